//! Influence functions of the nonlocal model.
//!
//! An influence function `φ(x, y)` weights the interaction between two points. All functions
//! here depend on `|x - y|` only, vanish beyond their radius and are normalized such that
//! `∫ φ(x, y) dy = 1` over the ball of the given radius.
use crate::error::FemError;
use nalgebra::Point;
use std::f64::consts::PI;

pub trait InfluenceFunction<const D: usize>: Sync {
    fn evaluate(&self, x: &Point<f64, D>, y: &Point<f64, D>) -> f64;

    /// Radius of the support.
    fn radius(&self) -> f64;
}

impl<'a, F, const D: usize> InfluenceFunction<D> for &'a F
where
    F: ?Sized + InfluenceFunction<D>,
{
    fn evaluate(&self, x: &Point<f64, D>, y: &Point<f64, D>) -> f64 {
        F::evaluate(self, x, y)
    }

    fn radius(&self) -> f64 {
        F::radius(self)
    }
}

/// Measure of the ball with the given radius, `2r` in 1D and `πr²` in 2D.
fn ball_measure(dim: usize, radius: f64) -> f64 {
    match dim {
        1 => 2.0 * radius,
        2 => PI * radius * radius,
        _ => panic!("unsupported dimension {}", dim),
    }
}

/// Constant influence `1 / |B_r|` inside the ball of radius `r`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ConstantInfluence {
    radius: f64,
}

impl ConstantInfluence {
    pub fn new(radius: f64) -> Result<Self, FemError> {
        check_radius(radius)?;
        Ok(Self { radius })
    }
}

impl<const D: usize> InfluenceFunction<D> for ConstantInfluence {
    fn evaluate(&self, x: &Point<f64, D>, y: &Point<f64, D>) -> f64 {
        if nalgebra::distance_squared(x, y) <= self.radius * self.radius {
            1.0 / ball_measure(D, self.radius)
        } else {
            0.0
        }
    }

    fn radius(&self) -> f64 {
        self.radius
    }
}

/// Bell-shaped influence `C (1 - (ρ/r)^p)^q` for `ρ = |x - y| <= r`.
///
/// With `p = 2, q = 1` this is the parabolic kernel, larger `q` makes the kernel smoother at
/// the edge of its support.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PolynomialInfluence {
    radius: f64,
    p: u32,
    q: u32,
    // Normalization constants for dimensions 1 and 2
    normalization: [f64; 2],
}

impl PolynomialInfluence {
    pub fn new(radius: f64, p: u32, q: u32) -> Result<Self, FemError> {
        check_radius(radius)?;
        if p == 0 {
            return Err(FemError::InvalidParameter {
                name: "p",
                value: p as f64,
            });
        }
        let normalization = [
            1.0 / (2.0 * radius * Self::moment(p, q, 0)),
            1.0 / (2.0 * PI * radius * radius * Self::moment(p, q, 1)),
        ];
        Ok(Self {
            radius,
            p,
            q,
            normalization,
        })
    }

    /// `∫_0^1 t^a (1 - t^p)^q dt`, expanded binomially.
    fn moment(p: u32, q: u32, a: u32) -> f64 {
        let mut binomial = 1.0;
        let mut sum = 0.0;
        for k in 0..=q {
            let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
            sum += sign * binomial / f64::from(a + 1 + p * k);
            binomial *= f64::from(q - k) / f64::from(k + 1);
        }
        sum
    }
}

impl<const D: usize> InfluenceFunction<D> for PolynomialInfluence {
    fn evaluate(&self, x: &Point<f64, D>, y: &Point<f64, D>) -> f64 {
        let rho = nalgebra::distance(x, y) / self.radius;
        if rho <= 1.0 {
            self.normalization[D - 1] * (1.0 - rho.powi(self.p as i32)).powi(self.q as i32)
        } else {
            0.0
        }
    }

    fn radius(&self) -> f64 {
        self.radius
    }
}

fn check_radius(radius: f64) -> Result<(), FemError> {
    if radius > 0.0 && radius.is_finite() {
        Ok(())
    } else {
        Err(FemError::InvalidParameter {
            name: "radius",
            value: radius,
        })
    }
}
