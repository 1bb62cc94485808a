//! Material parameters for heat conduction and plane-stress elasticity.
use crate::error::FemError;
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

/// Thermal conductivity `λ`, density `ρ` and specific heat capacity `c`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeatParameters {
    pub conductivity: f64,
    pub density: f64,
    pub capacity: f64,
}

impl Default for HeatParameters {
    fn default() -> Self {
        Self {
            conductivity: 1.0,
            density: 1.0,
            capacity: 1.0,
        }
    }
}

impl HeatParameters {
    /// Volumetric heat capacity `ρ c`, the coefficient of the mass matrix in transient problems.
    pub fn volumetric_capacity(&self) -> f64 {
        self.density * self.capacity
    }

    pub fn validate(&self) -> Result<(), FemError> {
        for (name, value) in [
            ("conductivity", self.conductivity),
            ("density", self.density),
            ("capacity", self.capacity),
        ] {
            if !(value > 0.0) || !value.is_finite() {
                return Err(FemError::InvalidParameter { name, value });
            }
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct YoungPoisson {
    pub young: f64,
    pub poisson: f64,
}

impl YoungPoisson {
    /// Requires `E > 0` and `-1 < ν < 0.5`.
    pub fn validate(&self) -> Result<(), FemError> {
        if !(self.young > 0.0) || !self.young.is_finite() {
            return Err(FemError::InvalidParameter {
                name: "young",
                value: self.young,
            });
        }
        if !(self.poisson > -1.0 && self.poisson < 0.5) {
            return Err(FemError::InvalidParameter {
                name: "poisson",
                value: self.poisson,
            });
        }
        Ok(())
    }
}

/// Coefficients of the plane-stress constitutive matrix
///
/// ```text
///     | d0  d1  0  |
/// D = | d1  d0  0  |
///     | 0   0   d2 |
/// ```
///
/// acting on the strain vector `[ε_xx, ε_yy, γ_xy]` with the engineering shear `γ_xy = 2 ε_xy`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlaneStress {
    pub d0: f64,
    pub d1: f64,
    pub d2: f64,
}

impl From<YoungPoisson> for PlaneStress {
    fn from(params: YoungPoisson) -> Self {
        let YoungPoisson { young, poisson } = params;
        let d0 = young / (1.0 - poisson * poisson);
        Self {
            d0,
            d1: poisson * d0,
            d2: 0.5 * young / (1.0 + poisson),
        }
    }
}

impl PlaneStress {
    /// The coefficients as the array `[d0, d1, d2]`.
    pub fn coefficients(&self) -> [f64; 3] {
        [self.d0, self.d1, self.d2]
    }

    #[rustfmt::skip]
    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.d0, self.d1, 0.0,
            self.d1, self.d0, 0.0,
            0.0,     0.0,     self.d2,
        )
    }

    /// Stress `[σ_xx, σ_yy, σ_xy]` for the tensor strain `[ε_xx, ε_yy, ε_xy]`.
    pub fn stress(&self, strain: &Vector3<f64>) -> Vector3<f64> {
        Vector3::new(
            self.d0 * strain[0] + self.d1 * strain[1],
            self.d1 * strain[0] + self.d0 * strain[1],
            2.0 * self.d2 * strain[2],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{PlaneStress, YoungPoisson};
    use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
    use nalgebra::Vector3;

    #[test]
    fn plane_stress_coefficients() {
        let d = PlaneStress::from(YoungPoisson {
            young: 21.0,
            poisson: 0.3,
        });
        assert_scalar_eq!(d.d0, 21.0 / 0.91, comp = abs, tol = 1e-12);
        assert_scalar_eq!(d.d1, 0.3 * 21.0 / 0.91, comp = abs, tol = 1e-12);
        assert_scalar_eq!(d.d2, 0.5 * 21.0 / 1.3, comp = abs, tol = 1e-12);
    }

    #[test]
    fn stress_agrees_with_constitutive_matrix_on_engineering_strain() {
        let d = PlaneStress::from(YoungPoisson {
            young: 2.0,
            poisson: 0.25,
        });
        let strain = Vector3::new(0.1, -0.05, 0.02);
        let engineering = Vector3::new(strain[0], strain[1], 2.0 * strain[2]);
        assert_matrix_eq!(d.stress(&strain), d.matrix() * engineering, comp = abs, tol = 1e-14);
    }
}
