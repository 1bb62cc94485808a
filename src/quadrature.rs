//! Gauss quadrature on the reference segment `[-1, 1]` and reference square `[-1, 1]²`.
use std::f64::consts::PI;

/// A quadrature rule consisting of weights and reference points.
pub type Rule<const D: usize> = (Vec<f64>, Vec<[f64; D]>);

/// Legendre polynomial `p_n` and its predecessor `p_{n-1}` evaluated at `x`.
///
/// The derivative formula is singular at |x| == 1, so this is only suitable for evaluation in
/// the open interval (-1, 1).
#[derive(Debug, Clone, Copy)]
struct LegendreRecurrence {
    n: usize,
    x: f64,
    p_n: f64,
    p_prev: f64,
}

impl LegendreRecurrence {
    fn evaluate(n: usize, x: f64) -> Self {
        // m P_m(x) = (2m - 1) x P_{m - 1}(x) - (m - 1) P_{m - 2}(x)
        let mut p_n = 1.0;
        let mut p_prev = 0.0;
        for m in 1..=n {
            let m = m as f64;
            let p_prev_prev = p_prev;
            p_prev = p_n;
            p_n = ((2.0 * m - 1.0) * x * p_prev - (m - 1.0) * p_prev_prev) / m;
        }
        Self { n, x, p_n, p_prev }
    }

    fn derivative(&self) -> f64 {
        let n = self.n as f64;
        n * (self.x * self.p_n - self.p_prev) / (self.x * self.x - 1.0)
    }
}

const MAX_NEWTON_ITERATIONS: usize = 100;

/// Gauss–Legendre rule with `num_points` points on `[-1, 1]`.
///
/// Integrates polynomials of degree up to `2 num_points - 1` exactly.
///
/// # Panics
///
/// Panics if zero points are requested.
pub fn gauss(num_points: usize) -> Rule<1> {
    let n = num_points;
    assert!(n > 0, "number of points must be positive");

    let mut points = vec![[0.0]; n];
    let mut weights = vec![0.0; n];

    // Roots come in symmetric pairs, only the upper half is computed by Newton iteration
    for i in 0..(n + 1) / 2 {
        let mut x = (PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
        for _ in 0..MAX_NEWTON_ITERATIONS {
            let recurrence = LegendreRecurrence::evaluate(n, x);
            let dx = -recurrence.p_n / recurrence.derivative();
            x += dx;
            if dx.abs() <= 1e-15 {
                break;
            }
        }

        let dp = LegendreRecurrence::evaluate(n, x).derivative();
        let w = 2.0 / ((1.0 - x * x) * dp * dp);
        points[i] = [-x];
        weights[i] = w;
        points[n - i - 1] = [x];
        weights[n - i - 1] = w;
    }

    (weights, points)
}

/// Tensor-product Gauss rule on `[-1, 1]²` with `num_points_per_dim` points per direction.
///
/// Points are ordered with the first coordinate varying slowest.
pub fn quadrilateral_gauss(num_points_per_dim: usize) -> Rule<2> {
    let (weights_1d, points_1d) = gauss(num_points_per_dim);
    let mut weights = Vec::with_capacity(weights_1d.len().pow(2));
    let mut points = Vec::with_capacity(weights_1d.len().pow(2));
    for (&w_x, &[x]) in weights_1d.iter().zip(&points_1d) {
        for (&w_y, &[y]) in weights_1d.iter().zip(&points_1d) {
            weights.push(w_x * w_y);
            points.push([x, y]);
        }
    }
    (weights, points)
}
