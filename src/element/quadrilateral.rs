use crate::element::ReferenceElement;
use crate::quadrature::{quadrilateral_gauss, Rule};
use nalgebra::{Point2, SVector, Vector2};
use serde::{Deserialize, Serialize};
use vtkio::model::CellType;

/// Lagrange-type elements on the reference square `[-1, 1]²`.
///
/// Node order: the four corners counter-clockwise starting at `(-1, -1)`, then the mid-edge
/// nodes of the edges `(0, -1)`, `(1, 0)`, `(0, 1)`, `(-1, 0)`, then the center.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuadrilateralElement {
    /// 4-node bilinear element.
    Bilinear,
    /// 8-node quadratic serendipity element.
    Serendipity,
    /// 9-node biquadratic Lagrange element.
    Biquadratic,
}

#[rustfmt::skip]
const REFERENCE_NODES: [[f64; 2]; 9] = [
    [-1.0, -1.0], [ 1.0, -1.0], [ 1.0,  1.0], [-1.0,  1.0],
    [ 0.0, -1.0], [ 1.0,  0.0], [ 0.0,  1.0], [-1.0,  0.0],
    [ 0.0,  0.0],
];

/// 1D quadratic Lagrange polynomial that equals one at `node` (one of -1, 0, 1).
fn quadratic_lagrange(node: f64, t: f64) -> f64 {
    if node == 0.0 {
        1.0 - t * t
    } else {
        0.5 * t * (t + node)
    }
}

fn quadratic_lagrange_derivative(node: f64, t: f64) -> f64 {
    if node == 0.0 {
        -2.0 * t
    } else {
        t + 0.5 * node
    }
}

impl ReferenceElement<2> for QuadrilateralElement {
    fn node_count(&self) -> usize {
        match self {
            Self::Bilinear => 4,
            Self::Serendipity => 8,
            Self::Biquadratic => 9,
        }
    }

    fn order(&self) -> usize {
        match self {
            Self::Bilinear => 1,
            Self::Serendipity | Self::Biquadratic => 2,
        }
    }

    fn reference_node(&self, local_node: usize) -> Point2<f64> {
        assert!(local_node < self.node_count(), "local node index out of bounds");
        Point2::from(REFERENCE_NODES[local_node])
    }

    #[rustfmt::skip]
    fn populate_basis(&self, basis: &mut [f64], xi: &Point2<f64>) {
        assert_eq!(basis.len(), self.node_count());
        let (x, y) = (xi[0], xi[1]);
        for (i, phi) in basis.iter_mut().enumerate() {
            let [a, b] = REFERENCE_NODES[i];
            *phi = match self {
                Self::Bilinear => 0.25 * (1.0 + a * x) * (1.0 + b * y),
                Self::Serendipity => match (a == 0.0, b == 0.0) {
                    (false, false) => 0.25 * (1.0 + a * x) * (1.0 + b * y) * (a * x + b * y - 1.0),
                    (true, _)      => 0.5 * (1.0 - x * x) * (1.0 + b * y),
                    (_, true)      => 0.5 * (1.0 + a * x) * (1.0 - y * y),
                },
                Self::Biquadratic => quadratic_lagrange(a, x) * quadratic_lagrange(b, y),
            };
        }
    }

    #[rustfmt::skip]
    fn populate_basis_gradients(&self, gradients: &mut [SVector<f64, 2>], xi: &Point2<f64>) {
        assert_eq!(gradients.len(), self.node_count());
        let (x, y) = (xi[0], xi[1]);
        for (i, grad) in gradients.iter_mut().enumerate() {
            let [a, b] = REFERENCE_NODES[i];
            *grad = match self {
                Self::Bilinear => Vector2::new(
                    0.25 * a * (1.0 + b * y),
                    0.25 * b * (1.0 + a * x),
                ),
                Self::Serendipity => match (a == 0.0, b == 0.0) {
                    (false, false) => Vector2::new(
                        0.25 * a * (1.0 + b * y) * (2.0 * a * x + b * y),
                        0.25 * b * (1.0 + a * x) * (a * x + 2.0 * b * y),
                    ),
                    (true, _) => Vector2::new(-x * (1.0 + b * y), 0.5 * b * (1.0 - x * x)),
                    (_, true) => Vector2::new(0.5 * a * (1.0 - y * y), -y * (1.0 + a * x)),
                },
                Self::Biquadratic => Vector2::new(
                    quadratic_lagrange_derivative(a, x) * quadratic_lagrange(b, y),
                    quadratic_lagrange(a, x) * quadratic_lagrange_derivative(b, y),
                ),
            };
        }
    }

    fn quadrature(&self, points_per_dim: usize) -> Rule<2> {
        quadrilateral_gauss(points_per_dim)
    }

    fn vtk_cell_type(&self) -> CellType {
        match self {
            Self::Bilinear => CellType::Quad,
            Self::Serendipity => CellType::QuadraticQuad,
            Self::Biquadratic => CellType::BiquadraticQuad,
        }
    }
}
