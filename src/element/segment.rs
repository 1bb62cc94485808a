use crate::element::ReferenceElement;
use crate::quadrature::{gauss, Rule};
use nalgebra::{Point1, SVector, Vector1};
use serde::{Deserialize, Serialize};
use vtkio::model::CellType;

/// Lagrange elements on the reference segment `[-1, 1]`.
///
/// Node order: the end points `-1` and `1` first, then (for the quadratic element) the
/// midpoint `0`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SegmentElement {
    Linear,
    Quadratic,
}

impl SegmentElement {
    /// The segment element with the given number of nodes, if any.
    pub fn from_node_count(node_count: usize) -> Option<Self> {
        match node_count {
            2 => Some(Self::Linear),
            3 => Some(Self::Quadratic),
            _ => None,
        }
    }
}

impl ReferenceElement<1> for SegmentElement {
    fn node_count(&self) -> usize {
        match self {
            Self::Linear => 2,
            Self::Quadratic => 3,
        }
    }

    fn order(&self) -> usize {
        match self {
            Self::Linear => 1,
            Self::Quadratic => 2,
        }
    }

    fn reference_node(&self, local_node: usize) -> Point1<f64> {
        assert!(local_node < self.node_count(), "local node index out of bounds");
        Point1::new([-1.0, 1.0, 0.0][local_node])
    }

    fn populate_basis(&self, basis: &mut [f64], xi: &Point1<f64>) {
        assert_eq!(basis.len(), self.node_count());
        let x = xi[0];
        match self {
            Self::Linear => {
                basis[0] = 0.5 * (1.0 - x);
                basis[1] = 0.5 * (1.0 + x);
            }
            Self::Quadratic => {
                basis[0] = 0.5 * x * (x - 1.0);
                basis[1] = 0.5 * x * (x + 1.0);
                basis[2] = 1.0 - x * x;
            }
        }
    }

    fn populate_basis_gradients(&self, gradients: &mut [SVector<f64, 1>], xi: &Point1<f64>) {
        assert_eq!(gradients.len(), self.node_count());
        let x = xi[0];
        match self {
            Self::Linear => {
                gradients[0] = Vector1::new(-0.5);
                gradients[1] = Vector1::new(0.5);
            }
            Self::Quadratic => {
                gradients[0] = Vector1::new(x - 0.5);
                gradients[1] = Vector1::new(x + 0.5);
                gradients[2] = Vector1::new(-2.0 * x);
            }
        }
    }

    fn quadrature(&self, points_per_dim: usize) -> Rule<1> {
        gauss(points_per_dim)
    }

    fn vtk_cell_type(&self) -> CellType {
        match self {
            Self::Linear => CellType::Line,
            Self::Quadratic => CellType::QuadraticEdge,
        }
    }
}
