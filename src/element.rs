//! Reference finite elements and tabulated shape functions.
//!
//! A reference element describes the shape functions of an element on its reference domain
//! (`[-1, 1]` or `[-1, 1]²`). Elements in a mesh are described by a reference element together
//! with the global indices of their nodes, the physical geometry is obtained by the usual
//! isoparametric mapping.
use crate::quadrature::Rule;
use nalgebra::{Point, SMatrix, SVector};
use std::fmt::Debug;
use vtkio::model::CellType;

mod quadrilateral;
mod segment;

pub use quadrilateral::QuadrilateralElement;
pub use segment::SegmentElement;

/// Shape functions of a Lagrange-type element on its reference domain.
///
/// Nodes are ordered vertices first, then mid-edge nodes, then interior nodes, which is the
/// node order of the corresponding VTK cells.
pub trait ReferenceElement<const D: usize>: Copy + Debug + PartialEq + Send + Sync + 'static {
    fn node_count(&self) -> usize;

    /// Polynomial order of the element along each reference direction.
    fn order(&self) -> usize;

    /// Reference coordinates of the given local node.
    ///
    /// # Panics
    ///
    /// Panics if `local_node >= self.node_count()`.
    fn reference_node(&self, local_node: usize) -> Point<f64, D>;

    /// Evaluates all shape functions at `xi`.
    ///
    /// # Panics
    ///
    /// Panics if `basis.len() != self.node_count()`.
    fn populate_basis(&self, basis: &mut [f64], xi: &Point<f64, D>);

    /// Evaluates the reference gradients of all shape functions at `xi`.
    ///
    /// # Panics
    ///
    /// Panics if `gradients.len() != self.node_count()`.
    fn populate_basis_gradients(&self, gradients: &mut [SVector<f64, D>], xi: &Point<f64, D>);

    /// Tensor-product Gauss rule with the given number of points per reference direction.
    fn quadrature(&self, points_per_dim: usize) -> Rule<D>;

    /// Gauss rule with `order + 1` points per direction.
    fn default_quadrature(&self) -> Rule<D> {
        self.quadrature(self.order() + 1)
    }

    fn vtk_cell_type(&self) -> CellType;
}

/// Shape function values, reference gradients and weights of a reference element, tabulated at
/// the points of a quadrature rule.
#[derive(Debug, Clone, PartialEq)]
pub struct TabulatedElement<const D: usize> {
    node_count: usize,
    weights: Vec<f64>,
    points: Vec<Point<f64, D>>,
    // Row-major in the quadrature point, i.e. entry (q, i) is stored at q * node_count + i
    values: Vec<f64>,
    gradients: Vec<SVector<f64, D>>,
}

impl<const D: usize> TabulatedElement<D> {
    pub fn new<E: ReferenceElement<D>>(element: &E, (weights, points): Rule<D>) -> Self {
        assert_eq!(weights.len(), points.len());
        let n = element.node_count();
        let points: Vec<_> = points.into_iter().map(Point::from).collect();
        let mut values = vec![0.0; n * points.len()];
        let mut gradients = vec![SVector::zeros(); n * points.len()];
        for (q, xi) in points.iter().enumerate() {
            element.populate_basis(&mut values[q * n..(q + 1) * n], xi);
            element.populate_basis_gradients(&mut gradients[q * n..(q + 1) * n], xi);
        }
        Self {
            node_count: n,
            weights,
            points,
            values,
            gradients,
        }
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn quadrature_node_count(&self) -> usize {
        self.weights.len()
    }

    pub fn weight(&self, q: usize) -> f64 {
        self.weights[q]
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn reference_point(&self, q: usize) -> &Point<f64, D> {
        &self.points[q]
    }

    pub fn shape_value(&self, i: usize, q: usize) -> f64 {
        self.values[q * self.node_count + i]
    }

    pub fn shape_gradient(&self, i: usize, q: usize) -> &SVector<f64, D> {
        &self.gradients[q * self.node_count + i]
    }

    /// All shape function values at quadrature point `q`.
    pub fn shape_values_at(&self, q: usize) -> &[f64] {
        &self.values[q * self.node_count..(q + 1) * self.node_count]
    }

    pub fn shape_gradients_at(&self, q: usize) -> &[SVector<f64, D>] {
        &self.gradients[q * self.node_count..(q + 1) * self.node_count]
    }
}

/// Returns the cofactor matrix `det(J) J^{-T}` together with `det(J)`.
///
/// For a reference gradient `g`, `cofactor * g = det(J) * (physical gradient)`, which lets the
/// bilinear forms divide by the determinant once instead of inverting the Jacobian.
///
/// # Panics
///
/// Panics for dimensions other than 1 and 2.
pub fn cofactor_and_determinant<const D: usize>(jacobian: &SMatrix<f64, D, D>) -> (SMatrix<f64, D, D>, f64) {
    let mut cofactor = SMatrix::<f64, D, D>::zeros();
    match D {
        1 => {
            cofactor[(0, 0)] = 1.0;
            (cofactor, jacobian[(0, 0)])
        }
        2 => {
            let j = jacobian;
            cofactor[(0, 0)] = j[(1, 1)];
            cofactor[(0, 1)] = -j[(1, 0)];
            cofactor[(1, 0)] = -j[(0, 1)];
            cofactor[(1, 1)] = j[(0, 0)];
            (cofactor, j[(0, 0)] * j[(1, 1)] - j[(0, 1)] * j[(1, 0)])
        }
        _ => panic!("unsupported dimension {}", D),
    }
}

/// Jacobian `J_ik = sum_n x^n_i dN_n/dxi_k` of the isoparametric map.
pub fn reference_jacobian<const D: usize>(
    vertices: impl IntoIterator<Item = Point<f64, D>>,
    gradients: &[SVector<f64, D>],
) -> SMatrix<f64, D, D> {
    vertices
        .into_iter()
        .zip(gradients)
        .fold(SMatrix::zeros(), |jacobian, (x, g)| jacobian + x.coords * g.transpose())
}

/// Physical point `x = sum_n x^n N_n` corresponding to the given shape function values.
pub fn map_reference_coords<const D: usize>(vertices: impl IntoIterator<Item = Point<f64, D>>, basis: &[f64]) -> Point<f64, D> {
    let coords = vertices
        .into_iter()
        .zip(basis)
        .fold(SVector::zeros(), |x, (x_n, &n)| x + x_n.coords * n);
    Point::from(coords)
}
