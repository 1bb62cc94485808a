//! Quadrature kernels of the bilinear forms and linear functionals.
//!
//! Gradients come from the [`QuadratureCache`](super::cache::QuadratureCache) in the scaled form
//! `g = det(J) ∇N`, so that `∇N_i · ∇N_j |det J| = g_i · g_j / |det J|` and
//! `∇N_i |det J| = sign(det J) g_i`.
use crate::assembly::cache::ElementQuadrature;
use crate::config::{AssemblyConfig, ModelParameters};
use crate::element::{ReferenceElement, TabulatedElement};
use crate::influence::InfluenceFunction;
use crate::materials::PlaneStress;
use crate::mesh::Facet;
use nalgebra::{Matrix2, Point, SVector, Vector2};

/// A symmetric bilinear form split into its element-local and nonlocal parts.
///
/// Blocks couple the solution components of one node (rows) with those of another node
/// (columns). They are row-major with `solution_dim()²` entries, and the methods add to them.
pub trait BilinearForm<const D: usize>: Sync {
    fn solution_dim(&self) -> usize;

    /// Whether [`add_nonlocal_block`](Self::add_nonlocal_block) contributes at all.
    fn is_nonlocal(&self) -> bool {
        false
    }

    /// Adds the block coupling local nodes `i` and `j` of one element.
    fn add_local_block(&self, element: &ElementQuadrature<D>, i: usize, j: usize, block: &mut [f64]);

    /// Adds the block coupling local node `i` of `element` with local node `j` of `neighbor`.
    fn add_nonlocal_block(
        &self,
        _element: &ElementQuadrature<D>,
        _neighbor: &ElementQuadrature<D>,
        _i: usize,
        _j: usize,
        _block: &mut [f64],
    ) {
    }
}

/// `∫ ∇N_i · ∇N_j dx` over one element.
pub fn local_stiffness<const D: usize>(element: &ElementQuadrature<D>, i: usize, j: usize) -> f64 {
    (0..element.quadrature_node_count())
        .map(|q| {
            element.weight(q) * element.scaled_gradient(i, q).dot(element.scaled_gradient(j, q))
                / element.determinant(q).abs()
        })
        .sum()
}

/// `∫ φ(x, y) ∇N_j(y) dy` over the neighbor element, for a fixed point `x`.
fn weighted_neighbor_gradient<const D: usize, F>(
    x: &Point<f64, D>,
    neighbor: &ElementQuadrature<D>,
    j: usize,
    influence: &F,
) -> SVector<f64, D>
where
    F: InfluenceFunction<D>,
{
    let mut integral = SVector::zeros();
    for q in 0..neighbor.quadrature_node_count() {
        let phi = influence.evaluate(x, neighbor.point(q));
        if phi != 0.0 {
            integral += neighbor.scaled_gradient(j, q) * (neighbor.weight(q) * phi * neighbor.determinant(q).signum());
        }
    }
    integral
}

/// `∫∫ φ(x, y) ∇N_i(x) · ∇N_j(y) dy dx` with `x` in `element` and `y` in `neighbor`.
///
/// The outer sum runs over the quadrature points of `element`, the inner one over those of
/// `neighbor`.
pub fn nonlocal_stiffness<const D: usize, F>(
    element: &ElementQuadrature<D>,
    neighbor: &ElementQuadrature<D>,
    i: usize,
    j: usize,
    influence: &F,
) -> f64
where
    F: InfluenceFunction<D>,
{
    (0..element.quadrature_node_count())
        .map(|q| {
            let inner = weighted_neighbor_gradient(element.point(q), neighbor, j, influence);
            element.weight(q) * element.determinant(q).signum() * element.scaled_gradient(i, q).dot(&inner)
        })
        .sum()
}

/// `∫ N_i N_j dx` over one element.
pub fn mass<const D: usize>(element: &ElementQuadrature<D>, i: usize, j: usize) -> f64 {
    (0..element.quadrature_node_count())
        .map(|q| element.measure(q) * element.shape_value(i, q) * element.shape_value(j, q))
        .sum()
}

/// `∫ N_i dx` over one element.
pub fn basis_integral<const D: usize>(element: &ElementQuadrature<D>, i: usize) -> f64 {
    (0..element.quadrature_node_count())
        .map(|q| element.measure(q) * element.shape_value(i, q))
        .sum()
}

/// `∫ N_i f dx` over one element.
pub fn source_integral<const D: usize>(
    element: &ElementQuadrature<D>,
    i: usize,
    source: impl Fn(&Point<f64, D>) -> f64,
) -> f64 {
    (0..element.quadrature_node_count())
        .map(|q| element.measure(q) * element.shape_value(i, q) * source(element.point(q)))
        .sum()
}

/// Integrates `flux` against the shape functions of a boundary facet, calling
/// `add(node, ∫ N_node flux ds)` for every node of the facet.
///
/// A point facet contributes the flux value itself. Segment facets are integrated with the
/// default Gauss rule of their kind and the line element `|dx/dξ|`.
pub fn integrate_facet<const D: usize>(
    vertices: &[Point<f64, D>],
    facet: &Facet,
    flux: impl Fn(&Point<f64, D>) -> f64,
    mut add: impl FnMut(usize, f64),
) {
    match facet {
        Facet::Point(node) => add(*node, flux(&vertices[*node])),
        Facet::Segment(kind, nodes) => {
            let table = TabulatedElement::new(kind, kind.default_quadrature());
            let mut integrals = vec![0.0; nodes.len()];
            for q in 0..table.quadrature_node_count() {
                let mut x = SVector::<f64, D>::zeros();
                let mut tangent = SVector::<f64, D>::zeros();
                for (n, &node) in nodes.iter().enumerate() {
                    x += vertices[node].coords * table.shape_value(n, q);
                    tangent += vertices[node].coords * table.shape_gradient(n, q)[0];
                }
                let value = table.weight(q) * flux(&Point::from(x)) * tangent.norm();
                for (n, integral) in integrals.iter_mut().enumerate() {
                    *integral += value * table.shape_value(n, q);
                }
            }
            for (&node, integral) in nodes.iter().zip(integrals) {
                add(node, integral);
            }
        }
    }
}

/// Row `i`, column `j` block of the plane-stress form for the gradients `gi`, `gj`:
///
/// ```text
/// | d0 gi_x gj_x + d2 gi_y gj_y    d1 gi_x gj_y + d2 gi_y gj_x |
/// | d1 gi_y gj_x + d2 gi_x gj_y    d0 gi_y gj_y + d2 gi_x gj_x |
/// ```
fn plane_stress_block(d: &PlaneStress, gi: &Vector2<f64>, gj: &Vector2<f64>) -> Matrix2<f64> {
    #[rustfmt::skip]
    let block = Matrix2::new(
        d.d0 * gi.x * gj.x + d.d2 * gi.y * gj.y, d.d1 * gi.x * gj.y + d.d2 * gi.y * gj.x,
        d.d1 * gi.y * gj.x + d.d2 * gi.x * gj.y, d.d0 * gi.y * gj.y + d.d2 * gi.x * gj.x,
    );
    block
}

/// Local plane-stress stiffness block `∫ B_iᵀ D B_j dx` of two local nodes.
pub fn plane_stress_local(element: &ElementQuadrature<2>, i: usize, j: usize, d: &PlaneStress) -> Matrix2<f64> {
    (0..element.quadrature_node_count()).fold(Matrix2::zeros(), |block, q| {
        let scale = element.weight(q) / element.determinant(q).abs();
        block + plane_stress_block(d, element.scaled_gradient(i, q), element.scaled_gradient(j, q)) * scale
    })
}

/// Nonlocal plane-stress stiffness block `∫∫ φ(x, y) B_i(x)ᵀ D B_j(y) dy dx`.
pub fn plane_stress_nonlocal<F>(
    element: &ElementQuadrature<2>,
    neighbor: &ElementQuadrature<2>,
    i: usize,
    j: usize,
    d: &PlaneStress,
    influence: &F,
) -> Matrix2<f64>
where
    F: InfluenceFunction<2>,
{
    (0..element.quadrature_node_count()).fold(Matrix2::zeros(), |block, q| {
        let inner = weighted_neighbor_gradient(element.point(q), neighbor, j, influence);
        let scale = element.weight(q) * element.determinant(q).signum();
        block + plane_stress_block(d, element.scaled_gradient(i, q), &inner) * scale
    })
}

/// Nonlocal weight applied to the nonlocal part, or `None` when the model is treated as local.
fn nonlocal_weight(model: &ModelParameters, config: &AssemblyConfig) -> Option<f64> {
    model.is_nonlocal(config).then(|| model.nonlocal_weight())
}

/// Heat conduction `p1 λ ∫ ∇T·∇v + (1 - p1) λ ∫∫ φ ∇T·∇v`.
#[derive(Debug, Clone)]
pub struct HeatStiffness<F> {
    conductivity: f64,
    local_weight: f64,
    nonlocal_weight: Option<f64>,
    influence: F,
}

impl<F> HeatStiffness<F> {
    pub fn new(conductivity: f64, model: &ModelParameters, config: &AssemblyConfig, influence: F) -> Self {
        Self {
            conductivity,
            local_weight: model.local_weight,
            nonlocal_weight: nonlocal_weight(model, config),
            influence,
        }
    }
}

impl<F, const D: usize> BilinearForm<D> for HeatStiffness<F>
where
    F: InfluenceFunction<D>,
{
    fn solution_dim(&self) -> usize {
        1
    }

    fn is_nonlocal(&self) -> bool {
        self.nonlocal_weight.is_some()
    }

    fn add_local_block(&self, element: &ElementQuadrature<D>, i: usize, j: usize, block: &mut [f64]) {
        block[0] += self.local_weight * self.conductivity * local_stiffness(element, i, j);
    }

    fn add_nonlocal_block(
        &self,
        element: &ElementQuadrature<D>,
        neighbor: &ElementQuadrature<D>,
        i: usize,
        j: usize,
        block: &mut [f64],
    ) {
        if let Some(weight) = self.nonlocal_weight {
            block[0] += weight * self.conductivity * nonlocal_stiffness(element, neighbor, i, j, &self.influence);
        }
    }
}

/// Heat capacity `ρ c ∫ T v`.
#[derive(Debug, Clone, Copy)]
pub struct HeatCapacity {
    pub volumetric_capacity: f64,
}

impl<const D: usize> BilinearForm<D> for HeatCapacity {
    fn solution_dim(&self) -> usize {
        1
    }

    fn add_local_block(&self, element: &ElementQuadrature<D>, i: usize, j: usize, block: &mut [f64]) {
        block[0] += self.volumetric_capacity * mass(element, i, j);
    }
}

/// Plane-stress elasticity `p1 ∫ ε(v)ᵀ D ε(u) + (1 - p1) ∫∫ φ ε(v)ᵀ D ε(u)`.
#[derive(Debug, Clone)]
pub struct PlaneStressStiffness<F> {
    material: PlaneStress,
    local_weight: f64,
    nonlocal_weight: Option<f64>,
    influence: F,
}

impl<F> PlaneStressStiffness<F> {
    pub fn new(material: PlaneStress, model: &ModelParameters, config: &AssemblyConfig, influence: F) -> Self {
        Self {
            material,
            local_weight: model.local_weight,
            nonlocal_weight: nonlocal_weight(model, config),
            influence,
        }
    }
}

impl<F> BilinearForm<2> for PlaneStressStiffness<F>
where
    F: InfluenceFunction<2>,
{
    fn solution_dim(&self) -> usize {
        2
    }

    fn is_nonlocal(&self) -> bool {
        self.nonlocal_weight.is_some()
    }

    fn add_local_block(&self, element: &ElementQuadrature<2>, i: usize, j: usize, block: &mut [f64]) {
        add_row_major(block, &plane_stress_local(element, i, j, &self.material), self.local_weight);
    }

    fn add_nonlocal_block(
        &self,
        element: &ElementQuadrature<2>,
        neighbor: &ElementQuadrature<2>,
        i: usize,
        j: usize,
        block: &mut [f64],
    ) {
        if let Some(weight) = self.nonlocal_weight {
            let nonlocal = plane_stress_nonlocal(element, neighbor, i, j, &self.material, &self.influence);
            add_row_major(block, &nonlocal, weight);
        }
    }
}

fn add_row_major(block: &mut [f64], matrix: &Matrix2<f64>, scale: f64) {
    for a in 0..2 {
        for b in 0..2 {
            block[2 * a + b] += scale * matrix[(a, b)];
        }
    }
}
