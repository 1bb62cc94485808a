//! Per-element quadrature data shared by all integration kernels.
use crate::config::QuadratureParameters;
use crate::element::{cofactor_and_determinant, map_reference_coords, reference_jacobian, ReferenceElement, TabulatedElement};
use crate::mesh::Mesh;
use log::info;
use nalgebra::{Point, SMatrix, SVector};
use rayon::prelude::*;

/// Quadrature points, Jacobians and scaled shape gradients of every element of a mesh.
///
/// Shape function tables are built once per element kind. For every element and quadrature
/// point the cache stores the physical point, the Jacobian `J` of the reference map, `det(J)`
/// and the scaled gradients `cofactor(J) * ∇_ref N_i = det(J) * ∇N_i`, so that kernels never
/// invert a Jacobian.
#[derive(Debug, Clone)]
pub struct QuadratureCache<const D: usize> {
    tables: Vec<TabulatedElement<D>>,
    element_tables: Vec<usize>,
    // Element e owns points point_offsets[e]..point_offsets[e + 1]
    point_offsets: Vec<usize>,
    points: Vec<Point<f64, D>>,
    jacobians: Vec<SMatrix<f64, D, D>>,
    determinants: Vec<f64>,
    // Element e owns gradients gradient_offsets[e]..gradient_offsets[e + 1], row-major in q
    gradient_offsets: Vec<usize>,
    scaled_gradients: Vec<SVector<f64, D>>,
}

#[derive(Debug, Default)]
struct ElementData<const D: usize> {
    points: Vec<Point<f64, D>>,
    jacobians: Vec<SMatrix<f64, D, D>>,
    determinants: Vec<f64>,
    scaled_gradients: Vec<SVector<f64, D>>,
}

impl<const D: usize> QuadratureCache<D> {
    pub fn new<E: ReferenceElement<D>>(mesh: &Mesh<D, E>, quadrature: &QuadratureParameters) -> Self {
        let kinds = mesh.element_kinds();
        let tables: Vec<_> = kinds
            .iter()
            .map(|kind| {
                let rule = match quadrature.points_per_dimension {
                    Some(n) => kind.quadrature(n),
                    None => kind.default_quadrature(),
                };
                TabulatedElement::new(kind, rule)
            })
            .collect();
        let element_tables: Vec<usize> = (0..mesh.element_count())
            .map(|e| {
                kinds
                    .iter()
                    .position(|kind| kind == mesh.element(e))
                    .expect("Internal error: every element kind is tabulated")
            })
            .collect();

        let per_element: Vec<ElementData<D>> = (0..mesh.element_count())
            .into_par_iter()
            .with_min_len(64)
            .map(|e| {
                let table = &tables[element_tables[e]];
                let nq = table.quadrature_node_count();
                let mut data = ElementData::default();
                data.scaled_gradients.reserve(nq * table.node_count());
                for q in 0..nq {
                    let jacobian = reference_jacobian(mesh.element_vertices(e), table.shape_gradients_at(q));
                    let (cofactor, det) = cofactor_and_determinant(&jacobian);
                    data.points
                        .push(map_reference_coords(mesh.element_vertices(e), table.shape_values_at(q)));
                    data.jacobians.push(jacobian);
                    data.determinants.push(det);
                    data.scaled_gradients
                        .extend(table.shape_gradients_at(q).iter().map(|g| cofactor * g));
                }
                data
            })
            .collect();

        let total_points: usize = per_element.iter().map(|data| data.points.len()).sum();
        let total_gradients: usize = per_element.iter().map(|data| data.scaled_gradients.len()).sum();
        let mut cache = Self {
            tables,
            element_tables,
            point_offsets: Vec::with_capacity(mesh.element_count() + 1),
            points: Vec::with_capacity(total_points),
            jacobians: Vec::with_capacity(total_points),
            determinants: Vec::with_capacity(total_points),
            gradient_offsets: Vec::with_capacity(mesh.element_count() + 1),
            scaled_gradients: Vec::with_capacity(total_gradients),
        };
        cache.point_offsets.push(0);
        cache.gradient_offsets.push(0);
        for data in per_element {
            cache.points.extend(data.points);
            cache.jacobians.extend(data.jacobians);
            cache.determinants.extend(data.determinants);
            cache.scaled_gradients.extend(data.scaled_gradients);
            cache.point_offsets.push(cache.points.len());
            cache.gradient_offsets.push(cache.scaled_gradients.len());
        }
        info!(
            "Quadrature cache: {} element kinds, {} quadrature points",
            cache.tables.len(),
            total_points
        );
        cache
    }

    pub fn element_count(&self) -> usize {
        self.element_tables.len()
    }

    pub fn element(&self, element: usize) -> ElementQuadrature<'_, D> {
        let points = self.point_offsets[element]..self.point_offsets[element + 1];
        let gradients = self.gradient_offsets[element]..self.gradient_offsets[element + 1];
        ElementQuadrature {
            table: &self.tables[self.element_tables[element]],
            points: &self.points[points.clone()],
            jacobians: &self.jacobians[points.clone()],
            determinants: &self.determinants[points],
            scaled_gradients: &self.scaled_gradients[gradients],
        }
    }

    /// All quadrature points of all elements, element by element.
    pub fn points(&self) -> &[Point<f64, D>] {
        &self.points
    }
}

/// Borrowed quadrature data of a single element.
#[derive(Debug, Clone, Copy)]
pub struct ElementQuadrature<'a, const D: usize> {
    table: &'a TabulatedElement<D>,
    points: &'a [Point<f64, D>],
    jacobians: &'a [SMatrix<f64, D, D>],
    determinants: &'a [f64],
    scaled_gradients: &'a [SVector<f64, D>],
}

impl<'a, const D: usize> ElementQuadrature<'a, D> {
    pub fn node_count(&self) -> usize {
        self.table.node_count()
    }

    pub fn quadrature_node_count(&self) -> usize {
        self.table.quadrature_node_count()
    }

    pub fn weight(&self, q: usize) -> f64 {
        self.table.weight(q)
    }

    pub fn point(&self, q: usize) -> &'a Point<f64, D> {
        &self.points[q]
    }

    pub fn points(&self) -> &'a [Point<f64, D>] {
        self.points
    }

    pub fn jacobian(&self, q: usize) -> &'a SMatrix<f64, D, D> {
        &self.jacobians[q]
    }

    pub fn determinant(&self, q: usize) -> f64 {
        self.determinants[q]
    }

    /// Quadrature weight times `|det J|`, the measure of the point in physical space.
    pub fn measure(&self, q: usize) -> f64 {
        self.table.weight(q) * self.determinants[q].abs()
    }

    pub fn shape_value(&self, i: usize, q: usize) -> f64 {
        self.table.shape_value(i, q)
    }

    pub fn shape_values_at(&self, q: usize) -> &'a [f64] {
        self.table.shape_values_at(q)
    }

    /// Reference gradient of shape function `i`.
    pub fn shape_gradient(&self, i: usize, q: usize) -> &'a SVector<f64, D> {
        self.table.shape_gradient(i, q)
    }

    /// `det(J) * ∇N_i` at quadrature point `q`.
    pub fn scaled_gradient(&self, i: usize, q: usize) -> &'a SVector<f64, D> {
        &self.scaled_gradients[q * self.table.node_count() + i]
    }

    /// Physical gradient `∇N_i` at quadrature point `q`.
    pub fn physical_gradient(&self, i: usize, q: usize) -> SVector<f64, D> {
        self.scaled_gradient(i, q) / self.determinants[q]
    }
}
