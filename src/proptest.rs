use crate::config::ModelParameters;
use crate::element::{QuadrilateralElement, SegmentElement};
use crate::mesh::procedural::{create_rectangular_mesh, create_uniform_segment_mesh};
use crate::mesh::{Mesh1d, Mesh2d};
use ::proptest::prelude::*;
use nalgebra::Point2;
use std::cmp::max;

pub fn point2() -> impl Strategy<Value = Point2<f64>> {
    // Pick a reasonably small range to pick coordinates from,
    // otherwise we can easily get floating point numbers that are
    // so ridiculously large as to break anything we might want to do with them
    let range = -10.0..10.0;
    [range.clone(), range.clone()].prop_map(|[x, y]| Point2::new(x, y))
}

impl Arbitrary for SegmentElement {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
        prop_oneof![Just(SegmentElement::Linear), Just(SegmentElement::Quadratic)].boxed()
    }
}

impl Arbitrary for QuadrilateralElement {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
        prop_oneof![
            Just(QuadrilateralElement::Bilinear),
            Just(QuadrilateralElement::Serendipity),
            Just(QuadrilateralElement::Biquadratic)
        ]
        .boxed()
    }
}

// Returns a strategy in which each value is a pair (nx, ny) of positive cell counts
// such that nx * ny <= max_cells
fn rectangular_mesh_cell_distribution_strategy(max_cells: usize) -> impl Strategy<Value = (usize, usize)> {
    let max_cells = max(1, max_cells);
    (1..=max_cells).prop_flat_map(move |nx| (Just(nx), 1..=max(1, max_cells / nx)))
}

/// Rectangular meshes of random element kind, cell counts and extents.
pub fn rectangular_mesh_strategy(max_cells: usize) -> impl Strategy<Value = Mesh2d> {
    (
        any::<QuadrilateralElement>(),
        rectangular_mesh_cell_distribution_strategy(max_cells),
        [-1.0..1.0, -1.0..1.0],
        [0.5..2.0, 0.5..2.0],
    )
        .prop_map(|(kind, (nx, ny), origin, size)| create_rectangular_mesh(kind, origin, size, [nx, ny]))
}

/// Uniform meshes of random element kind and cell count on `[0, length]`, `length` in `[0.5, 2]`.
pub fn segment_mesh_strategy(max_cells: usize) -> impl Strategy<Value = Mesh1d> {
    (any::<SegmentElement>(), 1..=max(1, max_cells), 0.5..2.0)
        .prop_map(|(kind, n, length)| create_uniform_segment_mesh(kind, [0.0, length], n))
}

/// Nonlocal model parameters with a local weight in `[0, 0.9]` and a radius in `[0.1, max_radius]`.
pub fn nonlocal_model_strategy(max_radius: f64) -> impl Strategy<Value = ModelParameters> {
    (0.0..=0.9, 0.1..=max_radius.max(0.1)).prop_map(|(p1, r)| ModelParameters::nonlocal(p1, r))
}
