//! Radius queries accelerated by an R*-tree.
use nalgebra::Point;
use rayon::prelude::*;
use rstar::primitives::GeomWithData;
use rstar::RTree;

/// Point stored in the tree. rstar requires at least two dimensions, so 1D points carry an
/// extra coordinate that is always zero.
#[derive(Debug, Clone, Copy, PartialEq)]
struct NeighborPoint<const D: usize> {
    coords: Point<f64, D>,
    padding: f64,
}

impl<const D: usize> NeighborPoint<D> {
    fn new(coords: Point<f64, D>) -> Self {
        Self { coords, padding: 0.0 }
    }
}

impl<const D: usize> rstar::Point for NeighborPoint<D> {
    type Scalar = f64;
    const DIMENSIONS: usize = if D < 2 { 2 } else { D };

    fn generate(mut generator: impl FnMut(usize) -> Self::Scalar) -> Self {
        let coords = Point::from(std::array::from_fn::<f64, D, _>(|i| generator(i)));
        let padding = if D < 2 { generator(D) } else { 0.0 };
        Self { coords, padding }
    }

    fn nth(&self, index: usize) -> Self::Scalar {
        if index < D {
            self.coords[index]
        } else {
            self.padding
        }
    }

    fn nth_mut(&mut self, index: usize) -> &mut Self::Scalar {
        if index < D {
            &mut self.coords[index]
        } else {
            &mut self.padding
        }
    }
}

/// For every query point, the sorted indices of the points within `radius` of it.
///
/// The radius is inclusive up to a relative round-off tolerance, so that points placed exactly
/// at the radius (common on uniform meshes) are found.
pub fn points_within_radius<const D: usize>(
    points: &[Point<f64, D>],
    queries: &[Point<f64, D>],
    radius: f64,
) -> Vec<Vec<usize>> {
    let tree = RTree::bulk_load(
        points
            .iter()
            .enumerate()
            .map(|(i, p)| GeomWithData::new(NeighborPoint::new(*p), i))
            .collect(),
    );
    let radius_squared = radius * radius * (1.0 + 1e-10);
    queries
        .par_iter()
        .map(|query| {
            let mut found: Vec<usize> = tree
                .locate_within_distance(NeighborPoint::new(*query), radius_squared)
                .map(|geom| geom.data)
                .collect();
            found.sort_unstable();
            found
        })
        .collect()
}
