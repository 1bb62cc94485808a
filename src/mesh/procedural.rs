//! Uniform meshes of intervals and rectangles.
use crate::element::{QuadrilateralElement, ReferenceElement, SegmentElement};
use crate::mesh::{BoundaryGroup, Facet, Mesh1d, Mesh2d};
use nalgebra::{Point1, Point2};

/// Uniform mesh of `[a, b]` with `num_elements` elements of the given kind.
///
/// Nodes are numbered from left to right. The boundary groups are `"left"` and `"right"`.
///
/// # Panics
///
/// Panics if `num_elements == 0` or the interval is empty.
pub fn create_uniform_segment_mesh(kind: SegmentElement, interval: [f64; 2], num_elements: usize) -> Mesh1d {
    let [a, b] = interval;
    assert!(num_elements > 0, "at least one element is required");
    assert!(b > a, "interval must be non-empty");

    let order = kind.order();
    let num_nodes = order * num_elements + 1;
    let h = (b - a) / (num_nodes - 1) as f64;
    let vertices = (0..num_nodes).map(|i| Point1::new(a + i as f64 * h)).collect();
    let connectivity = (0..num_elements)
        .map(|e| {
            let first = order * e;
            // End points first, then the interior node
            let mut nodes = vec![first, first + order];
            nodes.extend(first + 1..first + order);
            nodes
        })
        .collect();
    let boundary_groups = vec![
        BoundaryGroup::new("left", vec![Facet::Point(0)]),
        BoundaryGroup::new("right", vec![Facet::Point(num_nodes - 1)]),
    ];

    Mesh1d::from_vertices_and_connectivity(vertices, vec![kind; num_elements], connectivity, boundary_groups)
        .expect("generated connectivity is always valid")
}

/// Uniform mesh of the rectangle `[x0, x0 + width] x [y0, y0 + height]` with
/// `cells[0] x cells[1]` elements of the given kind.
///
/// Nodes are numbered row by row from the bottom left corner. The boundary groups are
/// `"down"`, `"right"`, `"up"` and `"left"`, each traversed counter-clockwise with respect to
/// the domain.
///
/// # Panics
///
/// Panics if a cell count is zero or the rectangle is empty.
pub fn create_rectangular_mesh(
    kind: QuadrilateralElement,
    origin: [f64; 2],
    size: [f64; 2],
    cells: [usize; 2],
) -> Mesh2d {
    let [nx, ny] = cells;
    assert!(nx > 0 && ny > 0, "at least one cell per dimension is required");
    assert!(size[0] > 0.0 && size[1] > 0.0, "rectangle must be non-empty");

    // Elements are laid out on a fine lattice with `order` lattice steps per cell
    let s = kind.order();
    let (lx, ly) = (s * nx + 1, s * ny + 1);
    let lattice_index = |i: usize, j: usize| j * lx + i;
    let element_lattice_nodes = |ex: usize, ey: usize| -> Vec<usize> {
        (0..kind.node_count())
            .map(|local| {
                let xi = kind.reference_node(local);
                let offset = |t: f64| ((t + 1.0) * 0.5 * s as f64).round() as usize;
                lattice_index(s * ex + offset(xi[0]), s * ey + offset(xi[1]))
            })
            .collect()
    };

    // Serendipity elements leave cell centers unused, so only number the lattice nodes in use
    let mut used = vec![false; lx * ly];
    for ey in 0..ny {
        for ex in 0..nx {
            for idx in element_lattice_nodes(ex, ey) {
                used[idx] = true;
            }
        }
    }
    let mut node_index = vec![usize::MAX; lx * ly];
    let mut vertices = Vec::new();
    let (hx, hy) = (size[0] / (lx - 1) as f64, size[1] / (ly - 1) as f64);
    for j in 0..ly {
        for i in 0..lx {
            if used[lattice_index(i, j)] {
                node_index[lattice_index(i, j)] = vertices.len();
                vertices.push(Point2::new(origin[0] + i as f64 * hx, origin[1] + j as f64 * hy));
            }
        }
    }

    let mut connectivity = Vec::with_capacity(nx * ny);
    for ey in 0..ny {
        for ex in 0..nx {
            let nodes = element_lattice_nodes(ex, ey)
                .into_iter()
                .map(|idx| node_index[idx])
                .collect();
            connectivity.push(nodes);
        }
    }

    let edge_kind = if s == 1 {
        SegmentElement::Linear
    } else {
        SegmentElement::Quadratic
    };
    // Edge from lattice point `start` to `end`, with the midpoint for quadratic edges
    let edge = |start: (usize, usize), end: (usize, usize)| {
        let mut nodes = vec![
            node_index[lattice_index(start.0, start.1)],
            node_index[lattice_index(end.0, end.1)],
        ];
        if s == 2 {
            nodes.push(node_index[lattice_index((start.0 + end.0) / 2, (start.1 + end.1) / 2)]);
        }
        Facet::Segment(edge_kind, nodes)
    };
    let (imax, jmax) = (lx - 1, ly - 1);
    let down = (0..nx).map(|e| edge((s * e, 0), (s * (e + 1), 0))).collect();
    let right = (0..ny).map(|e| edge((imax, s * e), (imax, s * (e + 1)))).collect();
    let up = (0..nx)
        .rev()
        .map(|e| edge((s * (e + 1), jmax), (s * e, jmax)))
        .collect();
    let left = (0..ny)
        .rev()
        .map(|e| edge((0, s * (e + 1)), (0, s * e)))
        .collect();
    let boundary_groups = vec![
        BoundaryGroup::new("down", down),
        BoundaryGroup::new("right", right),
        BoundaryGroup::new("up", up),
        BoundaryGroup::new("left", left),
    ];

    Mesh2d::from_vertices_and_connectivity(vertices, vec![kind; nx * ny], connectivity, boundary_groups)
        .expect("generated connectivity is always valid")
}

/// Uniform mesh of the unit square `[0, 1]²`.
pub fn create_unit_square_mesh(kind: QuadrilateralElement, cells_per_dim: usize) -> Mesh2d {
    create_rectangular_mesh(kind, [0.0, 0.0], [1.0, 1.0], [cells_per_dim, cells_per_dim])
}
