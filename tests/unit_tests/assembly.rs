use crate::{dense_reference_matrix, expand_upper_triangle};
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::Point1;
use nalgebra_sparse::SparseEntry;
use nonlocal_fem::assembly::kernels::nonlocal_stiffness;
use nonlocal_fem::assembly::traversal::{for_each_local_pair, for_each_nonlocal_pair};
use nonlocal_fem::assembly::{
    assemble_load_vector, BilinearForm, DofLayout, ElementQuadrature, HeatCapacity, HeatStiffness, PlaneStressStiffness, QuadratureCache,
    SystemAssembler,
};
use nonlocal_fem::boundary::apply_dirichlet;
use nonlocal_fem::config::{AssemblyConfig, ModelParameters, QuadratureParameters};
use nonlocal_fem::element::{QuadrilateralElement, ReferenceElement, SegmentElement};
use nonlocal_fem::influence::{ConstantInfluence, InfluenceFunction, PolynomialInfluence};
use nonlocal_fem::materials::{PlaneStress, YoungPoisson};
use nonlocal_fem::mesh::procedural::{create_rectangular_mesh, create_uniform_segment_mesh, create_unit_square_mesh};
use nonlocal_fem::mesh::{BoundaryGroup, Facet, Mesh, Mesh1d};
use nonlocal_fem::proptest::rectangular_mesh_strategy;
use proptest::prelude::*;
use std::collections::HashSet;

/// Node pairs `(i, j)` with `i <= j` coupled by the local or nonlocal form.
fn coupled_node_pairs<const D: usize, E: ReferenceElement<D>>(mesh: &Mesh<D, E>, nonlocal: bool) -> HashSet<(usize, usize)> {
    let mut pairs = HashSet::new();
    let mut insert = |a: usize, b: usize| {
        pairs.insert((a.min(b), a.max(b)));
    };
    for_each_local_pair(mesh, |e, i, j| insert(mesh.node_number(e, i), mesh.node_number(e, j)));
    if nonlocal {
        for_each_nonlocal_pair(mesh, |e, n, i, j| insert(mesh.node_number(e, i), mesh.node_number(n, j)));
    }
    pairs
}

/// The nonlocal stiffness with the quadrature loops in the opposite order: neighbor points
/// outside, element points inside.
fn nonlocal_stiffness_neighbor_outer<F: InfluenceFunction<2>>(
    element: &ElementQuadrature<2>,
    neighbor: &ElementQuadrature<2>,
    i: usize,
    j: usize,
    influence: &F,
) -> f64 {
    let mut sum = 0.0;
    for q_neighbor in 0..neighbor.quadrature_node_count() {
        let gradient_j = neighbor.physical_gradient(j, q_neighbor) * neighbor.measure(q_neighbor);
        for q in 0..element.quadrature_node_count() {
            let phi = influence.evaluate(element.point(q), neighbor.point(q_neighbor));
            sum += element.measure(q) * phi * element.physical_gradient(i, q).dot(&gradient_j);
        }
    }
    sum
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn portrait_rows_are_sorted_upper_triangles_of_coupled_pairs(
        mesh in rectangular_mesh_strategy(6),
        nonlocal in any::<bool>(),
        radius in 0.2..1.0,
    ) {
        let mut mesh = mesh;
        if nonlocal {
            mesh.find_neighbors(radius);
        }
        let layout = DofLayout::for_mesh(&mesh, 1);
        let matrix = SystemAssembler::default().build_portrait(&mesh, &layout, nonlocal).unwrap();
        let inner = matrix.inner();

        for (row, csr_row) in inner.row_iter().enumerate() {
            let cols = csr_row.col_indices();
            prop_assert!(cols.windows(2).all(|pair| pair[0] < pair[1]));
            prop_assert!(cols.iter().all(|&col| col >= row));
        }
        let pairs = coupled_node_pairs(&mesh, nonlocal);
        prop_assert_eq!(inner.nnz(), pairs.len());
        for (row, col, _) in inner.triplet_iter() {
            prop_assert!(pairs.contains(&(row, col)));
        }
        prop_assert_eq!(matrix.bound().nnz(), 0);
    }

    #[test]
    fn nonlocal_quadrature_loop_order_does_not_matter(
        mesh in rectangular_mesh_strategy(4),
        radius in 0.3..1.5,
    ) {
        let cache = QuadratureCache::new(&mesh, &QuadratureParameters::default());
        let influence = PolynomialInfluence::new(radius, 2, 1).unwrap();
        for e in 0..mesh.element_count() {
            for n in 0..mesh.element_count() {
                let (element, neighbor) = (cache.element(e), cache.element(n));
                for i in 0..element.node_count() {
                    for j in 0..neighbor.node_count() {
                        let a = nonlocal_stiffness(&element, &neighbor, i, j, &influence);
                        let b = nonlocal_stiffness_neighbor_outer(&element, &neighbor, i, j, &influence);
                        prop_assert!((a - b).abs() <= 1e-12 * a.abs().max(1.0), "{} vs {}", a, b);
                    }
                }
            }
        }
    }
}

#[test]
fn nonlocal_heat_stiffness_matches_element_centric_assembly() {
    let mut mesh = create_rectangular_mesh(QuadrilateralElement::Bilinear, [0.0, 0.0], [1.5, 1.0], [3, 2]);
    mesh.find_neighbors(0.6);
    let cache = QuadratureCache::new(&mesh, &QuadratureParameters::default());
    let config = AssemblyConfig::default();
    let influence = ConstantInfluence::new(0.6).unwrap();
    let form = HeatStiffness::new(2.0, &ModelParameters::nonlocal(0.5, 0.6), &config, influence);
    assert!(BilinearForm::<2>::is_nonlocal(&form));

    let layout = DofLayout::for_mesh(&mesh, 1);
    let assembler = SystemAssembler::default();
    let mut matrix = assembler.build_portrait(&mesh, &layout, true).unwrap();
    assembler
        .assemble_into(&mut matrix, &mesh, &cache, &layout, &form)
        .unwrap();

    let reference = dense_reference_matrix(&mesh, &cache, &form);
    assert_matrix_eq!(reference, reference.transpose(), comp = abs, tol = 1e-12);
    assert_matrix_eq!(expand_upper_triangle(matrix.inner()), reference, comp = abs, tol = 1e-12);

    // Constants lie in the kernel of both the local and the nonlocal operator
    for row in reference.row_iter() {
        assert_scalar_eq!(row.sum(), 0.0, comp = abs, tol = 1e-12);
    }
}

#[test]
fn partitioned_rows_match_the_full_system() {
    let mut mesh = create_unit_square_mesh(QuadrilateralElement::Bilinear, 4);
    mesh.find_neighbors(0.3);
    let cache = QuadratureCache::new(&mesh, &QuadratureParameters::default());
    let form = HeatStiffness::new(
        1.0,
        &ModelParameters::nonlocal(0.5, 0.3),
        &AssemblyConfig::default(),
        ConstantInfluence::new(0.3).unwrap(),
    );
    let left = mesh.find_boundary_group("left").unwrap();
    let dirichlet: Vec<_> = mesh
        .boundary_group(left)
        .nodes()
        .into_iter()
        .map(|node| (node, 1.0 + mesh.node(node)[1]))
        .collect();
    let source = |x: &nalgebra::Point2<f64>, _: usize| 1.0 + x[0];
    let assembler = SystemAssembler::default();

    let mut full_layout = DofLayout::for_mesh(&mesh, 1);
    for &(dof, _) in &dirichlet {
        full_layout.set_constrained(dof);
    }
    let mut full = assembler.build_portrait(&mesh, &full_layout, true).unwrap();
    assembler
        .assemble_into(&mut full, &mesh, &cache, &full_layout, &form)
        .unwrap();
    let mut full_rhs = assemble_load_vector(&mesh, &cache, &full_layout, source);

    let mut partitioned_mesh = mesh.clone();
    partitioned_mesh.set_owned_nodes(5..21).unwrap();
    let mut layout = DofLayout::for_mesh(&partitioned_mesh, 1);
    for &(dof, _) in &dirichlet {
        layout.set_constrained(dof);
    }
    assert_eq!(layout.first_row(), 5);
    assert_eq!(layout.row_count(), 16);
    assert!(!layout.is_complete());
    let mut partitioned = assembler.build_portrait(&partitioned_mesh, &layout, true).unwrap();
    assembler
        .assemble_into(&mut partitioned, &partitioned_mesh, &cache, &layout, &form)
        .unwrap();
    let mut rhs = assemble_load_vector(&partitioned_mesh, &cache, &layout, source);

    assert_eq!(partitioned.first_row(), 5);
    assert_eq!(partitioned.inner().nrows(), 16);
    assert_eq!(partitioned.bound().nrows(), 16);
    assert_eq!(partitioned.inner().ncols(), full.inner().ncols());
    for local_row in 0..16 {
        let row = layout.first_row() + local_row;
        let blocks = [
            (partitioned.inner(), full.inner()),
            (partitioned.bound(), full.bound()),
        ];
        for (local_block, full_block) in blocks {
            let local = local_block.row(local_row);
            let global = full_block.row(row);
            assert_eq!(local.col_indices(), global.col_indices(), "row {row}");
            for (&a, &b) in local.values().iter().zip(global.values()) {
                assert_scalar_eq!(a, b, comp = abs, tol = 1e-14);
            }
        }
    }

    for row in 0..mesh.node_count() {
        if (5..21).contains(&row) {
            assert_scalar_eq!(rhs[row], full_rhs[row], comp = abs, tol = 1e-14);
        } else {
            assert_eq!(rhs[row], 0.0);
        }
    }

    apply_dirichlet(&full, &mut full_rhs, &dirichlet);
    apply_dirichlet(&partitioned, &mut rhs, &dirichlet);
    for row in 5..21 {
        assert_scalar_eq!(rhs[row], full_rhs[row], comp = abs, tol = 1e-13);
    }
}

#[test]
fn nonlocal_assembly_on_mixed_segment_kinds_matches_element_centric_assembly() {
    let vertices = vec![
        Point1::new(0.0),
        Point1::new(0.5),
        Point1::new(1.0),
        Point1::new(0.75),
        Point1::new(1.4),
    ];
    let mut mesh = Mesh1d::from_vertices_and_connectivity(
        vertices,
        vec![SegmentElement::Linear, SegmentElement::Quadratic, SegmentElement::Linear],
        vec![vec![0, 1], vec![1, 2, 3], vec![2, 4]],
        vec![
            BoundaryGroup::new("left", vec![Facet::Point(0)]),
            BoundaryGroup::new("right", vec![Facet::Point(4)]),
        ],
    )
    .unwrap();
    mesh.find_neighbors(0.6);
    assert_eq!(mesh.neighbors(0), [0, 1]);
    assert_eq!(mesh.neighbors(1), [0, 1, 2]);

    let cache = QuadratureCache::new(&mesh, &QuadratureParameters::default());
    let form = HeatStiffness::new(
        1.5,
        &ModelParameters::nonlocal(0.4, 0.6),
        &AssemblyConfig::default(),
        PolynomialInfluence::new(0.6, 2, 1).unwrap(),
    );
    let layout = DofLayout::for_mesh(&mesh, 1);
    let assembler = SystemAssembler::default();
    let mut matrix = assembler.build_portrait(&mesh, &layout, true).unwrap();
    assembler
        .assemble_into(&mut matrix, &mesh, &cache, &layout, &form)
        .unwrap();

    let reference = dense_reference_matrix(&mesh, &cache, &form);
    assert_matrix_eq!(expand_upper_triangle(matrix.inner()), reference, comp = abs, tol = 1e-12);
    for row in reference.row_iter() {
        assert_scalar_eq!(row.sum(), 0.0, comp = abs, tol = 1e-12);
    }
}

#[test]
fn nonlocal_plane_stress_stiffness_is_symmetric() {
    let mut mesh = create_rectangular_mesh(QuadrilateralElement::Serendipity, [0.0, 0.0], [1.0, 1.0], [2, 2]);
    mesh.find_neighbors(0.75);
    let cache = QuadratureCache::new(&mesh, &QuadratureParameters::default());
    let material = PlaneStress::from(YoungPoisson {
        young: 21.0,
        poisson: 0.3,
    });
    let influence = PolynomialInfluence::new(0.75, 2, 2).unwrap();
    let form = PlaneStressStiffness::new(
        material,
        &ModelParameters::nonlocal(0.3, 0.75),
        &AssemblyConfig::default(),
        influence,
    );

    let layout = DofLayout::for_mesh(&mesh, 2);
    let assembler = SystemAssembler::default();
    let mut matrix = assembler.build_portrait(&mesh, &layout, true).unwrap();
    assembler
        .assemble_into(&mut matrix, &mesh, &cache, &layout, &form)
        .unwrap();

    let reference = dense_reference_matrix(&mesh, &cache, &form);
    let scale = reference.amax();
    assert_matrix_eq!(reference, reference.transpose(), comp = abs, tol = 1e-12 * scale);
    assert_matrix_eq!(expand_upper_triangle(matrix.inner()), reference, comp = abs, tol = 1e-12 * scale);
}

#[test]
fn local_weight_at_threshold_assembles_the_local_matrix() {
    let mut mesh = create_uniform_segment_mesh(SegmentElement::Quadratic, [0.0, 1.0], 8);
    mesh.find_neighbors(0.3);
    let cache = QuadratureCache::new(&mesh, &QuadratureParameters::default());
    let config = AssemblyConfig::default();
    let influence = ConstantInfluence::new(0.3).unwrap();
    let layout = DofLayout::for_mesh(&mesh, 1);
    let assembler = SystemAssembler::default();

    let local_form = HeatStiffness::new(1.0, &ModelParameters::local(), &config, influence);
    let mut local = assembler.build_portrait(&mesh, &layout, false).unwrap();
    assembler
        .assemble_into(&mut local, &mesh, &cache, &layout, &local_form)
        .unwrap();

    for p1 in [1.0, 0.5 * (1.0 + config.max_local_weight)] {
        let form = HeatStiffness::new(1.0, &ModelParameters::nonlocal(p1, 0.3), &config, influence);
        assert!(!BilinearForm::<1>::is_nonlocal(&form));
        let mut matrix = assembler
            .build_portrait(&mesh, &layout, BilinearForm::<1>::is_nonlocal(&form))
            .unwrap();
        assembler
            .assemble_into(&mut matrix, &mesh, &cache, &layout, &form)
            .unwrap();
        assert_eq!(matrix.inner().pattern(), local.inner().pattern());
        let expected = expand_upper_triangle(local.inner()) * p1;
        assert_matrix_eq!(expand_upper_triangle(matrix.inner()), expected, comp = abs, tol = 1e-12);
    }

    // Below the threshold the nonlocal couplings enlarge the portrait
    let form = HeatStiffness::new(1.0, &ModelParameters::nonlocal(0.5, 0.3), &config, influence);
    let matrix = assembler
        .build_portrait(&mesh, &layout, BilinearForm::<1>::is_nonlocal(&form))
        .unwrap();
    assert!(matrix.inner().nnz() > local.inner().nnz());
}

#[test]
fn nonlocal_portrait_requires_neighbors() {
    let mesh = create_uniform_segment_mesh(SegmentElement::Linear, [0.0, 1.0], 4);
    let layout = DofLayout::for_mesh(&mesh, 1);
    assert!(SystemAssembler::default()
        .build_portrait(&mesh, &layout, true)
        .is_err());
}

#[test]
fn constrained_rows_are_unit_rows_and_couplings_move_to_the_boundary_block() {
    let mesh = create_uniform_segment_mesh(SegmentElement::Linear, [0.0, 1.0], 2);
    let cache = QuadratureCache::new(&mesh, &QuadratureParameters::default());
    let mut layout = DofLayout::for_mesh(&mesh, 1);
    layout.set_constrained(0);
    layout.set_constrained(2);
    let form = HeatStiffness::new(
        1.0,
        &ModelParameters::local(),
        &AssemblyConfig::default(),
        ConstantInfluence::new(1.0).unwrap(),
    );
    let assembler = SystemAssembler::default();
    let mut matrix = assembler.build_portrait(&mesh, &layout, false).unwrap();
    assembler
        .assemble_into(&mut matrix, &mesh, &cache, &layout, &form)
        .unwrap();

    // Element length 1/2, so the local stiffness is [[2, -2], [-2, 2]] per element
    #[rustfmt::skip]
    let expected_inner = nalgebra::DMatrix::from_row_slice(3, 3, &[
        1.0, 0.0, 0.0,
        0.0, 4.0, 0.0,
        0.0, 0.0, 1.0,
    ]);
    assert_matrix_eq!(expand_upper_triangle(matrix.inner()), expected_inner, comp = abs, tol = 1e-12);

    let bound = matrix.bound();
    assert_eq!(bound.nnz(), 2);
    let triplets: Vec<_> = bound.triplet_iter().map(|(r, c, &v)| (r, c, v)).collect();
    assert_eq!(triplets.len(), 2);
    for (row, col, value) in triplets {
        assert_eq!(row, 1);
        assert!(col == 0 || col == 2);
        assert_scalar_eq!(value, -2.0, comp = abs, tol = 1e-12);
    }
}

#[test]
fn augmentation_columns_hold_basis_integrals() {
    let mesh = create_rectangular_mesh(QuadrilateralElement::Biquadratic, [0.0, 0.0], [2.0, 1.5], [2, 3]);
    let cache = QuadratureCache::new(&mesh, &QuadratureParameters::default());
    let mut layout = DofLayout::for_mesh(&mesh, 1);
    layout.set_augmented(true);
    let assembler = SystemAssembler::default();
    let mut matrix = assembler.build_portrait(&mesh, &layout, false).unwrap();
    assembler
        .assemble_augmentation(&mut matrix, &mesh, &cache, &layout)
        .unwrap();

    let multiplier = layout.augmented_dof(0);
    assert_eq!(multiplier, mesh.node_count());
    let column_sum: f64 = matrix
        .inner()
        .triplet_iter()
        .filter(|&(row, col, _)| col == multiplier && row != multiplier)
        .map(|(_, _, &value)| value)
        .sum();
    assert_scalar_eq!(column_sum, 3.0, comp = abs, tol = 1e-12);

    let diagonal = matrix.inner().get_entry(multiplier, multiplier);
    assert!(matches!(diagonal, Some(SparseEntry::NonZero(&value)) if value == 0.0));
}

#[test]
fn capacity_matrix_integrates_to_total_capacity() {
    let mesh = create_rectangular_mesh(QuadrilateralElement::Serendipity, [0.0, 0.0], [1.0, 2.0], [2, 2]);
    let cache = QuadratureCache::new(&mesh, &QuadratureParameters::default());
    let layout = DofLayout::for_mesh(&mesh, 1);
    let form = HeatCapacity {
        volumetric_capacity: 3.0,
    };
    let assembler = SystemAssembler::default();
    let mut matrix = assembler.build_portrait(&mesh, &layout, false).unwrap();
    assembler
        .assemble_into(&mut matrix, &mesh, &cache, &layout, &form)
        .unwrap();
    // 1ᵀ C 1 = ρc |Ω|
    assert_scalar_eq!(expand_upper_triangle(matrix.inner()).sum(), 6.0, comp = abs, tol = 1e-12);
}
