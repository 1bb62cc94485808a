use super::data_output_path;
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::{DVector, Vector2, Vector3};
use nonlocal_fem::assembly::QuadratureCache;
use nonlocal_fem::boundary::{BoundaryCondition, ComponentCondition};
use nonlocal_fem::config::{ModelParameters, SolveOptions};
use nonlocal_fem::element::QuadrilateralElement;
use nonlocal_fem::influence::{ConstantInfluence, PolynomialInfluence};
use nonlocal_fem::io::vtk::MeshDataSetBuilder;
use nonlocal_fem::materials::{PlaneStress, YoungPoisson};
use nonlocal_fem::mesh::procedural::create_rectangular_mesh;
use nonlocal_fem::mesh::Mesh2d;
use nonlocal_fem::postprocess::{nodal_strains, nodal_stresses};
use nonlocal_fem::solve::solve_plane_stress;

const MATERIAL: YoungPoisson = YoungPoisson {
    young: 21.0,
    poisson: 0.3,
};

fn traction(x: f64, y: f64) -> BoundaryCondition<2> {
    BoundaryCondition::new(vec![ComponentCondition::second_kind(x), ComponentCondition::second_kind(y)])
}

/// Unit tension in x on the right edge, with the left edge held in x and the bottom edge in y.
fn uniaxial_tension() -> Vec<BoundaryCondition<2>> {
    vec![
        BoundaryCondition::new(vec![ComponentCondition::second_kind(0.0), ComponentCondition::first_kind(0.0)]),
        traction(1.0, 0.0),
        traction(0.0, 0.0),
        BoundaryCondition::new(vec![ComponentCondition::first_kind(0.0), ComponentCondition::second_kind(0.0)]),
    ]
}

fn plate(kind: QuadrilateralElement) -> Mesh2d {
    create_rectangular_mesh(kind, [0.0, 0.0], [2.0, 1.0], [6, 3])
}

#[test]
fn local_uniaxial_tension_matches_analytic_solution() {
    let options = SolveOptions::default();
    let influence = ConstantInfluence::new(1.0).unwrap();
    for kind in [QuadrilateralElement::Bilinear, QuadrilateralElement::Serendipity] {
        let mesh = plate(kind);
        let displacement = solve_plane_stress(
            &mesh,
            &MATERIAL,
            &ModelParameters::local(),
            influence,
            uniaxial_tension(),
            |_| Vector2::zeros(),
            &options,
        )
        .unwrap();

        let (e, nu) = (MATERIAL.young, MATERIAL.poisson);
        let expected = DVector::from_iterator(
            2 * mesh.node_count(),
            mesh.vertices().iter().flat_map(|x| [x.x / e, -nu * x.y / e]),
        );
        assert_matrix_eq!(displacement, expected, comp = abs, tol = 1e-8);

        let strains = nodal_strains(&mesh, &displacement).unwrap();
        for strain in &strains {
            assert_matrix_eq!(*strain, Vector3::new(1.0 / e, -nu / e, 0.0), comp = abs, tol = 1e-8);
        }

        let cache = QuadratureCache::new(&mesh, &options.quadrature);
        let stresses = nodal_stresses(
            &mesh,
            &cache,
            &PlaneStress::from(MATERIAL),
            &ModelParameters::local(),
            &options.assembly,
            influence,
            &strains,
        )
        .unwrap();
        for stress in &stresses {
            assert_matrix_eq!(*stress, Vector3::new(1.0, 0.0, 0.0), comp = abs, tol = 1e-7);
        }
    }
}

#[test]
fn nonlocal_solution_with_dominant_local_weight_is_close_to_local() {
    let options = SolveOptions::default();
    let mut mesh = plate(QuadrilateralElement::Bilinear);
    mesh.find_neighbors(0.4);
    let local = solve_plane_stress(
        &mesh,
        &MATERIAL,
        &ModelParameters::local(),
        ConstantInfluence::new(0.4).unwrap(),
        uniaxial_tension(),
        |_| Vector2::zeros(),
        &options,
    )
    .unwrap();
    let nonlocal = solve_plane_stress(
        &mesh,
        &MATERIAL,
        &ModelParameters::nonlocal(0.998, 0.4),
        PolynomialInfluence::new(0.4, 2, 1).unwrap(),
        uniaxial_tension(),
        |_| Vector2::zeros(),
        &options,
    )
    .unwrap();
    assert_matrix_eq!(nonlocal, local, comp = abs, tol = 1e-2);
    assert!((&nonlocal - &local).amax() > 0.0);

    let output = data_output_path().join("plate");
    std::fs::create_dir_all(&output).unwrap();
    let ux: Vec<_> = nonlocal.iter().step_by(2).copied().collect();
    let uy: Vec<_> = nonlocal.iter().skip(1).step_by(2).copied().collect();
    MeshDataSetBuilder::from_mesh(&mesh)
        .with_title("Displacement")
        .with_point_scalars("ux", ux)
        .with_point_scalars("uy", uy)
        .try_export(output.join("displacement.vtk"))
        .unwrap();
}

#[test]
fn balanced_traction_without_supports_is_solvable() {
    let options = SolveOptions::default();
    let mesh = plate(QuadrilateralElement::Bilinear);
    let conditions = vec![traction(0.0, 0.0), traction(1.0, 0.0), traction(0.0, 0.0), traction(-1.0, 0.0)];
    let displacement = solve_plane_stress(
        &mesh,
        &MATERIAL,
        &ModelParameters::local(),
        ConstantInfluence::new(1.0).unwrap(),
        conditions,
        |_| Vector2::zeros(),
        &options,
    )
    .unwrap();
    assert_eq!(displacement.len(), 2 * mesh.node_count());

    // Rigid body motions are not determined, but the strains are
    let (e, nu) = (MATERIAL.young, MATERIAL.poisson);
    for strain in nodal_strains(&mesh, &displacement).unwrap() {
        assert_scalar_eq!(strain[0], 1.0 / e, comp = abs, tol = 1e-6);
        assert_scalar_eq!(strain[1], -nu / e, comp = abs, tol = 1e-6);
    }
}

#[test]
fn unbalanced_traction_without_supports_is_rejected() {
    let mesh = plate(QuadrilateralElement::Bilinear);
    let conditions = vec![traction(0.0, 0.0), traction(1.0, 0.0), traction(0.0, 0.0), traction(0.0, 0.0)];
    let err = solve_plane_stress(
        &mesh,
        &MATERIAL,
        &ModelParameters::local(),
        ConstantInfluence::new(1.0).unwrap(),
        conditions,
        |_| Vector2::zeros(),
        &SolveOptions::default(),
    )
    .unwrap_err();
    assert!(err.to_string().contains("unsolvable"));
}
