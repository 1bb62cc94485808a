use super::data_output_path;
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::{DVector, Point1};
use nonlocal_fem::assembly::{HeatStiffness, QuadratureCache};
use nonlocal_fem::boundary::{BoundaryCondition, BoundaryValue};
use nonlocal_fem::config::{ModelParameters, SolveOptions, TimeParameters};
use nonlocal_fem::element::{QuadrilateralElement, SegmentElement};
use nonlocal_fem::error::FemError;
use nonlocal_fem::influence::{ConstantInfluence, PolynomialInfluence};
use nonlocal_fem::io::csv::write_nodal_csv;
use nonlocal_fem::io::vtk::MeshDataSetBuilder;
use nonlocal_fem::materials::HeatParameters;
use nonlocal_fem::mesh::{BoundaryGroup, Facet, Mesh1d};
use nonlocal_fem::mesh::procedural::{create_rectangular_mesh, create_uniform_segment_mesh, create_unit_square_mesh};
use nonlocal_fem::postprocess::{energy, integrate_solution, nodal_gradient};
use nonlocal_fem::solve::{solve_stationary_heat, solve_transient_heat, StationaryProblem};
use rayon::ThreadPoolBuilder;

fn down_right_up_left(
    down: BoundaryCondition<2>,
    right: BoundaryCondition<2>,
    up: BoundaryCondition<2>,
    left: BoundaryCondition<2>,
) -> Vec<BoundaryCondition<2>> {
    vec![down, right, up, left]
}

#[test]
fn local_bar_with_two_linear_elements_is_linear() {
    let mesh = create_uniform_segment_mesh(SegmentElement::Linear, [0.0, 1.0], 2);
    let temperature = solve_stationary_heat(
        &mesh,
        &HeatParameters::default(),
        &ModelParameters::local(),
        ConstantInfluence::new(1.0).unwrap(),
        vec![BoundaryCondition::value(0.0), BoundaryCondition::value(1.0)],
        |_| 0.0,
        &SolveOptions::default(),
    )
    .unwrap();
    let expected = DVector::from_column_slice(&[0.0, 0.5, 1.0]);
    assert_matrix_eq!(temperature, expected, comp = abs, tol = 1e-12);
}

#[test]
fn bar_with_linear_and_quadratic_elements_is_linear() {
    // [0, 0.5] is a linear element, [0.5, 1] a quadratic one with its midpoint numbered last
    let vertices = vec![Point1::new(0.0), Point1::new(0.5), Point1::new(1.0), Point1::new(0.75)];
    let mesh = Mesh1d::from_vertices_and_connectivity(
        vertices,
        vec![SegmentElement::Linear, SegmentElement::Quadratic],
        vec![vec![0, 1], vec![1, 2, 3]],
        vec![
            BoundaryGroup::new("left", vec![Facet::Point(0)]),
            BoundaryGroup::new("right", vec![Facet::Point(2)]),
        ],
    )
    .unwrap();
    let temperature = solve_stationary_heat(
        &mesh,
        &HeatParameters::default(),
        &ModelParameters::local(),
        ConstantInfluence::new(1.0).unwrap(),
        vec![BoundaryCondition::value(0.0), BoundaryCondition::value(1.0)],
        |_| 0.0,
        &SolveOptions::default(),
    )
    .unwrap();
    let expected = DVector::from_column_slice(&[0.0, 0.5, 1.0, 0.75]);
    assert_matrix_eq!(temperature, expected, comp = abs, tol = 1e-12);
}

#[test]
fn quadratic_bar_with_flux_and_source_matches_exact_solution() {
    // -T'' = 2 on [0, 1], T(0) = 0, T'(1) = 0 has the solution T = 2x - x², which quadratic
    // elements reproduce at the nodes
    let mesh = create_uniform_segment_mesh(SegmentElement::Quadratic, [0.0, 1.0], 3);
    let temperature = solve_stationary_heat(
        &mesh,
        &HeatParameters::default(),
        &ModelParameters::local(),
        ConstantInfluence::new(1.0).unwrap(),
        vec![BoundaryCondition::value(0.0), BoundaryCondition::flux(0.0)],
        |_| 2.0,
        &SolveOptions::default(),
    )
    .unwrap();
    for (x, t) in mesh.vertices().iter().zip(temperature.iter()) {
        assert_scalar_eq!(*t, 2.0 * x[0] - x[0] * x[0], comp = abs, tol = 1e-9);
    }
}

#[test]
fn nonlocal_bar_solution_is_antisymmetric() {
    let mut mesh = create_uniform_segment_mesh(SegmentElement::Linear, [0.0, 1.0], 20);
    mesh.find_neighbors(0.15);
    let temperature = solve_stationary_heat(
        &mesh,
        &HeatParameters::default(),
        &ModelParameters::nonlocal(0.5, 0.15),
        PolynomialInfluence::new(0.15, 2, 1).unwrap(),
        vec![BoundaryCondition::value(-1.0), BoundaryCondition::value(1.0)],
        |_| 0.0,
        &SolveOptions::default(),
    )
    .unwrap();

    let n = temperature.len();
    assert_eq!(temperature[0], -1.0);
    assert_eq!(temperature[n - 1], 1.0);
    for i in 0..n {
        assert_scalar_eq!(temperature[i], -temperature[n - 1 - i], comp = abs, tol = 1e-8);
    }
}

#[test]
fn dirichlet_values_are_exact_for_any_thread_count() {
    let mut mesh = create_unit_square_mesh(QuadrilateralElement::Serendipity, 4);
    mesh.find_neighbors(0.3);
    let left_nodes = mesh.boundary_group(3).nodes();
    let right_nodes = mesh.boundary_group(1).nodes();

    let mut solutions = Vec::new();
    for num_threads in [1, 2, 4] {
        let pool = ThreadPoolBuilder::new().num_threads(num_threads).build().unwrap();
        let temperature = pool
            .install(|| {
                solve_stationary_heat(
                    &mesh,
                    &HeatParameters::default(),
                    &ModelParameters::nonlocal(0.7, 0.3),
                    ConstantInfluence::new(0.3).unwrap(),
                    down_right_up_left(
                        BoundaryCondition::flux(0.0),
                        BoundaryCondition::value(1.0),
                        BoundaryCondition::flux(0.0),
                        BoundaryCondition::value(BoundaryValue::<2>::function(|x, _| x[1])),
                    ),
                    |x| x.x * x.y,
                    &SolveOptions::default(),
                )
            })
            .unwrap();

        for &node in &left_nodes {
            assert_scalar_eq!(temperature[node], mesh.node(node).y, comp = abs, tol = 1e-14);
        }
        for &node in &right_nodes {
            assert_scalar_eq!(temperature[node], 1.0, comp = abs, tol = 1e-14);
        }
        solutions.push(temperature);
    }
    for solution in &solutions[1..] {
        assert_matrix_eq!(solution, solutions[0], comp = abs, tol = 1e-7);
    }
}

#[test]
fn single_quad_with_balanced_flux_is_solvable() {
    let mesh = create_unit_square_mesh(QuadrilateralElement::Bilinear, 1);
    let form = HeatStiffness::new(
        1.0,
        &ModelParameters::local(),
        &SolveOptions::default().assembly,
        ConstantInfluence::new(1.0).unwrap(),
    );
    let conditions = down_right_up_left(
        BoundaryCondition::flux(0.0),
        BoundaryCondition::flux(1.0),
        BoundaryCondition::flux(0.0),
        BoundaryCondition::flux(-1.0),
    );
    let mut problem = StationaryProblem::new(&mesh, form, conditions, SolveOptions::default()).unwrap();
    assert!(problem.layout().is_augmented());
    problem.run().unwrap();

    // T = x + c with the mean value fixed to zero
    let temperature = problem.nodal_solution();
    for (x, t) in mesh.vertices().iter().zip(temperature.iter()) {
        assert_scalar_eq!(*t, x.x - 0.5, comp = abs, tol = 1e-8);
    }
    assert_eq!(problem.multipliers().len(), 1);
    assert_scalar_eq!(problem.multipliers()[0], 0.0, comp = abs, tol = 1e-8);
}

#[test]
fn single_quad_with_net_flux_fails_before_assembly() {
    let mesh = create_unit_square_mesh(QuadrilateralElement::Bilinear, 1);
    let form = HeatStiffness::new(
        1.0,
        &ModelParameters::local(),
        &SolveOptions::default().assembly,
        ConstantInfluence::new(1.0).unwrap(),
    );
    let conditions = down_right_up_left(
        BoundaryCondition::flux(0.0),
        BoundaryCondition::flux(1.0),
        BoundaryCondition::flux(0.0),
        BoundaryCondition::flux(0.0),
    );
    let err = StationaryProblem::new(&mesh, form, conditions, SolveOptions::default())
        .err()
        .expect("configuration must fail");
    assert!(err.to_string().contains("The problem is unsolvable"));
    let err = err.downcast_ref::<FemError>().unwrap();
    assert!(matches!(err, FemError::Unsolvable { .. }));
    assert!(!err.is_configuration_error());
}

#[test]
fn pure_neumann_problem_without_flux_has_zero_energy() {
    let mut mesh = create_rectangular_mesh(QuadrilateralElement::Bilinear, [0.0, 0.0], [2.0, 1.0], [6, 3]);
    mesh.find_neighbors(0.5);
    let options = SolveOptions::default();
    let model = ModelParameters::nonlocal(0.5, 0.5);
    let influence = PolynomialInfluence::new(0.5, 2, 1).unwrap();
    let temperature = solve_stationary_heat(
        &mesh,
        &HeatParameters::default(),
        &model,
        influence,
        vec![BoundaryCondition::flux(0.0); 4],
        |_| 0.0,
        &options,
    )
    .unwrap();

    let cache = QuadratureCache::new(&mesh, &options.quadrature);
    let form = HeatStiffness::new(1.0, &model, &options.assembly, influence);
    assert!(energy(&mesh, &cache, &form, &temperature).unwrap().abs() < 1e-12);
    assert!(integrate_solution(&mesh, &cache, &temperature).unwrap().abs() < 1e-12);
}

#[test]
fn linear_temperature_has_unit_gradient_and_energy() {
    let mesh = create_unit_square_mesh(QuadrilateralElement::Biquadratic, 3);
    let options = SolveOptions::default();
    let influence = ConstantInfluence::new(1.0).unwrap();
    let temperature = solve_stationary_heat(
        &mesh,
        &HeatParameters::default(),
        &ModelParameters::local(),
        influence,
        down_right_up_left(
            BoundaryCondition::flux(0.0),
            BoundaryCondition::value(1.0),
            BoundaryCondition::flux(0.0),
            BoundaryCondition::value(0.0),
        ),
        |_| 0.0,
        &options,
    )
    .unwrap();

    for gradient in nodal_gradient(&mesh, &temperature).unwrap() {
        assert_scalar_eq!(gradient.x, 1.0, comp = abs, tol = 1e-8);
        assert_scalar_eq!(gradient.y, 0.0, comp = abs, tol = 1e-8);
    }
    let cache = QuadratureCache::new(&mesh, &options.quadrature);
    let form = HeatStiffness::new(1.0, &ModelParameters::local(), &options.assembly, influence);
    assert_scalar_eq!(energy(&mesh, &cache, &form, &temperature).unwrap(), 1.0, comp = abs, tol = 1e-8);
    assert_scalar_eq!(integrate_solution(&mesh, &cache, &temperature).unwrap(), 0.5, comp = abs, tol = 1e-8);
}

#[test]
fn transient_solution_with_matching_boundary_values_stays_constant() {
    let mut mesh = create_uniform_segment_mesh(SegmentElement::Quadratic, [0.0, 1.0], 10);
    mesh.find_neighbors(0.2);
    let time = TimeParameters {
        interval: [0.0, 1.0],
        steps: 20,
        save_frequency: 1,
    };
    let mut callbacks = 0;
    let temperature = solve_transient_heat(
        &mesh,
        &HeatParameters::default(),
        &ModelParameters::nonlocal(0.6, 0.2),
        ConstantInfluence::new(0.2).unwrap(),
        vec![BoundaryCondition::value(1.0), BoundaryCondition::value(1.0)],
        |_| 1.0,
        &time,
        &SolveOptions::default(),
        |_, _, solution| {
            callbacks += 1;
            for t in solution.iter() {
                assert_scalar_eq!(*t, 1.0, comp = abs, tol = 1e-10);
            }
            Ok(())
        },
    )
    .unwrap();
    assert_eq!(callbacks, 21);
    assert_eq!(temperature.len(), mesh.node_count());
}

#[test]
fn transient_solution_approaches_stationary_solution() {
    let mesh = create_uniform_segment_mesh(SegmentElement::Linear, [0.0, 1.0], 10);
    let time = TimeParameters {
        interval: [0.0, 2.0],
        steps: 200,
        save_frequency: 50,
    };
    let output = data_output_path().join("transient_bar");
    std::fs::create_dir_all(&output).unwrap();
    let temperature = solve_transient_heat(
        &mesh,
        &HeatParameters::default(),
        &ModelParameters::local(),
        ConstantInfluence::new(1.0).unwrap(),
        vec![BoundaryCondition::value(0.0), BoundaryCondition::value(1.0)],
        |_| 0.0,
        &time,
        &SolveOptions::default(),
        |step, _, solution| write_nodal_csv(&mesh, solution.as_slice(), 10, output.join(format!("T{step}.csv"))),
    )
    .unwrap();

    for (x, t) in mesh.vertices().iter().zip(temperature.iter()) {
        assert_scalar_eq!(*t, x[0], comp = abs, tol = 1e-3);
    }
    for step in [0, 50, 100, 150, 200] {
        assert!(output.join(format!("T{step}.csv")).exists());
    }
}

#[test]
fn stationary_temperature_exports_to_vtk() {
    let mesh = create_unit_square_mesh(QuadrilateralElement::Serendipity, 2);
    let temperature = solve_stationary_heat(
        &mesh,
        &HeatParameters::default(),
        &ModelParameters::local(),
        ConstantInfluence::new(1.0).unwrap(),
        down_right_up_left(
            BoundaryCondition::value(0.0),
            BoundaryCondition::flux(1.0),
            BoundaryCondition::flux(0.0),
            BoundaryCondition::flux(0.0),
        ),
        |_| 0.0,
        &SolveOptions::default(),
    )
    .unwrap();

    let output = data_output_path().join("stationary_square");
    std::fs::create_dir_all(&output).unwrap();
    let path = output.join("temperature.vtk");
    MeshDataSetBuilder::from_mesh(&mesh)
        .with_title("Temperature")
        .with_point_scalars("Temperature", temperature.iter().copied())
        .try_export(&path)
        .unwrap();
    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.contains("CELL_TYPES 4"));
    assert!(contents.contains("POINT_DATA 21"));
}
