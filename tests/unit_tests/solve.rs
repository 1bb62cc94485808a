use matrixcompare::assert_scalar_eq;
use nalgebra::Vector2;
use nonlocal_fem::assembly::HeatStiffness;
use nonlocal_fem::boundary::BoundaryCondition;
use nonlocal_fem::config::{AssemblyConfig, ModelParameters, SolveOptions, TimeParameters};
use nonlocal_fem::element::{QuadrilateralElement, SegmentElement};
use nonlocal_fem::error::FemError;
use nonlocal_fem::influence::ConstantInfluence;
use nonlocal_fem::materials::{HeatParameters, YoungPoisson};
use nonlocal_fem::mesh::procedural::{create_uniform_segment_mesh, create_unit_square_mesh};
use nonlocal_fem::solve::{
    solve_plane_stress, solve_stationary_heat, ProblemState, StationaryProblem, TransientHeatProblem,
};

fn local_heat_form() -> HeatStiffness<ConstantInfluence> {
    HeatStiffness::new(
        1.0,
        &ModelParameters::local(),
        &AssemblyConfig::default(),
        ConstantInfluence::new(1.0).unwrap(),
    )
}

fn fem_error(err: &eyre::Report) -> &FemError {
    err.downcast_ref::<FemError>()
        .unwrap_or_else(|| panic!("expected a FemError, got {err:?}"))
}

#[test]
fn transitions_out_of_order_are_rejected() {
    let mesh = create_uniform_segment_mesh(SegmentElement::Linear, [0.0, 1.0], 4);
    let conditions = vec![BoundaryCondition::value(0.0), BoundaryCondition::value(1.0)];
    let mut problem = StationaryProblem::new(&mesh, local_heat_form(), conditions, SolveOptions::default()).unwrap();
    assert_eq!(problem.state(), ProblemState::Configured);

    let err = problem.solve().unwrap_err();
    assert!(matches!(fem_error(&err), FemError::InvalidState { .. }));
    let err = problem.assemble().unwrap_err();
    assert!(matches!(fem_error(&err), FemError::InvalidState { .. }));

    problem.build_portrait().unwrap();
    assert_eq!(problem.state(), ProblemState::PortraitBuilt);
    assert!(problem.build_portrait().is_err());
    problem.assemble().unwrap();
    problem.apply_boundary_conditions().unwrap();
    assert_eq!(problem.state(), ProblemState::BoundaryApplied);
    problem.solve().unwrap();
    assert_eq!(problem.state(), ProblemState::Solved);
    assert!(problem.solve().is_err());
    assert!(problem.multipliers().is_empty());
}

#[test]
fn boundary_condition_count_must_match_groups() {
    let mesh = create_uniform_segment_mesh(SegmentElement::Linear, [0.0, 1.0], 2);
    let err = StationaryProblem::new(
        &mesh,
        local_heat_form(),
        vec![BoundaryCondition::value(0.0)],
        SolveOptions::default(),
    )
    .err()
    .unwrap();
    let err = fem_error(&err);
    assert!(matches!(err, FemError::BoundaryGroupMismatch { expected: 2, actual: 1 }));
    assert!(err.is_configuration_error());
}

#[test]
fn conflicting_dirichlet_values_are_rejected() {
    let mesh = create_unit_square_mesh(QuadrilateralElement::Bilinear, 2);
    // down, right, up, left: the corner (1, 0) receives both 0 and 1
    let conditions = vec![
        BoundaryCondition::value(0.0),
        BoundaryCondition::value(1.0),
        BoundaryCondition::flux(0.0),
        BoundaryCondition::flux(0.0),
    ];
    let err = StationaryProblem::new(&mesh, local_heat_form(), conditions, SolveOptions::default())
        .err()
        .unwrap();
    assert!(matches!(fem_error(&err), FemError::ConflictingDirichlet { .. }));
}

#[test]
fn nonlocal_model_requires_neighbors() {
    let mesh = create_uniform_segment_mesh(SegmentElement::Linear, [0.0, 1.0], 4);
    let conditions = vec![BoundaryCondition::value(0.0), BoundaryCondition::value(1.0)];
    let err = solve_stationary_heat(
        &mesh,
        &HeatParameters::default(),
        &ModelParameters::nonlocal(0.5, 0.3),
        ConstantInfluence::new(0.3).unwrap(),
        conditions,
        |_| 0.0,
        &SolveOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(fem_error(&err), FemError::MissingNeighbors));
}

#[test]
fn invalid_parameters_are_rejected() {
    let mut mesh = create_uniform_segment_mesh(SegmentElement::Linear, [0.0, 1.0], 4);
    mesh.find_neighbors(0.3);
    let conditions = || vec![BoundaryCondition::value(0.0), BoundaryCondition::value(1.0)];
    let influence = ConstantInfluence::new(0.3).unwrap();

    let err = solve_stationary_heat(
        &mesh,
        &HeatParameters::default(),
        &ModelParameters::nonlocal(1.5, 0.3),
        influence,
        conditions(),
        |_| 0.0,
        &SolveOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(fem_error(&err), FemError::InvalidParameter { name: "local_weight", .. }));

    let heat = HeatParameters {
        conductivity: -1.0,
        ..HeatParameters::default()
    };
    let err = solve_stationary_heat(
        &mesh,
        &heat,
        &ModelParameters::local(),
        influence,
        conditions(),
        |_| 0.0,
        &SolveOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(fem_error(&err), FemError::InvalidParameter { name: "conductivity", .. }));

    let time = TimeParameters {
        steps: 0,
        ..TimeParameters::default()
    };
    let err = TransientHeatProblem::new(
        &mesh,
        &HeatParameters::default(),
        &ModelParameters::local(),
        influence,
        conditions(),
        time,
        SolveOptions::default(),
    )
    .err()
    .unwrap();
    assert!(matches!(fem_error(&err), FemError::InvalidParameter { name: "steps", .. }));
}

#[test]
fn plane_stress_rejects_invalid_poisson_ratio() {
    let mesh = create_unit_square_mesh(QuadrilateralElement::Bilinear, 1);
    let err = solve_plane_stress(
        &mesh,
        &YoungPoisson {
            young: 1.0,
            poisson: 0.5,
        },
        &ModelParameters::local(),
        ConstantInfluence::new(1.0).unwrap(),
        Vec::new(),
        |_| Vector2::zeros(),
        &SolveOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(fem_error(&err), FemError::InvalidParameter { name: "poisson", .. }));
}

#[test]
fn transient_problem_reports_time_of_completed_steps() {
    let mesh = create_uniform_segment_mesh(SegmentElement::Linear, [0.0, 1.0], 4);
    let conditions = vec![BoundaryCondition::value(0.0), BoundaryCondition::value(0.0)];
    let time = TimeParameters {
        interval: [0.0, 0.5],
        steps: 5,
        save_frequency: 2,
    };
    let mut problem = TransientHeatProblem::new(
        &mesh,
        &HeatParameters::default(),
        &ModelParameters::local(),
        ConstantInfluence::new(1.0).unwrap(),
        conditions,
        time,
        SolveOptions::default(),
    )
    .unwrap();
    assert!(problem.advance().is_err());

    let mut saved = Vec::new();
    problem
        .run(|step, t, _| {
            saved.push((step, t));
            Ok(())
        })
        .unwrap();
    let steps: Vec<_> = saved.iter().map(|&(step, _)| step).collect();
    assert_eq!(steps, vec![0, 2, 4, 5]);
    assert_scalar_eq!(saved[3].1, 0.5, comp = abs, tol = 1e-14);
    assert_eq!(problem.step(), 5);
}

#[test]
fn partitioned_layouts_cannot_be_solved() {
    let mut mesh = create_uniform_segment_mesh(SegmentElement::Linear, [0.0, 1.0], 4);
    mesh.set_owned_nodes(0..2).unwrap();
    let conditions = vec![BoundaryCondition::value(0.0), BoundaryCondition::value(1.0)];

    let mut problem =
        StationaryProblem::new(&mesh, local_heat_form(), conditions.clone(), SolveOptions::default()).unwrap();
    assert!(!problem.layout().is_complete());
    problem.build_portrait().unwrap();
    problem.assemble().unwrap();
    problem.apply_boundary_conditions().unwrap();
    let err = problem.solve().unwrap_err();
    assert!(matches!(
        fem_error(&err),
        FemError::InvalidState {
            actual: "partitioned layout",
            ..
        }
    ));

    let mut transient = TransientHeatProblem::new(
        &mesh,
        &HeatParameters::default(),
        &ModelParameters::local(),
        ConstantInfluence::new(1.0).unwrap(),
        conditions,
        TimeParameters {
            interval: [0.0, 0.1],
            steps: 1,
            save_frequency: 1,
        },
        SolveOptions::default(),
    )
    .unwrap();
    transient.build_portrait().unwrap();
    transient.assemble().unwrap();
    let err = transient.advance().unwrap_err();
    assert!(matches!(fem_error(&err), FemError::InvalidState { .. }));
    assert_eq!(transient.step(), 0);
}
