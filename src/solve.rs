//! Drivers that take a problem from its configuration to its solution.
//!
//! A [`StationaryProblem`] moves through the states
//! `Configured → PortraitBuilt → Assembled → BoundaryApplied → Solved`, one method per
//! transition. Invoking a transition out of order is an [`FemError::InvalidState`]. Boundary
//! conditions are validated and pure Neumann problems are checked for solvability while the
//! problem is configured, i.e. before anything is assembled.
//!
//! [`TransientHeatProblem`] assembles the capacity and stiffness matrices once and then repeats
//! the last two transitions for every implicit Euler step.
use crate::assembly::{
    assemble_load_vector, BilinearForm, DofLayout, HeatCapacity, HeatStiffness, PlaneStressStiffness, QuadratureCache,
    SystemAssembler, SystemMatrix,
};
use crate::boundary::{
    add_neumann_flux, apply_dirichlet, check_solvability, dirichlet_values, is_pure_neumann, validate_conditions,
    BoundaryCondition,
};
use crate::config::{ModelParameters, SolveOptions, TimeParameters};
use crate::element::ReferenceElement;
use crate::error::FemError;
use crate::influence::InfluenceFunction;
use crate::materials::{HeatParameters, PlaneStress, YoungPoisson};
use crate::mesh::Mesh;
use log::{debug, info};
use nalgebra::{DVector, Point, Point2, Vector2};
use nonlocal_fem_sparse::LinearSolver;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProblemState {
    Configured,
    PortraitBuilt,
    Assembled,
    BoundaryApplied,
    Solved,
}

impl ProblemState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Configured => "configured",
            Self::PortraitBuilt => "portrait built",
            Self::Assembled => "assembled",
            Self::BoundaryApplied => "boundary applied",
            Self::Solved => "solved",
        }
    }

    fn require(self, expected: ProblemState) -> Result<(), FemError> {
        if self == expected {
            Ok(())
        } else {
            Err(FemError::InvalidState {
                expected: expected.name(),
                actual: self.name(),
            })
        }
    }
}

type Source<'a, const D: usize> = Box<dyn Fn(&Point<f64, D>, usize) -> f64 + Send + Sync + 'a>;

/// The solvers work on the whole system, so every row must be stored locally.
fn require_complete(layout: &DofLayout) -> Result<(), FemError> {
    if layout.is_complete() {
        Ok(())
    } else {
        Err(FemError::InvalidState {
            expected: "complete degree of freedom layout",
            actual: "partitioned layout",
        })
    }
}

/// Solves the system with the configured solver, using `x` as initial guess.
fn solve_system(
    matrix: &SystemMatrix,
    layout: &DofLayout,
    options: &SolveOptions,
    rhs: &DVector<f64>,
    x: &mut DVector<f64>,
) -> eyre::Result<()> {
    require_complete(layout)?;
    let mut solver = options.solver.select(layout.is_augmented());
    let timer = Instant::now();
    let output = solver
        .solve_with_guess(matrix.inner(), rhs.into(), x.into())
        .map_err(FemError::from)?;
    info!(
        "Solved {} unknowns with {} in {:.3?} ({} iterations, residual estimate {:e})",
        rhs.len(),
        solver.name(),
        timer.elapsed(),
        output.num_iterations,
        output.residual_estimate
    );
    Ok(())
}

/// A stationary problem `a(u, v) = (f, v) + boundary terms` for a given bilinear form.
pub struct StationaryProblem<'a, const D: usize, E, F> {
    mesh: &'a Mesh<D, E>,
    form: F,
    conditions: Vec<BoundaryCondition<D>>,
    source: Source<'a, D>,
    options: SolveOptions,
    layout: DofLayout,
    dirichlet: Vec<(usize, f64)>,
    assembler: SystemAssembler,
    cache: QuadratureCache<D>,
    matrix: Option<SystemMatrix>,
    rhs: DVector<f64>,
    solution: DVector<f64>,
    state: ProblemState,
}

impl<'a, const D: usize, E, F> StationaryProblem<'a, D, E, F>
where
    E: ReferenceElement<D>,
    F: BilinearForm<D>,
{
    /// Validates the configuration, including the solvability of pure Neumann problems.
    pub fn new(
        mesh: &'a Mesh<D, E>,
        form: F,
        conditions: Vec<BoundaryCondition<D>>,
        options: SolveOptions,
    ) -> eyre::Result<Self> {
        let sd = form.solution_dim();
        validate_conditions(mesh, &conditions, sd)?;
        if form.is_nonlocal() && !mesh.has_neighbors() {
            return Err(FemError::MissingNeighbors.into());
        }
        check_solvability(mesh, &conditions, sd, &options.assembly)?;

        let mut layout = DofLayout::for_mesh(mesh, sd);
        let dirichlet = dirichlet_values(mesh, &conditions, &layout, &options.assembly, 0.0)?;
        for &(dof, _) in &dirichlet {
            layout.set_constrained(dof);
        }
        layout.set_augmented(is_pure_neumann(&conditions));
        info!(
            "Configured {} problem: {} nodes, {} unknowns, {} constrained{}",
            if form.is_nonlocal() { "nonlocal" } else { "local" },
            mesh.node_count(),
            layout.system_size(),
            dirichlet.len(),
            if layout.is_augmented() { ", augmented" } else { "" }
        );

        let cache = QuadratureCache::new(mesh, &options.quadrature);
        let size = layout.system_size();
        Ok(Self {
            mesh,
            form,
            conditions,
            source: Box::new(|_, _| 0.0),
            options,
            layout,
            dirichlet,
            assembler: SystemAssembler::default(),
            cache,
            matrix: None,
            rhs: DVector::zeros(size),
            solution: DVector::zeros(size),
            state: ProblemState::Configured,
        })
    }

    /// Sets the volume source, `source(x, c)` being its component `c` at `x`.
    pub fn with_source(mut self, source: impl Fn(&Point<f64, D>, usize) -> f64 + Send + Sync + 'a) -> Self {
        self.source = Box::new(source);
        self
    }

    pub fn state(&self) -> ProblemState {
        self.state
    }

    pub fn layout(&self) -> &DofLayout {
        &self.layout
    }

    pub fn cache(&self) -> &QuadratureCache<D> {
        &self.cache
    }

    pub fn form(&self) -> &F {
        &self.form
    }

    pub fn matrix(&self) -> Option<&SystemMatrix> {
        self.matrix.as_ref()
    }

    /// Prescribed values, ordered by degree of freedom.
    pub fn dirichlet_values(&self) -> &[(usize, f64)] {
        &self.dirichlet
    }

    pub fn rhs(&self) -> &DVector<f64> {
        &self.rhs
    }

    /// All unknowns, including Lagrange multipliers.
    pub fn solution(&self) -> &DVector<f64> {
        &self.solution
    }

    /// Nodal degrees of freedom of the solution.
    pub fn nodal_solution(&self) -> DVector<f64> {
        self.solution.rows(0, self.layout.dof_count()).into_owned()
    }

    /// Lagrange multipliers of an augmented problem, empty otherwise.
    pub fn multipliers(&self) -> DVector<f64> {
        let n = self.layout.dof_count();
        self.solution.rows(n, self.layout.system_size() - n).into_owned()
    }

    pub fn build_portrait(&mut self) -> eyre::Result<()> {
        self.state.require(ProblemState::Configured)?;
        self.matrix = Some(
            self.assembler
                .build_portrait(self.mesh, &self.layout, self.form.is_nonlocal())?,
        );
        self.state = ProblemState::PortraitBuilt;
        Ok(())
    }

    pub fn assemble(&mut self) -> eyre::Result<()> {
        self.state.require(ProblemState::PortraitBuilt)?;
        let matrix = self.matrix.as_mut().ok_or(FemError::InvalidState {
            expected: ProblemState::PortraitBuilt.name(),
            actual: ProblemState::Configured.name(),
        })?;
        self.assembler
            .assemble_into(matrix, self.mesh, &self.cache, &self.layout, &self.form)?;
        self.assembler
            .assemble_augmentation(matrix, self.mesh, &self.cache, &self.layout)?;
        self.rhs = assemble_load_vector(self.mesh, &self.cache, &self.layout, &self.source);
        self.state = ProblemState::Assembled;
        Ok(())
    }

    pub fn apply_boundary_conditions(&mut self) -> eyre::Result<()> {
        self.state.require(ProblemState::Assembled)?;
        let matrix = self.matrix.as_ref().ok_or(FemError::InvalidState {
            expected: ProblemState::Assembled.name(),
            actual: ProblemState::Configured.name(),
        })?;
        add_neumann_flux(self.mesh, &self.conditions, &self.layout, &mut self.rhs, 0.0);
        apply_dirichlet(matrix, &mut self.rhs, &self.dirichlet);
        self.state = ProblemState::BoundaryApplied;
        Ok(())
    }

    pub fn solve(&mut self) -> eyre::Result<()> {
        self.state.require(ProblemState::BoundaryApplied)?;
        let matrix = self.matrix.as_ref().ok_or(FemError::InvalidState {
            expected: ProblemState::BoundaryApplied.name(),
            actual: ProblemState::Configured.name(),
        })?;
        for &(dof, value) in &self.dirichlet {
            self.solution[dof] = value;
        }
        solve_system(matrix, &self.layout, &self.options, &self.rhs, &mut self.solution)?;
        self.state = ProblemState::Solved;
        Ok(())
    }

    /// Performs all remaining transitions.
    pub fn run(&mut self) -> eyre::Result<()> {
        loop {
            match self.state {
                ProblemState::Configured => self.build_portrait()?,
                ProblemState::PortraitBuilt => self.assemble()?,
                ProblemState::Assembled => self.apply_boundary_conditions()?,
                ProblemState::BoundaryApplied => self.solve()?,
                ProblemState::Solved => return Ok(()),
            }
        }
    }
}

/// Stationary heat conduction. Returns the nodal temperatures.
pub fn solve_stationary_heat<const D: usize, E, F>(
    mesh: &Mesh<D, E>,
    heat: &HeatParameters,
    model: &ModelParameters,
    influence: F,
    conditions: Vec<BoundaryCondition<D>>,
    source: impl Fn(&Point<f64, D>) -> f64 + Send + Sync,
    options: &SolveOptions,
) -> eyre::Result<DVector<f64>>
where
    E: ReferenceElement<D>,
    F: InfluenceFunction<D>,
{
    model.validate(&options.assembly)?;
    heat.validate()?;
    let form = HeatStiffness::new(heat.conductivity, model, &options.assembly, influence);
    let mut problem = StationaryProblem::new(mesh, form, conditions, *options)?.with_source(move |x, _| source(x));
    problem.run()?;
    Ok(problem.nodal_solution())
}

/// Stationary plane-stress elasticity. Returns the nodal displacements, interleaved as
/// `[u_x(0), u_y(0), u_x(1), ...]`.
pub fn solve_plane_stress<E, F>(
    mesh: &Mesh<2, E>,
    material: &YoungPoisson,
    model: &ModelParameters,
    influence: F,
    conditions: Vec<BoundaryCondition<2>>,
    body_force: impl Fn(&Point2<f64>) -> Vector2<f64> + Send + Sync,
    options: &SolveOptions,
) -> eyre::Result<DVector<f64>>
where
    E: ReferenceElement<2>,
    F: InfluenceFunction<2>,
{
    model.validate(&options.assembly)?;
    material.validate()?;
    let form = PlaneStressStiffness::new(PlaneStress::from(*material), model, &options.assembly, influence);
    let mut problem =
        StationaryProblem::new(mesh, form, conditions, *options)?.with_source(move |x, c| body_force(x)[c]);
    problem.run()?;
    Ok(problem.nodal_solution())
}

/// Transient heat conduction `ρc ∂T/∂t - div(λ ∇T) = f` with implicit Euler steps.
///
/// Each step solves `(C + τK) T_next = τ (f + q) + C T_prev`, where the boundary values and the
/// source are evaluated at the end of the step. The constrained degrees of freedom are fixed
/// by the boundary groups of the first kind, their values may change over time.
pub struct TransientHeatProblem<'a, const D: usize, E, F> {
    mesh: &'a Mesh<D, E>,
    stiffness: HeatStiffness<F>,
    capacity: HeatCapacity,
    conditions: Vec<BoundaryCondition<D>>,
    source: Box<dyn Fn(&Point<f64, D>, f64) -> f64 + Send + Sync + 'a>,
    time: TimeParameters,
    options: SolveOptions,
    layout: DofLayout,
    assembler: SystemAssembler,
    cache: QuadratureCache<D>,
    capacity_matrix: Option<SystemMatrix>,
    system: Option<SystemMatrix>,
    rhs: DVector<f64>,
    solution: DVector<f64>,
    step: usize,
    state: ProblemState,
}

impl<'a, const D: usize, E, F> TransientHeatProblem<'a, D, E, F>
where
    E: ReferenceElement<D>,
    F: InfluenceFunction<D>,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        mesh: &'a Mesh<D, E>,
        heat: &HeatParameters,
        model: &ModelParameters,
        influence: F,
        conditions: Vec<BoundaryCondition<D>>,
        time: TimeParameters,
        options: SolveOptions,
    ) -> eyre::Result<Self> {
        model.validate(&options.assembly)?;
        heat.validate()?;
        time.validate()?;
        validate_conditions(mesh, &conditions, 1)?;
        let stiffness = HeatStiffness::new(heat.conductivity, model, &options.assembly, influence);
        if BilinearForm::<D>::is_nonlocal(&stiffness) && !mesh.has_neighbors() {
            return Err(FemError::MissingNeighbors.into());
        }

        let mut layout = DofLayout::for_mesh(mesh, 1);
        for (dof, _) in dirichlet_values(mesh, &conditions, &layout, &options.assembly, time.interval[0])? {
            layout.set_constrained(dof);
        }
        let cache = QuadratureCache::new(mesh, &options.quadrature);
        let size = layout.system_size();
        info!(
            "Configured transient problem: {} nodes, {} steps of {}",
            mesh.node_count(),
            time.steps,
            time.time_step()
        );
        Ok(Self {
            mesh,
            stiffness,
            capacity: HeatCapacity {
                volumetric_capacity: heat.volumetric_capacity(),
            },
            conditions,
            source: Box::new(|_, _| 0.0),
            time,
            options,
            layout,
            assembler: SystemAssembler::default(),
            cache,
            capacity_matrix: None,
            system: None,
            rhs: DVector::zeros(size),
            solution: DVector::zeros(size),
            step: 0,
            state: ProblemState::Configured,
        })
    }

    /// Sets the volume source `f(x, t)`.
    pub fn with_source(mut self, source: impl Fn(&Point<f64, D>, f64) -> f64 + Send + Sync + 'a) -> Self {
        self.source = Box::new(source);
        self
    }

    /// Sets the initial temperature.
    pub fn with_initial_distribution(mut self, initial: impl Fn(&Point<f64, D>) -> f64) -> Self {
        for (node, x) in self.mesh.vertices().iter().enumerate() {
            self.solution[node] = initial(x);
        }
        self
    }

    pub fn state(&self) -> ProblemState {
        self.state
    }

    /// Number of completed steps.
    pub fn step(&self) -> usize {
        self.step
    }

    pub fn time(&self) -> f64 {
        self.time.time_at(self.step)
    }

    pub fn solution(&self) -> &DVector<f64> {
        &self.solution
    }

    pub fn layout(&self) -> &DofLayout {
        &self.layout
    }

    pub fn cache(&self) -> &QuadratureCache<D> {
        &self.cache
    }

    pub fn build_portrait(&mut self) -> eyre::Result<()> {
        self.state.require(ProblemState::Configured)?;
        let nonlocal = BilinearForm::<D>::is_nonlocal(&self.stiffness);
        self.system = Some(self.assembler.build_portrait(self.mesh, &self.layout, nonlocal)?);
        self.state = ProblemState::PortraitBuilt;
        Ok(())
    }

    /// Assembles `C` and `C + τK`.
    pub fn assemble(&mut self) -> eyre::Result<()> {
        self.state.require(ProblemState::PortraitBuilt)?;
        let mut system = self.system.take().ok_or(FemError::InvalidState {
            expected: ProblemState::PortraitBuilt.name(),
            actual: ProblemState::Configured.name(),
        })?;
        let mut capacity_matrix = system.clone();
        self.assembler
            .assemble_into(&mut capacity_matrix, self.mesh, &self.cache, &self.layout, &self.capacity)?;
        self.assembler
            .assemble_into(&mut system, self.mesh, &self.cache, &self.layout, &self.stiffness)?;
        let mut combined = capacity_matrix.clone();
        combined.scaled_add(self.time.time_step(), &system);
        self.capacity_matrix = Some(capacity_matrix);
        self.system = Some(combined);
        self.state = ProblemState::Assembled;
        Ok(())
    }

    /// Advances the solution by one implicit Euler step and returns the new time.
    pub fn advance(&mut self) -> eyre::Result<f64> {
        if self.state != ProblemState::Solved {
            self.state.require(ProblemState::Assembled)?;
        }
        let (Some(capacity_matrix), Some(system)) = (&self.capacity_matrix, &self.system) else {
            return Err(FemError::InvalidState {
                expected: ProblemState::Assembled.name(),
                actual: self.state.name(),
            }
            .into());
        };
        require_complete(&self.layout)?;
        let tau = self.time.time_step();
        let t = self.time.time_at(self.step + 1);

        let source = &self.source;
        let mut rhs = assemble_load_vector(self.mesh, &self.cache, &self.layout, |x, _| source(x, t));
        add_neumann_flux(self.mesh, &self.conditions, &self.layout, &mut rhs, t);
        rhs *= tau;
        rhs += capacity_matrix.apply(&self.solution)?;
        let dirichlet = dirichlet_values(self.mesh, &self.conditions, &self.layout, &self.options.assembly, t)?;
        apply_dirichlet(system, &mut rhs, &dirichlet);
        self.rhs = rhs;
        self.state = ProblemState::BoundaryApplied;

        for &(dof, value) in &dirichlet {
            self.solution[dof] = value;
        }
        solve_system(system, &self.layout, &self.options, &self.rhs, &mut self.solution)?;
        self.step += 1;
        self.state = ProblemState::Solved;
        debug!("Completed step {} of {} at t = {}", self.step, self.time.steps, t);
        Ok(t)
    }

    /// Runs all remaining steps. `callback(step, time, solution)` is invoked for the initial
    /// state and after every step whose index is a multiple of the save frequency, as well as
    /// after the last step.
    pub fn run(
        &mut self,
        mut callback: impl FnMut(usize, f64, &DVector<f64>) -> eyre::Result<()>,
    ) -> eyre::Result<()> {
        if self.state == ProblemState::Configured {
            self.build_portrait()?;
        }
        if self.state == ProblemState::PortraitBuilt {
            self.assemble()?;
        }
        if self.step == 0 {
            callback(0, self.time.time_at(0), &self.solution)?;
        }
        let frequency = self.time.save_frequency.max(1);
        while self.step < self.time.steps {
            let t = self.advance()?;
            if self.step % frequency == 0 || self.step == self.time.steps {
                callback(self.step, t, &self.solution)?;
            }
        }
        Ok(())
    }
}

/// Transient heat conduction from `initial`. Returns the temperatures at the end of the
/// interval.
#[allow(clippy::too_many_arguments)]
pub fn solve_transient_heat<const D: usize, E, F>(
    mesh: &Mesh<D, E>,
    heat: &HeatParameters,
    model: &ModelParameters,
    influence: F,
    conditions: Vec<BoundaryCondition<D>>,
    initial: impl Fn(&Point<f64, D>) -> f64,
    time: &TimeParameters,
    options: &SolveOptions,
    callback: impl FnMut(usize, f64, &DVector<f64>) -> eyre::Result<()>,
) -> eyre::Result<DVector<f64>>
where
    E: ReferenceElement<D>,
    F: InfluenceFunction<D>,
{
    let mut problem = TransientHeatProblem::new(mesh, heat, model, influence, conditions, *time, *options)?
        .with_initial_distribution(initial);
    problem.run(callback)?;
    Ok(problem.solution().clone())
}
