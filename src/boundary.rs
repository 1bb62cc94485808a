//! Boundary conditions of the first kind (prescribed values) and the second kind (prescribed
//! fluxes or tractions), and their application to the assembled system.
use crate::assembly::kernels::integrate_facet;
use crate::assembly::{DofLayout, SystemMatrix};
use crate::config::AssemblyConfig;
use crate::element::ReferenceElement;
use crate::error::FemError;
use crate::mesh::Mesh;
use log::{debug, info};
use nalgebra::{DVector, Point};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryKind {
    /// Prescribed value (Dirichlet).
    FirstKind,
    /// Prescribed flux (Neumann).
    SecondKind,
}

/// A boundary value, either constant or a function of the point and the time.
#[derive(Clone)]
pub enum BoundaryValue<const D: usize> {
    Constant(f64),
    Function(Arc<dyn Fn(&Point<f64, D>, f64) -> f64 + Send + Sync>),
}

impl<const D: usize> BoundaryValue<D> {
    pub fn function(f: impl Fn(&Point<f64, D>, f64) -> f64 + Send + Sync + 'static) -> Self {
        Self::Function(Arc::new(f))
    }

    pub fn evaluate(&self, x: &Point<f64, D>, time: f64) -> f64 {
        match self {
            Self::Constant(value) => *value,
            Self::Function(f) => f(x, time),
        }
    }
}

impl<const D: usize> From<f64> for BoundaryValue<D> {
    fn from(value: f64) -> Self {
        Self::Constant(value)
    }
}

impl<const D: usize> fmt::Debug for BoundaryValue<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(value) => f.debug_tuple("Constant").field(value).finish(),
            Self::Function(_) => f.write_str("Function(..)"),
        }
    }
}

/// Condition on one solution component.
#[derive(Debug, Clone)]
pub struct ComponentCondition<const D: usize> {
    pub kind: BoundaryKind,
    pub value: BoundaryValue<D>,
}

impl<const D: usize> ComponentCondition<D> {
    pub fn first_kind(value: impl Into<BoundaryValue<D>>) -> Self {
        Self {
            kind: BoundaryKind::FirstKind,
            value: value.into(),
        }
    }

    pub fn second_kind(value: impl Into<BoundaryValue<D>>) -> Self {
        Self {
            kind: BoundaryKind::SecondKind,
            value: value.into(),
        }
    }
}

/// The conditions of one boundary group, one per solution component.
#[derive(Debug, Clone)]
pub struct BoundaryCondition<const D: usize> {
    components: Vec<ComponentCondition<D>>,
}

impl<const D: usize> BoundaryCondition<D> {
    pub fn new(components: Vec<ComponentCondition<D>>) -> Self {
        Self { components }
    }

    /// Scalar condition of the first kind, e.g. a prescribed temperature.
    pub fn value(value: impl Into<BoundaryValue<D>>) -> Self {
        Self::new(vec![ComponentCondition::first_kind(value)])
    }

    /// Scalar condition of the second kind, e.g. a prescribed heat flux.
    pub fn flux(value: impl Into<BoundaryValue<D>>) -> Self {
        Self::new(vec![ComponentCondition::second_kind(value)])
    }

    pub fn components(&self) -> &[ComponentCondition<D>] {
        &self.components
    }

    pub fn component(&self, component: usize) -> &ComponentCondition<D> {
        &self.components[component]
    }
}

/// Checks that there is one condition per boundary group with one entry per component.
pub fn validate_conditions<const D: usize, E: ReferenceElement<D>>(
    mesh: &Mesh<D, E>,
    conditions: &[BoundaryCondition<D>],
    solution_dim: usize,
) -> Result<(), FemError> {
    if conditions.len() != mesh.boundary_groups_count() {
        return Err(FemError::BoundaryGroupMismatch {
            expected: mesh.boundary_groups_count(),
            actual: conditions.len(),
        });
    }
    for (group, condition) in conditions.iter().enumerate() {
        if condition.components.len() != solution_dim {
            return Err(FemError::ComponentMismatch {
                group,
                expected: solution_dim,
                actual: condition.components.len(),
            });
        }
    }
    Ok(())
}

/// Whether no component is prescribed anywhere, i.e. the solution is only determined up to a
/// constant (per component).
pub fn is_pure_neumann<const D: usize>(conditions: &[BoundaryCondition<D>]) -> bool {
    conditions
        .iter()
        .flat_map(|condition| &condition.components)
        .all(|component| component.kind == BoundaryKind::SecondKind)
}

/// Net flux `∮ q ds` of the given component through the whole boundary.
pub fn net_flux<const D: usize, E: ReferenceElement<D>>(
    mesh: &Mesh<D, E>,
    conditions: &[BoundaryCondition<D>],
    component: usize,
    time: f64,
) -> f64 {
    let mut total = 0.0;
    for (group, condition) in mesh.boundary_groups().iter().zip(conditions) {
        let condition = &condition.components[component];
        if condition.kind == BoundaryKind::SecondKind {
            for facet in group.facets() {
                integrate_facet(
                    mesh.vertices(),
                    facet,
                    |x| condition.value.evaluate(x, time),
                    |_, integral| total += integral,
                );
            }
        }
    }
    total
}

/// Rejects pure Neumann problems whose prescribed boundary flux does not integrate to zero.
///
/// Only pure Neumann problems are checked, other problems always pass.
pub fn check_solvability<const D: usize, E: ReferenceElement<D>>(
    mesh: &Mesh<D, E>,
    conditions: &[BoundaryCondition<D>],
    solution_dim: usize,
    config: &AssemblyConfig,
) -> Result<(), FemError> {
    if !is_pure_neumann(conditions) {
        return Ok(());
    }
    for component in 0..solution_dim {
        let flux = net_flux(mesh, conditions, component, 0.0);
        debug!("Net boundary flux of component {component}: {flux:e}");
        if flux.abs() > config.neumann_tolerance {
            return Err(FemError::Unsolvable {
                net_flux: flux,
                tolerance: config.neumann_tolerance,
            });
        }
    }
    Ok(())
}

/// Prescribed values of all constrained degrees of freedom, ordered by degree of freedom.
///
/// A node shared by several groups may be constrained by each of them, as long as the values
/// agree within `config.dirichlet_tolerance`.
pub fn dirichlet_values<const D: usize, E: ReferenceElement<D>>(
    mesh: &Mesh<D, E>,
    conditions: &[BoundaryCondition<D>],
    layout: &DofLayout,
    config: &AssemblyConfig,
    time: f64,
) -> Result<Vec<(usize, f64)>, FemError> {
    let mut values: BTreeMap<usize, f64> = BTreeMap::new();
    for (group, condition) in mesh.boundary_groups().iter().zip(conditions) {
        for (component, condition) in condition.components.iter().enumerate() {
            if condition.kind != BoundaryKind::FirstKind {
                continue;
            }
            for node in group.nodes() {
                let dof = layout.dof(node, component);
                let value = condition.value.evaluate(mesh.node(node), time);
                match values.get(&dof) {
                    Some(&first) if (first - value).abs() > config.dirichlet_tolerance => {
                        return Err(FemError::ConflictingDirichlet {
                            dof,
                            first,
                            second: value,
                        });
                    }
                    Some(_) => {}
                    None => {
                        values.insert(dof, value);
                    }
                }
            }
        }
    }
    Ok(values.into_iter().collect())
}

/// Adds `∫ N_i q ds` of all conditions of the second kind to the owned rows of `f`.
pub fn add_neumann_flux<const D: usize, E: ReferenceElement<D>>(
    mesh: &Mesh<D, E>,
    conditions: &[BoundaryCondition<D>],
    layout: &DofLayout,
    f: &mut DVector<f64>,
    time: f64,
) {
    let owned = layout.owned_nodes();
    for (group, condition) in mesh.boundary_groups().iter().zip(conditions) {
        for (component, condition) in condition.components.iter().enumerate() {
            if condition.kind != BoundaryKind::SecondKind {
                continue;
            }
            for facet in group.facets() {
                integrate_facet(
                    mesh.vertices(),
                    facet,
                    |x| condition.value.evaluate(x, time),
                    |node, integral| {
                        if owned.contains(&node) {
                            f[layout.dof(node, component)] += integral;
                        }
                    },
                );
            }
        }
    }
}

/// Eliminates the prescribed values from the right-hand side.
///
/// Every owned unknown row is corrected by `-Σ_c K_bound[row, c] v_c`, after which the
/// constrained entries are overwritten with their values, matching the unit rows of the inner
/// block.
pub fn apply_dirichlet(matrix: &SystemMatrix, f: &mut DVector<f64>, values: &[(usize, f64)]) {
    let mut prescribed = DVector::zeros(f.len());
    for &(dof, value) in values {
        prescribed[dof] = value;
    }
    let first_row = matrix.first_row();
    for (local_row, row) in matrix.bound().row_iter().enumerate() {
        let correction: f64 = row
            .col_indices()
            .iter()
            .zip(row.values())
            .map(|(&col, &value)| value * prescribed[col])
            .sum();
        f[first_row + local_row] -= correction;
    }
    let owned_rows = first_row..first_row + matrix.inner().nrows();
    for &(dof, value) in values {
        if owned_rows.contains(&dof) {
            f[dof] = value;
        }
    }
    info!("Applied {} prescribed values", values.len());
}
