//! Run parameters.
//!
//! All parameter structs are serde-deserializable with defaults for missing fields, so that
//! runs can be described by (partial) JSON documents.
use crate::error::FemError;
use log::warn;
use nonlocal_fem_sparse::SymmetricSolver;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Numerical thresholds used by the assembly.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyConfig {
    /// Local weights `p1` at or above this value are treated as purely local, and the nonlocal
    /// contribution is not assembled at all.
    pub max_local_weight: f64,
    /// Largest net boundary flux for which a pure Neumann problem is considered solvable.
    pub neumann_tolerance: f64,
    /// Dirichlet values on a shared degree of freedom that differ by less than this are
    /// considered equal.
    pub dirichlet_tolerance: f64,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            max_local_weight: 0.999,
            neumann_tolerance: 1e-5,
            dirichlet_tolerance: 1e-12,
        }
    }
}

/// Locality weight `p1` and influence radius `r` of the nonlocal model.
///
/// The bilinear form is `p1 * local + (1 - p1) * nonlocal`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelParameters {
    pub local_weight: f64,
    pub radius: f64,
}

impl Default for ModelParameters {
    fn default() -> Self {
        Self::local()
    }
}

impl ModelParameters {
    pub fn local() -> Self {
        Self {
            local_weight: 1.0,
            radius: 0.0,
        }
    }

    pub fn nonlocal(local_weight: f64, radius: f64) -> Self {
        Self { local_weight, radius }
    }

    pub fn nonlocal_weight(&self) -> f64 {
        1.0 - self.local_weight
    }

    pub fn is_nonlocal(&self, config: &AssemblyConfig) -> bool {
        self.local_weight < config.max_local_weight
    }

    pub fn validate(&self, config: &AssemblyConfig) -> Result<(), FemError> {
        if !(0.0..=1.0).contains(&self.local_weight) {
            return Err(FemError::InvalidParameter {
                name: "local_weight",
                value: self.local_weight,
            });
        }
        if !(self.radius >= 0.0) || !self.radius.is_finite() {
            return Err(FemError::InvalidParameter {
                name: "radius",
                value: self.radius,
            });
        }
        if self.is_nonlocal(config) && self.radius == 0.0 {
            warn!(
                "Nonlocal weight {} requested with zero influence radius",
                self.nonlocal_weight()
            );
        }
        Ok(())
    }
}

/// Time interval, number of implicit Euler steps and output frequency of a transient run.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeParameters {
    pub interval: [f64; 2],
    pub steps: usize,
    pub save_frequency: usize,
}

impl Default for TimeParameters {
    fn default() -> Self {
        Self {
            interval: [0.0, 1.0],
            steps: 100,
            save_frequency: 1,
        }
    }
}

impl TimeParameters {
    pub fn time_step(&self) -> f64 {
        (self.interval[1] - self.interval[0]) / self.steps as f64
    }

    /// Time at the end of the given step. Step 0 is the initial state.
    pub fn time_at(&self, step: usize) -> f64 {
        self.interval[0] + step as f64 * self.time_step()
    }

    pub fn validate(&self) -> Result<(), FemError> {
        if self.steps == 0 {
            return Err(FemError::InvalidParameter {
                name: "steps",
                value: 0.0,
            });
        }
        if !(self.interval[1] > self.interval[0]) {
            return Err(FemError::InvalidParameter {
                name: "interval",
                value: self.interval[1] - self.interval[0],
            });
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverKind {
    /// Conjugate gradient for positive definite systems, MINRES for saddle-point systems.
    Auto,
    ConjugateGradient,
    Minres,
    DenseLu,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverParameters {
    pub kind: SolverKind,
    pub tolerance: f64,
    pub max_iterations: Option<usize>,
}

impl Default for SolverParameters {
    fn default() -> Self {
        Self {
            kind: SolverKind::Auto,
            tolerance: 1e-10,
            max_iterations: None,
        }
    }
}

impl SolverParameters {
    /// The concrete solver for a system that is positive definite, or a saddle-point system
    /// when `augmented` is set.
    pub fn select(&self, augmented: bool) -> SymmetricSolver {
        let (tolerance, max_iter) = (self.tolerance, self.max_iterations);
        match self.kind {
            SolverKind::Auto if augmented => SymmetricSolver::Minres { tolerance, max_iter },
            SolverKind::Auto | SolverKind::ConjugateGradient => {
                SymmetricSolver::ConjugateGradient { tolerance, max_iter }
            }
            SolverKind::Minres => SymmetricSolver::Minres { tolerance, max_iter },
            SolverKind::DenseLu => SymmetricSolver::DenseLu,
        }
    }
}

/// Where and what to write.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveParameters {
    pub folder: PathBuf,
    pub save_csv: bool,
    pub save_vtk: bool,
    /// Log the solution integral whenever results are saved.
    pub calc_energy: bool,
    /// Number of digits after the decimal point in text output.
    pub precision: usize,
}

impl Default for SaveParameters {
    fn default() -> Self {
        Self {
            folder: PathBuf::from("."),
            save_csv: true,
            save_vtk: true,
            calc_energy: true,
            precision: 17,
        }
    }
}

/// Overrides the number of Gauss points per reference direction of every element.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuadratureParameters {
    pub points_per_dimension: Option<usize>,
}

/// Numerical settings shared by all drivers.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolveOptions {
    pub assembly: AssemblyConfig,
    pub quadrature: QuadratureParameters,
    pub solver: SolverParameters,
}
