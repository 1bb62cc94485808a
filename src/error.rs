//! Errors reported by the assembly and solve pipeline.
use nonlocal_fem_sparse::SolveError;
use std::fmt;

#[derive(Debug)]
#[non_exhaustive]
pub enum FemError {
    /// The boundary conditions name a boundary group the mesh does not have, or do not cover
    /// the mesh's boundary groups.
    BoundaryGroupMismatch { expected: usize, actual: usize },
    /// A boundary condition has a different number of components than the problem.
    ComponentMismatch { group: usize, expected: usize, actual: usize },
    /// Two boundary groups prescribe different values for the same degree of freedom.
    ConflictingDirichlet { dof: usize, first: f64, second: f64 },
    InvalidParameter { name: &'static str, value: f64 },
    /// A nonlocal model was requested on a mesh without neighbor lists.
    MissingNeighbors,
    SizeMismatch { what: &'static str, expected: usize, actual: usize },
    /// An operation was invoked before the stage it depends on was reached.
    InvalidState { expected: &'static str, actual: &'static str },
    /// Pure Neumann problem whose prescribed boundary flux does not integrate to zero.
    Unsolvable { net_flux: f64, tolerance: f64 },
    Solver(SolveError),
}

impl FemError {
    /// Whether the error stems from invalid input rather than from the numerics.
    pub fn is_configuration_error(&self) -> bool {
        !matches!(self, Self::Unsolvable { .. } | Self::Solver(_))
    }
}

impl fmt::Display for FemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BoundaryGroupMismatch { expected, actual } => write!(
                f,
                "Boundary conditions given for {actual} groups, but the mesh has {expected} boundary groups"
            ),
            Self::ComponentMismatch {
                group,
                expected,
                actual,
            } => write!(
                f,
                "Boundary group {group} prescribes {actual} components, expected {expected}"
            ),
            Self::ConflictingDirichlet { dof, first, second } => write!(
                f,
                "Conflicting Dirichlet values {first} and {second} prescribed for degree of freedom {dof}"
            ),
            Self::InvalidParameter { name, value } => write!(f, "Invalid value {value} for parameter {name}"),
            Self::MissingNeighbors => write!(
                f,
                "Nonlocal model requested, but the mesh has no neighbor lists. Compute neighbors first"
            ),
            Self::SizeMismatch { what, expected, actual } => {
                write!(f, "Size mismatch for {what}: expected {expected}, got {actual}")
            }
            Self::InvalidState { expected, actual } => {
                write!(f, "Invalid state: expected {expected}, but the problem is {actual}")
            }
            Self::Unsolvable { net_flux, tolerance } => write!(
                f,
                "The problem is unsolvable. Net boundary flux {net_flux:e} exceeds tolerance {tolerance:e}"
            ),
            Self::Solver(err) => write!(f, "Linear solver failed: {err}"),
        }
    }
}

impl std::error::Error for FemError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Solver(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SolveError> for FemError {
    fn from(err: SolveError) -> Self {
        Self::Solver(err)
    }
}
