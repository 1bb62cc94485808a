use crate::OperatorError;
use std::fmt;

/// Summary of a (possibly failed) solve.
#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolveOutput {
    /// Number of iterations of the solver.
    ///
    /// Corresponds to the number of updates made to the (initial) solution vector. Direct
    /// solvers report a single iteration.
    pub num_iterations: usize,
    /// Norm of the residual as estimated by the solver when it stopped.
    pub residual_estimate: f64,
}

impl SolveOutput {
    pub(crate) fn new(num_iterations: usize, residual_estimate: f64) -> Self {
        Self {
            num_iterations,
            residual_estimate,
        }
    }
}

#[derive(Debug)]
#[non_exhaustive]
pub enum SolveErrorKind {
    OperatorError(OperatorError),
    PreconditionerError(OperatorError),
    IndefiniteOperator,
    IndefinitePreconditioner,
    MaxIterationsReached { max_iter: usize },
    SingularMatrix,
    /// The stored matrix is not in the upper-triangular form expected by the solver.
    InvalidStructure { row: usize, col: usize },
    DimensionMismatch(DimensionMismatch),
}

impl fmt::Display for SolveErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OperatorError(err) => {
                write!(f, "Error applying operator: ")?;
                err.fmt(f)
            }
            Self::PreconditionerError(err) => {
                write!(f, "Error applying preconditioner: ")?;
                err.fmt(f)
            }
            Self::IndefiniteOperator => write!(f, "Operator appears to be indefinite"),
            Self::IndefinitePreconditioner => write!(f, "Indefinite preconditioner"),
            Self::MaxIterationsReached { max_iter } => {
                write!(f, "Max iterations ({}) reached", max_iter)
            }
            Self::SingularMatrix => write!(f, "Matrix is singular"),
            Self::InvalidStructure { row, col } => write!(
                f,
                "Entry ({row}, {col}) lies below the diagonal of an upper-triangular matrix"
            ),
            Self::DimensionMismatch(mismatch) => mismatch.fmt(f),
        }
    }
}

#[non_exhaustive]
#[derive(Debug)]
pub struct SolveError {
    pub output: SolveOutput,
    pub kind: SolveErrorKind,
}

impl SolveError {
    pub(crate) fn new(output: SolveOutput, kind: SolveErrorKind) -> Self {
        Self { output, kind }
    }
}

impl fmt::Display for SolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Linear solve failed after {} iterations. Error: {}",
            self.output.num_iterations, self.kind
        )
    }
}

impl std::error::Error for SolveError {}

/// Raised when vectors or matrices of incompatible sizes meet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DimensionMismatch {
    pub expected: usize,
    pub actual: usize,
}

impl fmt::Display for DimensionMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Dimension mismatch: expected {}, got {}",
            self.expected, self.actual
        )
    }
}

impl std::error::Error for DimensionMismatch {}
