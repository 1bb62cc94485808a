use crate::cg::{ConjugateGradient, RelativeResidualCriterion};
use crate::dense::DenseLu;
use crate::minres::Minres;
use crate::{DiagonalPreconditioner, SolveError, SolveOutput, SymmetricCsrOperator};
use log::debug;
use nalgebra::{DVectorView, DVectorViewMut};
use nalgebra_sparse::CsrMatrix;

/// A solver for symmetric systems whose matrix is stored as its upper triangle.
pub trait LinearSolver {
    /// Solves `A x = b`, using the contents of `x` as initial guess where the method allows it.
    fn solve_with_guess(
        &mut self,
        upper: &CsrMatrix<f64>,
        b: DVectorView<f64>,
        x: DVectorViewMut<f64>,
    ) -> Result<SolveOutput, SolveError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SymmetricSolver {
    /// Jacobi-preconditioned conjugate gradient. Requires a positive definite matrix.
    ConjugateGradient { tolerance: f64, max_iter: Option<usize> },
    Minres { tolerance: f64, max_iter: Option<usize> },
    DenseLu,
}

impl SymmetricSolver {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ConjugateGradient { .. } => "conjugate gradient",
            Self::Minres { .. } => "MINRES",
            Self::DenseLu => "dense LU",
        }
    }
}

impl LinearSolver for SymmetricSolver {
    fn solve_with_guess(
        &mut self,
        upper: &CsrMatrix<f64>,
        b: DVectorView<f64>,
        x: DVectorViewMut<f64>,
    ) -> Result<SolveOutput, SolveError> {
        let operator = SymmetricCsrOperator::from_upper_triangle(upper)
            .map_err(|kind| SolveError::new(SolveOutput::default(), kind))?;
        let result = match *self {
            Self::ConjugateGradient { tolerance, max_iter } => {
                let mut cg = ConjugateGradient::new()
                    .with_operator(operator)
                    .with_preconditioner(DiagonalPreconditioner::from_operator(&operator))
                    .with_stopping_criterion(RelativeResidualCriterion::new(tolerance));
                if let Some(max_iter) = max_iter {
                    cg = cg.with_max_iter(max_iter);
                }
                cg.solve_with_guess(b, x)
            }
            Self::Minres { tolerance, max_iter } => {
                let mut minres = Minres::new().with_operator(operator).with_tolerance(tolerance);
                if let Some(max_iter) = max_iter {
                    minres = minres.with_max_iter(max_iter);
                }
                minres.solve_with_guess(b, x)
            }
            Self::DenseLu => DenseLu.solve(&operator, b, x),
        };
        if let Ok(output) = &result {
            debug!(
                "{} finished after {} iterations (residual estimate {:.3e})",
                self.name(),
                output.num_iterations,
                output.residual_estimate
            );
        }
        result
    }
}
