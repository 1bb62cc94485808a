//! Dense LU fallback for small symmetric systems.
use crate::{DimensionMismatch, SolveError, SolveErrorKind, SolveOutput, SymmetricCsrOperator};
use nalgebra::{DVectorView, DVectorViewMut};

#[derive(Debug, Clone, Copy, Default)]
pub struct DenseLu;

impl DenseLu {
    /// Expands the symmetric operator to a dense matrix and solves with partial-pivoting LU.
    pub fn solve<'b>(
        &self,
        operator: &SymmetricCsrOperator,
        b: impl Into<DVectorView<'b, f64>>,
        x: impl Into<DVectorViewMut<'b, f64>>,
    ) -> Result<SolveOutput, SolveError> {
        let b = b.into();
        let mut x = x.into();
        if b.len() != operator.dim() || x.len() != operator.dim() {
            let kind = SolveErrorKind::DimensionMismatch(DimensionMismatch {
                expected: operator.dim(),
                actual: b.len(),
            });
            return Err(SolveError::new(SolveOutput::default(), kind));
        }

        let solution = operator
            .to_dense()
            .lu()
            .solve(&b)
            .ok_or_else(|| SolveError::new(SolveOutput::default(), SolveErrorKind::SingularMatrix))?;
        x.copy_from(&solution);
        Ok(SolveOutput::new(1, 0.0))
    }
}
