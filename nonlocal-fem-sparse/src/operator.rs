use crate::{DimensionMismatch, SolveErrorKind};
use nalgebra::{DMatrix, DVector, DVectorView, DVectorViewMut};
use nalgebra_sparse::CsrMatrix;
use std::error::Error;

pub type OperatorError = Box<dyn Error + Send + Sync>;

/// A linear map `y = A x`.
pub trait LinearOperator {
    fn apply(&self, y: DVectorViewMut<f64>, x: DVectorView<f64>) -> Result<(), OperatorError>;
}

impl<'a, A> LinearOperator for &'a A
where
    A: ?Sized + LinearOperator,
{
    fn apply(&self, y: DVectorViewMut<f64>, x: DVectorView<f64>) -> Result<(), OperatorError> {
        <A as LinearOperator>::apply(self, y, x)
    }
}

fn check_dims(y_len: usize, x_len: usize, nrows: usize, ncols: usize) -> Result<(), OperatorError> {
    if x_len != ncols {
        return Err(Box::new(DimensionMismatch {
            expected: ncols,
            actual: x_len,
        }));
    }
    if y_len != nrows {
        return Err(Box::new(DimensionMismatch {
            expected: nrows,
            actual: y_len,
        }));
    }
    Ok(())
}

impl LinearOperator for DMatrix<f64> {
    fn apply(&self, mut y: DVectorViewMut<f64>, x: DVectorView<f64>) -> Result<(), OperatorError> {
        check_dims(y.len(), x.len(), self.nrows(), self.ncols())?;
        y.gemv(1.0, self, &x, 0.0);
        Ok(())
    }
}

/// A general (non-symmetric) CSR matrix, every stored entry is used as is.
impl LinearOperator for CsrMatrix<f64> {
    fn apply(&self, mut y: DVectorViewMut<f64>, x: DVectorView<f64>) -> Result<(), OperatorError> {
        check_dims(y.len(), x.len(), self.nrows(), self.ncols())?;
        for (i, row) in self.row_iter().enumerate() {
            y[i] = row
                .col_indices()
                .iter()
                .zip(row.values())
                .map(|(&j, &a_ij)| a_ij * x[j])
                .sum();
        }
        Ok(())
    }
}

pub struct IdentityOperator;

impl LinearOperator for IdentityOperator {
    fn apply(&self, mut y: DVectorViewMut<f64>, x: DVectorView<f64>) -> Result<(), OperatorError> {
        check_dims(y.len(), x.len(), x.len(), x.len())?;
        y.copy_from(&x);
        Ok(())
    }
}

/// A symmetric matrix represented by the upper triangle (diagonal included) of a CSR matrix.
///
/// Applying the operator computes `y = (U + U^T - diag(U)) x`, which is the product with the
/// full symmetric matrix.
#[derive(Debug, Clone, Copy)]
pub struct SymmetricCsrOperator<'a> {
    upper: &'a CsrMatrix<f64>,
}

impl<'a> SymmetricCsrOperator<'a> {
    /// Wraps an upper-triangular CSR matrix.
    ///
    /// Returns an error if the matrix is not square or stores an entry below the diagonal.
    pub fn from_upper_triangle(upper: &'a CsrMatrix<f64>) -> Result<Self, SolveErrorKind> {
        if upper.nrows() != upper.ncols() {
            return Err(SolveErrorKind::DimensionMismatch(DimensionMismatch {
                expected: upper.nrows(),
                actual: upper.ncols(),
            }));
        }
        for (i, row) in upper.row_iter().enumerate() {
            if let Some(&j) = row.col_indices().iter().find(|&&j| j < i) {
                return Err(SolveErrorKind::InvalidStructure { row: i, col: j });
            }
        }
        Ok(Self { upper })
    }

    pub fn dim(&self) -> usize {
        self.upper.nrows()
    }

    pub fn upper_triangle(&self) -> &'a CsrMatrix<f64> {
        self.upper
    }

    /// Expands the operator into a dense symmetric matrix.
    pub fn to_dense(&self) -> DMatrix<f64> {
        let mut dense = DMatrix::zeros(self.dim(), self.dim());
        for (i, j, &a_ij) in self.upper.triplet_iter() {
            dense[(i, j)] = a_ij;
            dense[(j, i)] = a_ij;
        }
        dense
    }

    /// Returns the diagonal of the matrix. Missing diagonal entries are reported as zero.
    pub fn diagonal(&self) -> DVector<f64> {
        DVector::from_iterator(
            self.dim(),
            self.upper.row_iter().enumerate().map(|(i, row)| {
                row.col_indices()
                    .iter()
                    .position(|&j| j == i)
                    .map(|idx| row.values()[idx])
                    .unwrap_or(0.0)
            }),
        )
    }
}

impl<'a> LinearOperator for SymmetricCsrOperator<'a> {
    fn apply(&self, mut y: DVectorViewMut<f64>, x: DVectorView<f64>) -> Result<(), OperatorError> {
        check_dims(y.len(), x.len(), self.dim(), self.dim())?;
        y.fill(0.0);
        for (i, row) in self.upper.row_iter().enumerate() {
            let x_i = x[i];
            let mut y_i = 0.0;
            for (&j, &a_ij) in row.col_indices().iter().zip(row.values()) {
                y_i += a_ij * x[j];
                if j != i {
                    y[j] += a_ij * x_i;
                }
            }
            y[i] += y_i;
        }
        Ok(())
    }
}

/// Jacobi preconditioner `P = diag(A)^{-1}`.
///
/// Zero diagonal entries are left unscaled.
#[derive(Debug, Clone)]
pub struct DiagonalPreconditioner {
    inverse_diagonal: DVector<f64>,
}

impl DiagonalPreconditioner {
    pub fn from_diagonal(diagonal: &DVector<f64>) -> Self {
        let inverse_diagonal = diagonal.map(|d| if d != 0.0 { 1.0 / d } else { 1.0 });
        Self { inverse_diagonal }
    }

    pub fn from_operator(operator: &SymmetricCsrOperator) -> Self {
        Self::from_diagonal(&operator.diagonal())
    }
}

impl LinearOperator for DiagonalPreconditioner {
    fn apply(&self, mut y: DVectorViewMut<f64>, x: DVectorView<f64>) -> Result<(), OperatorError> {
        let n = self.inverse_diagonal.len();
        check_dims(y.len(), x.len(), n, n)?;
        y.copy_from(&x);
        y.component_mul_assign(&self.inverse_diagonal);
        Ok(())
    }
}
