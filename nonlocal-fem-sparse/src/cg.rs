//! Preconditioned Conjugate Gradient for symmetric positive definite operators.
use crate::{IdentityOperator, LinearOperator, OperatorError, SolveError, SolveErrorKind, SolveOutput};
use nalgebra::{DVector, DVectorView, DVectorViewMut};
use std::ops::{Deref, DerefMut};

pub trait CgStoppingCriterion {
    /// Decides convergence from the approximate residual maintained by CG.
    fn has_converged(&self, b_norm: f64, iteration: usize, approx_residual: DVectorView<f64>) -> bool;
}

/// Relative residual tolerance ||r|| <= tol * ||b||.
///
/// Note that we use the *approximate* residual given by Conjugate-Gradient. For ill-conditioned
/// problems, it is possible that CG's residual converges, but the real residual does not.
#[derive(Debug, Clone, Copy)]
pub struct RelativeResidualCriterion {
    tol: f64,
}

impl RelativeResidualCriterion {
    pub fn new(tol: f64) -> Self {
        Self { tol }
    }

    pub fn tolerance(&self) -> f64 {
        self.tol
    }
}

impl Default for RelativeResidualCriterion {
    fn default() -> Self {
        Self::new(1e-8)
    }
}

impl CgStoppingCriterion for RelativeResidualCriterion {
    fn has_converged(&self, b_norm: f64, _iteration: usize, approx_residual: DVectorView<f64>) -> bool {
        approx_residual.norm() <= self.tol * b_norm
    }
}

#[derive(Debug, Clone)]
#[allow(non_snake_case)]
pub struct CgWorkspace {
    r: DVector<f64>,
    z: DVector<f64>,
    p: DVector<f64>,
    Ap: DVector<f64>,
}

impl Default for CgWorkspace {
    fn default() -> Self {
        Self {
            r: DVector::zeros(0),
            z: DVector::zeros(0),
            p: DVector::zeros(0),
            Ap: DVector::zeros(0),
        }
    }
}

#[allow(non_snake_case)]
struct Buffers<'a> {
    r: &'a mut DVector<f64>,
    z: &'a mut DVector<f64>,
    p: &'a mut DVector<f64>,
    Ap: &'a mut DVector<f64>,
}

impl CgWorkspace {
    fn prepare_buffers(&mut self, dim: usize) -> Buffers {
        self.r.resize_vertically_mut(dim, 0.0);
        self.z.resize_vertically_mut(dim, 0.0);
        self.p.resize_vertically_mut(dim, 0.0);
        self.Ap.resize_vertically_mut(dim, 0.0);
        Buffers {
            r: &mut self.r,
            z: &mut self.z,
            p: &mut self.p,
            Ap: &mut self.Ap,
        }
    }
}

#[derive(Debug)]
enum OwnedOrMutRef<'a, T> {
    Owned(T),
    MutRef(&'a mut T),
}

impl<'a, T> Deref for OwnedOrMutRef<'a, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        match self {
            Self::Owned(owned) => owned,
            Self::MutRef(mutref) => mutref,
        }
    }
}

impl<'a, T> DerefMut for OwnedOrMutRef<'a, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self {
            Self::Owned(owned) => owned,
            Self::MutRef(mutref) => mutref,
        }
    }
}

/// Builder-style Conjugate Gradient solver.
///
/// ```ignore
/// let output = ConjugateGradient::new()
///     .with_operator(&operator)
///     .with_preconditioner(DiagonalPreconditioner::from_operator(&operator))
///     .with_stopping_criterion(RelativeResidualCriterion::new(1e-10))
///     .solve_with_guess(&b, &mut x)?;
/// ```
#[derive(Debug)]
pub struct ConjugateGradient<'a, A, P, Criterion> {
    workspace: OwnedOrMutRef<'a, CgWorkspace>,
    operator: A,
    preconditioner: P,
    stopping_criterion: Criterion,
    max_iter: Option<usize>,
}

impl<'a> ConjugateGradient<'a, (), IdentityOperator, RelativeResidualCriterion> {
    pub fn new() -> Self {
        Self {
            workspace: OwnedOrMutRef::Owned(CgWorkspace::default()),
            operator: (),
            preconditioner: IdentityOperator,
            stopping_criterion: RelativeResidualCriterion::default(),
            max_iter: None,
        }
    }

    pub fn with_workspace(workspace: &'a mut CgWorkspace) -> Self {
        Self {
            workspace: OwnedOrMutRef::MutRef(workspace),
            operator: (),
            preconditioner: IdentityOperator,
            stopping_criterion: RelativeResidualCriterion::default(),
            max_iter: None,
        }
    }
}

impl<'a> Default for ConjugateGradient<'a, (), IdentityOperator, RelativeResidualCriterion> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, P, Criterion> ConjugateGradient<'a, (), P, Criterion> {
    pub fn with_operator<A>(self, operator: A) -> ConjugateGradient<'a, A, P, Criterion> {
        ConjugateGradient {
            workspace: self.workspace,
            operator,
            preconditioner: self.preconditioner,
            stopping_criterion: self.stopping_criterion,
            max_iter: self.max_iter,
        }
    }
}

impl<'a, A, P, Criterion> ConjugateGradient<'a, A, P, Criterion> {
    pub fn with_preconditioner<P2>(self, preconditioner: P2) -> ConjugateGradient<'a, A, P2, Criterion> {
        ConjugateGradient {
            workspace: self.workspace,
            operator: self.operator,
            preconditioner,
            stopping_criterion: self.stopping_criterion,
            max_iter: self.max_iter,
        }
    }

    pub fn with_stopping_criterion<C2>(self, stopping_criterion: C2) -> ConjugateGradient<'a, A, P, C2> {
        ConjugateGradient {
            workspace: self.workspace,
            operator: self.operator,
            preconditioner: self.preconditioner,
            stopping_criterion,
            max_iter: self.max_iter,
        }
    }

    pub fn with_max_iter(self, max_iter: usize) -> Self {
        Self {
            max_iter: Some(max_iter),
            ..self
        }
    }
}

/// y = Ax
fn apply_operator<'a, A>(
    y: impl Into<DVectorViewMut<'a, f64>>,
    a: &A,
    x: impl Into<DVectorView<'a, f64>>,
) -> Result<(), OperatorError>
where
    A: LinearOperator,
{
    a.apply(y.into(), x.into())
}

impl<'a, A, P, Criterion> ConjugateGradient<'a, A, P, Criterion>
where
    A: LinearOperator,
    P: LinearOperator,
    Criterion: CgStoppingCriterion,
{
    /// Solves `A x = b`, starting from the current contents of `x`.
    pub fn solve_with_guess<'b>(
        &mut self,
        b: impl Into<DVectorView<'b, f64>>,
        x: impl Into<DVectorViewMut<'b, f64>>,
    ) -> Result<SolveOutput, SolveError> {
        self.solve_with_guess_(b.into(), x.into())
    }

    #[allow(non_snake_case)]
    fn solve_with_guess_(&mut self, b: DVectorView<f64>, mut x: DVectorViewMut<f64>) -> Result<SolveOutput, SolveError> {
        use SolveErrorKind::*;
        assert_eq!(b.len(), x.len());

        let mut output = SolveOutput::new(0, 0.0);
        let b_norm = b.norm();
        if b_norm == 0.0 {
            x.fill(0.0);
            return Ok(output);
        }

        let Buffers { r, z, p, Ap } = self.workspace.prepare_buffers(x.len());

        // r = b - Ax
        if let Err(err) = apply_operator(&mut *r, &self.operator, &x) {
            return Err(SolveError::new(output, OperatorError(err)));
        }
        r.zip_apply(&b, |r_i, b_i| *r_i = b_i - *r_i);

        // z = Pr
        if let Err(err) = apply_operator(&mut *z, &self.preconditioner, &*r) {
            return Err(SolveError::new(output, PreconditionerError(err)));
        }
        p.copy_from(&*z);
        let mut zTr = z.dot(&*r);

        loop {
            output.residual_estimate = r.norm();
            if self
                .stopping_criterion
                .has_converged(b_norm, output.num_iterations, (&*r).into())
            {
                break;
            } else if let Some(max_iter) = self.max_iter {
                if output.num_iterations >= max_iter {
                    return Err(SolveError::new(output, MaxIterationsReached { max_iter }));
                }
            }

            // Ap = A * p
            if let Err(err) = apply_operator(&mut *Ap, &self.operator, &*p) {
                return Err(SolveError::new(output, OperatorError(err)));
            }
            let pAp = p.dot(&*Ap);
            if pAp <= 0.0 {
                return Err(SolveError::new(output, IndefiniteOperator));
            }
            if zTr <= 0.0 {
                return Err(SolveError::new(output, IndefinitePreconditioner));
            }

            let alpha = zTr / pAp;
            // x <- x + alpha * p
            x.zip_apply(&*p, |x_i, p_i| *x_i += alpha * p_i);
            // r <- r - alpha * Ap
            r.zip_apply(&*Ap, |r_i, Ap_i| *r_i -= alpha * Ap_i);
            output.num_iterations += 1;

            // z <- P r
            if let Err(err) = apply_operator(&mut *z, &self.preconditioner, &*r) {
                return Err(SolveError::new(output, PreconditionerError(err)));
            }
            let zTr_next = z.dot(&*r);
            let beta = zTr_next / zTr;

            // p <- z + beta * p
            p.zip_apply(&*z, |p_i, z_i| *p_i = z_i + beta * *p_i);
            zTr = zTr_next;
        }

        Ok(output)
    }
}
