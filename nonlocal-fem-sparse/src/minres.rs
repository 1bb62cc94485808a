//! MINRES for symmetric, possibly indefinite operators.
//!
//! This is the Paige–Saunders recurrence without preconditioning. For a consistent singular
//! system started from `x = 0` the iterates stay in the range of the operator, which makes it
//! suitable for saddle-point systems with a (semi)definite block.
use crate::{LinearOperator, SolveError, SolveErrorKind, SolveOutput};
use nalgebra::{DVector, DVectorView, DVectorViewMut};

#[derive(Debug, Clone)]
pub struct MinresWorkspace {
    r1: DVector<f64>,
    r2: DVector<f64>,
    y: DVector<f64>,
    v: DVector<f64>,
    w: DVector<f64>,
    w1: DVector<f64>,
    w2: DVector<f64>,
}

impl Default for MinresWorkspace {
    fn default() -> Self {
        let empty = DVector::zeros(0);
        Self {
            r1: empty.clone(),
            r2: empty.clone(),
            y: empty.clone(),
            v: empty.clone(),
            w: empty.clone(),
            w1: empty.clone(),
            w2: empty,
        }
    }
}

impl MinresWorkspace {
    fn resize(&mut self, dim: usize) {
        for buffer in [
            &mut self.r1,
            &mut self.r2,
            &mut self.y,
            &mut self.v,
            &mut self.w,
            &mut self.w1,
            &mut self.w2,
        ] {
            buffer.resize_vertically_mut(dim, 0.0);
        }
    }
}

#[derive(Debug)]
pub struct Minres<A> {
    workspace: MinresWorkspace,
    operator: A,
    tolerance: f64,
    max_iter: Option<usize>,
}

impl Minres<()> {
    pub fn new() -> Self {
        Self {
            workspace: MinresWorkspace::default(),
            operator: (),
            tolerance: 1e-10,
            max_iter: None,
        }
    }

    pub fn with_operator<A>(self, operator: A) -> Minres<A> {
        Minres {
            workspace: self.workspace,
            operator,
            tolerance: self.tolerance,
            max_iter: self.max_iter,
        }
    }
}

impl Default for Minres<()> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> Minres<A> {
    /// Relative tolerance on the estimated residual, `||r|| <= tol * ||b||`.
    pub fn with_tolerance(self, tolerance: f64) -> Self {
        Self { tolerance, ..self }
    }

    pub fn with_max_iter(self, max_iter: usize) -> Self {
        Self {
            max_iter: Some(max_iter),
            ..self
        }
    }
}

impl<A: LinearOperator> Minres<A> {
    pub fn solve_with_guess<'b>(
        &mut self,
        b: impl Into<DVectorView<'b, f64>>,
        x: impl Into<DVectorViewMut<'b, f64>>,
    ) -> Result<SolveOutput, SolveError> {
        self.solve_with_guess_(b.into(), x.into())
    }

    fn solve_with_guess_(&mut self, b: DVectorView<f64>, mut x: DVectorViewMut<f64>) -> Result<SolveOutput, SolveError> {
        assert_eq!(b.len(), x.len());
        let n = b.len();
        let mut output = SolveOutput::new(0, 0.0);

        let b_norm = b.norm();
        if b_norm == 0.0 {
            x.fill(0.0);
            return Ok(output);
        }

        let operator = &self.operator;
        let ws = &mut self.workspace;
        ws.resize(n);
        let apply = |y: &mut DVector<f64>, v: &DVector<f64>, output: &SolveOutput| {
            operator
                .apply(y.into(), v.into())
                .map_err(|err| SolveError::new(output.clone(), SolveErrorKind::OperatorError(err)))
        };

        // r1 = b - A x
        apply(&mut ws.r1, &x.clone_owned(), &output)?;
        ws.r1.zip_apply(&b, |r_i, b_i| *r_i = b_i - *r_i);
        ws.y.copy_from(&ws.r1);

        let mut beta = ws.r1.norm();
        output.residual_estimate = beta;
        if beta <= self.tolerance * b_norm {
            return Ok(output);
        }

        let max_iter = self.max_iter.unwrap_or(5 * n.max(1));
        let mut old_beta = 0.0;
        let mut dbar = 0.0;
        let mut epsilon = 0.0;
        let mut phibar = beta;
        let mut cs = -1.0;
        let mut sn = 0.0;
        ws.w.fill(0.0);
        ws.w2.fill(0.0);
        ws.r2.copy_from(&ws.r1);

        loop {
            if output.num_iterations >= max_iter {
                return Err(SolveError::new(output, SolveErrorKind::MaxIterationsReached { max_iter }));
            }
            output.num_iterations += 1;

            // Lanczos step
            let s = 1.0 / beta;
            ws.v.copy_from(&ws.y);
            ws.v *= s;
            apply(&mut ws.y, &ws.v, &output)?;
            if output.num_iterations >= 2 {
                let ratio = beta / old_beta;
                ws.y.zip_apply(&ws.r1, |y_i, r_i| *y_i -= ratio * r_i);
            }
            let alpha = ws.v.dot(&ws.y);
            let ratio = alpha / beta;
            ws.y.zip_apply(&ws.r2, |y_i, r_i| *y_i -= ratio * r_i);
            std::mem::swap(&mut ws.r1, &mut ws.r2);
            ws.r2.copy_from(&ws.y);
            old_beta = beta;
            beta = ws.r2.norm();

            // Apply the previous rotation, then compute and apply the next one
            let old_epsilon = epsilon;
            let delta = cs * dbar + sn * alpha;
            let gbar = sn * dbar - cs * alpha;
            epsilon = sn * beta;
            dbar = -cs * beta;

            let gamma = gbar.hypot(beta).max(f64::EPSILON);
            cs = gbar / gamma;
            sn = beta / gamma;
            let phi = cs * phibar;
            phibar *= sn;

            // w = (v - old_epsilon * w1 - delta * w2) / gamma
            std::mem::swap(&mut ws.w1, &mut ws.w2);
            std::mem::swap(&mut ws.w2, &mut ws.w);
            let inv_gamma = 1.0 / gamma;
            ws.w.copy_from(&ws.v);
            ws.w.zip_apply(&ws.w1, |w_i, w1_i| *w_i -= old_epsilon * w1_i);
            ws.w.zip_apply(&ws.w2, |w_i, w2_i| *w_i -= delta * w2_i);
            ws.w *= inv_gamma;
            x.zip_apply(&ws.w, |x_i, w_i| *x_i += phi * w_i);

            output.residual_estimate = phibar;
            if phibar <= self.tolerance * b_norm || beta == 0.0 {
                return Ok(output);
            }
        }
    }
}
