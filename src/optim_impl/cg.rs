//! Preconditioned conjugate gradient

use super::{DiagonalPreconditioner, LinearOperator};
use nalgebra::DVector;
use tracing::debug;

/// Result of a PCG solve
#[derive(Debug, Clone)]
pub struct CgOutcome {
    pub x: DVector<f64>,
    pub iterations: usize,
    pub residual_norm: f64,
    pub converged: bool,
}

/// PCG for `A x = b` with an absolute residual tolerance
#[derive(Debug, Clone)]
pub struct PreconditionedCg {
    max_iterations: usize,
    tolerance: f64,
}

impl PreconditionedCg {
    pub fn new(max_iterations: usize, tolerance: f64) -> Self {
        PreconditionedCg {
            max_iterations,
            tolerance,
        }
    }

    pub fn solve(
        &self,
        op: &dyn LinearOperator,
        prec: &DiagonalPreconditioner,
        b: &DVector<f64>,
        x0: DVector<f64>,
    ) -> CgOutcome {
        self.solve_with_callback(op, prec, b, x0, |_, _| {})
    }

    /// Same as [`PreconditionedCg::solve`], calling `callback(iteration, x)`
    /// after every update of `x`.
    pub fn solve_with_callback<F>(
        &self,
        op: &dyn LinearOperator,
        prec: &DiagonalPreconditioner,
        b: &DVector<f64>,
        x0: DVector<f64>,
        mut callback: F,
    ) -> CgOutcome
    where
        F: FnMut(usize, &DVector<f64>),
    {
        assert_eq!(b.len(), op.dim(), "right-hand side does not match the operator");
        assert_eq!(x0.len(), op.dim(), "initial guess does not match the operator");
        let mut x = x0;
        let mut r = b - op.matvec(&x);
        let mut rnorm = r.norm();
        if rnorm < self.tolerance {
            return CgOutcome {
                x,
                iterations: 0,
                residual_norm: rnorm,
                converged: true,
            };
        }

        let mut z = prec.apply(&r);
        let mut rz = r.dot(&z);
        if rz <= 0.0 {
            z = r.clone();
            rz = r.dot(&r);
        }
        let mut p = z;
        let mut iterations = 0;
        let mut converged = false;

        for it in 1..=self.max_iterations {
            let ap = op.matvec(&p);
            let curvature = p.dot(&ap);
            if curvature <= 0.0 {
                debug!("    PCG stopped at iteration {}: non-positive curvature {:.3e}", it, curvature);
                break;
            }
            let alpha = rz / curvature;
            x.axpy(alpha, &p, 1.0);
            r.axpy(-alpha, &ap, 1.0);
            rnorm = r.norm();
            iterations = it;
            callback(it, &x);
            debug!("    PCG iteration {:>3}: |r| = {:.6e}", it, rnorm);
            if rnorm < self.tolerance {
                converged = true;
                break;
            }

            let z = prec.apply(&r);
            let rz_new = r.dot(&z);
            if rz_new <= 0.0 {
                debug!("    Restarting PCG: preconditioned residual is not a descent direction");
                p = r.clone();
                rz = r.dot(&r);
                continue;
            }
            let beta = rz_new / rz;
            p = z + p * beta;
            rz = rz_new;
        }

        CgOutcome {
            x,
            iterations,
            residual_norm: rnorm,
            converged,
        }
    }
}
