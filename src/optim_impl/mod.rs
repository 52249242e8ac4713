//! Matrix-free linear solvers
//!
//! This module contains the linear-operator abstraction used for Newton
//! steps and a preconditioned conjugate-gradient solver that only needs
//! operator-vector products.

mod cg;
mod tests;

pub use cg::{CgOutcome, PreconditionedCg};

use nalgebra::DVector;
use std::str::FromStr;

/// A linear map that can only be applied, never materialized
pub trait LinearOperator {
    fn dim(&self) -> usize;

    fn matvec(&self, x: &DVector<f64>) -> DVector<f64>;

    /// Adjoint action; Hermitian operators can keep the default
    fn rmatvec(&self, x: &DVector<f64>) -> DVector<f64> {
        self.matvec(x)
    }
}

/// Diagonal approximation to an operator, applied as `x / diag`
#[derive(Debug, Clone)]
pub struct DiagonalPreconditioner {
    diag: DVector<f64>,
}

impl DiagonalPreconditioner {
    /// Entries with magnitude below `floor` are replaced by `floor`
    pub fn new(mut diag: DVector<f64>, floor: f64) -> Self {
        diag.iter_mut().for_each(|d| {
            if d.abs() < floor {
                *d = floor;
            }
        });
        DiagonalPreconditioner { diag }
    }

    pub fn diagonal(&self) -> &DVector<f64> {
        &self.diag
    }

    pub fn apply(&self, r: &DVector<f64>) -> DVector<f64> {
        r.component_div(&self.diag)
    }
}

/// Linear solver choice for the Newton step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinearSolverKind {
    ConjugateGradient,
    /// Single preconditioned step, `x = M^-1 b`
    Diagonal,
}

impl FromStr for LinearSolverKind {
    type Err = color_eyre::eyre::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cg" | "pcg" => Ok(Self::ConjugateGradient),
            "diag" | "diagonal" => Ok(Self::Diagonal),
            _ => Err(color_eyre::eyre::eyre!("Unknown linear solver: {}", s)),
        }
    }
}
