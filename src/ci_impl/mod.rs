//! Local CI solver adapter
//!
//! Every fragment of every rootspace owns one local solver. The optimizer
//! only talks to the [`LocalCiSolver`] trait, so any solver that provides
//! energies, sigma vectors, densities and the spin/orbital transforms can
//! be substituted per fragment.
//!
//! # Usage
//!
//! ```rust,ignore
//! use lasscf::ci_impl::{FragmentSolver, LocalCiSolver};
//!
//! let solver = FragmentSolver::new(2, (1, 1), 1);
//! let sol = solver.kernel(&ham, 1, None);
//! let (e, grad) = solver.gradient(&ham, &sol.vectors[0]);
//! ```

mod solver;
mod tests;

pub use solver::{FragmentSolver, LocalCiSolver};
