//! Localized active space self-consistent field
//!
//! The active space is split into fragments, each with its own CI vector.
//! Orbitals and CI vectors are optimized together by a second-order
//! macro/micro scheme:
//!
//! - [`UnitaryGroupGenerators`] maps between the flat parameter vector and
//!   orbital generators plus CI updates.
//! - [`LasHessian`] supplies the gradient, a matrix-free Hessian and a
//!   diagonal preconditioner at one point.
//! - [`LasDriver`] runs the CI cycle and damped Newton steps, then
//!   canonicalizes the converged orbitals.

mod canonicalize;
mod context;
mod driver;
mod grad_check;
mod hessian;
mod problem;
mod tests;
mod ugg;

pub use canonicalize::{canonicalize, Canonicalized};
pub use context::{
    assemble_fragment_hamiltonian, core_dm1s, embed_fragment, fragment_cumulant, mean_field_2rdm,
    LasContext, MoIntegrals, RootState,
};
pub use driver::LasDriver;
pub use grad_check::{check_gradient, GradientCheck};
pub use hessian::LasHessian;
pub use problem::{
    FragmentPartition, LasKeyframe, LasOptions, LasProblem, LasResult, OrbitalClass, RootspaceSpec,
    RotationSpace,
};
pub use ugg::{SymmetryMask, UnitaryGroupGenerators};
