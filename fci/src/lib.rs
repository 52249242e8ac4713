//! Determinant-based CI kernels for small fragment spaces
//!
//! This crate covers the low-level pieces the LAS optimizer treats as a
//! black box: occupation-string addressing, direct contraction of a CI
//! vector with a Hamiltonian, one- and two-body (transition) density
//! matrices, spin ladder operators and the CI transform that follows an
//! orbital rotation.
//!
//! # Usage
//!
//! ```rust,ignore
//! use fci::{DirectCi, Hamiltonian};
//!
//! let solver = DirectCi::new(2, (1, 1));
//! let ham = Hamiltonian::spin_free(0.0, h1, h2);
//! let sol = solver.kernel(&ham, 1, None, Some(1));
//! let (dm1, dm2) = solver.make_rdm12(&sol.vectors[0]);
//! ```

pub mod backend;
pub mod dense;
pub mod direct;
pub mod ops;
pub mod rotate;
pub mod spin;
pub mod strings;
pub mod tensor;
mod tests;

pub use backend::{ComputeBackend, RayonBackend, SerialBackend};
pub use direct::{CiSolution, DirectCi, Hamiltonian};
pub use strings::{CiSpace, FermionOp, Spin};
pub use tensor::Tensor4;
