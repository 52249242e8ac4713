//! Localized active space state interaction
//!
//! LASSI diagonalizes the Hamiltonian in a basis of fragment product
//! states grouped into rootspaces. The basis is not orthogonal, so the
//! overlap is built alongside and the generalized eigenproblem is solved.
//! [`Lassis`] enumerates charge-hop and spin-flip rootspaces around a LAS
//! reference and relaxes their excited fragments first.

mod eigen;
mod ham2q;
mod hamiltonian;
mod lassis;
mod product_state;
mod rootspace;
mod spaces;
mod tests;

pub use eigen::{asymmetry, LassiSolution};
pub use ham2q::{embedded_fragment_hamiltonian, ham_2q, veff_active, FragmentDensity};
pub use hamiltonian::{build_matrices, pair_statistics, HopClass, OpTerm, ProductOperator};
pub use lassis::{
    ladder_states, lassi_from_las, plan_model_space, solve_model_space, Lassis, LassisOptions, LassiResult,
    ModelSpacePlan, Origin,
};
pub use product_state::{ProductStateResult, ProductStateSolver};
pub use rootspace::{ModelSpace, Rootspace, RootspaceKey};
pub use spaces::{
    charge_hop_products, csf_count, is_valid_fragment, max_smult, single_charge_hops, spin_flip_options,
    spin_flip_patterns, spin_shuffle_assignments, ChargeHop, SpinFlipOptions,
};
