//! One- and two-electron integral providers
//!
//! The optimizer never inspects how two-electron integrals are stored. It
//! asks a provider for Coulomb/exchange builds and for transformed integral
//! slices, so dense and density-fitted backends are interchangeable.

mod dense;
mod df;
mod lattice;

pub use dense::DenseIntegrals;
pub use df::DfIntegrals;
pub use lattice::LatticeModel;

use crate::linalg::Tensor4;
use nalgebra::DMatrix;
use std::fmt;

pub trait IntegralProvider: Send + Sync + fmt::Debug {
    /// Short label for logging
    fn kind(&self) -> &'static str;

    fn nao(&self) -> usize;

    fn energy_nuc(&self) -> f64;

    fn hcore(&self) -> &DMatrix<f64>;

    fn ovlp(&self) -> &DMatrix<f64>;

    /// `J_pq = sum_rs (pq|rs) D_rs` and `K_pq = sum_rs (pr|sq) D_rs`
    fn get_jk(&self, dm: &DMatrix<f64>) -> (DMatrix<f64>, DMatrix<f64>);

    /// `(pq|rs)` with the four indices carried by `c[0]..c[3]`
    fn ao2mo(&self, c: [&DMatrix<f64>; 4]) -> Tensor4;

    /// Spin-resolved mean-field potential `V^s = J[Da + Db] - K[Ds]`
    fn get_veff(&self, dm1s: &[DMatrix<f64>; 2]) -> [DMatrix<f64>; 2] {
        let (ja, ka) = self.get_jk(&dm1s[0]);
        let (jb, kb) = self.get_jk(&dm1s[1]);
        let j = ja + jb;
        [&j - ka, j - kb]
    }
}

/// Core Hamiltonian in the MO basis
pub fn hcore_mo(provider: &dyn IntegralProvider, mo: &DMatrix<f64>) -> DMatrix<f64> {
    mo.transpose() * provider.hcore() * mo
}

/// Mean-field potential in the MO basis for MO-basis spin densities
pub fn veff_mo(
    provider: &dyn IntegralProvider,
    mo: &DMatrix<f64>,
    dm1s: &[DMatrix<f64>; 2],
) -> [DMatrix<f64>; 2] {
    let ao = [
        mo * &dm1s[0] * mo.transpose(),
        mo * &dm1s[1] * mo.transpose(),
    ];
    let [va, vb] = provider.get_veff(&ao);
    [mo.transpose() * va * mo, mo.transpose() * vb * mo]
}
