//! Fragment CI solver built on the determinant kernels

extern crate nalgebra as na;

use crate::linalg::Tensor4;
use fci::rotate::transform_ci_for_orbital_rotation;
use fci::spin::{contract_sdown, contract_sup};
use fci::{CiSolution, ComputeBackend, DirectCi, Hamiltonian, SerialBackend};
use na::{DMatrix, DVector};
use std::fmt;
use std::sync::Arc;

pub trait LocalCiSolver: Send + Sync + fmt::Debug {
    fn norb(&self) -> usize;

    fn nelec(&self) -> (usize, usize);

    /// Target spin multiplicity `2S + 1`
    fn smult(&self) -> usize;

    /// Length of a CI vector
    fn nconf(&self) -> usize;

    /// Lowest `nroots` states of the target multiplicity
    fn kernel(&self, ham: &Hamiltonian, nroots: usize, ci0: Option<&[DVector<f64>]>) -> CiSolution;

    fn contract_h(&self, ham: &Hamiltonian, c: &DVector<f64>) -> DVector<f64>;

    fn absorb_h1e(&self, h1: &DMatrix<f64>, h2: &Tensor4, fac: f64) -> Tensor4;

    fn contract_2e(&self, h2eff: &Tensor4, c: &DVector<f64>) -> DVector<f64>;

    fn make_hdiag(&self, ham: &Hamiltonian) -> DVector<f64>;

    fn make_rdm1s(&self, c: &DVector<f64>) -> [DMatrix<f64>; 2];

    fn make_rdm12(&self, c: &DVector<f64>) -> (DMatrix<f64>, Tensor4);

    fn trans_rdm1s(&self, bra: &DVector<f64>, ket: &DVector<f64>) -> [DMatrix<f64>; 2];

    fn trans_rdm12(&self, bra: &DVector<f64>, ket: &DVector<f64>) -> (DMatrix<f64>, Tensor4);

    /// `(<S^2>, 2S+1)`
    fn spin_square(&self, c: &DVector<f64>) -> (f64, f64);

    /// Apply `S+` (`raise = true`) or `S-`; returns the new electron count
    /// and vector, or `None` when the target sector is empty.
    fn spin_ladder(&self, c: &DVector<f64>, raise: bool) -> Option<((usize, usize), DVector<f64>)>;

    /// Re-express `c` in the rotated orbitals `phi u`
    fn rotate_orbitals(&self, c: &DVector<f64>, u: &DMatrix<f64>) -> DVector<f64>;

    fn energy(&self, ham: &Hamiltonian, c: &DVector<f64>) -> f64 {
        c.dot(&self.contract_h(ham, c))
    }

    /// Energy and `2 (H - E) c` for a normalized `c`
    fn gradient(&self, ham: &Hamiltonian, c: &DVector<f64>) -> (f64, DVector<f64>) {
        let hc = self.contract_h(ham, c);
        let e = c.dot(&hc);
        (e, (hc - c * e) * 2.0)
    }
}

/// Determinant-space solver for one fragment at fixed `(neleca, nelecb)`
#[derive(Clone)]
pub struct FragmentSolver {
    ci: DirectCi,
    smult: usize,
}

impl fmt::Debug for FragmentSolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FragmentSolver({}o, {:?}e, 2S+1={})",
            self.ci.norb(),
            self.ci.nelec(),
            self.smult
        )
    }
}

impl FragmentSolver {
    pub fn new(norb: usize, nelec: (usize, usize), smult: usize) -> Self {
        Self::with_backend(norb, nelec, smult, Arc::new(SerialBackend))
    }

    pub fn with_backend(
        norb: usize,
        nelec: (usize, usize),
        smult: usize,
        backend: Arc<dyn ComputeBackend>,
    ) -> Self {
        let twos = nelec.0.abs_diff(nelec.1);
        assert!(
            smult >= twos + 1 && (smult - 1 - twos) % 2 == 0,
            "multiplicity {} is incompatible with nelec {:?}",
            smult,
            nelec
        );
        FragmentSolver {
            ci: DirectCi::new(norb, nelec).with_backend(backend),
            smult,
        }
    }

    pub fn shared(self) -> Arc<dyn LocalCiSolver> {
        Arc::new(self)
    }
}

impl LocalCiSolver for FragmentSolver {
    fn norb(&self) -> usize {
        self.ci.norb()
    }

    fn nelec(&self) -> (usize, usize) {
        self.ci.nelec()
    }

    fn smult(&self) -> usize {
        self.smult
    }

    fn nconf(&self) -> usize {
        self.ci.dim()
    }

    fn kernel(&self, ham: &Hamiltonian, nroots: usize, ci0: Option<&[DVector<f64>]>) -> CiSolution {
        self.ci.kernel(ham, nroots, ci0, Some(self.smult))
    }

    fn contract_h(&self, ham: &Hamiltonian, c: &DVector<f64>) -> DVector<f64> {
        self.ci.contract_h(ham, c)
    }

    fn absorb_h1e(&self, h1: &DMatrix<f64>, h2: &Tensor4, fac: f64) -> Tensor4 {
        self.ci.absorb_h1e(h1, h2, fac)
    }

    fn contract_2e(&self, h2eff: &Tensor4, c: &DVector<f64>) -> DVector<f64> {
        self.ci.contract_2e(h2eff, c)
    }

    fn make_hdiag(&self, ham: &Hamiltonian) -> DVector<f64> {
        self.ci.make_hdiag(ham)
    }

    fn make_rdm1s(&self, c: &DVector<f64>) -> [DMatrix<f64>; 2] {
        self.ci.make_rdm1s(c)
    }

    fn make_rdm12(&self, c: &DVector<f64>) -> (DMatrix<f64>, Tensor4) {
        self.ci.make_rdm12(c)
    }

    fn trans_rdm1s(&self, bra: &DVector<f64>, ket: &DVector<f64>) -> [DMatrix<f64>; 2] {
        self.ci.trans_rdm1s(bra, ket)
    }

    fn trans_rdm12(&self, bra: &DVector<f64>, ket: &DVector<f64>) -> (DMatrix<f64>, Tensor4) {
        self.ci.trans_rdm12(bra, ket)
    }

    fn spin_square(&self, c: &DVector<f64>) -> (f64, f64) {
        self.ci.spin_square(c)
    }

    fn spin_ladder(&self, c: &DVector<f64>, raise: bool) -> Option<((usize, usize), DVector<f64>)> {
        let result = if raise {
            contract_sup(self.ci.space(), c)
        } else {
            contract_sdown(self.ci.space(), c)
        };
        result.map(|(space, v)| (space.nelec(), v))
    }

    fn rotate_orbitals(&self, c: &DVector<f64>, u: &DMatrix<f64>) -> DVector<f64> {
        transform_ci_for_orbital_rotation(self.ci.space(), c, u)
    }
}
