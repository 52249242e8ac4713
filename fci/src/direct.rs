//! Direct determinant CI for one small orbital space
//!
//! The Hamiltonian carries a spin-resolved one-body operator and a
//! spin-free two-body operator:
//!
//! `H = h0 + sum_{pq,s} h^s_pq E^s_pq + 1/2 sum_{pqrs} (pq|rs) a+_p a+_r a_s a_q`

use crate::backend::{ComputeBackend, SerialBackend};
use crate::dense::eigh_sorted;
use crate::ops::{accumulate_excitation, apply_excitation, apply_excitation_spinfree};
use crate::spin::{apply_s2, spin_square};
use crate::strings::{occupied, CiSpace, Spin};
use crate::tensor::Tensor4;
use nalgebra::{DMatrix, DVector};
use std::sync::Arc;
use tracing::debug;

/// Fragment-local Hamiltonian
#[derive(Debug, Clone)]
pub struct Hamiltonian {
    pub h0: f64,
    /// One-body operator per spin, `[alpha, beta]`
    pub h1: [DMatrix<f64>; 2],
    /// Two-electron integrals `(pq|rs)`
    pub h2: Tensor4,
}

impl Hamiltonian {
    pub fn new(h0: f64, h1: [DMatrix<f64>; 2], h2: Tensor4) -> Self {
        let n = h1[0].nrows();
        assert_eq!(h1[1].nrows(), n);
        assert_eq!(h2.dims(), [n; 4], "two-body operator does not match the one-body size");
        Hamiltonian { h0, h1, h2 }
    }

    pub fn spin_free(h0: f64, h1: DMatrix<f64>, h2: Tensor4) -> Self {
        Self::new(h0, [h1.clone(), h1], h2)
    }

    pub fn norb(&self) -> usize {
        self.h1[0].nrows()
    }
}

/// Eigenpairs returned by [`DirectCi::kernel`]
#[derive(Debug, Clone)]
pub struct CiSolution {
    pub energies: Vec<f64>,
    pub vectors: Vec<DVector<f64>>,
}

#[derive(Debug, Clone)]
pub struct DirectCi {
    space: CiSpace,
    backend: Arc<dyn ComputeBackend>,
}

impl DirectCi {
    pub fn new(norb: usize, nelec: (usize, usize)) -> Self {
        DirectCi {
            space: CiSpace::new(norb, nelec),
            backend: Arc::new(SerialBackend),
        }
    }

    pub fn with_backend(mut self, backend: Arc<dyn ComputeBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn space(&self) -> &CiSpace {
        &self.space
    }

    pub fn norb(&self) -> usize {
        self.space.norb()
    }

    pub fn nelec(&self) -> (usize, usize) {
        self.space.nelec()
    }

    pub fn dim(&self) -> usize {
        self.space.dim()
    }

    fn check_vector(&self, c: &DVector<f64>) {
        assert_eq!(
            c.len(),
            self.dim(),
            "CI vector length {} does not match {} determinants",
            c.len(),
            self.dim()
        );
    }

    /// `sum_s sum_pq h^s_pq E^s_pq c`
    pub fn contract_1e(&self, h1: &[DMatrix<f64>; 2], c: &DVector<f64>) -> DVector<f64> {
        self.check_vector(c);
        let n = self.norb();
        let mut out = DVector::zeros(self.dim());
        for spin in Spin::BOTH {
            let h = &h1[spin.index()];
            for p in 0..n {
                for q in 0..n {
                    accumulate_excitation(&self.space, c, p, q, spin, h[(p, q)], &mut out);
                }
            }
        }
        out
    }

    fn excitation_table(&self, c: &DVector<f64>) -> Vec<DVector<f64>> {
        let n = self.norb();
        (0..n * n)
            .map(|rs| apply_excitation_spinfree(&self.space, c, rs / n, rs % n))
            .collect()
    }

    /// `sum_pqrs g_pqrs E_pq E_rs c`, with `fac` applied to the result
    fn contract_pair(&self, g: &Tensor4, c: &DVector<f64>, fac: f64) -> DVector<f64> {
        let n = self.norb();
        let t = self.excitation_table(c);
        let mut out = DVector::zeros(self.dim());
        for p in 0..n {
            for q in 0..n {
                let mut w = DVector::zeros(self.dim());
                for r in 0..n {
                    for s in 0..n {
                        let v = g[(p, q, r, s)];
                        if v != 0.0 {
                            w.axpy(v, &t[r * n + s], 1.0);
                        }
                    }
                }
                accumulate_excitation(&self.space, &w, p, q, Spin::Alpha, fac, &mut out);
                accumulate_excitation(&self.space, &w, p, q, Spin::Beta, fac, &mut out);
            }
        }
        out
    }

    fn exchange_trace(h2: &Tensor4) -> DMatrix<f64> {
        let n = h2.dims()[0];
        DMatrix::from_fn(n, n, |p, q| (0..n).map(|r| h2[(p, r, r, q)]).sum())
    }

    /// `H c`
    pub fn contract_h(&self, ham: &Hamiltonian, c: &DVector<f64>) -> DVector<f64> {
        self.check_vector(c);
        assert_eq!(ham.norb(), self.norb());
        let k = Self::exchange_trace(&ham.h2) * 0.5;
        let h1 = [&ham.h1[0] - &k, &ham.h1[1] - &k];
        let mut sigma = self.contract_1e(&h1, c);
        sigma.axpy(ham.h0, c, 1.0);
        sigma += self.contract_pair(&ham.h2, c, 0.5);
        sigma
    }

    /// Fold a spin-free one-body operator into the two-body operator so that
    /// [`DirectCi::contract_2e`] with `fac = 0.5` reproduces `H c` at this
    /// electron count.
    pub fn absorb_h1e(&self, h1: &DMatrix<f64>, h2: &Tensor4, fac: f64) -> Tensor4 {
        let n = self.norb();
        let (na, nb) = self.nelec();
        let f1e = (h1 - Self::exchange_trace(h2) * 0.5) * (1.0 / ((na + nb) as f64 + 1e-100));
        let mut out = h2.clone();
        for k in 0..n {
            for p in 0..n {
                for q in 0..n {
                    out[(k, k, p, q)] += f1e[(p, q)];
                    out[(p, q, k, k)] += f1e[(p, q)];
                }
            }
        }
        out.scale(fac);
        out
    }

    /// `sum_pqrs h2eff_pqrs E_pq E_rs c`
    pub fn contract_2e(&self, h2eff: &Tensor4, c: &DVector<f64>) -> DVector<f64> {
        self.check_vector(c);
        self.contract_pair(h2eff, c, 1.0)
    }

    /// Diagonal of the Hamiltonian in the determinant basis
    pub fn make_hdiag(&self, ham: &Hamiltonian) -> DVector<f64> {
        let n = self.norb();
        let nb = self.space.beta.len();
        DVector::from_fn(self.dim(), |idx, _| {
            let sa = self.space.alpha.string(idx / nb);
            let sb = self.space.beta.string(idx % nb);
            let occ = |s: u64, p: usize| if occupied(s, p) { 1.0 } else { 0.0 };
            let mut e = ham.h0;
            for p in 0..n {
                let (ap, bp) = (occ(sa, p), occ(sb, p));
                e += ham.h1[0][(p, p)] * ap + ham.h1[1][(p, p)] * bp;
                for q in 0..n {
                    let (aq, bq) = (occ(sa, q), occ(sb, q));
                    e += 0.5 * (ap + bp) * (aq + bq) * ham.h2[(p, p, q, q)];
                    e -= 0.5 * (ap * aq + bp * bq) * ham.h2[(p, q, q, p)];
                }
            }
            e
        })
    }

    pub fn energy(&self, ham: &Hamiltonian, c: &DVector<f64>) -> f64 {
        c.dot(&self.contract_h(ham, c)) / c.dot(c)
    }

    /// Dense Hamiltonian matrix, one column per determinant
    pub fn hamiltonian_matrix(&self, ham: &Hamiltonian) -> DMatrix<f64> {
        let dim = self.dim();
        let column = |j: usize| {
            let mut e = DVector::zeros(dim);
            e[j] = 1.0;
            self.contract_h(ham, &e)
        };
        let h = self.backend.build_columns(dim, dim, &column);
        (&h + h.transpose()) * 0.5
    }

    fn s2_matrix(&self) -> DMatrix<f64> {
        let dim = self.dim();
        let column = |j: usize| {
            let mut e = DVector::zeros(dim);
            e[j] = 1.0;
            apply_s2(&self.space, &e)
        };
        self.backend.build_columns(dim, dim, &column)
    }

    /// Lowest `nroots` eigenstates, optionally restricted to multiplicity `smult`.
    ///
    /// Each returned vector is phase-aligned with the matching guess in `ci0`.
    pub fn kernel(
        &self,
        ham: &Hamiltonian,
        nroots: usize,
        ci0: Option<&[DVector<f64>]>,
        smult: Option<usize>,
    ) -> CiSolution {
        let dim = self.dim();
        assert!(dim > 0, "empty determinant space for {:?}", self.nelec());
        let h = self.hamiltonian_matrix(ham);
        let basis = match smult {
            Some(m) => {
                let target = ((m * m) as f64 - 1.0) / 4.0;
                let (vals, vecs) = eigh_sorted(&self.s2_matrix());
                let keep: Vec<usize> = (0..dim).filter(|&i| (vals[i] - target).abs() < 1e-6).collect();
                assert!(
                    !keep.is_empty(),
                    "no states of multiplicity {} with nelec {:?} in {} orbitals",
                    m,
                    self.nelec(),
                    self.norb()
                );
                DMatrix::from_fn(dim, keep.len(), |i, k| vecs[(i, keep[k])])
            }
            None => DMatrix::identity(dim, dim),
        };
        let hsub = basis.transpose() * &h * &basis;
        let (evals, evecs) = eigh_sorted(&hsub);
        let nroots = nroots.min(evals.len());
        debug!(
            "direct CI: {} determinants, {} states in target spin space, {} roots",
            dim,
            basis.ncols(),
            nroots
        );

        let mut energies = Vec::with_capacity(nroots);
        let mut vectors = Vec::with_capacity(nroots);
        for k in 0..nroots {
            let mut v = &basis * evecs.column(k);
            v /= v.norm();
            if let Some(guess) = ci0.and_then(|g| g.get(k)) {
                if guess.len() == dim && v.dot(guess) < 0.0 {
                    v = -v;
                }
            }
            energies.push(evals[k]);
            vectors.push(v);
        }
        CiSolution { energies, vectors }
    }

    /// Spin-resolved one-body density `[D^alpha, D^beta]`
    pub fn make_rdm1s(&self, c: &DVector<f64>) -> [DMatrix<f64>; 2] {
        self.trans_rdm1s(c, c)
    }

    /// Spin-resolved transition density `D^s_pq = <bra| a+_ps a_qs |ket>`
    pub fn trans_rdm1s(&self, bra: &DVector<f64>, ket: &DVector<f64>) -> [DMatrix<f64>; 2] {
        self.check_vector(bra);
        self.check_vector(ket);
        let n = self.norb();
        let dm = |spin: Spin| {
            DMatrix::from_fn(n, n, |p, q| bra.dot(&apply_excitation(&self.space, ket, p, q, spin)))
        };
        [dm(Spin::Alpha), dm(Spin::Beta)]
    }

    /// Spin-summed one- and two-body densities,
    /// `G_pqrs = <E_pq E_rs> - delta_qr <E_ps>`
    pub fn make_rdm12(&self, c: &DVector<f64>) -> (DMatrix<f64>, Tensor4) {
        self.trans_rdm12(c, c)
    }

    pub fn trans_rdm12(&self, bra: &DVector<f64>, ket: &DVector<f64>) -> (DMatrix<f64>, Tensor4) {
        self.check_vector(bra);
        self.check_vector(ket);
        let n = self.norb();
        let tb = self.excitation_table(bra);
        let tk = self.excitation_table(ket);
        let dm1 = DMatrix::from_fn(n, n, |p, q| bra.dot(&tk[p * n + q]));
        let dm2 = Tensor4::from_fn([n; 4], |p, q, r, s| {
            let mut v = tb[q * n + p].dot(&tk[r * n + s]);
            if q == r {
                v -= dm1[(p, s)];
            }
            v
        });
        (dm1, dm2)
    }

    /// Returns `(<S^2>, 2S+1)`
    pub fn spin_square(&self, c: &DVector<f64>) -> (f64, f64) {
        self.check_vector(c);
        spin_square(&self.space, c)
    }
}
