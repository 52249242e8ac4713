//! Pariser-Parr-Pople style lattice Hamiltonians
//!
//! Sites form an orthonormal basis. Two-electron integrals follow the
//! zero-differential-overlap form `(pq|rs) = delta_pq delta_rs gamma_pr`
//! with `gamma_pr = U exp(-|p - r| / xi)`. That kernel is positive definite,
//! so its eigendecomposition gives an exact density-fitted factorization.

use super::{DenseIntegrals, DfIntegrals};
use crate::linalg::{eigh_sorted, Tensor4};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatticeModel {
    pub onsite: Vec<f64>,
    /// `(p, q, t)` adds `-t` to `h[p][q]` and `h[q][p]`
    pub hoppings: Vec<(usize, usize, f64)>,
    pub hubbard_u: f64,
    pub decay_length: f64,
    #[serde(default)]
    pub e_nuc: f64,
}

impl LatticeModel {
    /// A chain of `ndimers` strongly bound two-site units
    pub fn dimer_chain(ndimers: usize, t_intra: f64, t_inter: f64, hubbard_u: f64) -> Self {
        let nsites = 2 * ndimers;
        let mut hoppings = Vec::new();
        for k in 0..ndimers {
            hoppings.push((2 * k, 2 * k + 1, t_intra));
            if k + 1 < ndimers {
                hoppings.push((2 * k + 1, 2 * k + 2, t_inter));
            }
        }
        LatticeModel {
            onsite: vec![0.0; nsites],
            hoppings,
            hubbard_u,
            decay_length: 2.0,
            e_nuc: 0.0,
        }
    }

    /// The standard test chain: `t_intra = 1`, `t_inter = 0.15`, `U = 2`, embedded
    pub fn embedded_dimer_chain(ndimers: usize) -> Self {
        Self::dimer_chain(ndimers, 1.0, 0.15, 2.0).embedded()
    }

    /// Add one deep site in front and one high site behind, weakly coupled
    /// to the ends, giving an inactive orbital and an external orbital.
    pub fn embedded(&self) -> Self {
        let nsites = self.nsites() + 2;
        let mut onsite = Vec::with_capacity(nsites);
        onsite.push(-3.0);
        onsite.extend_from_slice(&self.onsite);
        onsite.push(3.0);
        let mut hoppings: Vec<(usize, usize, f64)> = self
            .hoppings
            .iter()
            .map(|&(p, q, t)| (p + 1, q + 1, t))
            .collect();
        hoppings.push((0, 1, 0.2));
        hoppings.push((nsites - 2, nsites - 1, 0.2));
        LatticeModel {
            onsite,
            hoppings,
            hubbard_u: self.hubbard_u,
            decay_length: self.decay_length,
            e_nuc: self.e_nuc,
        }
    }

    pub fn nsites(&self) -> usize {
        self.onsite.len()
    }

    pub fn hcore(&self) -> DMatrix<f64> {
        let n = self.nsites();
        let mut h = DMatrix::from_diagonal(&nalgebra::DVector::from_column_slice(&self.onsite));
        for &(p, q, t) in &self.hoppings {
            assert!(p < n && q < n && p != q, "bad hopping ({}, {})", p, q);
            h[(p, q)] -= t;
            h[(q, p)] -= t;
        }
        h
    }

    /// `gamma_pr = U exp(-|p - r| / xi)`
    pub fn coulomb_kernel(&self) -> DMatrix<f64> {
        let n = self.nsites();
        DMatrix::from_fn(n, n, |p, r| {
            let d = (p as f64 - r as f64).abs();
            self.hubbard_u * (-d / self.decay_length).exp()
        })
    }

    pub fn eri(&self) -> Tensor4 {
        let gamma = self.coulomb_kernel();
        let n = self.nsites();
        let mut eri = Tensor4::cubic(n);
        for p in 0..n {
            for r in 0..n {
                eri[(p, p, r, r)] = gamma[(p, r)];
            }
        }
        eri
    }

    pub fn dense(&self) -> DenseIntegrals {
        DenseIntegrals::new(self.hcore(), self.eri(), self.e_nuc)
    }

    pub fn density_fitted(&self) -> DfIntegrals {
        let n = self.nsites();
        let (vals, vecs) = eigh_sorted(&self.coulomb_kernel());
        let cderi = (0..n)
            .filter(|&k| vals[k] > 1e-12)
            .map(|k| {
                let scale = vals[k].sqrt();
                DMatrix::from_fn(n, n, |p, q| if p == q { scale * vecs[(p, k)] } else { 0.0 })
            })
            .collect();
        DfIntegrals::new(self.hcore(), cderi, self.e_nuc)
    }
}
