//! Generalized eigenproblem over the non-orthogonal product-state basis

use crate::linalg::general_eigh;
use nalgebra::{DMatrix, DVector};
use tracing::info;

#[derive(Debug, Clone)]
pub struct LassiSolution {
    pub energies: DVector<f64>,
    /// Eigenvectors in the product-state basis, `S`-orthonormal
    pub si: DMatrix<f64>,
    /// `<S^2>` of each eigenvector
    pub s2: Vec<f64>,
}

impl LassiSolution {
    /// Symmetrize `h`, `s` and `s2` and solve `H c = E S c`. Directions with
    /// overlap eigenvalues below `lindep` are dropped.
    pub fn solve(h: &DMatrix<f64>, s: &DMatrix<f64>, s2: &DMatrix<f64>, lindep: f64) -> Self {
        let (energies, si) = general_eigh(h, s, lindep);
        let s2 = (s2 + s2.transpose()) * 0.5;
        let s2 = (0..si.ncols())
            .map(|k| {
                let c = si.column(k);
                c.dot(&(&s2 * c))
            })
            .collect();
        LassiSolution { energies, si, s2 }
    }

    pub fn nroots(&self) -> usize {
        self.energies.len()
    }

    pub fn ground_energy(&self) -> f64 {
        self.energies[0]
    }

    /// `2S+1` recovered from `<S^2>`
    pub fn smult(&self, k: usize) -> f64 {
        (4.0 * self.s2[k] + 1.0).max(0.0).sqrt()
    }

    /// Mulliken-like weight of each rootspace in eigenvector `k`
    pub fn rootspace_weights(&self, s: &DMatrix<f64>, offsets: &[usize], k: usize) -> Vec<f64> {
        let c = self.si.column(k).into_owned();
        let sc = s * &c;
        offsets
            .windows(2)
            .map(|w| (w[0]..w[1]).map(|i| c[i] * sc[i]).sum())
            .collect()
    }

    pub fn log(&self, nprint: usize) {
        info!("  {:>5} {:>20} {:>10} {:>8}", "root", "E / au", "<S^2>", "2S+1");
        for k in 0..self.nroots().min(nprint) {
            info!(
                "  {:>5} {:>20.10} {:>10.6} {:>8.4}",
                k,
                self.energies[k],
                self.s2[k],
                self.smult(k)
            );
        }
    }
}

/// Largest asymmetry `|M - M^T|`
pub fn asymmetry(m: &DMatrix<f64>) -> f64 {
    (m - m.transpose()).abs().max()
}
