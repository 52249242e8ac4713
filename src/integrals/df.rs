use super::IntegralProvider;
use crate::linalg::{eigh_sorted, Tensor4};
use nalgebra::DMatrix;
use tracing::info;

/// Factorized integrals `(pq|rs) = sum_P B^P_pq B^P_rs`
#[derive(Debug, Clone)]
pub struct DfIntegrals {
    hcore: DMatrix<f64>,
    ovlp: DMatrix<f64>,
    cderi: Vec<DMatrix<f64>>,
    e_nuc: f64,
}

impl DfIntegrals {
    pub fn new(hcore: DMatrix<f64>, cderi: Vec<DMatrix<f64>>, e_nuc: f64) -> Self {
        let n = hcore.nrows();
        for b in &cderi {
            assert_eq!(b.shape(), (n, n), "auxiliary factor does not match the basis size");
        }
        DfIntegrals {
            hcore,
            ovlp: DMatrix::identity(n, n),
            cderi,
            e_nuc,
        }
    }

    /// Factorize a dense ERI tensor through the eigendecomposition of its
    /// `(pq, rs)` supermatrix, keeping eigenvalues above `thresh`.
    ///
    /// The result is exact when the supermatrix is positive semidefinite.
    pub fn from_eri(hcore: DMatrix<f64>, eri: &Tensor4, e_nuc: f64, thresh: f64) -> Self {
        let n = hcore.nrows();
        let npair = n * n;
        let sup = DMatrix::from_fn(npair, npair, |pq, rs| eri[(pq / n, pq % n, rs / n, rs % n)]);
        let (vals, vecs) = eigh_sorted(&sup);
        let cderi: Vec<DMatrix<f64>> = (0..npair)
            .filter(|&k| vals[k] > thresh)
            .map(|k| {
                let scale = vals[k].sqrt();
                DMatrix::from_fn(n, n, |p, q| scale * vecs[(p * n + q, k)])
            })
            .collect();
        info!("Density fitting: {} auxiliary vectors for {} AO pairs", cderi.len(), npair);
        Self::new(hcore, cderi, e_nuc)
    }

    pub fn naux(&self) -> usize {
        self.cderi.len()
    }
}

impl IntegralProvider for DfIntegrals {
    fn kind(&self) -> &'static str {
        "density-fitted"
    }

    fn nao(&self) -> usize {
        self.hcore.nrows()
    }

    fn energy_nuc(&self) -> f64 {
        self.e_nuc
    }

    fn hcore(&self) -> &DMatrix<f64> {
        &self.hcore
    }

    fn ovlp(&self) -> &DMatrix<f64> {
        &self.ovlp
    }

    fn get_jk(&self, dm: &DMatrix<f64>) -> (DMatrix<f64>, DMatrix<f64>) {
        let n = self.nao();
        let mut vj = DMatrix::zeros(n, n);
        let mut vk = DMatrix::zeros(n, n);
        for b in &self.cderi {
            vj += b * b.dot(dm);
            vk += b * dm * b;
        }
        (vj, vk)
    }

    fn ao2mo(&self, c: [&DMatrix<f64>; 4]) -> Tensor4 {
        let left: Vec<DMatrix<f64>> = self.cderi.iter().map(|b| c[0].transpose() * b * c[1]).collect();
        let right: Vec<DMatrix<f64>> = self.cderi.iter().map(|b| c[2].transpose() * b * c[3]).collect();
        let dims = [c[0].ncols(), c[1].ncols(), c[2].ncols(), c[3].ncols()];
        Tensor4::from_fn(dims, |p, q, r, s| {
            left.iter()
                .zip(right.iter())
                .map(|(l, r_)| l[(p, q)] * r_[(r, s)])
                .sum()
        })
    }
}
