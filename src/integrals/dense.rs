use super::IntegralProvider;
use crate::linalg::Tensor4;
use nalgebra::DMatrix;

/// Integrals held as a full `(pq|rs)` tensor
#[derive(Debug, Clone)]
pub struct DenseIntegrals {
    hcore: DMatrix<f64>,
    ovlp: DMatrix<f64>,
    eri: Tensor4,
    e_nuc: f64,
}

impl DenseIntegrals {
    /// Integrals over an orthonormal basis
    pub fn new(hcore: DMatrix<f64>, eri: Tensor4, e_nuc: f64) -> Self {
        let n = hcore.nrows();
        Self::with_overlap(hcore, DMatrix::identity(n, n), eri, e_nuc)
    }

    pub fn with_overlap(hcore: DMatrix<f64>, ovlp: DMatrix<f64>, eri: Tensor4, e_nuc: f64) -> Self {
        let n = hcore.nrows();
        assert_eq!(hcore.ncols(), n);
        assert_eq!(ovlp.shape(), (n, n));
        assert_eq!(eri.dims(), [n; 4], "ERI tensor does not match the basis size");
        DenseIntegrals {
            hcore,
            ovlp,
            eri,
            e_nuc,
        }
    }

    pub fn eri(&self) -> &Tensor4 {
        &self.eri
    }
}

impl IntegralProvider for DenseIntegrals {
    fn kind(&self) -> &'static str {
        "dense"
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
        for p in 0..n {
            for q in 0..n {
                let mut j = 0.0;
                let mut k = 0.0;
                for r in 0..n {
                    for s in 0..n {
                        j += self.eri[(p, q, r, s)] * dm[(r, s)];
                        k += self.eri[(p, r, s, q)] * dm[(r, s)];
                    }
                }
                vj[(p, q)] = j;
                vk[(p, q)] = k;
            }
        }
        (vj, vk)
    }

    fn ao2mo(&self, c: [&DMatrix<f64>; 4]) -> Tensor4 {
        self.eri.transform(c)
    }
}
