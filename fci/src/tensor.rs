//! Dense four-index tensor stored row-major
//!
//! Two-electron integrals use chemist's notation, `t[(p, q, r, s)] = (pq|rs)`,
//! and two-body density matrices use the matching index order.

use nalgebra::DMatrix;
use std::ops::{Index, IndexMut, Range};

#[derive(Clone, Debug, PartialEq)]
pub struct Tensor4 {
    dims: [usize; 4],
    data: Vec<f64>,
}

impl Tensor4 {
    pub fn zeros(dims: [usize; 4]) -> Self {
        Tensor4 {
            dims,
            data: vec![0.0; dims.iter().product()],
        }
    }

    /// Square tensor with every dimension equal to `n`
    pub fn cubic(n: usize) -> Self {
        Self::zeros([n; 4])
    }

    pub fn from_fn<F>(dims: [usize; 4], f: F) -> Self
    where
        F: Fn(usize, usize, usize, usize) -> f64,
    {
        let mut t = Self::zeros(dims);
        for p in 0..dims[0] {
            for q in 0..dims[1] {
                for r in 0..dims[2] {
                    for s in 0..dims[3] {
                        t[(p, q, r, s)] = f(p, q, r, s);
                    }
                }
            }
        }
        t
    }

    pub fn dims(&self) -> [usize; 4] {
        self.dims
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    #[inline]
    fn offset(&self, p: usize, q: usize, r: usize, s: usize) -> usize {
        debug_assert!(p < self.dims[0] && q < self.dims[1] && r < self.dims[2] && s < self.dims[3]);
        ((p * self.dims[1] + q) * self.dims[2] + r) * self.dims[3] + s
    }

    /// Copy out a rectangular sub-block
    pub fn block(&self, ranges: [Range<usize>; 4]) -> Tensor4 {
        let dims = [
            ranges[0].len(),
            ranges[1].len(),
            ranges[2].len(),
            ranges[3].len(),
        ];
        let [o0, o1, o2, o3] = [
            ranges[0].start,
            ranges[1].start,
            ranges[2].start,
            ranges[3].start,
        ];
        Tensor4::from_fn(dims, |p, q, r, s| self[(p + o0, q + o1, r + o2, s + o3)])
    }

    /// Write `other` into this tensor starting at `offsets`
    pub fn set_block(&mut self, offsets: [usize; 4], other: &Tensor4) {
        let d = other.dims;
        for p in 0..d[0] {
            for q in 0..d[1] {
                for r in 0..d[2] {
                    for s in 0..d[3] {
                        self[(p + offsets[0], q + offsets[1], r + offsets[2], s + offsets[3])] =
                            other[(p, q, r, s)];
                    }
                }
            }
        }
    }

    pub fn scale(&mut self, alpha: f64) {
        self.data.iter_mut().for_each(|x| *x *= alpha);
    }

    /// `self += alpha * other`
    pub fn axpy(&mut self, alpha: f64, other: &Tensor4) {
        assert_eq!(self.dims, other.dims, "tensor shape mismatch in axpy");
        self.data
            .iter_mut()
            .zip(other.data.iter())
            .for_each(|(x, y)| *x += alpha * y);
    }

    pub fn dot(&self, other: &Tensor4) -> f64 {
        assert_eq!(self.dims, other.dims, "tensor shape mismatch in dot");
        self.data.iter().zip(other.data.iter()).map(|(x, y)| x * y).sum()
    }

    pub fn norm(&self) -> f64 {
        self.dot(self).sqrt()
    }

    /// Average over the eight permutations that leave real chemist-notation
    /// integrals invariant.
    pub fn symmetrize_8fold(&self) -> Tensor4 {
        let n = self.dims[0];
        assert!(
            self.dims.iter().all(|&d| d == n),
            "8-fold symmetrization needs a cubic tensor"
        );
        Tensor4::from_fn(self.dims, |p, q, r, s| {
            (self[(p, q, r, s)]
                + self[(q, p, r, s)]
                + self[(p, q, s, r)]
                + self[(q, p, s, r)]
                + self[(r, s, p, q)]
                + self[(s, r, p, q)]
                + self[(r, s, q, p)]
                + self[(s, r, q, p)])
                / 8.0
        })
    }

    /// Transform one index: `out[.., a, ..] = sum_i c[(i, a)] * self[.., i, ..]`
    pub fn transform_axis(&self, axis: usize, c: &DMatrix<f64>) -> Tensor4 {
        assert!(axis < 4);
        assert_eq!(c.nrows(), self.dims[axis], "coefficient rows must match axis length");
        let mut dims = self.dims;
        dims[axis] = c.ncols();
        let mut out = Tensor4::zeros(dims);
        let [n0, n1, n2, n3] = self.dims;
        for p in 0..n0 {
            for q in 0..n1 {
                for r in 0..n2 {
                    for s in 0..n3 {
                        let v = self[(p, q, r, s)];
                        if v == 0.0 {
                            continue;
                        }
                        let idx = [p, q, r, s];
                        for a in 0..c.ncols() {
                            let mut o = idx;
                            o[axis] = a;
                            out[(o[0], o[1], o[2], o[3])] += c[(idx[axis], a)] * v;
                        }
                    }
                }
            }
        }
        out
    }

    /// Congruent transformation of all four indices, applied as four
    /// sequential one-index contractions.
    pub fn transform(&self, c: [&DMatrix<f64>; 4]) -> Tensor4 {
        self.transform_axis(0, c[0])
            .transform_axis(1, c[1])
            .transform_axis(2, c[2])
            .transform_axis(3, c[3])
    }

    /// `m[(p, u)] = sum_{vwx} self[(p, v, w, x)] * other[(u, v, w, x)]`
    pub fn contract_last3(&self, other: &Tensor4) -> DMatrix<f64> {
        assert_eq!(self.dims[1..], other.dims[1..], "inner dimensions must agree");
        let inner = self.dims[1] * self.dims[2] * self.dims[3];
        let mut m = DMatrix::zeros(self.dims[0], other.dims[0]);
        for p in 0..self.dims[0] {
            let a = &self.data[p * inner..(p + 1) * inner];
            for u in 0..other.dims[0] {
                let b = &other.data[u * inner..(u + 1) * inner];
                m[(p, u)] = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
            }
        }
        m
    }
}

impl Index<(usize, usize, usize, usize)> for Tensor4 {
    type Output = f64;

    fn index(&self, (p, q, r, s): (usize, usize, usize, usize)) -> &f64 {
        &self.data[self.offset(p, q, r, s)]
    }
}

impl IndexMut<(usize, usize, usize, usize)> for Tensor4 {
    fn index_mut(&mut self, (p, q, r, s): (usize, usize, usize, usize)) -> &mut f64 {
        let o = self.offset(p, q, r, s);
        &mut self.data[o]
    }
}
