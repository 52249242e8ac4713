//! Dense linear-algebra helpers shared by the optimizer and LASSI

pub use fci::dense::eigh_sorted;
pub use fci::Tensor4;

use nalgebra::{DMatrix, DVector};
use std::ops::Range;

/// `exp(k)` for an antisymmetric generator
pub fn expm_antisym(k: &DMatrix<f64>) -> DMatrix<f64> {
    k.exp()
}

/// One-index transformation `m k - k m`
pub fn one_index(m: &DMatrix<f64>, k: &DMatrix<f64>) -> DMatrix<f64> {
    m * k - k * m
}

/// Copy of the square block `m[r, r]`
pub fn sub_block(m: &DMatrix<f64>, r: Range<usize>) -> DMatrix<f64> {
    m.view((r.start, r.start), (r.len(), r.len())).into_owned()
}

/// Write `block` onto the diagonal of `m` starting at `offset`
pub fn set_sub_block(m: &mut DMatrix<f64>, offset: usize, block: &DMatrix<f64>) {
    m.view_mut((offset, offset), (block.nrows(), block.ncols()))
        .copy_from(block);
}

/// Canonical orthogonalizer `X = U lambda^{-1/2}`, dropping eigenvalues of
/// `s` at or below `lindep`. Columns of `X` span the non-null space of `s`.
pub fn canonical_orthogonalizer(s: &DMatrix<f64>, lindep: f64) -> DMatrix<f64> {
    let (vals, vecs) = eigh_sorted(s);
    let keep: Vec<usize> = (0..vals.len()).filter(|&i| vals[i] > lindep).collect();
    DMatrix::from_fn(s.nrows(), keep.len(), |p, k| {
        vecs[(p, keep[k])] / vals[keep[k]].sqrt()
    })
}

/// Solve the generalized symmetric eigenproblem `H C = S C e`.
///
/// Both matrices are symmetrized before use. Linear dependencies in `s`
/// are projected out, so the number of returned eigenpairs can be smaller
/// than the dimension.
pub fn general_eigh(h: &DMatrix<f64>, s: &DMatrix<f64>, lindep: f64) -> (DVector<f64>, DMatrix<f64>) {
    assert_eq!(h.shape(), s.shape(), "H and S must have the same shape");
    let hs = (h + h.transpose()) * 0.5;
    let ss = (s + s.transpose()) * 0.5;
    let x = canonical_orthogonalizer(&ss, lindep);
    let ht = x.transpose() * hs * &x;
    let (e, u) = eigh_sorted(&ht);
    (e, x * u)
}
