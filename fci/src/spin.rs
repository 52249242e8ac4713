//! Spin ladder operators and `<S^2>`

use crate::ops::apply_op;
use crate::strings::{CiSpace, FermionOp, Spin};
use nalgebra::DVector;

fn ladder(space: &CiSpace, c: &DVector<f64>, create: Spin, destroy: Spin) -> Option<(CiSpace, DVector<f64>)> {
    let (dna, dnb) = match create {
        Spin::Alpha => (1, -1),
        Spin::Beta => (-1, 1),
    };
    let target = space.shifted(dna, dnb)?;
    let mut out = DVector::zeros(target.dim());
    for p in 0..space.norb() {
        let Some((mid_space, mid)) = apply_op(space, c, FermionOp::Annihilate(p, destroy)) else {
            continue;
        };
        if let Some((_, v)) = apply_op(&mid_space, &mid, FermionOp::Create(p, create)) {
            out += v;
        }
    }
    Some((target, out))
}

/// `S+ c = sum_p a+_{p,alpha} a_{p,beta} c`
pub fn contract_sup(space: &CiSpace, c: &DVector<f64>) -> Option<(CiSpace, DVector<f64>)> {
    ladder(space, c, Spin::Alpha, Spin::Beta)
}

/// `S- c = sum_p a+_{p,beta} a_{p,alpha} c`
pub fn contract_sdown(space: &CiSpace, c: &DVector<f64>) -> Option<(CiSpace, DVector<f64>)> {
    ladder(space, c, Spin::Beta, Spin::Alpha)
}

fn sz(space: &CiSpace) -> f64 {
    (space.neleca() as f64 - space.nelecb() as f64) * 0.5
}

/// `S^2 c = S- S+ c + Sz (Sz + 1) c`
pub fn apply_s2(space: &CiSpace, c: &DVector<f64>) -> DVector<f64> {
    let m = sz(space);
    let mut out = c * (m * (m + 1.0));
    if let Some((up_space, up)) = contract_sup(space, c) {
        if let Some((_, back)) = contract_sdown(&up_space, &up) {
            out += back;
        }
    }
    out
}

/// Returns `(<S^2>, 2S+1)`
pub fn spin_square(space: &CiSpace, c: &DVector<f64>) -> (f64, f64) {
    let m = sz(space);
    let norm2 = c.dot(c);
    if norm2 == 0.0 {
        return (0.0, 1.0);
    }
    let up2 = contract_sup(space, c).map(|(_, v)| v.dot(&v)).unwrap_or(0.0);
    let ss = up2 / norm2 + m * (m + 1.0);
    (ss, (4.0 * ss + 1.0).max(0.0).sqrt())
}
