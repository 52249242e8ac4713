//! Second-quantized operators acting on determinant CI vectors

use crate::strings::{annihilate, create, excite, CiSpace, FermionOp, Spin};
use nalgebra::DVector;

/// `E^sigma_pq c` for one spin
pub fn apply_excitation(space: &CiSpace, c: &DVector<f64>, p: usize, q: usize, spin: Spin) -> DVector<f64> {
    let mut out = DVector::zeros(space.dim());
    accumulate_excitation(space, c, p, q, spin, 1.0, &mut out);
    out
}

/// `E_pq c` summed over spin
pub fn apply_excitation_spinfree(space: &CiSpace, c: &DVector<f64>, p: usize, q: usize) -> DVector<f64> {
    let mut out = DVector::zeros(space.dim());
    accumulate_excitation(space, c, p, q, Spin::Alpha, 1.0, &mut out);
    accumulate_excitation(space, c, p, q, Spin::Beta, 1.0, &mut out);
    out
}

/// `out += alpha * E^sigma_pq c`
pub fn accumulate_excitation(
    space: &CiSpace,
    c: &DVector<f64>,
    p: usize,
    q: usize,
    spin: Spin,
    alpha: f64,
    out: &mut DVector<f64>,
) {
    if alpha == 0.0 {
        return;
    }
    let na = space.alpha.len();
    let nb = space.beta.len();
    match spin {
        Spin::Alpha => {
            for ia in 0..na {
                if let Some((s, sign)) = excite(space.alpha.string(ia), p, q) {
                    if let Some(ja) = space.alpha.address(s) {
                        let f = alpha * sign;
                        for ib in 0..nb {
                            out[ja * nb + ib] += f * c[ia * nb + ib];
                        }
                    }
                }
            }
        }
        Spin::Beta => {
            for ib in 0..nb {
                if let Some((s, sign)) = excite(space.beta.string(ib), p, q) {
                    if let Some(jb) = space.beta.address(s) {
                        let f = alpha * sign;
                        for ia in 0..na {
                            out[ia * nb + jb] += f * c[ia * nb + ib];
                        }
                    }
                }
            }
        }
    }
}

/// Apply one ladder operator; `None` when the target sector does not exist
pub fn apply_op(space: &CiSpace, c: &DVector<f64>, op: FermionOp) -> Option<(CiSpace, DVector<f64>)> {
    let (dna, dnb) = op.delta();
    let target = space.shifted(dna, dnb)?;
    let mut out = DVector::zeros(target.dim());
    let act = |s: u64| match op {
        FermionOp::Create(p, _) => create(s, p),
        FermionOp::Annihilate(p, _) => annihilate(s, p),
    };
    let nb_in = space.beta.len();
    let nb_out = target.beta.len();
    match op.spin() {
        Spin::Alpha => {
            for ia in 0..space.alpha.len() {
                if let Some((s, sign)) = act(space.alpha.string(ia)) {
                    if let Some(ja) = target.alpha.address(s) {
                        for ib in 0..nb_in {
                            out[ja * nb_out + ib] += sign * c[ia * nb_in + ib];
                        }
                    }
                }
            }
        }
        Spin::Beta => {
            let phase = if space.neleca() % 2 == 0 { 1.0 } else { -1.0 };
            for ib in 0..nb_in {
                if let Some((s, sign)) = act(space.beta.string(ib)) {
                    if let Some(jb) = target.beta.address(s) {
                        for ia in 0..space.alpha.len() {
                            out[ia * nb_out + jb] += phase * sign * c[ia * nb_in + ib];
                        }
                    }
                }
            }
        }
    }
    Some((target, out))
}

/// Apply a product of ladder operators, rightmost first
pub fn apply_op_string(space: &CiSpace, c: &DVector<f64>, ops: &[FermionOp]) -> Option<(CiSpace, DVector<f64>)> {
    let mut current = (space.clone(), c.clone());
    for op in ops.iter().rev() {
        current = apply_op(&current.0, &current.1, *op)?;
    }
    Some(current)
}
