//! Block-wise canonicalization of converged orbitals
//!
//! Inactive and external orbitals diagonalize the state-averaged,
//! spin-averaged Fock matrix (ascending). Each fragment diagonalizes its
//! state-averaged one-body density (descending occupation). With point-group
//! labels the diagonalization runs per irrep and the labels follow the
//! eigenvectors. Frozen orbitals are left untouched.

use super::context::LasContext;
use super::problem::{LasKeyframe, LasProblem};
use crate::linalg::{eigh_sorted, sub_block};
use itertools::Itertools;
use nalgebra::{DMatrix, DVector};
use std::ops::Range;

#[derive(Debug, Clone)]
pub struct Canonicalized {
    pub keyframe: LasKeyframe,
    pub orbsym: Option<Vec<u8>>,
    /// Block-diagonal rotation with `mo_new = mo_old umat`
    pub umat: DMatrix<f64>,
    /// Fock eigenvalues for inactive/external orbitals, occupations for
    /// active orbitals
    pub eigenvalues: DVector<f64>,
}

struct Eigenpair {
    value: f64,
    irrep: u8,
    /// `(orbital index, coefficient)`
    coeffs: Vec<(usize, f64)>,
}

/// Diagonalize `m` over the unfrozen orbitals of `range`, writing the
/// eigenvectors into `umat` and relabeling `orbsym`.
fn diagonalize_block(
    m: &DMatrix<f64>,
    range: Range<usize>,
    frozen: &[usize],
    orbsym: &mut Option<Vec<u8>>,
    descending: bool,
    umat: &mut DMatrix<f64>,
    eigenvalues: &mut DVector<f64>,
) {
    let active: Vec<usize> = range.filter(|p| !frozen.contains(p)).collect();
    if active.is_empty() {
        return;
    }
    let label = |p: usize| orbsym.as_ref().map_or(0, |s| s[p]);
    let groups = active.iter().copied().into_group_map_by(|&p| label(p));

    let mut pairs: Vec<Eigenpair> = Vec::with_capacity(active.len());
    for (irrep, idx) in groups.into_iter().sorted_by_key(|(irrep, _)| *irrep) {
        let sub = DMatrix::from_fn(idx.len(), idx.len(), |i, j| m[(idx[i], idx[j])]);
        let (vals, vecs) = eigh_sorted(&sub);
        for k in 0..idx.len() {
            pairs.push(Eigenpair {
                value: vals[k],
                irrep,
                coeffs: idx.iter().enumerate().map(|(i, &p)| (p, vecs[(i, k)])).collect(),
            });
        }
    }
    pairs.sort_by(|a, b| {
        if descending {
            b.value.total_cmp(&a.value)
        } else {
            a.value.total_cmp(&b.value)
        }
    });

    for &p in &active {
        for &q in &active {
            umat[(p, q)] = 0.0;
        }
    }
    for (&target, pair) in active.iter().zip(pairs.iter()) {
        for &(p, c) in &pair.coeffs {
            umat[(p, target)] = c;
        }
        eigenvalues[target] = pair.value;
        if let Some(labels) = orbsym.as_mut() {
            labels[target] = pair.irrep;
        }
    }
}

pub fn canonicalize(problem: &LasProblem, keyframe: &LasKeyframe) -> Canonicalized {
    let partition = problem.partition();
    let nmo = partition.nmo();
    let ctx = LasContext::new(problem, keyframe);
    let fock = ctx.sa_fock();

    let mut umat = DMatrix::identity(nmo, nmo);
    let mut eigenvalues = DVector::zeros(nmo);
    let mut orbsym = problem.orbsym().map(|s| s.to_vec());
    let frozen = problem.frozen();

    diagonalize_block(&fock, 0..partition.ncore(), frozen, &mut orbsym, false, &mut umat, &mut eigenvalues);
    diagonalize_block(&fock, partition.nocc()..nmo, frozen, &mut orbsym, false, &mut umat, &mut eigenvalues);

    let dm = ctx.roots.iter().fold(DMatrix::zeros(nmo, nmo), |acc, root| {
        acc + (&root.dm1s[0] + &root.dm1s[1]) * root.weight
    });
    for f in 0..partition.nfrags() {
        let range = partition.frag_range(f);
        diagonalize_block(&dm, range, frozen, &mut orbsym, true, &mut umat, &mut eigenvalues);
    }

    let mo = &keyframe.mo * &umat;
    let ci = keyframe
        .ci
        .iter()
        .enumerate()
        .map(|(r, ci_r)| {
            ci_r.iter()
                .enumerate()
                .map(|(f, c)| {
                    let uf = sub_block(&umat, partition.frag_range(f));
                    problem.solver(r, f).rotate_orbitals(c, &uf)
                })
                .collect()
        })
        .collect();

    Canonicalized {
        keyframe: LasKeyframe::new(mo, ci),
        orbsym,
        umat,
        eigenvalues,
    }
}
