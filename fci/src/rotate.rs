//! CI vector transformation under a rotation of the orbital basis

use crate::strings::{occupied, CiSpace, StringSpace};
use nalgebra::{DMatrix, DVector};

fn occupation_list(s: u64, norb: usize) -> Vec<usize> {
    (0..norb).filter(|&p| occupied(s, p)).collect()
}

/// `t[(I, J)] = det(u[occ(I), occ(J)])` over one string space
pub fn string_transform(strings: &StringSpace, u: &DMatrix<f64>) -> DMatrix<f64> {
    let n = strings.len();
    let norb = strings.norb();
    let occ: Vec<Vec<usize>> = strings
        .strings()
        .iter()
        .map(|&s| occupation_list(s, norb))
        .collect();
    let k = strings.nelec();
    let mut t = DMatrix::zeros(n, n);
    for i in 0..n {
        for j in 0..n {
            t[(i, j)] = if k == 0 {
                1.0
            } else {
                DMatrix::from_fn(k, k, |a, b| u[(occ[i][a], occ[j][b])]).determinant()
            };
        }
    }
    t
}

/// Express a CI vector in the rotated orbitals `phi' = phi u`.
///
/// With `T_s` the string transform of each spin, the coefficient matrix
/// becomes `Ta^T C Tb`.
pub fn transform_ci_for_orbital_rotation(space: &CiSpace, c: &DVector<f64>, u: &DMatrix<f64>) -> DVector<f64> {
    assert_eq!(u.nrows(), space.norb());
    assert_eq!(u.ncols(), space.norb());
    let na = space.alpha.len();
    let nb = space.beta.len();
    let cmat = DMatrix::from_row_slice(na, nb, c.as_slice());
    let ta = string_transform(&space.alpha, u);
    let tb = string_transform(&space.beta, u);
    let rotated = ta.transpose() * cmat * tb;
    DVector::from_iterator(na * nb, (0..na).flat_map(|i| (0..nb).map(move |j| (i, j))).map(|(i, j)| rotated[(i, j)]))
}
