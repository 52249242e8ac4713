//! Small dense helpers shared by the CI kernels

use nalgebra::{DMatrix, DVector};

/// Symmetric eigendecomposition with eigenvalues in ascending order.
///
/// nalgebra's `symmetric_eigen` leaves the spectrum unsorted, so the
/// eigenpairs are permuted here. The input is symmetrized first.
pub fn eigh_sorted(m: &DMatrix<f64>) -> (DVector<f64>, DMatrix<f64>) {
    let sym = (m + m.transpose()) * 0.5;
    let eig = sym.symmetric_eigen();
    let mut order: Vec<usize> = (0..eig.eigenvalues.len()).collect();
    order.sort_by(|&a, &b| eig.eigenvalues[a].total_cmp(&eig.eigenvalues[b]));

    let values = DVector::from_iterator(order.len(), order.iter().map(|&i| eig.eigenvalues[i]));
    let mut vectors = DMatrix::zeros(m.nrows(), order.len());
    for (k, &i) in order.iter().enumerate() {
        vectors.set_column(k, &eig.eigenvectors.column(i));
    }
    (values, vectors)
}
