//! Tests for the local CI solver adapter

#[cfg(test)]
mod tests {
    use super::super::{FragmentSolver, LocalCiSolver};
    use crate::linalg::Tensor4;
    use fci::Hamiltonian;
    use nalgebra::{DMatrix, DVector};

    fn dimer(t: f64, u: f64) -> Hamiltonian {
        let h1 = DMatrix::from_row_slice(2, 2, &[0.0, -t, -t, 0.0]);
        let mut h2 = Tensor4::cubic(2);
        h2[(0, 0, 0, 0)] = u;
        h2[(1, 1, 1, 1)] = u;
        Hamiltonian::spin_free(0.0, h1, h2)
    }

    #[test]
    fn test_gradient_vanishes_at_eigenstate() {
        let ham = dimer(1.0, 3.0);
        let solver = FragmentSolver::new(2, (1, 1), 1);
        let sol = solver.kernel(&ham, 1, None);
        let (e, g) = solver.gradient(&ham, &sol.vectors[0]);
        assert!((e - sol.energies[0]).abs() < 1e-10);
        assert!(g.norm() < 1e-10);

        let trial = DVector::from_vec(vec![0.5, 0.5, 0.5, 0.5]);
        let (_, g) = solver.gradient(&ham, &trial);
        assert!(g.norm() > 1e-3);
        // The gradient is orthogonal to the state itself
        assert!(g.dot(&trial).abs() < 1e-10);
    }

    #[test]
    fn test_absorbed_hamiltonian_matches_contract_h() {
        let h1 = DMatrix::from_row_slice(2, 2, &[-0.3, -1.0, -1.0, 0.2]);
        let mut h2 = Tensor4::cubic(2);
        h2[(0, 0, 0, 0)] = 3.0;
        h2[(1, 1, 1, 1)] = 2.5;
        h2[(0, 0, 1, 1)] = 0.4;
        h2[(1, 1, 0, 0)] = 0.4;
        let ham = Hamiltonian::spin_free(0.0, h1.clone(), h2.clone());

        let solver: &dyn LocalCiSolver = &FragmentSolver::new(2, (1, 1), 1);
        let c = DVector::from_vec(vec![0.6, -0.2, 0.3, 0.7]).normalize();
        let h2eff = solver.absorb_h1e(&h1, &h2, 0.5);
        let sigma = solver.contract_2e(&h2eff, &c);
        assert!((sigma - solver.contract_h(&ham, &c)).norm() < 1e-10);
    }

    #[test]
    fn test_kernel_targets_multiplicity() {
        let ham = dimer(1.0, 3.0);
        let triplet = FragmentSolver::new(2, (1, 1), 3);
        let sol = triplet.kernel(&ham, 1, None);
        let (_, mult) = triplet.spin_square(&sol.vectors[0]);
        assert!((mult - 3.0).abs() < 1e-8);
        assert_eq!(triplet.nconf(), 4);
    }

    #[test]
    fn test_spin_ladder_moves_between_sectors() {
        let ham = dimer(1.0, 3.0);
        let triplet = FragmentSolver::new(2, (1, 1), 3);
        let c = triplet.kernel(&ham, 1, None).vectors.remove(0);
        let (nelec, up) = triplet.spin_ladder(&c, true).expect("Ms = 1 sector exists");
        assert_eq!(nelec, (2, 0));
        assert!((up.norm() - 2.0_f64.sqrt()).abs() < 1e-10);

        let singlet = FragmentSolver::new(2, (1, 1), 1);
        let s = singlet.kernel(&ham, 1, None).vectors.remove(0);
        let (_, up) = singlet.spin_ladder(&s, true).expect("Ms = 1 sector exists");
        assert!(up.norm() < 1e-10);
    }

    #[test]
    #[should_panic]
    fn test_incompatible_multiplicity_is_rejected() {
        FragmentSolver::new(2, (1, 1), 2);
    }
}
