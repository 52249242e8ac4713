//! Tests for LASSI and the LASSIS model space

#[cfg(test)]
mod tests {
    use super::super::{
        build_matrices, charge_hop_products, csf_count, embedded_fragment_hamiltonian, ladder_states,
        max_smult, plan_model_space, single_charge_hops, spin_flip_patterns, spin_shuffle_assignments,
        HopClass, LassiSolution, LassisOptions, ModelSpace, ProductOperator, ProductStateSolver, Rootspace,
    };
    use crate::ci_impl::{FragmentSolver, LocalCiSolver};
    use crate::las_impl::FragmentPartition;
    use fci::{DirectCi, Hamiltonian, RayonBackend, SerialBackend, Tensor4};
    use nalgebra::{DMatrix, DVector};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::HashSet;

    fn random_hamiltonian(n: usize, seed: u64) -> Hamiltonian {
        let mut rng = StdRng::seed_from_u64(seed);
        let h = DMatrix::from_fn(n, n, |_, _| rng.gen_range(-0.5..0.5));
        let h = (&h + h.transpose()) * 0.5;
        let mut g = Tensor4::cubic(n);
        for x in g.data_mut().iter_mut() {
            *x = rng.gen_range(-0.2..0.2);
        }
        Hamiltonian::spin_free(0.7, h, g.symmetrize_8fold())
    }

    fn singlet_reference(nfrags: usize) -> Rootspace {
        Rootspace::new(vec![(1, 1); nfrags], vec![1; nfrags])
    }

    fn determinant_basis(dim: usize) -> Vec<DVector<f64>> {
        (0..dim)
            .map(|i| {
                let mut v = DVector::zeros(dim);
                v[i] = 1.0;
                v
            })
            .collect()
    }

    #[test]
    fn test_configuration_counts() {
        assert_eq!(csf_count(2, 2, 1), 3);
        assert_eq!(csf_count(2, 2, 3), 1);
        assert_eq!(csf_count(2, 1, 2), 2);
        assert_eq!(csf_count(2, 3, 2), 2);
        assert_eq!(csf_count(4, 4, 1), 20);
        assert_eq!(csf_count(4, 4, 3), 15);
        assert_eq!(csf_count(4, 4, 5), 1);
        assert_eq!(csf_count(2, 2, 2), 0);
        assert_eq!(max_smult(2, 2), 3);
        assert_eq!(max_smult(3, 2), 2);
        assert_eq!(max_smult(4, 2), 1);
        assert_eq!(max_smult(1, 2), 2);
    }

    #[test]
    fn test_spin_shuffles_put_own_assignment_first() {
        let space = Rootspace::new(vec![(0, 1), (1, 0)], vec![2, 2]);
        let shuffles = spin_shuffle_assignments(&space, &[2, 2], 0);
        assert_eq!(shuffles, vec![vec![(0, 1), (1, 0)], vec![(1, 0), (0, 1)]]);

        let triplets = Rootspace::new(vec![(1, 1), (1, 1), (1, 1)], vec![3, 3, 3]);
        assert_eq!(spin_shuffle_assignments(&triplets, &[2, 2, 2], 0).len(), 7);
        assert_eq!(spin_shuffle_assignments(&triplets, &[2, 2, 2], 6).len(), 1);
    }

    #[test]
    fn test_three_fragment_charge_hops() {
        let reference = singlet_reference(3);
        let hops = single_charge_hops(&reference, &[2, 2, 2]);
        assert_eq!(hops.len(), 6);
        for hop in &hops {
            assert_eq!(hop.spin_case, 3);
            assert_eq!(hop.space.frag_nelec(hop.donor), 1);
            assert_eq!(hop.space.frag_nelec(hop.acceptor), 3);
            assert_eq!(hop.space.twice_ms(), 0);
            assert_eq!(hop.space.smult[hop.donor], 2);
            assert_eq!(hop.space.smult[hop.acceptor], 2);
        }
        assert!(charge_hop_products(&hops, 1).is_empty());
    }

    #[test]
    fn test_spin_flip_patterns_need_coupling() {
        let reference = singlet_reference(3);
        let patterns = spin_flip_patterns(&reference, &[2, 2, 2]);
        assert_eq!(
            patterns,
            vec![vec![3, 3, 1], vec![3, 1, 3], vec![1, 3, 3], vec![3, 3, 3]]
        );
    }

    #[test]
    fn test_three_fragment_model_space() {
        let reference = singlet_reference(3);
        let plan = plan_model_space(&reference, &[2, 2, 2], &LassisOptions::default());
        assert_eq!(plan.model.nref(), 1);
        assert_eq!(plan.model.nsingle(), 12);
        assert_eq!(plan.model.nproduct(), 16);
        assert_eq!(plan.model.len(), 29);
        assert_eq!(plan.origins.len(), 29);

        let keys: HashSet<_> = plan.model.spaces().iter().map(Rootspace::key).collect();
        assert_eq!(keys.len(), 29);
        assert!(plan.model.spaces().iter().all(|s| s.twice_ms() == 0));
        assert!(plan
            .model
            .spaces()
            .iter()
            .all(|s| (s.weight - 1.0 / 29.0).abs() < 1e-15));

        let none = LassisOptions {
            ncharge: 0,
            nspin: 0,
            ..LassisOptions::default()
        };
        assert_eq!(plan_model_space(&reference, &[2, 2, 2], &none).model.len(), 1);
    }

    #[test]
    fn test_four_fragment_products() {
        let reference = singlet_reference(4);
        let ncas_sub = [2, 2, 2, 2];
        let hops = single_charge_hops(&reference, &ncas_sub);
        assert_eq!(hops.len(), 12);
        assert_eq!(charge_hop_products(&hops, 2).len(), 12);

        let options = LassisOptions {
            nspin: 0,
            ..LassisOptions::default()
        };
        let plan = plan_model_space(&reference, &ncas_sub, &options);
        assert_eq!(plan.model.nsingle(), 24);
        assert_eq!(plan.model.nproduct(), 36);
        let charges: HashSet<Vec<i32>> = plan.model.spaces()[1 + 24..]
            .iter()
            .map(|s| s.charges(&reference))
            .collect();
        assert_eq!(charges.len(), 6);

        let no_products = LassisOptions {
            product_threshold: 4,
            ..options
        };
        assert_eq!(plan_model_space(&reference, &ncas_sub, &no_products).model.nproduct(), 0);
    }

    #[test]
    #[should_panic(expected = "duplicate")]
    fn test_duplicate_single_is_fatal() {
        let mut model = ModelSpace::new();
        model.push_reference(singlet_reference(2));
        let hop = Rootspace::new(vec![(0, 1), (2, 1)], vec![2, 2]);
        model.push_single(hop.clone());
        model.push_single(hop);
    }

    #[test]
    fn test_hop_classes() {
        assert_eq!(HopClass::from_signature(&[(0, 0), (0, 0)]), HopClass::Null);
        assert_eq!(HopClass::from_signature(&[(1, 0), (-1, 0), (0, 0)]), HopClass::ChargeHop);
        assert_eq!(HopClass::from_signature(&[(0, -1), (0, 1)]), HopClass::ChargeHop);
        assert_eq!(HopClass::from_signature(&[(1, -1), (-1, 1)]), HopClass::SpinExchange);
        assert_eq!(HopClass::from_signature(&[(1, 1), (-1, -1)]), HopClass::DoubleHop);
        assert_eq!(HopClass::from_signature(&[(1, 0), (0, -1)]), HopClass::Other);
        assert_eq!(HopClass::from_signature(&[(1, 1), (-1, 0), (1, 0)]), HopClass::Other);
        assert_eq!(HopClass::from_signature(&[(2, 0), (-1, 0), (-1, 0)]), HopClass::DoubleHop);
    }

    #[test]
    fn test_spin_ladder_keeps_multiplicity() {
        let ham = random_hamiltonian(2, 5);
        let solver = FragmentSolver::new(2, (2, 0), 3);
        let high = solver.kernel(&ham, 1, None).vectors;
        let low = ladder_states(2, 3, (2, 0), &high, (0, 2));
        assert_eq!(low.len(), 1);
        assert!((low[0].norm() - 1.0).abs() < 1e-12);
        let mid = ladder_states(2, 3, (2, 0), &high, (1, 1));
        let (ss, _) = FragmentSolver::new(2, (1, 1), 3).spin_square(&mid[0]);
        assert!((ss - 2.0).abs() < 1e-10, "<S^2> = {}", ss);
    }

    /// Four rootspaces with complete determinant bases span the whole
    /// `(1, 1)` space of four orbitals, so LASSI reproduces FCI.
    #[test]
    fn test_complete_model_space_matches_fci() {
        let ham = random_hamiltonian(4, 17);
        let partition = FragmentPartition::new(0, vec![2, 2], 4).unwrap();
        let mut model = ModelSpace::new();
        for nelec in [
            vec![(1, 1), (0, 0)],
            vec![(1, 0), (0, 1)],
            vec![(0, 1), (1, 0)],
            vec![(0, 0), (1, 1)],
        ] {
            let smult = nelec.iter().map(|&(a, b): &(usize, usize)| a.abs_diff(b) + 1).collect();
            let ci = nelec
                .iter()
                .map(|&(a, b)| determinant_basis(fci::CiSpace::new(2, (a, b)).dim()))
                .collect();
            model.push_reference(Rootspace::new(nelec, smult).with_ci(ci));
        }
        assert_eq!(model.nstates(), 16);

        let h_op = ProductOperator::hamiltonian(&ham, &partition);
        let s_op = ProductOperator::identity(&partition);
        let s2_op = ProductOperator::spin_square(&partition, 0);
        let mats = build_matrices(&model, &[&h_op, &s_op, &s2_op], &SerialBackend);
        let (h, s, s2) = (&mats[0], &mats[1], &mats[2]);

        assert!((s - DMatrix::identity(16, 16)).abs().max() < 1e-12);
        assert!((h - h.transpose()).abs().max() < 1e-10);
        assert!((s2 - s2.transpose()).abs().max() < 1e-10);

        let sol = LassiSolution::solve(h, s, s2, 1e-10);
        assert_eq!(sol.nroots(), 16);
        let fci = DirectCi::new(4, (1, 1)).hamiltonian_matrix(&ham);
        let (exact, _) = fci::dense::eigh_sorted(&fci);
        for k in 0..16 {
            assert!(
                (sol.energies[k] - exact[k]).abs() < 1e-9,
                "root {}: {} vs {}",
                k,
                sol.energies[k],
                exact[k]
            );
            let s2k = sol.s2[k];
            assert!(s2k.abs() < 1e-8 || (s2k - 2.0).abs() < 1e-8, "<S^2> = {}", s2k);
        }
    }

    #[test]
    fn test_backends_build_identical_matrices() {
        let ham = random_hamiltonian(4, 23);
        let partition = FragmentPartition::new(0, vec![2, 2], 4).unwrap();
        let mut model = ModelSpace::new();
        model.push_reference(
            Rootspace::new(vec![(1, 1), (0, 0)], vec![1, 1])
                .with_ci(vec![determinant_basis(4), determinant_basis(1)]),
        );
        model.push_single(
            Rootspace::new(vec![(1, 0), (0, 1)], vec![2, 2])
                .with_ci(vec![determinant_basis(2), determinant_basis(2)]),
        );
        let h_op = ProductOperator::hamiltonian(&ham, &partition);
        let serial = build_matrices(&model, &[&h_op], &SerialBackend);
        let rayon = build_matrices(&model, &[&h_op], &RayonBackend);
        assert!((&serial[0] - &rayon[0]).abs().max() < 1e-14);
    }

    /// The mean-field energy of a product state is its exact expectation value
    #[test]
    fn test_product_state_energy_matches_diagonal_element() {
        let ham = random_hamiltonian(6, 31);
        let partition = FragmentPartition::new(0, vec![2, 2, 2], 6).unwrap();
        let frozen: Vec<DVector<f64>> = (0..3)
            .map(|f| {
                let local = embedded_fragment_hamiltonian(&ham, partition.local_range(f), &[]);
                FragmentSolver::new(2, (1, 1), 1).kernel(&local, 1, None).vectors[0].clone()
            })
            .collect();

        let mut solver = ProductStateSolver::new(&ham, &partition, 50, 1e-10);
        solver.set_frozen_fragment(0, (1, 1), 1, vec![(frozen[0].clone(), 1.0)]);
        solver.set_excited_fragment(1, (2, 1), 2, 1, true);
        solver.set_frozen_fragment(2, (0, 1), 2, vec![(DVector::from_vec(vec![0.6, 0.8]), 1.0)]);
        let result = solver.kernel(&[None, None, None]);
        assert!(result.converged);
        assert_eq!(result.ci[1].len(), 1);

        let space = Rootspace::new(vec![(1, 1), (2, 1), (0, 1)], vec![1, 2, 2]).with_ci(result.ci.clone());
        let mut model = ModelSpace::new();
        model.push_reference(space);
        let h_op = ProductOperator::hamiltonian(&ham, &partition);
        let h = &build_matrices(&model, &[&h_op], &SerialBackend)[0];
        assert!(
            (h[(0, 0)] - result.energy).abs() < 1e-10,
            "{} vs {}",
            h[(0, 0)],
            result.energy
        );
    }

    #[test]
    fn test_state_averaged_excited_fragments() {
        let ham = random_hamiltonian(6, 37);
        let partition = FragmentPartition::new(0, vec![2, 2, 2], 6).unwrap();
        let local = embedded_fragment_hamiltonian(&ham, partition.local_range(2), &[]);
        let c2 = FragmentSolver::new(2, (1, 1), 1).kernel(&local, 1, None).vectors[0].clone();

        let mut solver = ProductStateSolver::new(&ham, &partition, 100, 1e-12);
        solver.set_excited_fragment(0, (0, 1), 2, 2, true);
        solver.set_excited_fragment(1, (2, 1), 2, 2, true);
        solver.set_frozen_fragment(2, (1, 1), 1, vec![(c2, 1.0)]);
        let result = solver.kernel(&[None, None, None]);
        assert!(result.converged);
        assert_eq!(result.ci[0].len(), 2);
        assert_eq!(result.e_local[1].len(), 2);
        assert!(result.e_local[1][0] <= result.e_local[1][1] + 1e-12);
    }
}
