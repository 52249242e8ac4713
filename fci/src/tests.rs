//! Tests for the determinant CI kernels

#[cfg(test)]
mod tests {
    use crate::rotate::transform_ci_for_orbital_rotation;
    use crate::spin::{contract_sdown, contract_sup, spin_square};
    use crate::strings::{CiSpace, StringSpace};
    use crate::{DirectCi, Hamiltonian, RayonBackend, Tensor4};
    use nalgebra::{DMatrix, DVector};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::sync::Arc;

    fn random_integrals(n: usize, seed: u64) -> (DMatrix<f64>, Tensor4) {
        let mut rng = StdRng::seed_from_u64(seed);
        let h = DMatrix::from_fn(n, n, |_, _| rng.gen_range(-0.5..0.5));
        let h = (&h + h.transpose()) * 0.5;
        let mut g = Tensor4::cubic(n);
        for x in g.data_mut().iter_mut() {
            *x = rng.gen_range(-0.2..0.2);
        }
        (h, g.symmetrize_8fold())
    }

    fn random_vector(dim: usize, seed: u64) -> DVector<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let v = DVector::from_fn(dim, |_, _| rng.gen_range(-1.0..1.0));
        v.normalize()
    }

    fn hubbard_dimer(t: f64, u: f64) -> Hamiltonian {
        let h1 = DMatrix::from_row_slice(2, 2, &[0.0, -t, -t, 0.0]);
        let mut h2 = Tensor4::cubic(2);
        h2[(0, 0, 0, 0)] = u;
        h2[(1, 1, 1, 1)] = u;
        Hamiltonian::spin_free(0.0, h1, h2)
    }

    #[test]
    fn test_string_space_counts() {
        assert_eq!(StringSpace::new(4, 2).len(), 6);
        assert_eq!(StringSpace::new(3, 0).len(), 1);
        assert!(StringSpace::new(2, 3).is_empty());
        assert_eq!(CiSpace::new(4, (2, 1)).dim(), 24);
    }

    #[test]
    fn test_hubbard_dimer_singlet_and_triplet() {
        let (t, u) = (1.0, 2.0);
        let ham = hubbard_dimer(t, u);
        let solver = DirectCi::new(2, (1, 1));

        let singlet = solver.kernel(&ham, 1, None, Some(1));
        let exact = (u - (u * u + 16.0 * t * t).sqrt()) / 2.0;
        assert!((singlet.energies[0] - exact).abs() < 1e-10, "got {}", singlet.energies[0]);
        let (ss, mult) = solver.spin_square(&singlet.vectors[0]);
        assert!(ss.abs() < 1e-10);
        assert!((mult - 1.0).abs() < 1e-10);

        let triplet = solver.kernel(&ham, 1, None, Some(3));
        assert!(triplet.energies[0].abs() < 1e-10);
        let (ss, _) = solver.spin_square(&triplet.vectors[0]);
        assert!((ss - 2.0).abs() < 1e-10);
    }

    #[test]
    fn test_hdiag_matches_dense_diagonal() {
        let (h1, h2) = random_integrals(3, 7);
        let ham = Hamiltonian::spin_free(0.3, h1, h2);
        let solver = DirectCi::new(3, (2, 1));
        let hmat = solver.hamiltonian_matrix(&ham);
        let hdiag = solver.make_hdiag(&ham);
        for i in 0..solver.dim() {
            assert!((hmat[(i, i)] - hdiag[i]).abs() < 1e-10, "diag {} differs", i);
        }
    }

    #[test]
    fn test_absorb_h1e_reproduces_contract_h() {
        let (h1, h2) = random_integrals(3, 11);
        let solver = DirectCi::new(3, (2, 1));
        let c = random_vector(solver.dim(), 3);
        let ham = Hamiltonian::spin_free(0.0, h1.clone(), h2.clone());
        let reference = solver.contract_h(&ham, &c);
        let h2eff = solver.absorb_h1e(&h1, &h2, 0.5);
        let sigma = solver.contract_2e(&h2eff, &c);
        assert!((reference - sigma).norm() < 1e-10);
    }

    #[test]
    fn test_energy_from_densities() {
        let (h1, h2) = random_integrals(4, 5);
        let ham = Hamiltonian::spin_free(-1.25, h1.clone(), h2.clone());
        let solver = DirectCi::new(4, (2, 2));
        let sol = solver.kernel(&ham, 2, None, None);
        let c = &sol.vectors[1];

        let (dm1, dm2) = solver.make_rdm12(c);
        let n = 4;
        let mut e = ham.h0 + h1.component_mul(&dm1).sum();
        for p in 0..n {
            for q in 0..n {
                for r in 0..n {
                    for s in 0..n {
                        e += 0.5 * h2[(p, q, r, s)] * dm2[(p, q, r, s)];
                    }
                }
            }
        }
        assert!((e - sol.energies[1]).abs() < 1e-9, "{} vs {}", e, sol.energies[1]);

        let nel = 4.0;
        assert!((dm1.trace() - nel).abs() < 1e-10);
        let pair_trace: f64 = (0..n).flat_map(|p| (0..n).map(move |r| (p, r))).map(|(p, r)| dm2[(p, p, r, r)]).sum();
        assert!((pair_trace - nel * (nel - 1.0)).abs() < 1e-9);

        let dm1s = solver.make_rdm1s(c);
        assert!((dm1s[0].trace() - 2.0).abs() < 1e-10);
        assert!((&dm1s[0] + &dm1s[1] - dm1).norm() < 1e-10);
    }

    #[test]
    fn test_transition_density_adjoint() {
        let solver = DirectCi::new(3, (1, 2));
        let a = random_vector(solver.dim(), 1);
        let b = random_vector(solver.dim(), 2);
        let ab = solver.trans_rdm1s(&a, &b);
        let ba = solver.trans_rdm1s(&b, &a);
        for s in 0..2 {
            assert!((&ab[s] - ba[s].transpose()).norm() < 1e-12);
        }
        let (_, g_ab) = solver.trans_rdm12(&a, &b);
        let (_, g_ba) = solver.trans_rdm12(&b, &a);
        // <a|E_pq E_rs|b> = <b|E_sr E_qp|a>
        for p in 0..3 {
            for q in 0..3 {
                for r in 0..3 {
                    for s in 0..3 {
                        assert!((g_ab[(p, q, r, s)] - g_ba[(s, r, q, p)]).abs() < 1e-12);
                    }
                }
            }
        }
    }

    #[test]
    fn test_spin_ladders() {
        let (h1, h2) = random_integrals(3, 13);
        let ham = Hamiltonian::spin_free(0.0, h1, h2);
        let solver = DirectCi::new(3, (2, 1));
        let sol = solver.kernel(&ham, 1, None, Some(2));
        let c = &sol.vectors[0];
        let (ss, _) = solver.spin_square(c);
        assert!((ss - 0.75).abs() < 1e-8);

        // Lowering a doublet with Ms = 1/2 lands on Ms = -1/2 with the same norm
        let (down_space, down) = contract_sdown(solver.space(), c).expect("beta sector exists");
        assert_eq!(down_space.nelec(), (1, 2));
        assert!((down.norm() - 1.0).abs() < 1e-10);
        let (ss_down, _) = spin_square(&down_space, &down);
        assert!((ss_down - 0.75).abs() < 1e-8);

        // Raising the highest Ms component annihilates it
        assert!(contract_sup(solver.space(), c).map(|(_, v)| v.norm() < 1e-10).unwrap_or(true));
    }

    #[test]
    fn test_orbital_rotation_preserves_energy() {
        let (h1, h2) = random_integrals(3, 17);
        let ham = Hamiltonian::spin_free(0.0, h1.clone(), h2.clone());
        let solver = DirectCi::new(3, (2, 1));
        let c = random_vector(solver.dim(), 9);
        let e0 = solver.energy(&ham, &c);

        let mut rng = StdRng::seed_from_u64(23);
        let k = DMatrix::from_fn(3, 3, |_, _| rng.gen_range(-0.4..0.4));
        let u = (&k - k.transpose()).exp();
        let h1r = u.transpose() * &h1 * &u;
        let h2r = h2.transform([&u, &u, &u, &u]);
        let rotated = Hamiltonian::spin_free(0.0, h1r, h2r);
        let cr = transform_ci_for_orbital_rotation(solver.space(), &c, &u);
        assert!((cr.norm() - 1.0).abs() < 1e-10);
        assert!((solver.energy(&rotated, &cr) - e0).abs() < 1e-10);
    }

    #[test]
    fn test_rayon_backend_matches_serial() {
        let (h1, h2) = random_integrals(4, 29);
        let ham = Hamiltonian::spin_free(0.0, h1, h2);
        let serial = DirectCi::new(4, (2, 1));
        let parallel = DirectCi::new(4, (2, 1)).with_backend(Arc::new(RayonBackend));
        let diff = serial.hamiltonian_matrix(&ham) - parallel.hamiltonian_matrix(&ham);
        assert!(diff.norm() < 1e-12);
    }

    #[test]
    fn test_tensor_helpers() {
        let (_, g) = random_integrals(3, 31);
        let eye = DMatrix::<f64>::identity(3, 3);
        assert!((g.transform([&eye, &eye, &eye, &eye]).norm() - g.norm()).abs() < 1e-12);
        assert!((g.symmetrize_8fold().dot(&g) - g.dot(&g)).abs() < 1e-12);
        let block = g.block([0..1, 0..3, 1..3, 1..3]);
        assert_eq!(block.dims(), [1, 3, 2, 2]);
        assert_eq!(block[(0, 2, 1, 0)], g[(0, 2, 2, 1)]);
    }
}
