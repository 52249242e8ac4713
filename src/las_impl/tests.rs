//! Tests for the LAS optimizer

#[cfg(test)]
mod tests {
    use super::super::{
        canonicalize, check_gradient, FragmentPartition, LasContext, LasDriver, LasHessian, LasKeyframe,
        LasOptions, LasProblem, MoIntegrals, OrbitalClass, RootspaceSpec, RotationSpace, SymmetryMask,
        UnitaryGroupGenerators,
    };
    use crate::ci_impl::LocalCiSolver;
    use crate::integrals::{IntegralProvider, LatticeModel};
    use crate::linalg::expm_antisym;
    use crate::optim_impl::LinearOperator;
    use fci::SerialBackend;
    use nalgebra::{DMatrix, DVector};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::sync::Arc;

    fn singlet_rootspace() -> Vec<RootspaceSpec> {
        vec![RootspaceSpec::new(vec![(1, 1), (1, 1)], vec![1, 1], 1.0)]
    }

    fn averaged_rootspaces() -> Vec<RootspaceSpec> {
        vec![
            RootspaceSpec::new(vec![(1, 1), (1, 1)], vec![1, 1], 0.5),
            RootspaceSpec::new(vec![(2, 1), (0, 1)], vec![2, 2], 0.5),
        ]
    }

    fn chain_problem_with(provider: Arc<dyn IntegralProvider>, rootspaces: Vec<RootspaceSpec>) -> LasProblem {
        let partition = FragmentPartition::new(1, vec![2, 2], 6).unwrap();
        LasProblem::new(provider, partition, rootspaces, Arc::new(SerialBackend)).unwrap()
    }

    fn chain_problem(rootspaces: Vec<RootspaceSpec>) -> LasProblem {
        let model = LatticeModel::embedded_dimer_chain(2);
        chain_problem_with(Arc::new(model.dense()), rootspaces)
    }

    fn random_vector(n: usize, rng: &mut StdRng) -> DVector<f64> {
        DVector::from_fn(n, |_, _| rng.gen_range(-1.0..1.0))
    }

    fn random_rotation(n: usize, seed: u64, scale: f64) -> DMatrix<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let k = DMatrix::from_fn(n, n, |_, _| rng.gen_range(-scale..scale));
        expm_antisym(&(&k - k.transpose()))
    }

    /// Rotated orbitals and slightly perturbed CI vectors, away from any
    /// stationary point
    fn perturbed_keyframe(problem: &LasProblem, seed: u64) -> LasKeyframe {
        let mo = random_rotation(problem.partition().nmo(), seed, 0.1);
        let driver = LasDriver::new(problem, LasOptions::default());
        let mut rng = StdRng::seed_from_u64(seed + 100);
        let ci = driver
            .initial_ci(&mo)
            .into_iter()
            .map(|ci_r| {
                ci_r.into_iter()
                    .map(|c| {
                        let v = &c + random_vector(c.len(), &mut rng) * 0.05;
                        v.normalize()
                    })
                    .collect()
            })
            .collect();
        LasKeyframe::new(mo, ci)
    }

    fn unit_ci(n: usize) -> DVector<f64> {
        let mut c = DVector::zeros(n);
        c[0] = 1.0;
        c
    }

    #[test]
    fn test_partition_layout() {
        assert!(FragmentPartition::new(1, vec![2, 3], 5).is_err());
        assert!(FragmentPartition::new(0, vec![], 4).is_err());
        assert!(FragmentPartition::new(0, vec![2, 0], 4).is_err());

        let p = FragmentPartition::new(1, vec![2, 2], 6).unwrap();
        assert_eq!(p.ncas(), 4);
        assert_eq!(p.nocc(), 5);
        assert_eq!(p.local_range(1), 2..4);
        assert_eq!(p.frag_range(1), 3..5);
        assert_eq!(p.classify(0), OrbitalClass::Core);
        assert_eq!(p.classify(2), OrbitalClass::Active(0));
        assert_eq!(p.classify(3), OrbitalClass::Active(1));
        assert_eq!(p.classify(5), OrbitalClass::Virtual);
    }

    #[test]
    fn test_problem_validation() {
        let provider: Arc<dyn IntegralProvider> = Arc::new(LatticeModel::embedded_dimer_chain(2).dense());
        let partition = FragmentPartition::new(1, vec![2, 2], 6).unwrap();
        let build = |spaces: Vec<RootspaceSpec>| {
            LasProblem::new(provider.clone(), partition.clone(), spaces, Arc::new(SerialBackend))
        };

        assert!(build(vec![RootspaceSpec::new(vec![(1, 1), (1, 1)], vec![1, 1], 0.7)]).is_err());
        assert!(build(vec![RootspaceSpec::new(vec![(3, 0), (1, 1)], vec![4, 1], 1.0)]).is_err());
        assert!(build(vec![RootspaceSpec::new(vec![(1, 1), (1, 1)], vec![2, 1], 1.0)]).is_err());
        assert!(build(vec![RootspaceSpec::new(vec![(1, 1)], vec![1], 1.0)]).is_err());
        assert!(build(vec![]).is_err());
        let twice = RootspaceSpec::new(vec![(1, 1), (1, 1)], vec![1, 1], 0.5);
        assert!(build(vec![twice.clone(), twice]).is_err());
        assert!(build(vec![
            RootspaceSpec::new(vec![(1, 1), (1, 1)], vec![1, 1], 0.5),
            RootspaceSpec::new(vec![(1, 1), (1, 1)], vec![3, 3], 0.5),
        ])
        .is_ok());

        let problem = build(singlet_rootspace()).unwrap();
        assert!(problem.clone().with_frozen(vec![6]).is_err());
        assert!(problem.clone().with_orbsym(vec![0; 5]).is_err());
        assert_eq!(problem.solver(0, 1).nconf(), 4);
        assert_eq!(problem.rootspaces()[0].twice_ms(), 0);
        assert_eq!("lasci".parse::<RotationSpace>().unwrap(), RotationSpace::Lasci);
    }

    #[test]
    fn test_rotation_masks() {
        let partition = FragmentPartition::new(1, vec![2, 2], 6).unwrap();
        let ci = vec![vec![unit_ci(4), unit_ci(4)]];

        let full = UnitaryGroupGenerators::from_parts(&partition, RotationSpace::Lasscf, &[], None, &ci);
        assert_eq!(full.nvar_orb(), 13);
        assert_eq!(full.nvar_ci(), 8);
        assert!(full.gx_pairs().is_empty());

        let lasci = UnitaryGroupGenerators::from_parts(&partition, RotationSpace::Lasci, &[], None, &ci);
        assert_eq!(lasci.nvar_orb(), 5);
        assert_eq!(lasci.gx_pairs().len(), 8);

        let frozen = UnitaryGroupGenerators::from_parts(&partition, RotationSpace::Lasscf, &[5], None, &ci);
        assert_eq!(frozen.nvar_orb(), 8);
        assert!(frozen.pairs().iter().all(|&(p, q)| p != 5 && q != 5));

        let mask = SymmetryMask::new(vec![0, 0, 1, 0, 1, 0]);
        let sym = UnitaryGroupGenerators::from_parts(&partition, RotationSpace::Lasscf, &[], Some(mask), &ci);
        assert_eq!(sym.nvar_orb(), 7);
    }

    #[test]
    fn test_pack_unpack_round_trip() {
        let problem = chain_problem(averaged_rootspaces());
        let kf = perturbed_keyframe(&problem, 1);
        let ugg = UnitaryGroupGenerators::new(&problem, &kf.ci);
        let mut rng = StdRng::seed_from_u64(5);
        let x = ugg.project_tangent(&random_vector(ugg.nvar_tot(), &mut rng));

        let (kappa, dci) = ugg.unpack(&x);
        assert!((&kappa + kappa.transpose()).norm() < 1e-14);
        for (ci_r, dci_r) in kf.ci.iter().zip(&dci) {
            for (c, dc) in ci_r.iter().zip(dci_r) {
                assert!(c.dot(dc).abs() < 1e-12);
            }
        }
        assert!((ugg.pack(&kappa, &dci) - &x).norm() < 1e-12);
        assert!((ugg.project_tangent(&x) - &x).norm() < 1e-12);
    }

    #[test]
    #[should_panic]
    fn test_unpack_rejects_wrong_length() {
        let problem = chain_problem(singlet_rootspace());
        let kf = perturbed_keyframe(&problem, 2);
        let ugg = UnitaryGroupGenerators::new(&problem, &kf.ci);
        ugg.unpack(&DVector::zeros(ugg.nvar_tot() + 1));
    }

    #[test]
    fn test_fragment_hamiltonians_reproduce_energy() {
        let problem = chain_problem(averaged_rootspaces());
        let kf = perturbed_keyframe(&problem, 3);
        let ctx = LasContext::new(&problem, &kf);
        let ugg = UnitaryGroupGenerators::new(&problem, &kf.ci);
        let hop = LasHessian::new(&ctx, &ugg, 0.0);

        for (r, e_r) in hop.fragment_energies().iter().enumerate() {
            for (f, e) in e_r.iter().enumerate() {
                assert!(
                    (e - ctx.roots[r].energy).abs() < 1e-10,
                    "rootspace {} fragment {}: {} vs {}",
                    r,
                    f,
                    e,
                    ctx.roots[r].energy
                );
            }
        }
        let averaged: f64 = ctx.roots.iter().map(|r| r.weight * r.energy).sum();
        assert!((averaged - ctx.e_tot).abs() < 1e-12);
    }

    #[test]
    fn test_dense_and_density_fitted_agree() {
        let model = LatticeModel::embedded_dimer_chain(2);
        let dense = chain_problem_with(Arc::new(model.dense()), averaged_rootspaces());
        let df = chain_problem_with(Arc::new(model.density_fitted()), averaged_rootspaces());
        let kf = perturbed_keyframe(&dense, 4);

        let ctx_dense = LasContext::new(&dense, &kf);
        let ctx_df = LasContext::new(&df, &kf);
        assert!((ctx_dense.e_tot - ctx_df.e_tot).abs() < 1e-9);

        let ugg = UnitaryGroupGenerators::new(&dense, &kf.ci);
        let g_dense = LasHessian::new(&ctx_dense, &ugg, 0.0).get_grad();
        let g_df = LasHessian::new(&ctx_df, &ugg, 0.0).get_grad();
        assert!((g_dense - g_df).norm() < 1e-8);
    }

    #[test]
    fn test_gradient_matches_finite_difference() {
        for space in [RotationSpace::Lasscf, RotationSpace::Lasci] {
            let problem = chain_problem(averaged_rootspaces()).with_rotation_space(space);
            let kf = perturbed_keyframe(&problem, 6);
            let ugg = UnitaryGroupGenerators::new(&problem, &kf.ci);
            let mut rng = StdRng::seed_from_u64(7);
            for _ in 0..3 {
                let dir = random_vector(ugg.nvar_tot(), &mut rng);
                let check = check_gradient(&problem, &kf, &dir, 1e-4);
                assert!(
                    check.error() < 1e-6,
                    "{:?}: analytic {} vs numeric {}",
                    space,
                    check.analytic,
                    check.numeric
                );
            }
        }
    }

    #[test]
    fn test_hessian_is_symmetric() {
        let problem = chain_problem(averaged_rootspaces());
        let kf = perturbed_keyframe(&problem, 8);
        let ctx = LasContext::new(&problem, &kf);
        let ugg = UnitaryGroupGenerators::new(&problem, &kf.ci);
        let hop = LasHessian::new(&ctx, &ugg, 0.0);
        assert_eq!(hop.dim(), ugg.nvar_tot());

        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..3 {
            let x = ugg.project_tangent(&random_vector(ugg.nvar_tot(), &mut rng));
            let y = ugg.project_tangent(&random_vector(ugg.nvar_tot(), &mut rng));
            let xhy = x.dot(&hop.matvec(&y));
            let yhx = y.dot(&hop.matvec(&x));
            assert!((xhy - yhx).abs() < 1e-8, "{} vs {}", xhy, yhx);
        }
    }

    #[test]
    fn test_hessian_matches_energy_curvature() {
        let problem = chain_problem(averaged_rootspaces());
        let kf = perturbed_keyframe(&problem, 10);
        let ctx = LasContext::new(&problem, &kf);
        let ugg = UnitaryGroupGenerators::new(&problem, &kf.ci);
        let hop = LasHessian::new(&ctx, &ugg, 0.0);
        let unit = vec![1.0; problem.nroots()];

        let mut rng = StdRng::seed_from_u64(11);
        let t = 1e-3;
        for _ in 0..3 {
            let x = ugg.project_tangent(&random_vector(ugg.nvar_tot(), &mut rng)).normalize();
            let e_plus = LasContext::new(&problem, &ugg.update_wfn(&kf, &(&x * t), &unit)).e_tot;
            let e_minus = LasContext::new(&problem, &ugg.update_wfn(&kf, &(&x * -t), &unit)).e_tot;
            let numeric = (e_plus + e_minus - 2.0 * ctx.e_tot) / (t * t);
            let analytic = x.dot(&hop.matvec(&x));
            assert!((numeric - analytic).abs() < 1e-4, "{} vs {}", analytic, numeric);
        }
    }

    #[test]
    fn test_preconditioner_is_floored() {
        let problem = chain_problem(singlet_rootspace());
        let kf = perturbed_keyframe(&problem, 12);
        let ctx = LasContext::new(&problem, &kf);
        let ugg = UnitaryGroupGenerators::new(&problem, &kf.ci);
        let prec = LasHessian::new(&ctx, &ugg, 0.0).get_prec();
        assert_eq!(prec.diagonal().len(), ugg.nvar_tot());
        assert!(prec.diagonal().iter().all(|d| d.abs() >= 1e-8));
    }

    #[test]
    fn test_driver_converges_monotonically() {
        let problem = chain_problem(singlet_rootspace());
        let options = LasOptions {
            max_cycle_macro: 100,
            ..LasOptions::default()
        };
        let driver = LasDriver::new(&problem, options);
        let mo0 = random_rotation(6, 13, 0.1);
        let e_start = driver.energy(&LasKeyframe::new(mo0.clone(), driver.initial_ci(&mo0)));

        let result = driver.kernel(mo0, None);
        assert!(result.converged);
        assert!(result.e_tot <= e_start + 1e-10);
        for w in result.energy_history.windows(2) {
            assert!(w[1] <= w[0] + 1e-9, "energy rose from {} to {}", w[0], w[1]);
        }

        let ctx = LasContext::new(&problem, &result.keyframe);
        assert!((ctx.e_tot - result.e_tot).abs() < 1e-10);
        let ugg = UnitaryGroupGenerators::new(&problem, &result.keyframe.ci);
        let g = LasHessian::new(&ctx, &ugg, 0.0).get_grad();
        assert!(g.norm() < 1.5e-4, "|g| = {}", g.norm());
    }

    #[test]
    fn test_frozen_orbitals_stay_fixed() {
        let problem = chain_problem(singlet_rootspace()).with_frozen(vec![5]).unwrap();
        let options = LasOptions {
            max_cycle_macro: 5,
            ..LasOptions::default()
        };
        let mo0 = random_rotation(6, 14, 0.1);
        let result = LasDriver::new(&problem, options).kernel(mo0.clone(), None);
        assert!((result.keyframe.mo.column(5) - mo0.column(5)).norm() < 1e-12);
    }

    #[test]
    fn test_canonicalize_preserves_energy() {
        let problem = chain_problem(averaged_rootspaces());
        let kf = perturbed_keyframe(&problem, 15);
        let e0 = LasContext::new(&problem, &kf).e_tot;

        let canon = canonicalize(&problem, &kf);
        let ctx = LasContext::new(&problem, &canon.keyframe);
        assert!((ctx.e_tot - e0).abs() < 1e-9);
        let eye = DMatrix::<f64>::identity(6, 6);
        assert!((canon.umat.transpose() * &canon.umat - eye).norm() < 1e-12);

        let dm = ctx.roots.iter().fold(DMatrix::zeros(6, 6), |acc, root| {
            acc + (&root.dm1s[0] + &root.dm1s[1]) * root.weight
        });
        let partition = problem.partition();
        for f in 0..partition.nfrags() {
            let range = partition.frag_range(f);
            for p in range.clone() {
                for q in range.clone() {
                    if p != q {
                        assert!(dm[(p, q)].abs() < 1e-8);
                    }
                }
                if p + 1 < range.end {
                    assert!(dm[(p, p)] >= dm[(p + 1, p + 1)] - 1e-12);
                }
                assert!((canon.eigenvalues[p] - dm[(p, p)]).abs() < 1e-8);
            }
        }
    }

    #[test]
    fn test_rotated_integrals_match_recomputed() {
        let problem = chain_problem(singlet_rootspace());
        let kf = perturbed_keyframe(&problem, 16);
        let canon = canonicalize(&problem, &kf);

        let ints = MoIntegrals::new(problem.provider(), &kf.mo, problem.partition());
        let rotated = ints.rotated(&canon.umat);
        let fresh = MoIntegrals::new(problem.provider(), &canon.keyframe.mo, problem.partition());
        assert!((rotated.h1 - fresh.h1).norm() < 1e-10);
        for (a, b) in [
            (&rotated.paaa, &fresh.paaa),
            (&rotated.ppaa, &fresh.ppaa),
            (&rotated.papa, &fresh.papa),
        ] {
            let diff: f64 = a.data().iter().zip(b.data()).map(|(x, y)| (x - y).abs()).fold(0.0, f64::max);
            assert!(diff < 1e-10);
        }
    }

    #[test]
    fn test_canonicalize_keeps_irrep_labels() {
        let problem = chain_problem(singlet_rootspace()).with_orbsym(vec![0, 0, 1, 0, 1, 0]).unwrap();
        let kf = perturbed_keyframe(&problem, 17);
        let canon = canonicalize(&problem, &kf);
        let labels = canon.orbsym.expect("labels are carried through");
        for f in 0..2 {
            let mut block: Vec<u8> = labels[problem.partition().frag_range(f)].to_vec();
            block.sort();
            assert_eq!(block, vec![0, 1]);
        }
        assert_eq!(labels[0], 0);
        assert_eq!(labels[5], 0);
    }
}
