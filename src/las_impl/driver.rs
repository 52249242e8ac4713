//! Macro/micro LASSCF driver
//!
//! Each macro iteration relaxes the fragment CI vectors one at a time in
//! the current mean field, rebuilds the context and Hessian, checks the
//! gradient and takes a damped Newton step from a short PCG solve.

use super::canonicalize::canonicalize;
use super::context::{
    core_dm1s, cumulant_energy, embed_fragment, fragment_cumulant, fragment_hamiltonian, LasContext,
    MoIntegrals,
};
use super::hessian::LasHessian;
use super::problem::{LasKeyframe, LasOptions, LasProblem, LasResult};
use super::ugg::UnitaryGroupGenerators;
use crate::optim_impl::{LinearSolverKind, PreconditionedCg};
use nalgebra::{DMatrix, DVector};
use tracing::{debug, info, warn};

const NEWTON_DAMPING: [f64; 4] = [1.0, 0.5, 0.25, 0.125];
const MAX_DESCENT_HALVINGS: usize = 20;

pub struct LasDriver<'a> {
    problem: &'a LasProblem,
    options: LasOptions,
}

impl<'a> LasDriver<'a> {
    pub fn new(problem: &'a LasProblem, options: LasOptions) -> Self {
        LasDriver { problem, options }
    }

    pub fn options(&self) -> &LasOptions {
        &self.options
    }

    /// State-averaged energy of a keyframe
    pub fn energy(&self, keyframe: &LasKeyframe) -> f64 {
        LasContext::new(self.problem, keyframe).e_tot
    }

    /// Sweep over fragments, solving each in the field of the inactive
    /// orbitals and of the fragments already solved.
    pub fn initial_ci(&self, mo: &DMatrix<f64>) -> Vec<Vec<DVector<f64>>> {
        let ints = MoIntegrals::new(self.problem.provider(), mo, self.problem.partition());
        (0..self.problem.nroots())
            .map(|r| {
                let mut ci_r: Vec<DVector<f64>> = Vec::new();
                for f in 0..self.problem.partition().nfrags() {
                    let (dm_env, e_corr) = self.environment(&ints, r, &ci_r, f);
                    let ham = fragment_hamiltonian(self.problem, &ints, mo, &dm_env, e_corr, f);
                    let sol = self.problem.solver(r, f).kernel(&ham, 1, None);
                    ci_r.push(sol.vectors[0].clone());
                }
                ci_r
            })
            .collect()
    }

    /// Inactive density plus every solved fragment other than `f`, and the
    /// cumulant energy of those fragments.
    fn environment(
        &self,
        ints: &MoIntegrals,
        r: usize,
        ci_r: &[DVector<f64>],
        f: usize,
    ) -> ([DMatrix<f64>; 2], f64) {
        let partition = self.problem.partition();
        let mut dm = core_dm1s(partition);
        let mut e_corr = 0.0;
        for (g, c) in ci_r.iter().enumerate() {
            if g == f {
                continue;
            }
            let solver = self.problem.solver(r, g);
            let d = solver.make_rdm1s(c);
            dm[0] += embed_fragment(partition, g, &d[0]);
            dm[1] += embed_fragment(partition, g, &d[1]);
            e_corr += cumulant_energy(ints, partition, g, &fragment_cumulant(solver, c));
        }
        (dm, e_corr)
    }

    /// Gauss-Seidel relaxation of every fragment CI vector at fixed orbitals
    pub fn ci_cycle(&self, ints: &MoIntegrals, keyframe: &LasKeyframe) -> LasKeyframe {
        let ci = keyframe
            .ci
            .iter()
            .enumerate()
            .map(|(r, ci_r)| {
                let mut ci_r = ci_r.clone();
                for f in 0..ci_r.len() {
                    let (dm_env, e_corr) = self.environment(ints, r, &ci_r, f);
                    let ham = fragment_hamiltonian(self.problem, ints, &keyframe.mo, &dm_env, e_corr, f);
                    let solver = self.problem.solver(r, f);
                    let sol = solver.kernel(&ham, 1, Some(std::slice::from_ref(&ci_r[f])));
                    let (ss, mult) = solver.spin_square(&sol.vectors[0]);
                    debug!(
                        "  rootspace {} fragment {}: E = {:.10}, <S^2> = {:.6}, 2S+1 = {:.4}",
                        r, f, sol.energies[0], ss, mult
                    );
                    ci_r[f] = sol.vectors[0].clone();
                }
                ci_r
            })
            .collect();
        LasKeyframe::new(keyframe.mo.clone(), ci)
    }

    fn newton_step(&self, hop: &LasHessian, ugg: &UnitaryGroupGenerators, g: &DVector<f64>, gx: f64) -> DVector<f64> {
        let prec = hop.get_prec();
        let rhs = -g;
        let x0 = ugg.project_tangent(&prec.apply(&rhs));
        match self.options.linear_solver {
            LinearSolverKind::Diagonal => x0,
            LinearSolverKind::ConjugateGradient => {
                let tol = self.options.conv_tol_grad.max(gx / 10.0);
                let pcg = PreconditionedCg::new(self.options.max_cycle_micro, tol);
                let out = pcg.solve_with_callback(hop, &prec, &rhs, x0, |it, x| {
                    let (xo, xc) = ugg.split_norms(x);
                    debug!("LASSCF micro {:>3} : |x_orb| = {:.6e} ; |x_ci| = {:.6e}", it, xo, xc);
                });
                debug!(
                    "PCG finished after {} iterations, |r| = {:.6e}, converged = {}",
                    out.iterations, out.residual_norm, out.converged
                );
                ugg.project_tangent(&out.x)
            }
        }
    }

    /// Damped Newton step with a steepest-descent fallback. Returns `None`
    /// when no trial step lowers the energy.
    fn line_search(
        &self,
        keyframe: &LasKeyframe,
        ugg: &UnitaryGroupGenerators,
        x: &DVector<f64>,
        g: &DVector<f64>,
        e0: f64,
    ) -> Option<(LasKeyframe, f64)> {
        let ci_scale: Vec<f64> = self.problem.weights().iter().map(|w| 1.0 / w).collect();
        for alpha in NEWTON_DAMPING {
            let trial = ugg.update_wfn(keyframe, &(x * alpha), &ci_scale);
            let e = self.energy(&trial);
            if e <= e0 {
                return Some((trial, e));
            }
            debug!("  Newton step scaled by {} raises the energy by {:.3e}", alpha, e - e0);
        }

        warn!("Newton step rejected; falling back to steepest descent");
        let mut alpha = 1.0;
        for _ in 0..MAX_DESCENT_HALVINGS {
            let trial = ugg.update_wfn(keyframe, &(g * -alpha), &ci_scale);
            let e = self.energy(&trial);
            if e <= e0 {
                return Some((trial, e));
            }
            alpha *= 0.5;
        }
        None
    }

    /// Optimize from `mo0`. Without `ci0` the CI vectors are initialized by
    /// [`LasDriver::initial_ci`].
    pub fn kernel(&self, mo0: DMatrix<f64>, ci0: Option<Vec<Vec<DVector<f64>>>>) -> LasResult {
        let partition = self.problem.partition();
        let opts = &self.options;
        info!("============================================================");
        info!("                     LASSCF Optimization                    ");
        info!("============================================================");
        info!(
            "ncore = {}, ncas_sub = {:?}, nmo = {}, rootspaces = {}, rotations = {:?}",
            partition.ncore(),
            partition.ncas_sub(),
            partition.nmo(),
            self.problem.nroots(),
            self.problem.rotation_space()
        );
        info!(
            "conv_tol_grad = {:e}, max_cycle_macro = {}, max_cycle_micro = {}, ah_level_shift = {:e}",
            opts.conv_tol_grad, opts.max_cycle_macro, opts.max_cycle_micro, opts.ah_level_shift
        );

        let ci0 = ci0.unwrap_or_else(|| self.initial_ci(&mo0));
        let mut keyframe = LasKeyframe::new(mo0, ci0);
        let mut history = Vec::new();
        let mut converged = false;
        let mut niter = 0;

        for it in 1..=opts.max_cycle_macro {
            niter = it;
            let ints = MoIntegrals::new(self.problem.provider(), &keyframe.mo, partition);
            keyframe = self.ci_cycle(&ints, &keyframe);

            let step = {
                let ctx = LasContext::with_integrals(self.problem, &keyframe, ints);
                history.push(ctx.e_tot);
                let ugg = UnitaryGroupGenerators::new(self.problem, &keyframe.ci);
                let hop = LasHessian::new(&ctx, &ugg, opts.ah_level_shift);
                let g = hop.get_grad();
                let (gorb, gci) = ugg.split_norms(&g);
                let gx = hop.get_gx();
                info!(
                    "LASSCF macro {:>3} : E = {:.10} ; |g_orb| = {:.6e} ; |g_ci| = {:.6e} ; |g_x| = {:.6e}",
                    it, ctx.e_tot, gorb, gci, gx
                );
                if (gorb < opts.conv_tol_grad && gci < opts.conv_tol_grad) || gorb + gci < gx / 10.0 {
                    None
                } else {
                    let x = self.newton_step(&hop, &ugg, &g, gx);
                    Some(self.line_search(&keyframe, &ugg, &x, &g, ctx.e_tot))
                }
            };

            match step {
                None => {
                    converged = true;
                    break;
                }
                Some(Some((next, e))) => {
                    history.push(e);
                    keyframe = next;
                }
                Some(None) => {
                    warn!("No energy-lowering step found at macro iteration {}", it);
                    break;
                }
            }
        }

        if !converged {
            warn!(
                "LASSCF did not converge after {} macro iterations; returning the last keyframe",
                niter
            );
        }

        let (keyframe, orbsym, ints) = if converged && opts.canonicalize {
            let ints = MoIntegrals::new(self.problem.provider(), &keyframe.mo, partition);
            let canon = canonicalize(self.problem, &keyframe);
            let rotated = ints.rotated(&canon.umat);
            (canon.keyframe, canon.orbsym, rotated)
        } else {
            let ints = MoIntegrals::new(self.problem.provider(), &keyframe.mo, partition);
            (keyframe, self.problem.orbsym().map(|s| s.to_vec()), ints)
        };

        let ctx = LasContext::with_integrals(self.problem, &keyframe, ints);
        let e_tot = ctx.e_tot;
        let e_states = ctx.e_states();

        info!("------------------------------------------------------------");
        info!("LASSCF {} in {} macro iterations", if converged { "converged" } else { "NOT converged" }, niter);
        info!("Final LASSCF energy: {:.10} au", e_tot);
        for (r, e) in e_states.iter().enumerate() {
            info!("  rootspace {:>3}: E = {:.10}", r, e);
        }
        info!("------------------------------------------------------------");

        LasResult {
            e_tot,
            e_states,
            keyframe,
            orbsym,
            converged,
            niter,
            energy_history: history,
        }
    }
}
