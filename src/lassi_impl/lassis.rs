//! LASSI over an explicit model space and the automatic LASSIS driver
//!
//! LASSIS starts from the first LAS rootspace and adds, in this order:
//! the spin shuffles of the reference, every single charge hop (each one
//! followed by its shuffles), products of hops on disjoint fragment pairs
//! for large systems, and finally the spin-flip rootspaces. Excited
//! fragments are relaxed in the mean field of the reference before the
//! state-interaction problem is solved.

use super::eigen::{asymmetry, LassiSolution};
use super::ham2q::ham_2q;
use super::hamiltonian::{build_matrices, pair_statistics, ProductOperator};
use super::product_state::ProductStateSolver;
use super::rootspace::{ModelSpace, Rootspace};
use super::spaces::{
    charge_hop_products, csf_count, single_charge_hops, spin_flip_patterns, spin_shuffle_assignments, ChargeHop,
};
use crate::ci_impl::{FragmentSolver, LocalCiSolver};
use crate::las_impl::{LasProblem, LasResult};
use fci::{ComputeBackend, Hamiltonian};
use nalgebra::{DMatrix, DVector};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct LassisOptions {
    /// Local roots per charge-hop fragment; 0 disables charge hops
    pub ncharge: usize,
    /// Local roots per spin-flip fragment; 0 disables spin flips
    pub nspin: usize,
    /// Embed excited fragments with their state average instead of the lowest root
    pub sa_heff: bool,
    /// Charge-hop products are added only above this many fragments
    pub product_threshold: usize,
    pub max_cycle_macro: usize,
    pub conv_tol_self: f64,
    /// Overlap eigenvalues below this are projected out
    pub lindep: f64,
}

impl Default for LassisOptions {
    fn default() -> Self {
        LassisOptions {
            ncharge: 1,
            nspin: 1,
            sa_heff: true,
            product_threshold: 3,
            max_cycle_macro: 50,
            conv_tol_self: 1e-6,
            lindep: 1e-10,
        }
    }
}

/// Where a rootspace of the model space comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Reference,
    /// Index into [`ModelSpacePlan::hops`]
    ChargeHop(usize),
    HopProduct(Vec<usize>),
    SpinFlip,
}

/// Ordered rootspaces, without CI vectors yet
#[derive(Debug, Clone)]
pub struct ModelSpacePlan {
    pub model: ModelSpace,
    pub origins: Vec<Origin>,
    pub hops: Vec<ChargeHop>,
}

impl ModelSpacePlan {
    fn push_shuffles(&mut self, space: &Rootspace, ncas_sub: &[usize], origin: Origin, single: bool) {
        let assignments = spin_shuffle_assignments(space, ncas_sub, space.twice_ms());
        for nelec in assignments.into_iter().filter(|n| *n != space.nelec) {
            let shuffled = Rootspace::new(nelec, space.smult.clone());
            if single {
                self.model.push_single(shuffled);
            } else if !self.model.push_product(shuffled) {
                continue;
            }
            self.origins.push(origin.clone());
        }
    }

    fn push_product(&mut self, space: Rootspace, ncas_sub: &[usize], origin: Origin) {
        if self.model.push_product(space.clone()) {
            self.origins.push(origin.clone());
        }
        self.push_shuffles(&space, ncas_sub, origin, false);
    }
}

/// Enumerate the LASSIS model space around `reference`
pub fn plan_model_space(reference: &Rootspace, ncas_sub: &[usize], options: &LassisOptions) -> ModelSpacePlan {
    let nfrags = reference.nfrags();
    let mut plan = ModelSpacePlan {
        model: ModelSpace::new(),
        origins: Vec::new(),
        hops: Vec::new(),
    };
    let bare = Rootspace::new(reference.nelec.clone(), reference.smult.clone());
    plan.model.push_reference(bare.clone());
    plan.origins.push(Origin::Reference);
    for nelec in spin_shuffle_assignments(&bare, ncas_sub, bare.twice_ms()).into_iter().skip(1) {
        plan.model.push_reference(Rootspace::new(nelec, bare.smult.clone()));
        plan.origins.push(Origin::Reference);
    }

    if options.ncharge > 0 {
        let hops = single_charge_hops(&bare, ncas_sub);
        for (h, hop) in hops.iter().enumerate() {
            plan.model.push_single(hop.space.clone());
            plan.origins.push(Origin::ChargeHop(h));
            plan.push_shuffles(&hop.space, ncas_sub, Origin::ChargeHop(h), true);
        }
        plan.hops = hops;
        if nfrags > options.product_threshold {
            for combo in charge_hop_products(&plan.hops, nfrags / 2) {
                let mut nelec = bare.nelec.clone();
                let mut smult = bare.smult.clone();
                for &h in &combo {
                    for f in plan.hops[h].fragments() {
                        nelec[f] = plan.hops[h].space.nelec[f];
                        smult[f] = plan.hops[h].space.smult[f];
                    }
                }
                plan.push_product(Rootspace::new(nelec, smult), ncas_sub, Origin::HopProduct(combo));
            }
        }
    }

    if options.nspin > 0 {
        for smult in spin_flip_patterns(&bare, ncas_sub) {
            let probe = Rootspace::new(bare.nelec.clone(), smult.clone());
            let Some(nelec) = spin_shuffle_assignments(&probe, ncas_sub, bare.twice_ms()).into_iter().next() else {
                continue;
            };
            plan.push_product(Rootspace::new(nelec, smult), ncas_sub, Origin::SpinFlip);
        }
    }

    plan.model.equalize_weights();
    plan
}

/// Carry states of multiplicity `smult` from `from` to the spin projection of `to`
pub fn ladder_states(
    norb: usize,
    smult: usize,
    from: (usize, usize),
    states: &[DVector<f64>],
    to: (usize, usize),
) -> Vec<DVector<f64>> {
    assert_eq!(from.0 + from.1, to.0 + to.1, "spin ladders conserve the electron count");
    states
        .iter()
        .map(|c| {
            let mut nelec = from;
            let mut v = c.clone();
            while nelec != to {
                let solver = FragmentSolver::new(norb, nelec, smult);
                let (next, w) = match solver.spin_ladder(&v, to.0 > nelec.0) {
                    Some(step) => step,
                    None => panic!("no spin ladder from {:?} towards {:?} in {} orbitals", nelec, to, norb),
                };
                let norm = w.norm();
                assert!(
                    norm > 1e-8,
                    "spin ladder annihilated a multiplicity-{} state at {:?}",
                    smult,
                    nelec
                );
                nelec = next;
                v = w / norm;
            }
            v
        })
        .collect()
}

/// Local states of one fragment at a known spin projection
#[derive(Debug, Clone)]
struct FragmentStates {
    nelec: (usize, usize),
    smult: usize,
    ci: Vec<DVector<f64>>,
}

impl FragmentStates {
    fn at(&self, norb: usize, nelec: (usize, usize)) -> Vec<DVector<f64>> {
        ladder_states(norb, self.smult, self.nelec, &self.ci, nelec)
    }
}

#[derive(Debug, Clone)]
pub struct LassiResult {
    pub model: ModelSpace,
    pub solution: LassiSolution,
    pub ham: DMatrix<f64>,
    pub ovlp: DMatrix<f64>,
    /// `<Phi_0|H|Phi_0>` of the first reference product state
    pub e_reference: f64,
    /// `false` when some excited-fragment relaxation failed to converge
    pub converged: bool,
}

impl LassiResult {
    pub fn e_tot(&self) -> f64 {
        self.solution.ground_energy()
    }
}

/// Build `H`, `S` and `S^2` over `model` and diagonalize
pub fn solve_model_space(
    ham: &Hamiltonian,
    problem: &LasProblem,
    model: ModelSpace,
    lindep: f64,
    backend: &dyn ComputeBackend,
    converged: bool,
) -> LassiResult {
    let partition = problem.partition();
    let twice_ms = model.spaces()[0].twice_ms();
    let h_op = ProductOperator::hamiltonian(ham, partition);
    let s_op = ProductOperator::identity(partition);
    let s2_op = ProductOperator::spin_square(partition, twice_ms);
    info!(
        "LASSI: {} rootspaces, {} product states, {} Hamiltonian terms, backend {}",
        model.len(),
        model.nstates(),
        h_op.nterms(),
        backend.name()
    );
    for (class, count) in pair_statistics(&model) {
        debug!("  rootspace pairs of class {:?}: {}", class, count);
    }

    let mut mats = build_matrices(&model, &[&h_op, &s_op, &s2_op], backend).into_iter();
    let (Some(h), Some(s), Some(s2)) = (mats.next(), mats.next(), mats.next()) else {
        unreachable!("three operators yield three matrices");
    };
    debug!(
        "LASSI asymmetry before symmetrization: |H - H^T| = {:.3e}, |S - S^T| = {:.3e}",
        asymmetry(&h),
        asymmetry(&s)
    );
    let h = (&h + h.transpose()) * 0.5;
    let s = (&s + s.transpose()) * 0.5;
    let solution = LassiSolution::solve(&h, &s, &s2, lindep);
    if solution.nroots() < model.nstates() {
        info!(
            "LASSI: {} linearly dependent product states removed",
            model.nstates() - solution.nroots()
        );
    }
    let e_reference = h[(0, 0)] / s[(0, 0)];
    LassiResult {
        model,
        solution,
        ham: h,
        ovlp: s,
        e_reference,
        converged,
    }
}

/// State interaction between the rootspaces of a LAS result
pub fn lassi_from_las(problem: &LasProblem, las: &LasResult, lindep: f64, backend: &dyn ComputeBackend) -> LassiResult {
    let ham = ham_2q(problem, &las.keyframe.mo);
    let mut model = ModelSpace::new();
    for (r, spec) in problem.rootspaces().iter().enumerate() {
        let mut space = Rootspace::new(spec.nelec.clone(), spec.smult.clone())
            .with_ci(las.keyframe.ci[r].iter().map(|c| vec![c.clone()]).collect());
        space.weight = spec.weight;
        model.push_reference(space);
    }
    let result = solve_model_space(&ham, problem, model, lindep, backend, las.converged);
    result.solution.log(10);
    result
}

pub struct Lassis<'a> {
    problem: &'a LasProblem,
    options: LassisOptions,
    backend: Arc<dyn ComputeBackend>,
}

impl<'a> Lassis<'a> {
    pub fn new(problem: &'a LasProblem, options: LassisOptions, backend: Arc<dyn ComputeBackend>) -> Self {
        Lassis {
            problem,
            options,
            backend,
        }
    }

    pub fn options(&self) -> &LassisOptions {
        &self.options
    }

    fn ncas_sub(&self) -> &[usize] {
        self.problem.partition().ncas_sub()
    }

    fn product_solver<'h>(&'h self, ham: &'h Hamiltonian, label: String) -> ProductStateSolver<'h> {
        ProductStateSolver::new(
            ham,
            self.problem.partition(),
            self.options.max_cycle_macro,
            self.options.conv_tol_self,
        )
        .with_label(label)
    }

    /// Relax the two fragments of a charge hop in the field of the reference
    fn solve_hop(&self, ham: &Hamiltonian, reference: &[FragmentStates], hop: &ChargeHop) -> (Vec<FragmentStates>, bool) {
        let mut solver = self.product_solver(ham, format!("charge hop {}", hop.describe()));
        for (f, states) in reference.iter().enumerate() {
            let nelec = hop.space.nelec[f];
            let smult = hop.space.smult[f];
            if hop.fragments().contains(&f) {
                let norb = self.ncas_sub()[f];
                let lroots = self.options.ncharge.min(csf_count(norb, nelec.0 + nelec.1, smult)).max(1);
                solver.set_excited_fragment(f, nelec, smult, lroots, self.options.sa_heff);
            } else {
                solver.set_frozen_fragment(f, states.nelec, states.smult, vec![(states.ci[0].clone(), 1.0)]);
            }
        }
        let result = solver.kernel(&vec![None; reference.len()]);
        let states = hop
            .fragments()
            .into_iter()
            .map(|f| FragmentStates {
                nelec: hop.space.nelec[f],
                smult: hop.space.smult[f],
                ci: result.ci[f].clone(),
            })
            .collect();
        (states, result.converged)
    }

    /// High-spin local states of fragment `f` at multiplicity `smult`
    fn solve_spin_flip(&self, ham: &Hamiltonian, reference: &[FragmentStates], f: usize, smult: usize) -> (FragmentStates, bool) {
        let norb = self.ncas_sub()[f];
        let n = reference[f].nelec.0 + reference[f].nelec.1;
        let nelec = ((n + smult - 1) / 2, (n + 1 - smult) / 2);
        let mut solver = self.product_solver(ham, format!("spin flip of fragment {} to 2S+1 = {}", f, smult));
        for (g, states) in reference.iter().enumerate() {
            if g == f {
                let lroots = self.options.nspin.min(csf_count(norb, n, smult)).max(1);
                solver.set_excited_fragment(f, nelec, smult, lroots, self.options.sa_heff);
            } else {
                solver.set_frozen_fragment(g, states.nelec, states.smult, vec![(states.ci[0].clone(), 1.0)]);
            }
        }
        let result = solver.kernel(&vec![None; reference.len()]);
        let states = FragmentStates {
            nelec,
            smult,
            ci: result.ci[f].clone(),
        };
        (states, result.converged)
    }

    pub fn kernel(&self, las: &LasResult) -> LassiResult {
        let partition = self.problem.partition();
        let ncas_sub = self.ncas_sub();
        info!("============================================================");
        info!("                      LASSIS Model Space                    ");
        info!("============================================================");
        info!(
            "ncharge = {}, nspin = {}, sa_heff = {}, product_threshold = {}",
            self.options.ncharge, self.options.nspin, self.options.sa_heff, self.options.product_threshold
        );
        if self.problem.nroots() > 1 {
            warn!(
                "LASSIS uses only the first of {} LAS rootspaces as its reference",
                self.problem.nroots()
            );
        }

        let spec = &self.problem.rootspaces()[0];
        let reference = Rootspace::new(spec.nelec.clone(), spec.smult.clone());
        let ref_states: Vec<FragmentStates> = (0..partition.nfrags())
            .map(|f| FragmentStates {
                nelec: spec.nelec[f],
                smult: spec.smult[f],
                ci: vec![las.keyframe.ci[0][f].clone()],
            })
            .collect();

        let mut plan = plan_model_space(&reference, ncas_sub, &self.options);
        info!(
            "{} reference, {} single-excitation and {} product rootspaces from {} charge hops",
            plan.model.nref(),
            plan.model.nsingle(),
            plan.model.nproduct(),
            plan.hops.len()
        );

        let ham = ham_2q(self.problem, &las.keyframe.mo);
        let mut converged = true;
        let mut hop_states: HashMap<usize, Vec<FragmentStates>> = HashMap::new();
        let mut flip_states: HashMap<(usize, usize), FragmentStates> = HashMap::new();
        for i in 0..plan.model.len() {
            let space = plan.model.spaces()[i].clone();
            let mut sources: Vec<FragmentStates> = ref_states.clone();
            match &plan.origins[i] {
                Origin::Reference => {}
                Origin::ChargeHop(h) => {
                    self.collect_hops(&ham, &ref_states, &plan.hops, &[*h], &mut hop_states, &mut sources, &mut converged);
                }
                Origin::HopProduct(combo) => {
                    self.collect_hops(&ham, &ref_states, &plan.hops, combo, &mut hop_states, &mut sources, &mut converged);
                }
                Origin::SpinFlip => {
                    for f in space.excited_fragments(&reference) {
                        let key = (f, space.smult[f]);
                        if !flip_states.contains_key(&key) {
                            let (states, ok) = self.solve_spin_flip(&ham, &ref_states, f, space.smult[f]);
                            converged &= ok;
                            flip_states.insert(key, states);
                        }
                        sources[f] = flip_states[&key].clone();
                    }
                }
            }
            let ci = sources
                .iter()
                .enumerate()
                .map(|(f, src)| src.at(ncas_sub[f], space.nelec[f]))
                .collect();
            plan.model.attach_ci(i, ci);
        }

        for (i, space) in plan.model.spaces().iter().enumerate() {
            debug!("rootspace {} ({:?}):", i, plan.origins[i]);
            space.log_table();
        }

        let result = solve_model_space(&ham, self.problem, plan.model, self.options.lindep, self.backend.as_ref(), converged);
        info!("------------------------------------------------------------");
        info!("LASSIS reference energy: {:.10} au", result.e_reference);
        info!("LASSIS ground energy:    {:.10} au", result.e_tot());
        result.solution.log(10);
        info!("------------------------------------------------------------");
        if !result.converged {
            warn!("LASSIS: some excited-fragment solves did not converge");
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn collect_hops(
        &self,
        ham: &Hamiltonian,
        ref_states: &[FragmentStates],
        hops: &[ChargeHop],
        combo: &[usize],
        cache: &mut HashMap<usize, Vec<FragmentStates>>,
        sources: &mut [FragmentStates],
        converged: &mut bool,
    ) {
        for &h in combo {
            let hop = &hops[h];
            if !cache.contains_key(&h) {
                let (states, ok) = self.solve_hop(ham, ref_states, hop);
                *converged &= ok;
                cache.insert(h, states);
            }
            for (f, states) in hop.fragments().into_iter().zip(&cache[&h]) {
                sources[f] = states.clone();
            }
        }
    }
}
