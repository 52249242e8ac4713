//! Self-consistent relaxation of excited fragments in a product state
//!
//! Some fragments are frozen at a weighted set of reference states; the
//! excited ones are solved one after another in the mean field of all the
//! others until the energy stops changing.

use super::ham2q::{embedded_fragment_hamiltonian, FragmentDensity};
use crate::ci_impl::{FragmentSolver, LocalCiSolver};
use crate::las_impl::FragmentPartition;
use fci::Hamiltonian;
use nalgebra::DVector;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
enum FragmentRole {
    Frozen {
        nelec: (usize, usize),
        smult: usize,
        states: Vec<(DVector<f64>, f64)>,
    },
    Excited {
        nelec: (usize, usize),
        smult: usize,
        lroots: usize,
        sa_heff: bool,
    },
}

#[derive(Debug, Clone)]
pub struct ProductStateResult {
    pub converged: bool,
    /// Mean-field energy with state-averaged densities on excited fragments
    pub energy: f64,
    /// States per fragment; frozen fragments return their reference states
    pub ci: Vec<Vec<DVector<f64>>>,
    /// Local energies of each excited fragment's states
    pub e_local: Vec<Vec<f64>>,
    pub niter: usize,
}

#[derive(Debug, Clone)]
pub struct ProductStateSolver<'a> {
    ham: &'a Hamiltonian,
    partition: &'a FragmentPartition,
    roles: Vec<Option<FragmentRole>>,
    max_cycle: usize,
    conv_tol: f64,
    label: String,
}

impl<'a> ProductStateSolver<'a> {
    pub fn new(ham: &'a Hamiltonian, partition: &'a FragmentPartition, max_cycle: usize, conv_tol: f64) -> Self {
        assert_eq!(ham.norb(), partition.ncas(), "Hamiltonian does not span the active space");
        ProductStateSolver {
            ham,
            partition,
            roles: vec![None; partition.nfrags()],
            max_cycle,
            conv_tol,
            label: String::from("product state"),
        }
    }

    /// Name used in convergence warnings
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Hold fragment `f` at a weighted superposition of `states`
    pub fn set_frozen_fragment(&mut self, f: usize, nelec: (usize, usize), smult: usize, states: Vec<(DVector<f64>, f64)>) {
        assert!(!states.is_empty(), "frozen fragment {} has no states", f);
        self.roles[f] = Some(FragmentRole::Frozen { nelec, smult, states });
    }

    /// Relax `lroots` states of fragment `f`. With `sa_heff` they carry
    /// equal weight in the mean field; otherwise only the lowest does.
    pub fn set_excited_fragment(&mut self, f: usize, nelec: (usize, usize), smult: usize, lroots: usize, sa_heff: bool) {
        assert!(lroots > 0);
        self.roles[f] = Some(FragmentRole::Excited {
            nelec,
            smult,
            lroots,
            sa_heff,
        });
    }

    fn solver(role: &FragmentRole, norb: usize) -> FragmentSolver {
        match *role {
            FragmentRole::Frozen { nelec, smult, .. } | FragmentRole::Excited { nelec, smult, .. } => {
                FragmentSolver::new(norb, nelec, smult)
            }
        }
    }

    fn weights(n: usize, sa_heff: bool) -> Vec<f64> {
        if sa_heff {
            vec![1.0 / n as f64; n]
        } else {
            let mut w = vec![0.0; n];
            w[0] = 1.0;
            w
        }
    }

    /// Relax the excited fragments. `ci0` supplies optional guesses per
    /// fragment; frozen fragments ignore it.
    pub fn kernel(&self, ci0: &[Option<Vec<DVector<f64>>>]) -> ProductStateResult {
        let nfrags = self.partition.nfrags();
        assert_eq!(ci0.len(), nfrags, "one guess slot per fragment is required");
        let roles: Vec<&FragmentRole> = self
            .roles
            .iter()
            .enumerate()
            .map(|(f, r)| match r {
                Some(role) => role,
                None => panic!("fragment {} was neither frozen nor excited", f),
            })
            .collect();
        let solvers: Vec<FragmentSolver> = roles
            .iter()
            .enumerate()
            .map(|(f, role)| Self::solver(role, self.partition.ncas_sub()[f]))
            .collect();

        let mut states: Vec<Vec<DVector<f64>>> = Vec::with_capacity(nfrags);
        let mut weights: Vec<Vec<f64>> = Vec::with_capacity(nfrags);
        let mut excited = Vec::new();
        for (f, role) in roles.iter().enumerate() {
            match role {
                FragmentRole::Frozen { states: s, .. } => {
                    states.push(s.iter().map(|(c, _)| c.clone()).collect());
                    weights.push(s.iter().map(|(_, w)| *w).collect());
                }
                FragmentRole::Excited { lroots, sa_heff, .. } => {
                    excited.push(f);
                    let guess = ci0[f].clone();
                    let n = guess.as_ref().map_or(*lroots, |g| g.len().min(*lroots));
                    states.push(guess.unwrap_or_default());
                    weights.push(Self::weights(n.max(1), *sa_heff));
                }
            }
        }

        let density = |f: usize, states: &[DVector<f64>], w: &[f64]| {
            let pairs: Vec<(DVector<f64>, f64)> = states.iter().cloned().zip(w.iter().copied()).collect();
            FragmentDensity::from_states(&solvers[f], &pairs, self.ham, self.partition.local_range(f))
        };
        let mut densities: Vec<Option<FragmentDensity>> = (0..nfrags)
            .map(|f| (!states[f].is_empty()).then(|| density(f, &states[f], &weights[f])))
            .collect();

        let mut e_local = vec![Vec::new(); nfrags];
        let mut energy = f64::NAN;
        let mut converged = false;
        let mut niter = 0;
        for it in 1..=self.max_cycle {
            niter = it;
            let e_prev = energy;
            for &k in &excited {
                let env: Vec<&FragmentDensity> = (0..nfrags)
                    .filter(|&g| g != k)
                    .filter_map(|g| densities[g].as_ref())
                    .collect();
                let ham_k = embedded_fragment_hamiltonian(self.ham, self.partition.local_range(k), &env);
                let (lroots, sa_heff) = match roles[k] {
                    FragmentRole::Excited { lroots, sa_heff, .. } => (*lroots, *sa_heff),
                    FragmentRole::Frozen { .. } => continue,
                };
                let guess = (!states[k].is_empty()).then(|| states[k].as_slice());
                let sol = solvers[k].kernel(&ham_k, lroots, guess);
                let w = Self::weights(sol.vectors.len(), sa_heff);
                energy = sol.energies.iter().zip(&w).map(|(e, w)| e * w).sum();
                debug!(
                    "  {} cycle {} fragment {}: E = {:.10} over {} local roots",
                    self.label,
                    it,
                    k,
                    energy,
                    sol.vectors.len()
                );
                states[k] = sol.vectors;
                weights[k] = w;
                e_local[k] = sol.energies;
                densities[k] = Some(density(k, &states[k], &weights[k]));
            }
            if (energy - e_prev).abs() < self.conv_tol {
                converged = true;
                break;
            }
        }
        if excited.is_empty() {
            converged = true;
        }
        if !converged {
            warn!(
                "{}: excited fragments {:?} not converged after {} cycles",
                self.label, excited, niter
            );
        }

        ProductStateResult {
            converged,
            energy,
            ci: states,
            e_local,
            niter,
        }
    }
}
