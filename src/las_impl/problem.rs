//! Problem definition: orbital partition, rootspaces, options and results

use crate::ci_impl::{FragmentSolver, LocalCiSolver};
use crate::integrals::IntegralProvider;
use crate::optim_impl::LinearSolverKind;
use color_eyre::eyre::{ensure, eyre, Result};
use fci::ComputeBackend;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::str::FromStr;
use std::sync::Arc;

/// Which orbital rotations the optimizer is allowed to make
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationSpace {
    /// Inactive-active, inactive-external, active-external and
    /// inter-fragment rotations
    #[default]
    Lasscf,
    /// Inactive-external and inter-fragment rotations only
    Lasci,
}

impl FromStr for RotationSpace {
    type Err = color_eyre::eyre::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lasscf" => Ok(Self::Lasscf),
            "lasci" => Ok(Self::Lasci),
            _ => Err(eyre!("Unknown rotation space: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrbitalClass {
    Core,
    Active(usize),
    Virtual,
}

/// Split of the MO space into inactive, fragment-active and external blocks.
///
/// Fragments are contiguous and ordered, so their concatenation is the
/// active space `ncore..ncore + ncas`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentPartition {
    ncore: usize,
    ncas_sub: Vec<usize>,
    nmo: usize,
}

impl FragmentPartition {
    pub fn new(ncore: usize, ncas_sub: Vec<usize>, nmo: usize) -> Result<Self> {
        ensure!(!ncas_sub.is_empty(), "At least one fragment is required");
        ensure!(
            ncas_sub.iter().all(|&n| n > 0),
            "Fragments must contain at least one orbital: {:?}",
            ncas_sub
        );
        let ncas: usize = ncas_sub.iter().sum();
        ensure!(
            ncore + ncas <= nmo,
            "ncore ({}) + ncas ({}) exceeds the number of orbitals ({})",
            ncore,
            ncas,
            nmo
        );
        Ok(FragmentPartition { ncore, ncas_sub, nmo })
    }

    pub fn ncore(&self) -> usize {
        self.ncore
    }

    pub fn ncas(&self) -> usize {
        self.ncas_sub.iter().sum()
    }

    pub fn nocc(&self) -> usize {
        self.ncore + self.ncas()
    }

    pub fn nmo(&self) -> usize {
        self.nmo
    }

    pub fn nfrags(&self) -> usize {
        self.ncas_sub.len()
    }

    pub fn ncas_sub(&self) -> &[usize] {
        &self.ncas_sub
    }

    /// Fragment orbitals as indices into the active space
    pub fn local_range(&self, f: usize) -> Range<usize> {
        let start: usize = self.ncas_sub[..f].iter().sum();
        start..start + self.ncas_sub[f]
    }

    /// Fragment orbitals as MO indices
    pub fn frag_range(&self, f: usize) -> Range<usize> {
        let r = self.local_range(f);
        self.ncore + r.start..self.ncore + r.end
    }

    pub fn classify(&self, p: usize) -> OrbitalClass {
        if p < self.ncore {
            return OrbitalClass::Core;
        }
        if p >= self.nocc() {
            return OrbitalClass::Virtual;
        }
        let u = p - self.ncore;
        let f = (0..self.nfrags())
            .find(|&f| self.local_range(f).contains(&u))
            .unwrap_or(self.nfrags() - 1);
        OrbitalClass::Active(f)
    }
}

/// Per-fragment charge and spin of one rootspace, with its averaging weight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootspaceSpec {
    pub nelec: Vec<(usize, usize)>,
    pub smult: Vec<usize>,
    pub weight: f64,
}

impl RootspaceSpec {
    pub fn new(nelec: Vec<(usize, usize)>, smult: Vec<usize>, weight: f64) -> Self {
        RootspaceSpec { nelec, smult, weight }
    }

    /// Total `(neleca, nelecb)` over fragments
    pub fn total_nelec(&self) -> (usize, usize) {
        self.nelec
            .iter()
            .fold((0, 0), |(a, b), &(na, nb)| (a + na, b + nb))
    }

    /// Twice the total spin projection
    pub fn twice_ms(&self) -> i32 {
        let (a, b) = self.total_nelec();
        a as i32 - b as i32
    }
}

/// Optimizer settings, passed explicitly to the driver
#[derive(Debug, Clone)]
pub struct LasOptions {
    pub conv_tol_grad: f64,
    pub ah_level_shift: f64,
    pub max_cycle_macro: usize,
    pub max_cycle_micro: usize,
    pub linear_solver: LinearSolverKind,
    pub canonicalize: bool,
}

impl Default for LasOptions {
    fn default() -> Self {
        LasOptions {
            conv_tol_grad: 1e-4,
            ah_level_shift: 1e-8,
            max_cycle_macro: 50,
            max_cycle_micro: 5,
            linear_solver: LinearSolverKind::ConjugateGradient,
            canonicalize: true,
        }
    }
}

/// Current orbitals and CI vectors, indexed `ci[rootspace][fragment]`.
///
/// A keyframe is never edited in place; updates produce a new one.
#[derive(Debug, Clone)]
pub struct LasKeyframe {
    pub mo: DMatrix<f64>,
    pub ci: Vec<Vec<DVector<f64>>>,
}

impl LasKeyframe {
    pub fn new(mo: DMatrix<f64>, ci: Vec<Vec<DVector<f64>>>) -> Self {
        LasKeyframe { mo, ci }
    }
}

#[derive(Debug, Clone)]
pub struct LasResult {
    pub e_tot: f64,
    pub e_states: Vec<f64>,
    pub keyframe: LasKeyframe,
    pub orbsym: Option<Vec<u8>>,
    pub converged: bool,
    pub niter: usize,
    /// Energy after every CI cycle and accepted step
    pub energy_history: Vec<f64>,
}

/// A LAS wave function layout over a fixed integral source
#[derive(Debug, Clone)]
pub struct LasProblem {
    provider: Arc<dyn IntegralProvider>,
    partition: FragmentPartition,
    rootspaces: Vec<RootspaceSpec>,
    solvers: Vec<Vec<Arc<dyn LocalCiSolver>>>,
    frozen: Vec<usize>,
    orbsym: Option<Vec<u8>>,
    rotation_space: RotationSpace,
}

impl LasProblem {
    pub fn new(
        provider: Arc<dyn IntegralProvider>,
        partition: FragmentPartition,
        rootspaces: Vec<RootspaceSpec>,
        backend: Arc<dyn ComputeBackend>,
    ) -> Result<Self> {
        ensure!(!rootspaces.is_empty(), "At least one rootspace is required");
        ensure!(
            partition.nmo() <= provider.nao(),
            "Partition has {} orbitals but the integral source has {} basis functions",
            partition.nmo(),
            provider.nao()
        );
        let wsum: f64 = rootspaces.iter().map(|r| r.weight).sum();
        ensure!(
            (wsum - 1.0).abs() < 1e-8,
            "Rootspace weights must sum to 1, got {}",
            wsum
        );

        for (r, space) in rootspaces.iter().enumerate() {
            if let Some(q) = rootspaces[..r]
                .iter()
                .position(|other| other.nelec == space.nelec && other.smult == space.smult)
            {
                return Err(eyre!("Rootspaces {} and {} have the same charges and spins", q, r));
            }
        }

        let mut solvers = Vec::with_capacity(rootspaces.len());
        for (r, space) in rootspaces.iter().enumerate() {
            ensure!(space.weight > 0.0, "Rootspace {} has a non-positive weight", r);
            ensure!(
                space.nelec.len() == partition.nfrags() && space.smult.len() == partition.nfrags(),
                "Rootspace {} describes {} fragments, partition has {}",
                r,
                space.nelec.len(),
                partition.nfrags()
            );
            let mut row: Vec<Arc<dyn LocalCiSolver>> = Vec::with_capacity(partition.nfrags());
            for (f, (&(na, nb), &smult)) in space.nelec.iter().zip(&space.smult).enumerate() {
                let norb = partition.ncas_sub()[f];
                ensure!(
                    na <= norb && nb <= norb,
                    "Rootspace {} fragment {}: ({}, {}) electrons do not fit in {} orbitals",
                    r,
                    f,
                    na,
                    nb,
                    norb
                );
                let twos = na.abs_diff(nb);
                ensure!(
                    smult > twos && (smult - 1 - twos) % 2 == 0,
                    "Rootspace {} fragment {}: multiplicity {} is incompatible with ({}, {})",
                    r,
                    f,
                    smult,
                    na,
                    nb
                );
                row.push(FragmentSolver::with_backend(norb, (na, nb), smult, backend.clone()).shared());
            }
            solvers.push(row);
        }

        Ok(LasProblem {
            provider,
            partition,
            rootspaces,
            solvers,
            frozen: Vec::new(),
            orbsym: None,
            rotation_space: RotationSpace::default(),
        })
    }

    pub fn with_frozen(mut self, frozen: Vec<usize>) -> Result<Self> {
        if let Some(&p) = frozen.iter().find(|&&p| p >= self.partition.nmo()) {
            return Err(eyre!("Frozen orbital {} is out of range", p));
        }
        self.frozen = frozen;
        Ok(self)
    }

    pub fn with_orbsym(mut self, orbsym: Vec<u8>) -> Result<Self> {
        ensure!(
            orbsym.len() == self.partition.nmo(),
            "orbsym has {} labels for {} orbitals",
            orbsym.len(),
            self.partition.nmo()
        );
        self.orbsym = Some(orbsym);
        Ok(self)
    }

    pub fn with_rotation_space(mut self, rotation_space: RotationSpace) -> Self {
        self.rotation_space = rotation_space;
        self
    }

    pub fn provider(&self) -> &dyn IntegralProvider {
        self.provider.as_ref()
    }

    pub fn shared_provider(&self) -> Arc<dyn IntegralProvider> {
        self.provider.clone()
    }

    pub fn partition(&self) -> &FragmentPartition {
        &self.partition
    }

    pub fn rootspaces(&self) -> &[RootspaceSpec] {
        &self.rootspaces
    }

    pub fn nroots(&self) -> usize {
        self.rootspaces.len()
    }

    pub fn weights(&self) -> Vec<f64> {
        self.rootspaces.iter().map(|r| r.weight).collect()
    }

    pub fn solver(&self, r: usize, f: usize) -> &dyn LocalCiSolver {
        self.solvers[r][f].as_ref()
    }

    pub fn frozen(&self) -> &[usize] {
        &self.frozen
    }

    pub fn orbsym(&self) -> Option<&[u8]> {
        self.orbsym.as_deref()
    }

    pub fn rotation_space(&self) -> RotationSpace {
        self.rotation_space
    }
}
