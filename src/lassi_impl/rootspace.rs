//! Rootspaces and the ordered model-space table

use nalgebra::DVector;
use std::collections::HashSet;
use tracing::info;

/// Canonical identity of a rootspace: per-fragment electrons and multiplicity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RootspaceKey {
    pub nelec: Vec<(usize, usize)>,
    pub smult: Vec<usize>,
}

/// One fixed charge/spin configuration across all fragments.
///
/// Every fragment slot holds the local states (`lroots` of them) once the
/// rootspace has been solved.
#[derive(Debug, Clone)]
pub struct Rootspace {
    pub nelec: Vec<(usize, usize)>,
    pub smult: Vec<usize>,
    pub weight: f64,
    ci: Vec<Option<Vec<DVector<f64>>>>,
}

impl Rootspace {
    pub fn new(nelec: Vec<(usize, usize)>, smult: Vec<usize>) -> Self {
        assert_eq!(nelec.len(), smult.len(), "one multiplicity per fragment is required");
        let nfrags = nelec.len();
        Rootspace {
            nelec,
            smult,
            weight: 1.0,
            ci: vec![None; nfrags],
        }
    }

    pub fn with_ci(mut self, ci: Vec<Vec<DVector<f64>>>) -> Self {
        assert_eq!(ci.len(), self.nfrags());
        self.ci = ci.into_iter().map(Some).collect();
        self
    }

    pub fn nfrags(&self) -> usize {
        self.nelec.len()
    }

    pub fn key(&self) -> RootspaceKey {
        RootspaceKey {
            nelec: self.nelec.clone(),
            smult: self.smult.clone(),
        }
    }

    pub fn set_ci(&mut self, f: usize, states: Vec<DVector<f64>>) {
        assert!(!states.is_empty(), "fragment {} needs at least one state", f);
        self.ci[f] = Some(states);
    }

    pub fn clear_ci(&mut self, f: usize) {
        self.ci[f] = None;
    }

    pub fn has_ci(&self) -> bool {
        self.ci.iter().all(Option::is_some)
    }

    /// Local states of fragment `f`; an unpopulated slot is a fault
    pub fn ci(&self, f: usize) -> &[DVector<f64>] {
        match &self.ci[f] {
            Some(states) => states,
            None => panic!(
                "rootspace {:?} has no CI vectors for fragment {}",
                self.key(),
                f
            ),
        }
    }

    pub fn lroots(&self, f: usize) -> usize {
        self.ci(f).len()
    }

    /// Number of product states
    pub fn nstates(&self) -> usize {
        (0..self.nfrags()).map(|f| self.lroots(f)).product()
    }

    pub fn frag_nelec(&self, f: usize) -> usize {
        self.nelec[f].0 + self.nelec[f].1
    }

    /// Twice the spin projection of fragment `f`
    pub fn frag_twice_ms(&self, f: usize) -> i32 {
        self.nelec[f].0 as i32 - self.nelec[f].1 as i32
    }

    pub fn twice_ms(&self) -> i32 {
        (0..self.nfrags()).map(|f| self.frag_twice_ms(f)).sum()
    }

    pub fn total_nelec(&self) -> (usize, usize) {
        self.nelec
            .iter()
            .fold((0, 0), |(a, b), &(na, nb)| (a + na, b + nb))
    }

    /// Electrons lost (positive) or gained relative to `reference`
    pub fn charges(&self, reference: &Rootspace) -> Vec<i32> {
        (0..self.nfrags())
            .map(|f| reference.frag_nelec(f) as i32 - self.frag_nelec(f) as i32)
            .collect()
    }

    /// Range of twice the total spin reachable by coupling the fragment
    /// spins, `(min, max)`
    pub fn twice_spin_range(&self) -> (usize, usize) {
        let spins: Vec<usize> = self.smult.iter().map(|s| s - 1).collect();
        let sum: usize = spins.iter().sum();
        let largest = spins.iter().copied().max().unwrap_or(0);
        let min = (2 * largest).saturating_sub(sum);
        (min.max(self.twice_ms().unsigned_abs() as usize), sum)
    }

    /// `true` when some total spin is reachable from both rootspaces
    pub fn couples_by_smult(&self, other: &Rootspace) -> bool {
        let (lo1, hi1) = self.twice_spin_range();
        let (lo2, hi2) = other.twice_spin_range();
        lo1 % 2 == lo2 % 2 && lo1.max(lo2) <= hi1.min(hi2)
    }

    /// Fragments whose electron count or multiplicity differs from `other`
    pub fn excited_fragments(&self, other: &Rootspace) -> Vec<usize> {
        (0..self.nfrags())
            .filter(|&f| self.frag_nelec(f) != other.frag_nelec(f) || self.smult[f] != other.smult[f])
            .collect()
    }

    /// Same charges and multiplicities, different spin projections
    pub fn is_spin_shuffle_of(&self, other: &Rootspace) -> bool {
        self.excited_fragments(other).is_empty() && self.nelec != other.nelec
    }

    /// One info line per fragment
    pub fn log_table(&self) {
        info!("  {:>4} {:>6} {:>6} {:>5} {:>6}", "frag", "neleca", "nelecb", "2S+1", "lroots");
        for f in 0..self.nfrags() {
            let lroots = self.ci[f].as_ref().map_or(0, |c| c.len());
            info!(
                "  {:>4} {:>6} {:>6} {:>5} {:>6}",
                f, self.nelec[f].0, self.nelec[f].1, self.smult[f], lroots
            );
        }
    }
}

/// Ordered rootspaces: reference block, single excitations, then products
#[derive(Debug, Clone, Default)]
pub struct ModelSpace {
    spaces: Vec<Rootspace>,
    keys: HashSet<RootspaceKey>,
    nref: usize,
    nsingle: usize,
}

impl ModelSpace {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, space: Rootspace) -> bool {
        if !self.keys.insert(space.key()) {
            return false;
        }
        self.spaces.push(space);
        true
    }

    fn push_unique(&mut self, space: Rootspace, tier: &str) {
        let key = space.key();
        assert!(
            self.insert(space),
            "model-space enumeration produced a duplicate {} rootspace {:?}",
            tier,
            key
        );
    }

    pub fn push_reference(&mut self, space: Rootspace) {
        assert_eq!(
            self.spaces.len(),
            self.nref,
            "reference rootspaces must precede excitations"
        );
        self.push_unique(space, "reference");
        self.nref += 1;
    }

    pub fn push_single(&mut self, space: Rootspace) {
        assert_eq!(
            self.spaces.len(),
            self.nref + self.nsingle,
            "single excitations must precede products"
        );
        self.push_unique(space, "single-excitation");
        self.nsingle += 1;
    }

    /// Products can be reached along several channels; repeats are dropped.
    /// Returns whether `space` was new.
    pub fn push_product(&mut self, space: Rootspace) -> bool {
        self.insert(space)
    }

    pub fn spaces(&self) -> &[Rootspace] {
        &self.spaces
    }

    pub fn len(&self) -> usize {
        self.spaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spaces.is_empty()
    }

    pub fn nref(&self) -> usize {
        self.nref
    }

    pub fn nsingle(&self) -> usize {
        self.nsingle
    }

    pub fn nproduct(&self) -> usize {
        self.spaces.len() - self.nref - self.nsingle
    }

    /// Set the local states of every fragment of rootspace `i`
    pub fn attach_ci(&mut self, i: usize, ci: Vec<Vec<DVector<f64>>>) {
        let space = &mut self.spaces[i];
        assert_eq!(ci.len(), space.nfrags(), "one state list per fragment is required");
        for (f, states) in ci.into_iter().enumerate() {
            space.set_ci(f, states);
        }
    }

    pub fn contains(&self, key: &RootspaceKey) -> bool {
        self.keys.contains(key)
    }

    /// Offset of each rootspace in the flattened product-state index, with
    /// the total as the last entry
    pub fn offsets(&self) -> Vec<usize> {
        let mut offsets = Vec::with_capacity(self.spaces.len() + 1);
        let mut acc = 0;
        offsets.push(0);
        for space in &self.spaces {
            acc += space.nstates();
            offsets.push(acc);
        }
        offsets
    }

    pub fn nstates(&self) -> usize {
        self.spaces.iter().map(Rootspace::nstates).sum()
    }

    /// Give every rootspace the same averaging weight
    pub fn equalize_weights(&mut self) {
        let w = 1.0 / self.spaces.len().max(1) as f64;
        self.spaces.iter_mut().for_each(|s| s.weight = w);
    }
}
