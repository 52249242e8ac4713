//! Combinatorics of the LASSIS model space
//!
//! These functions only decide which rootspaces exist and in which order.
//! CI vectors are attached by the LASSIS driver.

use super::rootspace::Rootspace;
use itertools::Itertools;

/// Largest multiplicity of `nelec` electrons in `norb` orbitals
pub fn max_smult(nelec: usize, norb: usize) -> usize {
    let npair = nelec.saturating_sub(norb);
    nelec - 2 * npair + 1
}

fn binomial(n: usize, k: usize) -> usize {
    if k > n {
        return 0;
    }
    (0..k.min(n - k)).fold(1, |acc, i| acc * (n - i) / (i + 1))
}

/// Number of spin-adapted configurations (Weyl-Paldus formula)
pub fn csf_count(norb: usize, nelec: usize, smult: usize) -> usize {
    let twos = smult - 1;
    if nelec > 2 * norb || twos > nelec || (nelec - twos) % 2 != 0 {
        return 0;
    }
    let a = (nelec - twos) / 2;
    let b = (nelec + twos) / 2 + 1;
    smult * binomial(norb + 1, a) * binomial(norb + 1, b) / (norb + 1)
}

/// `true` when `nelec` electrons in `norb` orbitals can have multiplicity `smult`
pub fn is_valid_fragment(norb: usize, nelec: i64, smult: i64) -> bool {
    if nelec < 0 || nelec as usize > 2 * norb || smult < 1 {
        return false;
    }
    let nelec = nelec as usize;
    let smult = smult as usize;
    smult <= max_smult(nelec, norb) && (smult - 1) % 2 == nelec % 2
}

/// Spin projections allowed for one fragment, highest first
fn fragment_projections(norb: usize, nelec: usize, smult: usize) -> Vec<(usize, usize)> {
    let twos = smult as i64 - 1;
    (0..smult as i64)
        .map(|k| twos - 2 * k)
        .filter_map(|m| {
            let na = (nelec as i64 + m) / 2;
            let nb = (nelec as i64 - m) / 2;
            (na >= 0 && nb >= 0 && na as usize <= norb && nb as usize <= norb).then_some((na as usize, nb as usize))
        })
        .collect()
}

/// All per-fragment `(neleca, nelecb)` assignments of the charges and
/// multiplicities of `space` with total `2 Ms = twice_ms`. The assignment
/// of `space` itself comes first when it qualifies.
pub fn spin_shuffle_assignments(space: &Rootspace, ncas_sub: &[usize], twice_ms: i32) -> Vec<Vec<(usize, usize)>> {
    let options: Vec<Vec<(usize, usize)>> = (0..space.nfrags())
        .map(|f| fragment_projections(ncas_sub[f], space.frag_nelec(f), space.smult[f]))
        .collect();
    let mut out: Vec<Vec<(usize, usize)>> = options
        .into_iter()
        .multi_cartesian_product()
        .filter(|assignment| assignment.iter().map(|&(a, b)| a as i32 - b as i32).sum::<i32>() == twice_ms)
        .collect();
    if let Some(pos) = out.iter().position(|a| *a == space.nelec) {
        let own = out.remove(pos);
        out.insert(0, own);
    }
    out
}

/// One electron moved from `donor` to `acceptor`, with the multiplicity of
/// each changed by `+-1`
#[derive(Debug, Clone)]
pub struct ChargeHop {
    pub donor: usize,
    pub acceptor: usize,
    /// `0..4` for `(donor, acceptor)` multiplicity changes `--, -+, +-, ++`
    pub spin_case: usize,
    pub space: Rootspace,
}

impl ChargeHop {
    pub fn fragments(&self) -> [usize; 2] {
        [self.donor, self.acceptor]
    }

    pub fn describe(&self) -> String {
        let sign = |d: i32| if d > 0 { '+' } else { '-' };
        let (dsi, dsa) = hop_smult_change(self.spin_case);
        format!(
            "{} -> {} (2S+1 {}1, {}1)",
            self.donor,
            self.acceptor,
            sign(dsi),
            sign(dsa)
        )
    }
}

fn hop_smult_change(spin_case: usize) -> (i32, i32) {
    (-1 + (spin_case / 2) as i32 * 2, -1 + (spin_case % 2) as i32 * 2)
}

/// Every single charge hop from `reference`: ordered fragment pairs, then
/// the four multiplicity cases. Each hop keeps the total spin projection;
/// the moved electron is alpha when possible.
pub fn single_charge_hops(reference: &Rootspace, ncas_sub: &[usize]) -> Vec<ChargeHop> {
    let nfrags = reference.nfrags();
    let mut hops = Vec::new();
    for (i, a) in (0..nfrags).cartesian_product(0..nfrags) {
        if i == a {
            continue;
        }
        for spin_case in 0..4 {
            let (dsi, dsa) = hop_smult_change(spin_case);
            let ni = reference.frag_nelec(i) as i64 - 1;
            let na = reference.frag_nelec(a) as i64 + 1;
            let si = reference.smult[i] as i64 + dsi as i64;
            let sa = reference.smult[a] as i64 + dsa as i64;
            if !is_valid_fragment(ncas_sub[i], ni, si) || !is_valid_fragment(ncas_sub[a], na, sa) {
                continue;
            }
            let mut smult = reference.smult.clone();
            smult[i] = si as usize;
            smult[a] = sa as usize;

            // Move an alpha electron, then a beta one, keeping each fragment inside its multiplet
            let mut nelec = None;
            for (da, db) in [(1, 0), (0, 1)] {
                let (ia, ib) = reference.nelec[i];
                let (aa, ab) = reference.nelec[a];
                if ia < da || ib < db {
                    continue;
                }
                let donor = (ia - da, ib - db);
                let acceptor = (aa + da, ab + db);
                let fits = |(x, y): (usize, usize), s: usize, norb: usize| {
                    x <= norb && y <= norb && x.abs_diff(y) < s
                };
                if fits(donor, si as usize, ncas_sub[i]) && fits(acceptor, sa as usize, ncas_sub[a]) {
                    let mut n = reference.nelec.clone();
                    n[i] = donor;
                    n[a] = acceptor;
                    nelec = Some(n);
                    break;
                }
            }
            let nelec = match nelec {
                Some(n) => n,
                None => {
                    let mut probe = Rootspace::new(reference.nelec.clone(), smult.clone());
                    probe.nelec[i] = (ni as usize, 0);
                    probe.nelec[a] = (na as usize, 0);
                    match spin_shuffle_assignments(&probe, ncas_sub, reference.twice_ms()).into_iter().next() {
                        Some(n) => n,
                        None => continue,
                    }
                }
            };
            hops.push(ChargeHop {
                donor: i,
                acceptor: a,
                spin_case,
                space: Rootspace::new(nelec, smult),
            });
        }
    }
    hops
}

/// Products of hops on pairwise disjoint fragment pairs, of order
/// `2..=max_order`, in combination order over `hops`. Returns the indices
/// into `hops` that make up each product.
pub fn charge_hop_products(hops: &[ChargeHop], max_order: usize) -> Vec<Vec<usize>> {
    let mut products = Vec::new();
    for order in 2..=max_order {
        for combo in (0..hops.len()).combinations(order) {
            let disjoint = combo.iter().tuple_combinations().all(|(&p, &q)| {
                let fp = hops[p].fragments();
                let fq = hops[q].fragments();
                fp.iter().all(|f| !fq.contains(f))
            });
            if disjoint {
                products.push(combo);
            }
        }
    }
    products
}

/// Local multiplicity changes available to one fragment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpinFlipOptions {
    pub fragment: usize,
    /// New multiplicities, lowered first
    pub smults: Vec<usize>,
}

pub fn spin_flip_options(reference: &Rootspace, ncas_sub: &[usize]) -> Vec<SpinFlipOptions> {
    (0..reference.nfrags())
        .map(|f| {
            let s = reference.smult[f];
            let mut smults = Vec::new();
            if s > 2 {
                smults.push(s - 2);
            }
            if s < max_smult(reference.frag_nelec(f), ncas_sub[f]) {
                smults.push(s + 2);
            }
            SpinFlipOptions { fragment: f, smults }
        })
        .collect()
}

/// Multiplicity patterns reachable by flipping any subset of fragments.
///
/// Flips are injected fragment by fragment into every pattern generated so
/// far. Patterns that cannot reach the reference spin projection, or whose
/// total spin range misses the reference, are dropped. The reference
/// itself is not returned.
pub fn spin_flip_patterns(reference: &Rootspace, ncas_sub: &[usize]) -> Vec<Vec<usize>> {
    let options = spin_flip_options(reference, ncas_sub);
    let mut patterns: Vec<Vec<usize>> = vec![reference.smult.clone()];
    for opt in &options {
        let mut extra = Vec::new();
        for pattern in &patterns {
            if pattern[opt.fragment] != reference.smult[opt.fragment] {
                continue;
            }
            for &s in &opt.smults {
                let mut p = pattern.clone();
                p[opt.fragment] = s;
                extra.push(p);
            }
        }
        patterns.extend(extra);
    }
    patterns
        .into_iter()
        .skip(1)
        .filter(|smult| {
            let probe = Rootspace::new(reference.nelec.clone(), smult.clone());
            let feasible = !spin_shuffle_assignments(&probe, ncas_sub, reference.twice_ms()).is_empty();
            feasible && probe_couples(&probe, reference, ncas_sub)
        })
        .collect()
}

/// Spin-range test for a multiplicity pattern whose own projection may not
/// yet be valid; the reference projection is used instead.
fn probe_couples(probe: &Rootspace, reference: &Rootspace, ncas_sub: &[usize]) -> bool {
    match spin_shuffle_assignments(probe, ncas_sub, reference.twice_ms()).into_iter().next() {
        Some(nelec) => Rootspace::new(nelec, probe.smult.clone()).couples_by_smult(reference),
        None => false,
    }
}
