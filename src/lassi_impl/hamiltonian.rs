//! Matrix elements of second-quantized operators between product states
//!
//! A product state of rootspace `I` is `|Phi> = |k_0> |k_1> ... |k_{F-1}>`
//! with the creation operators of fragment 0 leftmost, and alpha creators
//! left of beta creators inside each fragment. An operator string is split
//! into per-fragment substrings; each substring acts on its own fragment
//! CI vector and the results are multiplied together with the fermionic
//! sign of the reordering.
//!
//! Product states inside a rootspace are indexed with fragment 0 slowest,
//! which matches the Kronecker product of the per-fragment matrices.

use super::rootspace::{ModelSpace, Rootspace};
use crate::las_impl::FragmentPartition;
use fci::ops::apply_op_string;
use fci::{CiSpace, ComputeBackend, FermionOp, Hamiltonian, Spin};
use nalgebra::{DMatrix, DVector};
use std::collections::{BTreeMap, HashMap};
use std::ops::Range;
use tracing::debug;

const TERM_THRESHOLD: f64 = 1e-14;

/// `coef * ops`, with `ops` over active-space orbitals and applied rightmost first
#[derive(Debug, Clone)]
pub struct OpTerm {
    pub coef: f64,
    pub ops: Vec<FermionOp>,
}

impl OpTerm {
    pub fn new(coef: f64, ops: Vec<FermionOp>) -> Self {
        OpTerm { coef, ops }
    }
}

/// How the electrons of a rootspace pair differ, fragment by fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HopClass {
    /// Same `(neleca, nelecb)` everywhere
    Null,
    /// One electron moved between two fragments
    ChargeHop,
    /// Opposite spin flips on two fragments
    SpinExchange,
    /// Two electrons moved
    DoubleHop,
    Other,
}

impl HopClass {
    pub fn from_signature(signature: &[(i32, i32)]) -> Self {
        let moved: Vec<(i32, i32)> = signature.iter().copied().filter(|&d| d != (0, 0)).collect();
        let charge: Vec<i32> = moved.iter().map(|&(a, b)| a + b).collect();
        let displaced: i32 = charge.iter().map(|d| d.abs()).sum();
        let (da, db) = moved.iter().fold((0, 0), |(sa, sb), &(a, b)| (sa + a, sb + b));
        if da != 0 || db != 0 {
            return HopClass::Other;
        }
        match (moved.len(), displaced) {
            (0, _) => HopClass::Null,
            (2, 2) if charge.iter().all(|d| d.abs() == 1) => HopClass::ChargeHop,
            (2, 0) if moved.iter().all(|&(a, _)| a.abs() == 1) => HopClass::SpinExchange,
            (_, 4) => HopClass::DoubleHop,
            _ => HopClass::Other,
        }
    }
}

/// `(bra - ket)` electron counts per fragment
fn signature(bra: &Rootspace, ket: &Rootspace) -> Vec<(i32, i32)> {
    bra.nelec
        .iter()
        .zip(&ket.nelec)
        .map(|(&(ba, bb), &(ka, kb))| (ba as i32 - ka as i32, bb as i32 - kb as i32))
        .collect()
}

/// One operator term split by fragment. `parts[f]` is empty where the
/// term acts as the identity.
#[derive(Debug, Clone)]
struct LocalTerm {
    coef: f64,
    parts: Vec<Vec<FermionOp>>,
}

/// `O_f |k>` for every ket state of fragment `f`, memoized per ket rootspace
type KetCache = HashMap<(usize, Vec<FermionOp>), Option<Vec<DVector<f64>>>>;

/// An operator expressed as a sum of fermion strings, grouped by the
/// per-fragment electron-count change it causes
#[derive(Debug, Clone)]
pub struct ProductOperator {
    name: &'static str,
    ranges: Vec<Range<usize>>,
    groups: HashMap<Vec<(i32, i32)>, Vec<LocalTerm>>,
    nterms: usize,
}

impl ProductOperator {
    pub fn new(name: &'static str, partition: &FragmentPartition, terms: impl IntoIterator<Item = OpTerm>) -> Self {
        let ranges: Vec<Range<usize>> = (0..partition.nfrags()).map(|f| partition.local_range(f)).collect();
        let mut op = ProductOperator {
            name,
            ranges,
            groups: HashMap::new(),
            nterms: 0,
        };
        for term in terms {
            if term.coef.abs() < TERM_THRESHOLD {
                continue;
            }
            let (key, local) = op.split(&term);
            op.groups.entry(key).or_default().push(local);
            op.nterms += 1;
        }
        debug!(
            "{} operator: {} terms in {} hopping classes",
            name,
            op.nterms,
            op.groups.len()
        );
        op
    }

    /// `1`
    pub fn identity(partition: &FragmentPartition) -> Self {
        Self::new("overlap", partition, [OpTerm::new(1.0, Vec::new())])
    }

    /// `h0 + sum h1_pq a+_p a_q + 1/2 sum (pq|rs) a+_p a+_r a_s a_q`
    pub fn hamiltonian(ham: &Hamiltonian, partition: &FragmentPartition) -> Self {
        let n = ham.norb();
        assert_eq!(n, partition.ncas(), "Hamiltonian does not span the active space");
        let spins = [Spin::Alpha, Spin::Beta];
        let mut terms = vec![OpTerm::new(ham.h0, Vec::new())];
        for (s, &sigma) in spins.iter().enumerate() {
            for p in 0..n {
                for q in 0..n {
                    terms.push(OpTerm::new(
                        ham.h1[s][(p, q)],
                        vec![FermionOp::Create(p, sigma), FermionOp::Annihilate(q, sigma)],
                    ));
                }
            }
        }
        for &sigma in &spins {
            for &tau in &spins {
                for p in 0..n {
                    for q in 0..n {
                        for r in 0..n {
                            for s in 0..n {
                                if sigma == tau && (p == r || q == s) {
                                    continue;
                                }
                                terms.push(OpTerm::new(
                                    0.5 * ham.h2[(p, q, r, s)],
                                    vec![
                                        FermionOp::Create(p, sigma),
                                        FermionOp::Create(r, tau),
                                        FermionOp::Annihilate(s, tau),
                                        FermionOp::Annihilate(q, sigma),
                                    ],
                                ));
                            }
                        }
                    }
                }
            }
        }
        Self::new("hamiltonian", partition, terms)
    }

    /// `S^2 = S- S+ + Sz (Sz + 1)` at fixed total `2 Ms`
    pub fn spin_square(partition: &FragmentPartition, twice_ms: i32) -> Self {
        let n = partition.ncas();
        let m = twice_ms as f64 * 0.5;
        let mut terms = vec![OpTerm::new(m * (m + 1.0), Vec::new())];
        for p in 0..n {
            for q in 0..n {
                terms.push(OpTerm::new(
                    1.0,
                    vec![
                        FermionOp::Create(p, Spin::Beta),
                        FermionOp::Annihilate(p, Spin::Alpha),
                        FermionOp::Create(q, Spin::Alpha),
                        FermionOp::Annihilate(q, Spin::Beta),
                    ],
                ));
            }
        }
        Self::new("spin-square", partition, terms)
    }

    pub fn name(&self) -> &str {
        self.name
    }

    pub fn nterms(&self) -> usize {
        self.nterms
    }

    fn fragment_of(&self, p: usize) -> usize {
        match self.ranges.iter().position(|r| r.contains(&p)) {
            Some(f) => f,
            None => panic!("orbital {} lies outside every fragment", p),
        }
    }

    /// Stable grouping by fragment with the sign of the permutation
    fn split(&self, term: &OpTerm) -> (Vec<(i32, i32)>, LocalTerm) {
        let nfrags = self.ranges.len();
        let frags: Vec<usize> = term.ops.iter().map(|op| self.fragment_of(op.orbital())).collect();
        let inversions = frags
            .iter()
            .enumerate()
            .map(|(i, fi)| frags[i + 1..].iter().filter(|fj| *fj < fi).count())
            .sum::<usize>();
        let mut parts = vec![Vec::new(); nfrags];
        let mut key = vec![(0, 0); nfrags];
        for (op, &f) in term.ops.iter().zip(&frags) {
            let local = op.orbital() - self.ranges[f].start;
            parts[f].push(match *op {
                FermionOp::Create(_, s) => FermionOp::Create(local, s),
                FermionOp::Annihilate(_, s) => FermionOp::Annihilate(local, s),
            });
            let (da, db) = op.delta();
            key[f].0 += da;
            key[f].1 += db;
        }
        let sign = if inversions % 2 == 0 { 1.0 } else { -1.0 };
        (
            key,
            LocalTerm {
                coef: sign * term.coef,
                parts,
            },
        )
    }

    fn apply_local(&self, ket: &Rootspace, f: usize, ops: &[FermionOp]) -> Option<Vec<DVector<f64>>> {
        let space = CiSpace::new(self.ranges[f].len(), ket.nelec[f]);
        ket.ci(f)
            .iter()
            .map(|k| {
                assert_eq!(k.len(), space.dim(), "fragment {} CI vector does not match {:?}", f, ket.nelec[f]);
                apply_op_string(&space, k, ops).map(|(_, v)| v)
            })
            .collect()
    }

    /// `<bra| O |ket>` block, or `None` when no term connects the pair
    fn block(&self, bra: &Rootspace, ket: &Rootspace, cache: &mut KetCache) -> Option<DMatrix<f64>> {
        let terms = self.groups.get(&signature(bra, ket))?;
        let nfrags = self.ranges.len();
        let mut before = 0;
        let electrons_before: Vec<usize> = (0..nfrags)
            .map(|f| {
                let n = before;
                before += ket.frag_nelec(f);
                n
            })
            .collect();

        let mut local: HashMap<(usize, &[FermionOp]), Option<DMatrix<f64>>> = HashMap::new();
        let mut out = DMatrix::zeros(bra.nstates(), ket.nstates());
        for term in terms {
            for (f, ops) in term.parts.iter().enumerate() {
                local.entry((f, ops.as_slice())).or_insert_with(|| {
                    let applied = cache
                        .entry((f, ops.clone()))
                        .or_insert_with(|| self.apply_local(ket, f, ops))
                        .as_ref()?;
                    let bras = bra.ci(f);
                    Some(DMatrix::from_fn(bras.len(), applied.len(), |i, j| bras[i].dot(&applied[j])))
                });
            }
            let factors: Option<Vec<&DMatrix<f64>>> = term
                .parts
                .iter()
                .enumerate()
                .map(|(f, ops)| local.get(&(f, ops.as_slice())).and_then(Option::as_ref))
                .collect();
            let Some(factors) = factors else {
                continue;
            };
            let nflip: usize = term
                .parts
                .iter()
                .zip(&electrons_before)
                .map(|(ops, n)| ops.len() * n)
                .sum();
            let sign = if nflip % 2 == 0 { 1.0 } else { -1.0 };
            let mut prod = factors[0].clone();
            for m in &factors[1..] {
                prod = prod.kronecker(*m);
            }
            out += prod * (sign * term.coef);
        }
        Some(out)
    }
}

/// Assemble the model-space matrix of every operator in `ops`.
///
/// Jobs are split by ket rootspace; each job shares its `O_f |k>` cache
/// across the operators. Matrices are returned unsymmetrized.
pub fn build_matrices(model: &ModelSpace, ops: &[&ProductOperator], backend: &dyn ComputeBackend) -> Vec<DMatrix<f64>> {
    let spaces = model.spaces();
    assert!(
        spaces.iter().all(Rootspace::has_ci),
        "every rootspace needs CI vectors before the LASSI matrices are built"
    );
    let offsets = model.offsets();
    let n = offsets[spaces.len()];
    let nops = ops.len();

    let job = |j: usize| {
        let ket = &spaces[j];
        let nk = ket.nstates();
        let mut cols = DMatrix::zeros(n, nops * nk);
        let mut cache = KetCache::new();
        for (i, bra) in spaces.iter().enumerate() {
            for (o, op) in ops.iter().enumerate() {
                if let Some(b) = op.block(bra, ket, &mut cache) {
                    cols.view_mut((offsets[i], o * nk), (b.nrows(), nk)).copy_from(&b);
                }
            }
        }
        cols
    };
    let columns = backend.map_matrices(spaces.len(), &job);

    let mut mats = vec![DMatrix::zeros(n, n); nops];
    for (j, cols) in columns.iter().enumerate() {
        let nk = offsets[j + 1] - offsets[j];
        for (o, m) in mats.iter_mut().enumerate() {
            m.view_mut((0, offsets[j]), (n, nk))
                .copy_from(&cols.view((0, o * nk), (n, nk)));
        }
    }
    mats
}

/// Number of rootspace pairs in each hopping class
pub fn pair_statistics(model: &ModelSpace) -> BTreeMap<HopClass, usize> {
    let mut stats = BTreeMap::new();
    for bra in model.spaces() {
        for ket in model.spaces() {
            *stats.entry(HopClass::from_signature(&signature(bra, ket))).or_insert(0) += 1;
        }
    }
    stats
}
