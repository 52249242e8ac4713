//! Occupation-string addressing for determinant CI
//!
//! A determinant is a pair of bit strings (alpha, beta). The CI vector index
//! of a determinant is `ia * n_beta_strings + ib`. The second-quantized
//! ordering is all alpha creators (ascending orbital index) to the left of
//! all beta creators, so a beta operator picks up an extra `(-1)^na`.

use itertools::Itertools;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Spin {
    Alpha,
    Beta,
}

impl Spin {
    pub fn index(self) -> usize {
        match self {
            Spin::Alpha => 0,
            Spin::Beta => 1,
        }
    }

    pub const BOTH: [Spin; 2] = [Spin::Alpha, Spin::Beta];
}

/// All strings of `nelec` electrons in `norb` orbitals
#[derive(Debug, Clone)]
pub struct StringSpace {
    norb: usize,
    nelec: usize,
    strings: Vec<u64>,
    address: HashMap<u64, usize>,
}

impl StringSpace {
    pub fn new(norb: usize, nelec: usize) -> Self {
        assert!(norb <= 63, "occupation strings are limited to 63 orbitals");
        let mut strings: Vec<u64> = (0..norb)
            .combinations(nelec)
            .map(|occ| occ.iter().fold(0u64, |s, &p| s | (1u64 << p)))
            .collect();
        strings.sort_unstable();
        let address = strings.iter().enumerate().map(|(i, &s)| (s, i)).collect();
        StringSpace {
            norb,
            nelec,
            strings,
            address,
        }
    }

    pub fn norb(&self) -> usize {
        self.norb
    }

    pub fn nelec(&self) -> usize {
        self.nelec
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn string(&self, i: usize) -> u64 {
        self.strings[i]
    }

    pub fn strings(&self) -> &[u64] {
        &self.strings
    }

    pub fn address(&self, s: u64) -> Option<usize> {
        self.address.get(&s).copied()
    }
}

#[inline]
pub fn occupied(s: u64, p: usize) -> bool {
    s & (1u64 << p) != 0
}

#[inline]
fn parity_below(s: u64, p: usize) -> f64 {
    if (s & ((1u64 << p) - 1)).count_ones() % 2 == 0 {
        1.0
    } else {
        -1.0
    }
}

/// `a+_p` on a single string
#[inline]
pub fn create(s: u64, p: usize) -> Option<(u64, f64)> {
    if occupied(s, p) {
        None
    } else {
        Some((s | (1u64 << p), parity_below(s, p)))
    }
}

/// `a_p` on a single string
#[inline]
pub fn annihilate(s: u64, p: usize) -> Option<(u64, f64)> {
    if occupied(s, p) {
        Some((s ^ (1u64 << p), parity_below(s, p)))
    } else {
        None
    }
}

/// `a+_p a_q` on a single string
#[inline]
pub fn excite(s: u64, p: usize, q: usize) -> Option<(u64, f64)> {
    let (s1, sign1) = annihilate(s, q)?;
    let (s2, sign2) = create(s1, p)?;
    Some((s2, sign1 * sign2))
}

/// Determinant space for fixed `(neleca, nelecb)`
#[derive(Debug, Clone)]
pub struct CiSpace {
    pub alpha: StringSpace,
    pub beta: StringSpace,
}

impl CiSpace {
    pub fn new(norb: usize, nelec: (usize, usize)) -> Self {
        CiSpace {
            alpha: StringSpace::new(norb, nelec.0),
            beta: StringSpace::new(norb, nelec.1),
        }
    }

    /// Space reached by adding `dna` alpha and `dnb` beta electrons, if it exists
    pub fn shifted(&self, dna: i32, dnb: i32) -> Option<CiSpace> {
        let na = self.neleca() as i32 + dna;
        let nb = self.nelecb() as i32 + dnb;
        let norb = self.norb() as i32;
        if na < 0 || nb < 0 || na > norb || nb > norb {
            return None;
        }
        Some(CiSpace::new(self.norb(), (na as usize, nb as usize)))
    }

    pub fn norb(&self) -> usize {
        self.alpha.norb()
    }

    pub fn neleca(&self) -> usize {
        self.alpha.nelec()
    }

    pub fn nelecb(&self) -> usize {
        self.beta.nelec()
    }

    pub fn nelec(&self) -> (usize, usize) {
        (self.neleca(), self.nelecb())
    }

    pub fn dim(&self) -> usize {
        self.alpha.len() * self.beta.len()
    }

    pub fn strings(&self, spin: Spin) -> &StringSpace {
        match spin {
            Spin::Alpha => &self.alpha,
            Spin::Beta => &self.beta,
        }
    }

    #[inline]
    pub fn index(&self, ia: usize, ib: usize) -> usize {
        ia * self.beta.len() + ib
    }

    /// Index of the determinant with every orbital doubly occupied up to
    /// the electron count, lowest orbitals first.
    pub fn aufbau_index(&self) -> usize {
        let sa = (1u64 << self.neleca()) - 1;
        let sb = (1u64 << self.nelecb()) - 1;
        let ia = self.alpha.address(sa).unwrap_or(0);
        let ib = self.beta.address(sb).unwrap_or(0);
        self.index(ia, ib)
    }
}

/// A single fermionic ladder operator acting on one spin-orbital
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FermionOp {
    Create(usize, Spin),
    Annihilate(usize, Spin),
}

impl FermionOp {
    pub fn spin(&self) -> Spin {
        match *self {
            FermionOp::Create(_, s) | FermionOp::Annihilate(_, s) => s,
        }
    }

    pub fn orbital(&self) -> usize {
        match *self {
            FermionOp::Create(p, _) | FermionOp::Annihilate(p, _) => p,
        }
    }

    /// Change in (neleca, nelecb)
    pub fn delta(&self) -> (i32, i32) {
        let d = match self {
            FermionOp::Create(..) => 1,
            FermionOp::Annihilate(..) => -1,
        };
        match self.spin() {
            Spin::Alpha => (d, 0),
            Spin::Beta => (0, d),
        }
    }

    /// The Hermitian conjugate
    pub fn dagger(&self) -> FermionOp {
        match *self {
            FermionOp::Create(p, s) => FermionOp::Annihilate(p, s),
            FermionOp::Annihilate(p, s) => FermionOp::Create(p, s),
        }
    }
}
