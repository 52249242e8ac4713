//! Unitary group generators: the flat parameter vector of the optimizer
//!
//! The orbital part holds the strictly lower-triangular entries of the
//! antisymmetric generator that survive the rotation mask, in row-major
//! order. The CI part holds one update per fragment and rootspace,
//! fragment-major, each projected orthogonal to its reference vector.

use super::problem::{FragmentPartition, LasKeyframe, LasProblem, OrbitalClass, RotationSpace};
use crate::linalg::expm_antisym;
use nalgebra::{DMatrix, DVector};

/// Point-group labels that restrict rotations to matching irreps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymmetryMask {
    orbsym: Vec<u8>,
}

impl SymmetryMask {
    pub fn new(orbsym: Vec<u8>) -> Self {
        SymmetryMask { orbsym }
    }

    pub fn allows(&self, p: usize, q: usize) -> bool {
        self.orbsym[p] ^ self.orbsym[q] == 0
    }
}

fn in_rotation_space(space: RotationSpace, cp: OrbitalClass, cq: OrbitalClass) -> bool {
    use OrbitalClass::*;
    match (cp, cq) {
        (Virtual, Core) => true,
        (Active(f), Active(g)) => f != g,
        (Active(_), Core) | (Virtual, Active(_)) => space == RotationSpace::Lasscf,
        _ => false,
    }
}

/// Rotations that are excluded from the optimization but still carry a
/// meaningful gradient.
fn in_external_space(space: RotationSpace, cp: OrbitalClass, cq: OrbitalClass) -> bool {
    use OrbitalClass::*;
    space == RotationSpace::Lasci && matches!((cp, cq), (Active(_), Core) | (Virtual, Active(_)))
}

#[derive(Debug, Clone)]
pub struct UnitaryGroupGenerators {
    nmo: usize,
    pairs: Vec<(usize, usize)>,
    gx_pairs: Vec<(usize, usize)>,
    /// Reference CI vectors, `ci_ref[rootspace][fragment]`
    ci_ref: Vec<Vec<DVector<f64>>>,
    nfrags: usize,
}

impl UnitaryGroupGenerators {
    pub fn new(problem: &LasProblem, ci: &[Vec<DVector<f64>>]) -> Self {
        Self::from_parts(
            problem.partition(),
            problem.rotation_space(),
            problem.frozen(),
            problem.orbsym().map(|s| SymmetryMask::new(s.to_vec())),
            ci,
        )
    }

    pub fn from_parts(
        partition: &FragmentPartition,
        space: RotationSpace,
        frozen: &[usize],
        symmetry: Option<SymmetryMask>,
        ci: &[Vec<DVector<f64>>],
    ) -> Self {
        let nmo = partition.nmo();
        let allowed = |p: usize, q: usize| {
            !frozen.contains(&p)
                && !frozen.contains(&q)
                && symmetry.as_ref().map_or(true, |m| m.allows(p, q))
        };
        let mut pairs = Vec::new();
        let mut gx_pairs = Vec::new();
        for p in 0..nmo {
            for q in 0..p {
                if !allowed(p, q) {
                    continue;
                }
                let (cp, cq) = (partition.classify(p), partition.classify(q));
                if in_rotation_space(space, cp, cq) {
                    pairs.push((p, q));
                } else if in_external_space(space, cp, cq) {
                    gx_pairs.push((p, q));
                }
            }
        }
        for ci_r in ci {
            assert_eq!(ci_r.len(), partition.nfrags(), "one CI vector per fragment is required");
        }
        UnitaryGroupGenerators {
            nmo,
            pairs,
            gx_pairs,
            ci_ref: ci.to_vec(),
            nfrags: partition.nfrags(),
        }
    }

    pub fn nmo(&self) -> usize {
        self.nmo
    }

    pub fn nvar_orb(&self) -> usize {
        self.pairs.len()
    }

    pub fn nvar_ci(&self) -> usize {
        self.ci_ref.iter().flatten().map(|c| c.len()).sum()
    }

    pub fn nvar_tot(&self) -> usize {
        self.nvar_orb() + self.nvar_ci()
    }

    pub fn pairs(&self) -> &[(usize, usize)] {
        &self.pairs
    }

    /// Orbital pairs that define `g_x`
    pub fn gx_pairs(&self) -> &[(usize, usize)] {
        &self.gx_pairs
    }

    fn nroots(&self) -> usize {
        self.ci_ref.len()
    }

    fn project(c: &DVector<f64>, v: &DVector<f64>) -> DVector<f64> {
        v - c * c.dot(v)
    }

    /// Flatten an antisymmetric generator and per-rootspace CI updates
    pub fn pack(&self, kappa: &DMatrix<f64>, dci: &[Vec<DVector<f64>>]) -> DVector<f64> {
        assert_eq!(kappa.shape(), (self.nmo, self.nmo), "generator has the wrong shape");
        assert_eq!(dci.len(), self.nroots(), "CI update has the wrong number of rootspaces");
        let mut x = Vec::with_capacity(self.nvar_tot());
        x.extend(self.pairs.iter().map(|&(p, q)| kappa[(p, q)]));
        for f in 0..self.nfrags {
            for (r, ci_r) in self.ci_ref.iter().enumerate() {
                let c = &ci_r[f];
                let dc = &dci[r][f];
                assert_eq!(dc.len(), c.len(), "CI update length mismatch at ({}, {})", r, f);
                x.extend(Self::project(c, dc).iter());
            }
        }
        assert_eq!(
            x.len(),
            self.nvar_tot(),
            "packed length does not match the generator count"
        );
        DVector::from_vec(x)
    }

    /// Inverse of [`UnitaryGroupGenerators::pack`]
    pub fn unpack(&self, x: &DVector<f64>) -> (DMatrix<f64>, Vec<Vec<DVector<f64>>>) {
        assert_eq!(
            x.len(),
            self.nvar_tot(),
            "parameter vector has length {} but {} generators are defined",
            x.len(),
            self.nvar_tot()
        );
        let mut kappa = DMatrix::zeros(self.nmo, self.nmo);
        for (i, &(p, q)) in self.pairs.iter().enumerate() {
            kappa[(p, q)] = x[i];
            kappa[(q, p)] = -x[i];
        }
        let mut dci: Vec<Vec<DVector<f64>>> = self
            .ci_ref
            .iter()
            .map(|ci_r| ci_r.iter().map(|c| DVector::zeros(c.len())).collect())
            .collect();
        let mut offset = self.nvar_orb();
        for f in 0..self.nfrags {
            for (r, ci_r) in self.ci_ref.iter().enumerate() {
                let c = &ci_r[f];
                let seg = x.rows(offset, c.len()).into_owned();
                dci[r][f] = Self::project(c, &seg);
                offset += c.len();
            }
        }
        (kappa, dci)
    }

    /// Remove the components of `x` that leave the tangent space
    pub fn project_tangent(&self, x: &DVector<f64>) -> DVector<f64> {
        let (kappa, dci) = self.unpack(x);
        self.pack(&kappa, &dci)
    }

    /// `(|x_orb|, |x_ci|)`
    pub fn split_norms(&self, x: &DVector<f64>) -> (f64, f64) {
        let n = self.nvar_orb();
        (x.rows(0, n).norm(), x.rows(n, x.len() - n).norm())
    }

    /// Apply a step: orbitals become `mo exp(kappa / 2)`, each CI vector
    /// becomes `c + ci_scale[r] * dc`, renormalized.
    pub fn update_wfn(&self, keyframe: &LasKeyframe, x: &DVector<f64>, ci_scale: &[f64]) -> LasKeyframe {
        assert_eq!(ci_scale.len(), self.nroots());
        let (kappa, dci) = self.unpack(x);
        let umat = expm_antisym(&(kappa * 0.5));
        let mo = &keyframe.mo * umat;
        let ci = keyframe
            .ci
            .iter()
            .zip(dci.iter())
            .zip(ci_scale.iter())
            .map(|((ci_r, dci_r), &scale)| {
                ci_r.iter()
                    .zip(dci_r.iter())
                    .map(|(c, dc)| {
                        let v = c + dc * scale;
                        let norm = v.norm();
                        v / norm
                    })
                    .collect()
            })
            .collect();
        LasKeyframe::new(mo, ci)
    }
}
