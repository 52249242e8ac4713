//! Integrals and densities at one point of the optimization
//!
//! A [`LasContext`] is built once per macro iteration from a keyframe and
//! is read-only afterwards. Everything the gradient, Hessian and CI cycle
//! need is derived here.

use super::problem::{FragmentPartition, LasKeyframe, LasProblem};
use crate::ci_impl::LocalCiSolver;
use crate::integrals::{hcore_mo, veff_mo, IntegralProvider};
use crate::linalg::{set_sub_block, sub_block, Tensor4};
use fci::Hamiltonian;
use nalgebra::{DMatrix, DVector};
use std::ops::Range;

/// MO-basis integral slices for one set of orbitals
#[derive(Debug, Clone)]
pub struct MoIntegrals {
    pub e_nuc: f64,
    pub h1: DMatrix<f64>,
    /// `(p u|v w)`, first index over all MOs
    pub paaa: Tensor4,
    /// `(p q|u v)`
    pub ppaa: Tensor4,
    /// `(p u|q v)`
    pub papa: Tensor4,
    ncore: usize,
    ncas: usize,
}

impl MoIntegrals {
    pub fn new(provider: &dyn IntegralProvider, mo: &DMatrix<f64>, partition: &FragmentPartition) -> Self {
        assert_eq!(mo.ncols(), partition.nmo(), "orbital count does not match the partition");
        let mo_cas = mo.columns(partition.ncore(), partition.ncas()).into_owned();
        MoIntegrals {
            e_nuc: provider.energy_nuc(),
            h1: hcore_mo(provider, mo),
            paaa: provider.ao2mo([mo, &mo_cas, &mo_cas, &mo_cas]),
            ppaa: provider.ao2mo([mo, mo, &mo_cas, &mo_cas]),
            papa: provider.ao2mo([mo, &mo_cas, mo, &mo_cas]),
            ncore: partition.ncore(),
            ncas: partition.ncas(),
        }
    }

    pub fn nmo(&self) -> usize {
        self.h1.nrows()
    }

    pub fn aaaa(&self) -> Tensor4 {
        let a = 0..self.ncas;
        self.paaa.block([self.ncore..self.ncore + self.ncas, a.clone(), a.clone(), a])
    }

    /// `(uv|wx)` restricted to one fragment, `local` indexing the active space
    pub fn fragment_eri(&self, local: Range<usize>) -> Tensor4 {
        let rows = self.ncore + local.start..self.ncore + local.end;
        self.paaa.block([rows, local.clone(), local.clone(), local])
    }

    /// Integrals in the rotated orbitals `mo u`.
    ///
    /// Each slice goes through four sequential one-index contractions. The
    /// result is exact only when `u` does not mix active orbitals with
    /// inactive or external ones.
    pub fn rotated(&self, u: &DMatrix<f64>) -> MoIntegrals {
        let ua = sub_block(u, self.ncore..self.ncore + self.ncas);
        MoIntegrals {
            e_nuc: self.e_nuc,
            h1: u.transpose() * &self.h1 * u,
            paaa: self.paaa.transform([u, &ua, &ua, &ua]),
            ppaa: self.ppaa.transform([u, u, &ua, &ua]),
            papa: self.papa.transform([u, &ua, u, &ua]),
            ncore: self.ncore,
            ncas: self.ncas,
        }
    }
}

/// `B(X, Y)_uvwx = X_uv Y_wx - sum_s X^s_ux Y^s_wv`, the disconnected part of
/// a two-body density built from spin-resolved one-body densities.
pub fn mean_field_2rdm(x: &[DMatrix<f64>; 2], y: &[DMatrix<f64>; 2]) -> Tensor4 {
    let n = x[0].nrows();
    let xs = &x[0] + &x[1];
    let ys = &y[0] + &y[1];
    Tensor4::from_fn([n; 4], |u, v, w, t| {
        xs[(u, v)] * ys[(w, t)] - x[0][(u, t)] * y[0][(w, v)] - x[1][(u, t)] * y[1][(w, v)]
    })
}

/// Place a fragment block into an `nmo x nmo` matrix
pub fn embed_fragment(partition: &FragmentPartition, f: usize, local: &DMatrix<f64>) -> DMatrix<f64> {
    let mut m = DMatrix::zeros(partition.nmo(), partition.nmo());
    set_sub_block(&mut m, partition.frag_range(f).start, local);
    m
}

/// Doubly occupied inactive orbitals
pub fn core_dm1s(partition: &FragmentPartition) -> [DMatrix<f64>; 2] {
    let nmo = partition.nmo();
    let d = DMatrix::from_fn(nmo, nmo, |p, q| if p == q && p < partition.ncore() { 1.0 } else { 0.0 });
    [d.clone(), d]
}

fn frobenius(a: &DMatrix<f64>, b: &DMatrix<f64>) -> f64 {
    a.component_mul(b).sum()
}

/// Cumulant `sym(G - B(D, D))` of one fragment state
pub fn fragment_cumulant(solver: &dyn LocalCiSolver, c: &DVector<f64>) -> Tensor4 {
    let d = solver.make_rdm1s(c);
    let (_, mut lam) = solver.make_rdm12(c);
    lam.axpy(-1.0, &mean_field_2rdm(&d, &d));
    lam.symmetrize_8fold()
}

/// Hamiltonian of fragment `f` in the field of the environment density
/// `dm_env` (inactive orbitals plus every other fragment), whose mean-field
/// potential is `v_env`. `e_corr_env` is the cumulant energy of the other
/// fragments. The constant folds in the environment energy, so `<c|H|c>` is
/// the total energy.
pub fn assemble_fragment_hamiltonian(
    ints: &MoIntegrals,
    partition: &FragmentPartition,
    f: usize,
    dm_env: &[DMatrix<f64>; 2],
    v_env: &[DMatrix<f64>; 2],
    e_corr_env: f64,
) -> Hamiltonian {
    let range = partition.frag_range(f);
    let mut h0 = ints.e_nuc + e_corr_env;
    for s in 0..2 {
        let op = &ints.h1 + &v_env[s] * 0.5;
        h0 += frobenius(&op, &dm_env[s]);
    }
    let h1 = [
        sub_block(&(&ints.h1 + &v_env[0]), range.clone()),
        sub_block(&(&ints.h1 + &v_env[1]), range),
    ];
    Hamiltonian::new(h0, h1, ints.fragment_eri(partition.local_range(f)))
}

/// Fragment Hamiltonian for an explicitly given environment density
pub fn fragment_hamiltonian(
    problem: &LasProblem,
    ints: &MoIntegrals,
    mo: &DMatrix<f64>,
    dm_env: &[DMatrix<f64>; 2],
    e_corr_env: f64,
    f: usize,
) -> Hamiltonian {
    let v_env = veff_mo(problem.provider(), mo, dm_env);
    assemble_fragment_hamiltonian(ints, problem.partition(), f, dm_env, &v_env, e_corr_env)
}

/// `1/2 (uv|wx) lambda_uvwx` over one fragment
pub fn cumulant_energy(ints: &MoIntegrals, partition: &FragmentPartition, f: usize, lam: &Tensor4) -> f64 {
    0.5 * ints.fragment_eri(partition.local_range(f)).dot(lam)
}

/// Everything derived from one rootspace's CI vectors
#[derive(Debug, Clone)]
pub struct RootState {
    pub weight: f64,
    pub energy: f64,
    pub dm1s: [DMatrix<f64>; 2],
    pub frag_dm1s: Vec<[DMatrix<f64>; 2]>,
    /// Fragment-block-diagonal cumulant over the active space
    pub cumulant: Tensor4,
    pub veff: [DMatrix<f64>; 2],
    /// Mean-field potential of each fragment's own density
    pub vself: Vec<[DMatrix<f64>; 2]>,
    pub fock: [DMatrix<f64>; 2],
    /// `Lambda[p, u] = sum (pv|wx) lambda[u, v, w, x]`, active columns only
    pub lam: DMatrix<f64>,
    /// Generalized Fock matrix `sum_s F^s D^s + Lambda`
    pub f1: DMatrix<f64>,
    pub frag_hams: Vec<Hamiltonian>,
}

pub struct LasContext<'a> {
    pub problem: &'a LasProblem,
    pub keyframe: &'a LasKeyframe,
    pub ints: MoIntegrals,
    pub roots: Vec<RootState>,
    /// State-averaged generalized Fock matrix
    pub f1: DMatrix<f64>,
    pub e_tot: f64,
}

impl<'a> LasContext<'a> {
    pub fn new(problem: &'a LasProblem, keyframe: &'a LasKeyframe) -> Self {
        let ints = MoIntegrals::new(problem.provider(), &keyframe.mo, problem.partition());
        Self::with_integrals(problem, keyframe, ints)
    }

    pub fn with_integrals(problem: &'a LasProblem, keyframe: &'a LasKeyframe, ints: MoIntegrals) -> Self {
        assert_eq!(keyframe.ci.len(), problem.nroots(), "one CI list per rootspace is required");
        let partition = problem.partition();
        let nmo = partition.nmo();
        let ncore = partition.ncore();
        let ncas = partition.ncas();
        let aaaa = ints.aaaa();

        let roots: Vec<RootState> = keyframe
            .ci
            .iter()
            .enumerate()
            .map(|(r, ci_r)| {
                assert_eq!(ci_r.len(), partition.nfrags(), "one CI vector per fragment is required");
                let mut dm1s = core_dm1s(partition);
                let mut cumulant = Tensor4::cubic(ncas);
                let mut frag_dm1s = Vec::with_capacity(partition.nfrags());
                let mut e_corr = Vec::with_capacity(partition.nfrags());
                for (f, c) in ci_r.iter().enumerate() {
                    let solver = problem.solver(r, f);
                    let d = solver.make_rdm1s(c);
                    let lam = fragment_cumulant(solver, c);
                    e_corr.push(cumulant_energy(&ints, partition, f, &lam));
                    cumulant.set_block([partition.local_range(f).start; 4], &lam);
                    for s in 0..2 {
                        dm1s[s] += embed_fragment(partition, f, &d[s]);
                    }
                    frag_dm1s.push(d);
                }

                let veff = veff_mo(problem.provider(), &keyframe.mo, &dm1s);
                let fock = [&ints.h1 + &veff[0], &ints.h1 + &veff[1]];

                let mut energy = ints.e_nuc + 0.5 * aaaa.dot(&cumulant);
                for s in 0..2 {
                    energy += frobenius(&(&ints.h1 + &veff[s] * 0.5), &dm1s[s]);
                }

                let lam_act = ints.paaa.contract_last3(&cumulant);
                let mut lam = DMatrix::zeros(nmo, nmo);
                lam.columns_mut(ncore, ncas).copy_from(&lam_act);
                let f1 = &fock[0] * &dm1s[0] + &fock[1] * &dm1s[1] + &lam;

                let mut vself = Vec::with_capacity(partition.nfrags());
                let mut frag_hams = Vec::with_capacity(partition.nfrags());
                for (f, d) in frag_dm1s.iter().enumerate() {
                    let embedded = [embed_fragment(partition, f, &d[0]), embed_fragment(partition, f, &d[1])];
                    let vs = veff_mo(problem.provider(), &keyframe.mo, &embedded);
                    let dm_env = [&dm1s[0] - &embedded[0], &dm1s[1] - &embedded[1]];
                    let v_env = [&veff[0] - &vs[0], &veff[1] - &vs[1]];
                    let e_corr_env: f64 = e_corr.iter().sum::<f64>() - e_corr[f];
                    frag_hams.push(assemble_fragment_hamiltonian(
                        &ints, partition, f, &dm_env, &v_env, e_corr_env,
                    ));
                    vself.push(vs);
                }

                RootState {
                    weight: problem.rootspaces()[r].weight,
                    energy,
                    dm1s,
                    frag_dm1s,
                    cumulant,
                    veff,
                    vself,
                    fock,
                    lam,
                    f1,
                    frag_hams,
                }
            })
            .collect();

        let mut f1 = DMatrix::zeros(nmo, nmo);
        let mut e_tot = 0.0;
        for root in &roots {
            f1 += &root.f1 * root.weight;
            e_tot += root.energy * root.weight;
        }

        LasContext {
            problem,
            keyframe,
            ints,
            roots,
            f1,
            e_tot,
        }
    }

    pub fn partition(&self) -> &FragmentPartition {
        self.problem.partition()
    }

    pub fn e_states(&self) -> Vec<f64> {
        self.roots.iter().map(|r| r.energy).collect()
    }

    /// Mean-field potential of an arbitrary MO-basis spin density
    pub fn veff_of(&self, dm1s: &[DMatrix<f64>; 2]) -> [DMatrix<f64>; 2] {
        veff_mo(self.problem.provider(), &self.keyframe.mo, dm1s)
    }

    /// Spin-averaged, state-averaged Fock matrix
    pub fn sa_fock(&self) -> DMatrix<f64> {
        let nmo = self.partition().nmo();
        self.roots.iter().fold(DMatrix::zeros(nmo, nmo), |acc, r| {
            acc + (&r.fock[0] + &r.fock[1]) * (0.5 * r.weight)
        })
    }
}
