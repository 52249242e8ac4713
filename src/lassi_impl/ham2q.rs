//! Active-space second-quantized Hamiltonian and its fragment embeddings

use crate::ci_impl::LocalCiSolver;
use crate::integrals::veff_mo;
use crate::las_impl::{core_dm1s, fragment_cumulant, LasProblem, MoIntegrals};
use crate::linalg::{sub_block, Tensor4};
use fci::Hamiltonian;
use nalgebra::{DMatrix, DVector};
use std::ops::Range;

/// `(h0, h1, h2)` over the active orbitals of `mo`.
///
/// The inactive orbitals are folded in: `h0` carries the nuclear and core
/// energy and `h1` the core mean field.
pub fn ham_2q(problem: &LasProblem, mo: &DMatrix<f64>) -> Hamiltonian {
    let partition = problem.partition();
    let ints = MoIntegrals::new(problem.provider(), mo, partition);
    let dm_core = core_dm1s(partition);
    let v_core = veff_mo(problem.provider(), mo, &dm_core);
    let mut h0 = ints.e_nuc;
    for s in 0..2 {
        h0 += (&ints.h1 + &v_core[s] * 0.5).component_mul(&dm_core[s]).sum();
    }
    let act = partition.ncore()..partition.nocc();
    let h1 = [
        sub_block(&(&ints.h1 + &v_core[0]), act.clone()),
        sub_block(&(&ints.h1 + &v_core[1]), act),
    ];
    Hamiltonian::new(h0, h1, ints.aaaa())
}

/// `V^s = J[Da + Db] - K[Ds]` from active-space integrals
pub fn veff_active(h2: &Tensor4, dm1s: &[DMatrix<f64>; 2]) -> [DMatrix<f64>; 2] {
    let n = dm1s[0].nrows();
    let dt = &dm1s[0] + &dm1s[1];
    let mut j = DMatrix::zeros(n, n);
    let mut k = [DMatrix::zeros(n, n), DMatrix::zeros(n, n)];
    for p in 0..n {
        for q in 0..n {
            for r in 0..n {
                for s in 0..n {
                    j[(p, q)] += h2[(p, q, r, s)] * dt[(r, s)];
                    for sp in 0..2 {
                        k[sp][(p, q)] += h2[(p, r, s, q)] * dm1s[sp][(r, s)];
                    }
                }
            }
        }
    }
    [&j - &k[0], j - &k[1]]
}

/// Weighted-average densities of one fragment's states, embedded in the
/// active space, and the matching cumulant energy
#[derive(Debug, Clone)]
pub struct FragmentDensity {
    pub dm1s: [DMatrix<f64>; 2],
    pub e_cumulant: f64,
}

impl FragmentDensity {
    pub fn from_states(
        solver: &dyn LocalCiSolver,
        states: &[(DVector<f64>, f64)],
        ham: &Hamiltonian,
        range: Range<usize>,
    ) -> Self {
        let n = ham.norb();
        let eri = ham.h2.block([range.clone(), range.clone(), range.clone(), range.clone()]);
        let mut dm1s = [DMatrix::zeros(n, n), DMatrix::zeros(n, n)];
        let mut e_cumulant = 0.0;
        for (c, w) in states {
            let d = solver.make_rdm1s(c);
            for s in 0..2 {
                let mut view = dm1s[s].view_mut((range.start, range.start), (range.len(), range.len()));
                view += &d[s] * *w;
            }
            e_cumulant += w * 0.5 * eri.dot(&fragment_cumulant(solver, c));
        }
        FragmentDensity { dm1s, e_cumulant }
    }
}

/// Hamiltonian of the fragment on `range` in the mean field of `env`.
///
/// The constant carries the environment energy, so `<c|H|c>` is the
/// mean-field energy of the whole product state.
pub fn embedded_fragment_hamiltonian(ham: &Hamiltonian, range: Range<usize>, env: &[&FragmentDensity]) -> Hamiltonian {
    let n = ham.norb();
    let mut dm = [DMatrix::zeros(n, n), DMatrix::zeros(n, n)];
    let mut h0 = ham.h0;
    for d in env {
        dm[0] += &d.dm1s[0];
        dm[1] += &d.dm1s[1];
        h0 += d.e_cumulant;
    }
    let v = veff_active(&ham.h2, &dm);
    for s in 0..2 {
        h0 += (&ham.h1[s] + &v[s] * 0.5).component_mul(&dm[s]).sum();
    }
    let h1 = [
        sub_block(&(&ham.h1[0] + &v[0]), range.clone()),
        sub_block(&(&ham.h1[1] + &v[1]), range.clone()),
    ];
    Hamiltonian::new(h0, h1, ham.h2.block([range.clone(), range.clone(), range.clone(), range]))
}
