//! Matrix-free Hessian of the state-averaged LAS energy
//!
//! The orbital generator enters as `kappa_hat = kappa / 2` with
//! `U = exp(kappa_hat)`. Orbital-response densities are one-index
//! transformations `kappa_hat D - D kappa_hat`; CI-response densities are
//! symmetrized transition densities `<dc|..|c> + <c|..|dc>`.

use super::context::{embed_fragment, mean_field_2rdm, LasContext};
use super::ugg::UnitaryGroupGenerators;
use crate::linalg::{one_index, sub_block, Tensor4};
use crate::optim_impl::{DiagonalPreconditioner, LinearOperator};
use fci::Hamiltonian;
use nalgebra::{DMatrix, DVector};

const PREC_FLOOR: f64 = 1e-8;

pub struct LasHessian<'a> {
    ctx: &'a LasContext<'a>,
    ugg: &'a UnitaryGroupGenerators,
    level_shift: f64,
    /// `(H_f - e_f) c_f` per rootspace and fragment
    hci0: Vec<Vec<DVector<f64>>>,
    e_frag: Vec<Vec<f64>>,
    /// `F1 - F1^T`
    gm: DMatrix<f64>,
}

impl<'a> LasHessian<'a> {
    pub fn new(ctx: &'a LasContext<'a>, ugg: &'a UnitaryGroupGenerators, level_shift: f64) -> Self {
        let problem = ctx.problem;
        let mut hci0 = Vec::with_capacity(ctx.roots.len());
        let mut e_frag = Vec::with_capacity(ctx.roots.len());
        for (r, root) in ctx.roots.iter().enumerate() {
            let mut h_r = Vec::with_capacity(root.frag_hams.len());
            let mut e_r = Vec::with_capacity(root.frag_hams.len());
            for (f, ham) in root.frag_hams.iter().enumerate() {
                let c = &ctx.keyframe.ci[r][f];
                let hc = problem.solver(r, f).contract_h(ham, c);
                let e = c.dot(&hc);
                h_r.push(hc - c * e);
                e_r.push(e);
            }
            hci0.push(h_r);
            e_frag.push(e_r);
        }
        LasHessian {
            ctx,
            ugg,
            level_shift,
            hci0,
            e_frag,
            gm: &ctx.f1 - ctx.f1.transpose(),
        }
    }

    /// Energy of each fragment Hamiltonian at its own CI vector
    pub fn fragment_energies(&self) -> &[Vec<f64>] {
        &self.e_frag
    }

    /// Packed gradient: `F1 - F1^T` on the orbital pairs, `2 w (H - e) c`
    /// on the CI blocks.
    pub fn get_grad(&self) -> DVector<f64> {
        let gci: Vec<Vec<DVector<f64>>> = self
            .hci0
            .iter()
            .zip(self.ctx.roots.iter())
            .map(|(h_r, root)| h_r.iter().map(|hc| hc * (2.0 * root.weight)).collect())
            .collect();
        self.ugg.pack(&self.gm, &gci)
    }

    /// Norm of the gradient over rotations that are not optimized
    pub fn get_gx(&self) -> f64 {
        self.ugg
            .gx_pairs()
            .iter()
            .map(|&(p, q)| self.gm[(p, q)].powi(2))
            .sum::<f64>()
            .sqrt()
    }

    /// Diagonal approximation, clamped away from zero
    pub fn get_prec(&self) -> DiagonalPreconditioner {
        let mut diag = Vec::with_capacity(self.ugg.nvar_tot());
        for &(p, q) in self.ugg.pairs() {
            let mut h = -self.ctx.f1[(p, p)] - self.ctx.f1[(q, q)];
            for root in &self.ctx.roots {
                for s in 0..2 {
                    let (f, n) = (&root.fock[s], &root.dm1s[s]);
                    h += root.weight * (f[(p, p)] * n[(q, q)] + f[(q, q)] * n[(p, p)]);
                }
            }
            diag.push(0.5 * h + self.level_shift);
        }
        let nfrags = self.ctx.partition().nfrags();
        let problem = self.ctx.problem;
        for f in 0..nfrags {
            for (r, root) in self.ctx.roots.iter().enumerate() {
                let hdiag = problem.solver(r, f).make_hdiag(&root.frag_hams[f]);
                let e = self.e_frag[r][f];
                diag.extend(
                    hdiag
                        .iter()
                        .map(|&h| 2.0 * root.weight * (h - e) + self.level_shift * root.weight),
                );
            }
        }
        DiagonalPreconditioner::new(DVector::from_vec(diag), PREC_FLOOR)
    }

    /// `(F1 - F1^T)` response of one rootspace to the combined orbital and
    /// CI density change `edm`, excluding the commutator with the gradient.
    fn orbital_response(
        &self,
        r: usize,
        kappa_hat: &DMatrix<f64>,
        edm: &[DMatrix<f64>; 2],
        v_edm: &[DMatrix<f64>; 2],
        dlam: &Tensor4,
    ) -> DMatrix<f64> {
        let root = &self.ctx.roots[r];
        let partition = self.ctx.partition();
        let (nmo, ncore, ncas) = (partition.nmo(), partition.ncore(), partition.ncas());
        let ints = &self.ctx.ints;

        let mut f1 = DMatrix::zeros(nmo, nmo);
        for s in 0..2 {
            f1 += &root.fock[s] * &edm[s] + &v_edm[s] * &root.dm1s[s];
        }
        f1 -= &root.lam * kappa_hat;

        // External legs of the one-index transformed cumulant
        let k_act_t = kappa_hat.columns(ncore, ncas).transpose();
        let xb = root.cumulant.transform_axis(1, &k_act_t);
        let xc = root.cumulant.transform_axis(2, &k_act_t);
        let mut lam_ext = ints.ppaa.contract_last3(&xb) + ints.papa.contract_last3(&xc) * 2.0;
        lam_ext += ints.paaa.contract_last3(dlam);
        let mut cols = f1.columns_mut(ncore, ncas);
        cols += lam_ext;
        f1
    }

    /// Fragment Hamiltonian derivative along `kappa_hat` plus the
    /// mean-field coupling to the other fragments' density changes.
    fn ci_response_hamiltonian(
        &self,
        r: usize,
        g: usize,
        kappa_hat: &DMatrix<f64>,
        v_env_change: &[DMatrix<f64>; 2],
    ) -> Hamiltonian {
        let root = &self.ctx.roots[r];
        let partition = self.ctx.partition();
        let range = partition.frag_range(g);
        let local = partition.local_range(g);
        let ng = range.len();

        let h1: Vec<DMatrix<f64>> = (0..2)
            .map(|s| {
                let heff = &root.fock[s] - &root.vself[g][s];
                let rotated = &heff * kappa_hat - kappa_hat * &heff;
                sub_block(&(rotated + &v_env_change[s]), range.clone())
            })
            .collect();

        let eri_g = self
            .ctx
            .ints
            .paaa
            .block([0..partition.nmo(), local.clone(), local.clone(), local]);
        let kcols = kappa_hat.columns(range.start, ng).into_owned();
        let p = eri_g.transform_axis(0, &kcols);
        let h2 = Tensor4::from_fn([ng; 4], |u, v, w, x| {
            p[(u, v, w, x)] + p[(v, u, w, x)] + p[(w, x, u, v)] + p[(x, w, u, v)]
        });
        Hamiltonian::new(0.0, [h1[0].clone(), h1[1].clone()], h2)
    }
}

impl LinearOperator for LasHessian<'_> {
    fn dim(&self) -> usize {
        self.ugg.nvar_tot()
    }

    fn matvec(&self, x: &DVector<f64>) -> DVector<f64> {
        let (kappa, dci) = self.ugg.unpack(x);
        let kappa_hat = &kappa * 0.5;
        let ctx = self.ctx;
        let problem = ctx.problem;
        let partition = ctx.partition();
        let (nmo, ncas, nfrags) = (partition.nmo(), partition.ncas(), partition.nfrags());

        let mut orb = DMatrix::zeros(nmo, nmo);
        let mut ci_out: Vec<Vec<DVector<f64>>> = Vec::with_capacity(ctx.roots.len());

        for (r, root) in ctx.roots.iter().enumerate() {
            let w = root.weight;
            let ci_r = &ctx.keyframe.ci[r];

            // Orbital-rotated densities, total and per fragment
            let dt = [
                one_index(&root.dm1s[0], &kappa_hat) * -1.0,
                one_index(&root.dm1s[1], &kappa_hat) * -1.0,
            ];
            let mut frag_dt = Vec::with_capacity(nfrags);
            let mut tdm = Vec::with_capacity(nfrags);
            let mut dlam = Tensor4::cubic(ncas);
            let mut edm = dt.clone();
            for f in 0..nfrags {
                let solver = problem.solver(r, f);
                let (c, dc) = (&ci_r[f], &dci[r][f]);
                let d = &root.frag_dm1s[f];
                let emb = [embed_fragment(partition, f, &d[0]), embed_fragment(partition, f, &d[1])];
                frag_dt.push([
                    one_index(&emb[0], &kappa_hat) * -1.0,
                    one_index(&emb[1], &kappa_hat) * -1.0,
                ]);

                let t1 = solver.trans_rdm1s(dc, c);
                let t2 = solver.trans_rdm1s(c, dc);
                let dd = [&t1[0] + &t2[0], &t1[1] + &t2[1]];
                let (_, mut g2) = solver.trans_rdm12(dc, c);
                g2.axpy(1.0, &solver.trans_rdm12(c, dc).1);
                g2.axpy(-1.0, &mean_field_2rdm(&dd, d));
                g2.axpy(-1.0, &mean_field_2rdm(d, &dd));
                dlam.set_block([partition.local_range(f).start; 4], &g2.symmetrize_8fold());

                let dd_emb = [embed_fragment(partition, f, &dd[0]), embed_fragment(partition, f, &dd[1])];
                edm[0] += &dd_emb[0];
                edm[1] += &dd_emb[1];
                tdm.push(dd_emb);
            }
            let v_edm = ctx.veff_of(&edm);

            orb += self.orbital_response(r, &kappa_hat, &edm, &v_edm, &dlam) * w;

            let mut sigma_r = Vec::with_capacity(nfrags);
            for g in 0..nfrags {
                let solver = problem.solver(r, g);
                let (c, dc) = (&ci_r[g], &dci[r][g]);
                let own = [&frag_dt[g][0] + &tdm[g][0], &frag_dt[g][1] + &tdm[g][1]];
                let v_own = ctx.veff_of(&own);
                let v_env = [&v_edm[0] - &v_own[0], &v_edm[1] - &v_own[1]];
                let dham = self.ci_response_hamiltonian(r, g, &kappa_hat, &v_env);

                let ham = &root.frag_hams[g];
                let mut sigma = solver.contract_h(ham, dc) - dc * self.e_frag[r][g];
                sigma += solver.contract_h(&dham, c);
                sigma *= 2.0 * w;
                sigma += dc * (self.level_shift * w);
                sigma_r.push(sigma);
            }
            ci_out.push(sigma_r);
        }

        let mut m = &orb - orb.transpose();
        m += (&self.gm * &kappa_hat - &kappa_hat * &self.gm) * 0.5;
        let mut hx = self.ugg.pack(&m, &ci_out);
        let norb = self.ugg.nvar_orb();
        let mut orb_part = hx.rows_mut(0, norb);
        orb_part += x.rows(0, norb) * self.level_shift;
        hx
    }
}
