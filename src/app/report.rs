use crate::io::print_energy_summary;
use crate::las_impl::LasResult;
use crate::lassi_impl::LassiResult;
use color_eyre::eyre::{Result, WrapErr};
use std::fs::File;
use std::io::BufWriter;
use tracing::{info, warn};

pub fn report_las_summary(las: &LasResult) {
    if las.converged {
        info!("\nLASSCF converged in {} macro iterations.", las.niter);
    } else {
        warn!("\nLASSCF did not converge in {} macro iterations.", las.niter);
    }

    if las.e_states.len() > 1 {
        info!("\nRootspace energies:");
        for (r, e) in las.e_states.iter().enumerate() {
            info!("  Rootspace {}: {:.10} au", r, e);
        }
    }
    info!("\nLASSCF (state-averaged) energy: {:.10} au", las.e_tot);
}

pub fn report_lassi_summary(las: &LasResult, lassi: &LassiResult) {
    info!(
        "\nLASSI over {} rootspaces ({} product states)",
        lassi.model.len(),
        lassi.model.nstates()
    );
    info!("  Reference energy:   {:.10} au", lassi.e_reference);
    info!("  LASSI ground state: {:.10} au", lassi.e_tot());
    info!("  Correlation from state interaction: {:.10} au", lassi.e_tot() - las.e_states[0]);
    if !lassi.converged {
        warn!("  Some fragment solves did not converge");
    }

    let weights = lassi
        .solution
        .rootspace_weights(&lassi.ovlp, &lassi.model.offsets(), 0);
    info!("\nGround-state rootspace weights:");
    for (i, w) in weights.iter().enumerate().filter(|(_, w)| **w > 1e-4) {
        info!("  {:>4} {:?}: {:.6}", i, lassi.model.spaces()[i].key(), w);
    }
}

pub fn write_summary_file(path: &str, las: &LasResult, lassi: Option<&LassiResult>) -> Result<()> {
    let file = File::create(path).wrap_err_with(|| format!("Unable to create summary file: {}", path))?;
    let mut writer = BufWriter::new(file);
    print_energy_summary(&mut writer, las, lassi)?;
    info!("Energy summary written to {}", path);
    Ok(())
}
