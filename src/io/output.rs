//! Output formatting and logging utilities

use crate::las_impl::LasResult;
use crate::lassi_impl::LassiResult;
use color_eyre::eyre::Result;
use std::fmt;
use std::fs::File;
use std::io::Write;
use std::time::SystemTime as StdSystemTime;
use tracing::info;
use tracing_subscriber::{
    fmt::format::Writer, fmt::layer, fmt::time::FormatTime, layer::SubscriberExt, util::SubscriberInitExt,
    Registry,
};

/// Wall-clock time as HH:MM:SS
struct SecondPrecisionTimer;

impl FormatTime for SecondPrecisionTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        let total_seconds = StdSystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let hours = (total_seconds / 3600) % 24;
        let minutes = (total_seconds / 60) % 60;
        let seconds = total_seconds % 60;
        write!(w, "{:02}:{:02}:{:02}", hours, minutes, seconds)
    }
}

/// Setup output logging to file or stdout
pub fn setup_output(output_path: Option<&String>) {
    match output_path {
        Some(path) => match File::create(path) {
            Ok(log) => {
                let file_layer = layer()
                    .with_writer(log)
                    .with_timer(SecondPrecisionTimer)
                    .with_ansi(false);
                Registry::default().with(file_layer).init();
                info!("Output will be written to: {}", path);
            }
            Err(err) => eprintln!("Could not create output file {}: {}", path, err),
        },
        None => {
            let stdout_layer = layer()
                .with_writer(std::io::stdout)
                .with_timer(SecondPrecisionTimer)
                .with_ansi(true);
            Registry::default().with(stdout_layer).init();
            info!("Output will be printed to stdout");
        }
    }
}

/// Plain-text energy summary of a run
pub fn print_energy_summary<W: Write>(writer: &mut W, las: &LasResult, lassi: Option<&LassiResult>) -> Result<()> {
    writeln!(
        writer,
        "LASSCF {} after {} macro iterations",
        if las.converged { "converged" } else { "not converged" },
        las.niter
    )?;
    writeln!(writer, "LASSCF energy: {:.10} au", las.e_tot)?;
    for (r, e) in las.e_states.iter().enumerate() {
        writeln!(writer, "  rootspace {}: {:.10} au", r, e)?;
    }
    if let Some(lassi) = lassi {
        writeln!(
            writer,
            "LASSI over {} rootspaces ({} product states)",
            lassi.model.len(),
            lassi.model.nstates()
        )?;
        for k in 0..lassi.solution.nroots().min(10) {
            writeln!(
                writer,
                "  state {}: {:.10} au  <S^2> = {:.6}",
                k, lassi.solution.energies[k], lassi.solution.s2[k]
            )?;
        }
    }
    Ok(())
}
