mod report;
mod runner;
mod system;

pub use runner::{build_problem, build_rootspaces, configure_lassis, run_las, run_lassi};
pub use system::{build_system, System};

use self::report::{report_las_summary, report_lassi_summary, write_summary_file};
use crate::config::{Args, Config};
use crate::io::setup_output;
use clap::Parser;
use color_eyre::eyre::{eyre, Result, WrapErr};
use fci::{ComputeBackend, RayonBackend, SerialBackend};
use std::fs;
use std::sync::Arc;
use tracing::info;

pub struct LasApplication {
    args: Args,
    config: Config,
}

impl LasApplication {
    pub fn from_cli() -> Result<Self> {
        let args = Args::parse();
        let config = load_config(&args)?;
        Ok(Self { args, config })
    }

    pub fn run(self) -> Result<()> {
        setup_output(self.args.output.as_ref());

        let backend = select_backend(self.args.backend.as_deref().or(self.config.backend.as_deref()))?;
        let system = build_system(&self.config)?;
        let problem = build_problem(&system, &self.config, backend.clone())?;

        let las = run_las(&problem, &self.args, &self.config)?;
        report_las_summary(&las);

        let lassi = run_lassi(&problem, &las, &self.args, &self.config, backend);
        if let Some(lassi) = lassi.as_ref() {
            report_lassi_summary(&las, lassi);
        }

        if let Some(path) = self.args.summary.as_deref() {
            write_summary_file(path, &las, lassi.as_ref())?;
        }
        Ok(())
    }
}

fn load_config(args: &Args) -> Result<Config> {
    let config_content = fs::read_to_string(&args.config_file)
        .wrap_err_with(|| format!("Unable to read configuration file: {}", args.config_file))?;

    let config = serde_yml::from_str::<Config>(&config_content)
        .wrap_err("Failed to parse configuration file")?
        .with_defaults();

    Ok(config)
}

/// Dense CI kernels run serially or on the rayon thread pool.
pub fn select_backend(name: Option<&str>) -> Result<Arc<dyn ComputeBackend>> {
    match name.unwrap_or("serial") {
        "serial" => Ok(Arc::new(SerialBackend)),
        "rayon" => {
            info!("Using the rayon backend with {} threads", rayon::current_num_threads());
            Ok(Arc::new(RayonBackend))
        }
        other => Err(eyre!("Unknown compute backend: {}", other)),
    }
}
