use crate::config::Config;
use crate::integrals::{DfIntegrals, IntegralProvider, LatticeModel};
use crate::io::Fcidump;
use color_eyre::eyre::{eyre, Result};
use std::sync::Arc;
use tracing::info;

/// Integral source prepared from the user configuration, with the irrep
/// labels it carries
pub struct System {
    pub provider: Arc<dyn IntegralProvider>,
    pub orbsym: Option<Vec<u8>>,
}

/// Build the integral provider defined in the YAML configuration.
pub fn build_system(config: &Config) -> Result<System> {
    info!("Preparing integrals...");
    let kind = config.system.integrals.as_deref().unwrap_or("dense");
    let density_fitted = match kind {
        "dense" => false,
        "density_fitted" | "df" => true,
        other => return Err(eyre!("Unknown integral kind: {}", other)),
    };

    let system = match (&config.system.fcidump, &config.system.lattice) {
        (Some(path), None) => {
            let dump = Fcidump::read(path)?;
            let dense = dump.integrals();
            let provider: Arc<dyn IntegralProvider> = if density_fitted {
                Arc::new(DfIntegrals::from_eri(dump.h1.clone(), dense.eri(), dump.e_nuc, 1e-10))
            } else {
                Arc::new(dense)
            };
            System {
                provider,
                orbsym: dump.orbsym,
            }
        }
        (None, Some(lattice)) => {
            let chain = LatticeModel::dimer_chain(
                lattice.ndimers,
                lattice.t_intra.unwrap_or(1.0),
                lattice.t_inter.unwrap_or(0.15),
                lattice.hubbard_u.unwrap_or(2.0),
            );
            let model = if lattice.embedded.unwrap_or(true) {
                chain.embedded()
            } else {
                chain
            };
            info!("Lattice model with {} sites", model.nsites());
            let provider: Arc<dyn IntegralProvider> = if density_fitted {
                Arc::new(model.density_fitted())
            } else {
                Arc::new(model.dense())
            };
            System { provider, orbsym: None }
        }
        (Some(_), Some(_)) => return Err(eyre!("Specify either system.fcidump or system.lattice, not both")),
        (None, None) => return Err(eyre!("The system section needs an fcidump path or a lattice model")),
    };
    info!(
        "Integral provider: {} ({} basis functions)",
        system.provider.kind(),
        system.provider.nao()
    );
    Ok(system)
}
