//! LASSCF Command-Line Interface
//!
//! Runs a LASSCF optimization from a YAML configuration, optionally
//! followed by LASSI or LASSIS state interaction.

use color_eyre::eyre::Result;
use lasscf::app::LasApplication;

fn main() -> Result<()> {
    color_eyre::install()?;
    LasApplication::from_cli()?.run()
}
