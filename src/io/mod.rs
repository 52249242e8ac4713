//! Input/Output operations
//!
//! This module handles logging setup, result summaries and FCIDUMP input.

mod fcidump;
mod output;

pub use fcidump::Fcidump;
pub use output::{print_energy_summary, setup_output};
