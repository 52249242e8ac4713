//! Command-line argument parsing

use clap::Parser;

/// LASSCF optimization and LASSI state interaction from a YAML configuration
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    pub config_file: String,

    /// Override output file: (default stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Write a plain-text energy summary to this file
    #[arg(long)]
    pub summary: Option<String>,

    /// Override the gradient convergence threshold
    #[arg(long)]
    pub conv_tol_grad: Option<f64>,

    /// Override maximum macro iterations
    #[arg(long)]
    pub max_cycle_macro: Option<usize>,

    /// Override maximum PCG iterations per macro iteration
    #[arg(long)]
    pub max_cycle_micro: Option<usize>,

    /// Override the compute backend (serial or rayon)
    #[arg(long)]
    pub backend: Option<String>,

    /// Run LASSIS after the LASSCF optimization
    #[arg(long)]
    pub lassis: bool,

    /// Local roots per charge-hop fragment in LASSIS
    #[arg(long)]
    pub ncharge: Option<usize>,

    /// Local roots per spin-flip fragment in LASSIS
    #[arg(long)]
    pub nspin: Option<usize>,
}
