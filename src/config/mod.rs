//! Configuration management for LAS calculations
//!
//! A YAML file describes the integral source, the fragment partition and
//! the optimizer settings. Every optional section has a `*Params` struct
//! whose missing fields are filled by `with_defaults`.

mod args;

pub use args::Args;

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    pub system: SystemParams,
    pub las: LasParams,
    pub optimizer: Option<OptimizerParams>,
    pub lassis: Option<LassisParams>,
    /// `serial` or `rayon`
    pub backend: Option<String>,
}

/// Where the integrals come from
#[derive(Debug, Deserialize, Serialize)]
pub struct SystemParams {
    pub fcidump: Option<String>,
    pub lattice: Option<LatticeParams>,
    /// `dense` or `density_fitted`
    pub integrals: Option<String>,
}

/// A chain of two-site units
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LatticeParams {
    pub ndimers: usize,
    pub t_intra: Option<f64>,
    pub t_inter: Option<f64>,
    pub hubbard_u: Option<f64>,
    /// Add an inactive and an external site at the ends
    pub embedded: Option<bool>,
}

impl LatticeParams {
    /// Apply default values to any missing parameters
    pub fn with_defaults(mut self) -> Self {
        self.t_intra = self.t_intra.or(Some(1.0));
        self.t_inter = self.t_inter.or(Some(0.15));
        self.hubbard_u = self.hubbard_u.or(Some(2.0));
        self.embedded = self.embedded.or(Some(true));
        self
    }
}

/// One rootspace of a state average
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RootspaceParams {
    pub nelec: Vec<(usize, usize)>,
    pub smult: Option<Vec<usize>>,
    pub weight: f64,
}

/// Fragment partition and wave function layout
#[derive(Debug, Deserialize, Serialize)]
pub struct LasParams {
    pub ncore: Option<usize>,
    pub ncas_sub: Vec<usize>,
    /// `(neleca, nelecb)` per fragment of the first rootspace
    pub nelecas_sub: Vec<(usize, usize)>,
    pub smult_sub: Option<Vec<usize>>,
    /// Further rootspaces for state averaging; the first one takes the
    /// remaining weight
    pub rootspaces: Option<Vec<RootspaceParams>>,
    pub frozen: Option<Vec<usize>>,
    pub orbsym: Option<Vec<u8>>,
    /// `lasscf` or `lasci`
    pub rotation_space: Option<String>,
}

impl LasParams {
    /// Lowest multiplicity compatible with each `(neleca, nelecb)`
    pub fn smult_or_lowest(smult: Option<&Vec<usize>>, nelec: &[(usize, usize)]) -> Vec<usize> {
        match smult {
            Some(s) => s.clone(),
            None => nelec.iter().map(|&(a, b)| a.abs_diff(b) + 1).collect(),
        }
    }
}

/// Macro/micro optimizer parameters
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OptimizerParams {
    pub conv_tol_grad: Option<f64>,
    pub ah_level_shift: Option<f64>,
    pub max_cycle_macro: Option<usize>,
    pub max_cycle_micro: Option<usize>,
    /// `cg` or `diagonal`
    pub linear_solver: Option<String>,
    pub canonicalize: Option<bool>,
}

impl Default for OptimizerParams {
    fn default() -> Self {
        OptimizerParams {
            conv_tol_grad: Some(1e-4),
            ah_level_shift: Some(1e-8),
            max_cycle_macro: Some(50),
            max_cycle_micro: Some(5),
            linear_solver: Some("cg".to_string()),
            canonicalize: Some(true),
        }
    }
}

impl OptimizerParams {
    /// Apply default values to any missing parameters
    pub fn with_defaults(mut self) -> Self {
        let defaults = Self::default();
        if self.conv_tol_grad.is_none() {
            self.conv_tol_grad = defaults.conv_tol_grad;
        }
        if self.ah_level_shift.is_none() {
            self.ah_level_shift = defaults.ah_level_shift;
        }
        if self.max_cycle_macro.is_none() {
            self.max_cycle_macro = defaults.max_cycle_macro;
        }
        if self.max_cycle_micro.is_none() {
            self.max_cycle_micro = defaults.max_cycle_micro;
        }
        if self.linear_solver.is_none() {
            self.linear_solver = defaults.linear_solver;
        }
        if self.canonicalize.is_none() {
            self.canonicalize = defaults.canonicalize;
        }
        self
    }
}

/// Automatic model-space state interaction
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LassisParams {
    pub enabled: Option<bool>,
    pub ncharge: Option<usize>,
    pub nspin: Option<usize>,
    pub sa_heff: Option<bool>,
    pub product_threshold: Option<usize>,
    /// Product-state solver iterations per excited-fragment relaxation
    pub max_cycle_macro: Option<usize>,
    pub conv_tol_self: Option<f64>,
    pub lindep: Option<f64>,
}

impl Default for LassisParams {
    fn default() -> Self {
        LassisParams {
            enabled: Some(false),
            ncharge: Some(1),
            nspin: Some(1),
            sa_heff: Some(true),
            product_threshold: Some(3),
            max_cycle_macro: Some(50),
            conv_tol_self: Some(1e-6),
            lindep: Some(1e-10),
        }
    }
}

impl LassisParams {
    /// Apply default values to any missing parameters
    pub fn with_defaults(mut self) -> Self {
        let defaults = Self::default();
        if self.enabled.is_none() {
            self.enabled = defaults.enabled;
        }
        if self.ncharge.is_none() {
            self.ncharge = defaults.ncharge;
        }
        if self.nspin.is_none() {
            self.nspin = defaults.nspin;
        }
        if self.sa_heff.is_none() {
            self.sa_heff = defaults.sa_heff;
        }
        if self.product_threshold.is_none() {
            self.product_threshold = defaults.product_threshold;
        }
        if self.max_cycle_macro.is_none() {
            self.max_cycle_macro = defaults.max_cycle_macro;
        }
        if self.conv_tol_self.is_none() {
            self.conv_tol_self = defaults.conv_tol_self;
        }
        if self.lindep.is_none() {
            self.lindep = defaults.lindep;
        }
        self
    }
}

impl Config {
    /// Apply defaults to all configuration sections
    pub fn with_defaults(mut self) -> Self {
        self.optimizer = Some(self.optimizer.take().unwrap_or_default().with_defaults());
        if let Some(lassis) = self.lassis.take() {
            self.lassis = Some(lassis.with_defaults());
        }
        if let Some(lattice) = self.system.lattice.take() {
            self.system.lattice = Some(lattice.with_defaults());
        }
        if self.backend.is_none() {
            self.backend = Some("serial".to_string());
        }
        self
    }

    /// Optimizer section; present after `with_defaults`
    pub fn optimizer(&self) -> OptimizerParams {
        self.optimizer.clone().unwrap_or_default().with_defaults()
    }

    /// Check if the LASSIS stage is enabled
    pub fn is_lassis_enabled(&self) -> bool {
        self.lassis.as_ref().and_then(|l| l.enabled).unwrap_or(false)
    }

    pub fn lassis(&self) -> LassisParams {
        self.lassis.clone().unwrap_or_default().with_defaults()
    }
}
