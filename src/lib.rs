// Main library file for LAS calculations

pub mod app;
pub mod ci_impl;
pub mod config;
pub mod integrals;
pub mod io;
pub mod las_impl;
pub mod lassi_impl;
pub mod linalg;
pub mod optim_impl;
