use crate::app::system::System;
use crate::config::{Args, Config, LasParams};
use crate::las_impl::{FragmentPartition, LasDriver, LasOptions, LasProblem, LasResult, RootspaceSpec, RotationSpace};
use crate::lassi_impl::{lassi_from_las, LassiResult, Lassis, LassisOptions};
use crate::optim_impl::LinearSolverKind;
use color_eyre::eyre::{ensure, Result};
use fci::ComputeBackend;
use nalgebra::DMatrix;
use std::sync::Arc;
use tracing::info;

/// State-averaged rootspaces: the fragment charges given in `las` first,
/// then any extra rootspaces.
pub fn build_rootspaces(las: &LasParams) -> Result<Vec<RootspaceSpec>> {
    let extras = las.rootspaces.clone().unwrap_or_default();
    let extra_weight: f64 = extras.iter().map(|r| r.weight).sum();
    ensure!(
        extra_weight < 1.0,
        "Extra rootspace weights sum to {}, leaving nothing for the first rootspace",
        extra_weight
    );

    let mut rootspaces = Vec::with_capacity(extras.len() + 1);
    rootspaces.push(RootspaceSpec::new(
        las.nelecas_sub.clone(),
        LasParams::smult_or_lowest(las.smult_sub.as_ref(), &las.nelecas_sub),
        1.0 - extra_weight,
    ));
    for extra in extras {
        let smult = LasParams::smult_or_lowest(extra.smult.as_ref(), &extra.nelec);
        rootspaces.push(RootspaceSpec::new(extra.nelec, smult, extra.weight));
    }
    Ok(rootspaces)
}

pub fn build_problem(system: &System, config: &Config, backend: Arc<dyn ComputeBackend>) -> Result<LasProblem> {
    let las = &config.las;
    let nmo = system.provider.nao();
    let partition = FragmentPartition::new(las.ncore.unwrap_or(0), las.ncas_sub.clone(), nmo)?;
    let rootspaces = build_rootspaces(las)?;
    info!(
        "Fragments: {:?} orbitals, {} core, {} rootspace(s)",
        las.ncas_sub,
        partition.ncore(),
        rootspaces.len()
    );

    let mut problem = LasProblem::new(system.provider.clone(), partition, rootspaces, backend)?;
    if let Some(frozen) = las.frozen.clone() {
        info!("Freezing orbitals {:?}", frozen);
        problem = problem.with_frozen(frozen)?;
    }
    if let Some(orbsym) = las.orbsym.clone().or_else(|| system.orbsym.clone()) {
        problem = problem.with_orbsym(orbsym)?;
    }
    if let Some(space) = las.rotation_space.as_deref() {
        problem = problem.with_rotation_space(space.parse::<RotationSpace>()?);
    }
    Ok(problem)
}

fn configure_las(args: &Args, config: &Config) -> Result<LasOptions> {
    let params = config.optimizer();
    let defaults = LasOptions::default();
    let linear_solver = match params.linear_solver.as_deref() {
        Some(name) => name.parse::<LinearSolverKind>()?,
        None => defaults.linear_solver,
    };
    Ok(LasOptions {
        conv_tol_grad: args
            .conv_tol_grad
            .or(params.conv_tol_grad)
            .unwrap_or(defaults.conv_tol_grad),
        ah_level_shift: params.ah_level_shift.unwrap_or(defaults.ah_level_shift),
        max_cycle_macro: args
            .max_cycle_macro
            .or(params.max_cycle_macro)
            .unwrap_or(defaults.max_cycle_macro),
        max_cycle_micro: args
            .max_cycle_micro
            .or(params.max_cycle_micro)
            .unwrap_or(defaults.max_cycle_micro),
        linear_solver,
        canonicalize: params.canonicalize.unwrap_or(defaults.canonicalize),
    })
}

pub fn run_las(problem: &LasProblem, args: &Args, config: &Config) -> Result<LasResult> {
    let options = configure_las(args, config)?;
    info!(
        "LASSCF: conv_tol_grad = {:e}, max_cycle_macro = {}, max_cycle_micro = {}, linear solver {:?}",
        options.conv_tol_grad, options.max_cycle_macro, options.max_cycle_micro, options.linear_solver
    );
    let nao = problem.provider().nao();
    let mo0 = DMatrix::identity(nao, problem.partition().nmo());
    Ok(LasDriver::new(problem, options).kernel(mo0, None))
}

/// LASSIS settings with command-line overrides applied
pub fn configure_lassis(args: &Args, config: &Config) -> LassisOptions {
    let params = config.lassis();
    let defaults = LassisOptions::default();
    LassisOptions {
        ncharge: args.ncharge.or(params.ncharge).unwrap_or(defaults.ncharge),
        nspin: args.nspin.or(params.nspin).unwrap_or(defaults.nspin),
        sa_heff: params.sa_heff.unwrap_or(defaults.sa_heff),
        product_threshold: params.product_threshold.unwrap_or(defaults.product_threshold),
        max_cycle_macro: params.max_cycle_macro.unwrap_or(defaults.max_cycle_macro),
        conv_tol_self: params.conv_tol_self.unwrap_or(defaults.conv_tol_self),
        lindep: params.lindep.unwrap_or(defaults.lindep),
    }
}

/// State interaction after the LAS optimization: the automatic model space
/// when requested, otherwise plain LASSI over the optimized rootspaces if
/// there is more than one.
pub fn run_lassi(
    problem: &LasProblem,
    las: &LasResult,
    args: &Args,
    config: &Config,
    backend: Arc<dyn ComputeBackend>,
) -> Option<LassiResult> {
    if args.lassis || config.is_lassis_enabled() {
        let options = configure_lassis(args, config);
        info!(
            "LASSIS: ncharge = {}, nspin = {}, sa_heff = {}, conv_tol_self = {:e}",
            options.ncharge, options.nspin, options.sa_heff, options.conv_tol_self
        );
        Some(Lassis::new(problem, options, backend).kernel(las))
    } else if problem.nroots() > 1 {
        let lindep = config.lassis().lindep.unwrap_or(LassisOptions::default().lindep);
        Some(lassi_from_las(problem, las, lindep, backend.as_ref()))
    } else {
        None
    }
}
