//! End-to-end LASSCF and LASSI runs on small lattice models

use clap::Parser;
use fci::{ComputeBackend, SerialBackend};
use lasscf::app::{
    build_problem, build_rootspaces, build_system, configure_lassis, run_las, run_lassi, select_backend,
};
use lasscf::config::{Args, Config};
use lasscf::integrals::{IntegralProvider, LatticeModel};
use lasscf::las_impl::{FragmentPartition, LasDriver, LasOptions, LasProblem, LasResult, RootspaceSpec};
use lasscf::lassi_impl::{asymmetry, lassi_from_las, plan_model_space, Lassis, LassisOptions, Origin, Rootspace};
use nalgebra::DMatrix;
use std::sync::Arc;

fn three_fragment_problem() -> LasProblem {
    let provider: Arc<dyn IntegralProvider> = Arc::new(LatticeModel::embedded_dimer_chain(3).dense());
    let partition = FragmentPartition::new(1, vec![2, 2, 2], 8).unwrap();
    let reference = RootspaceSpec::new(vec![(1, 1); 3], vec![1; 3], 1.0);
    LasProblem::new(provider, partition, vec![reference], Arc::new(SerialBackend)).unwrap()
}

fn optimize(problem: &LasProblem) -> LasResult {
    let nmo = problem.partition().nmo();
    LasDriver::new(problem, LasOptions::default()).kernel(DMatrix::identity(nmo, nmo), None)
}

#[test]
fn test_lassis_lowers_three_fragment_energy() {
    let problem = three_fragment_problem();
    let las = optimize(&problem);
    let backend: Arc<dyn ComputeBackend> = Arc::new(SerialBackend);
    let lassi = Lassis::new(&problem, LassisOptions::default(), backend).kernel(&las);

    assert_eq!(lassi.model.len(), 29);
    assert_eq!(lassi.model.nsingle(), 12);
    assert!(lassi.model.spaces()[0].nelec.iter().all(|&n| n == (1, 1)));

    assert!(
        (lassi.e_reference - las.e_states[0]).abs() < 1e-8,
        "reference {} vs LAS {}",
        lassi.e_reference,
        las.e_states[0]
    );
    assert!(lassi.e_tot() <= lassi.e_reference + 1e-10);
    assert!(asymmetry(&lassi.ham) < 1e-12);
    assert!(asymmetry(&lassi.ovlp) < 1e-12);

    let weights = lassi
        .solution
        .rootspace_weights(&lassi.ovlp, &lassi.model.offsets(), 0);
    let total: f64 = weights.iter().sum();
    assert!((total - 1.0).abs() < 1e-8);
    assert!(weights[0] > 0.5);
}

#[test]
fn test_lassis_without_excitations_reproduces_las() {
    let problem = three_fragment_problem();
    let las = optimize(&problem);
    let options = LassisOptions {
        ncharge: 0,
        nspin: 0,
        ..LassisOptions::default()
    };
    let lassi = Lassis::new(&problem, options, Arc::new(SerialBackend)).kernel(&las);
    assert_eq!(lassi.model.len(), 1);
    assert!((lassi.e_tot() - las.e_tot).abs() < 1e-8);
}

#[test]
fn test_lassi_over_state_averaged_rootspaces() {
    let provider: Arc<dyn IntegralProvider> = Arc::new(LatticeModel::embedded_dimer_chain(2).dense());
    let partition = FragmentPartition::new(1, vec![2, 2], 6).unwrap();
    let rootspaces = vec![
        RootspaceSpec::new(vec![(1, 1), (1, 1)], vec![1, 1], 0.5),
        RootspaceSpec::new(vec![(2, 1), (0, 1)], vec![2, 2], 0.25),
        RootspaceSpec::new(vec![(1, 0), (1, 2)], vec![2, 2], 0.25),
    ];
    let problem = LasProblem::new(provider, partition, rootspaces, Arc::new(SerialBackend)).unwrap();
    let las = optimize(&problem);
    let lassi = lassi_from_las(&problem, &las, 1e-10, &SerialBackend);

    assert_eq!(lassi.model.nstates(), 3);
    assert!((lassi.e_reference - las.e_states[0]).abs() < 1e-8);
    let lowest = las.e_states.iter().cloned().fold(f64::INFINITY, f64::min);
    assert!(lassi.e_tot() <= lowest + 1e-10);
    for k in 0..3 {
        assert!((lassi.ovlp[(k, k)] - 1.0).abs() < 1e-10);
    }
}

#[test]
fn test_origins_follow_model_space_order() {
    let problem = three_fragment_problem();
    let plan = plan_model_space(
        &Rootspace::new(vec![(1, 1); 3], vec![1; 3]),
        problem.partition().ncas_sub(),
        &LassisOptions::default(),
    );
    assert_eq!(plan.origins[0], Origin::Reference);
    assert!(matches!(plan.origins[1], Origin::ChargeHop(0)));
    assert_eq!(plan.origins.iter().filter(|o| **o == Origin::SpinFlip).count(), 16);
    assert_eq!(plan.hops.len(), 6);
}

const LATTICE_CONFIG: &str = "
system:
  lattice:
    ndimers: 2
las:
  ncore: 1
  ncas_sub: [2, 2]
  nelecas_sub: [[1, 1], [1, 1]]
  rootspaces:
    - nelec: [[2, 1], [0, 1]]
      weight: 0.2
optimizer:
  max_cycle_macro: 30
lassis:
  enabled: false
";

#[test]
fn test_yaml_configuration_runs() {
    let config: Config = serde_yml::from_str::<Config>(LATTICE_CONFIG).unwrap().with_defaults();
    let args = Args::parse_from(["lasscf"]);

    let rootspaces = build_rootspaces(&config.las).unwrap();
    assert_eq!(rootspaces.len(), 2);
    assert!((rootspaces[0].weight - 0.8).abs() < 1e-12);
    assert_eq!(rootspaces[1].smult, vec![2, 2]);

    let backend = select_backend(config.backend.as_deref()).unwrap();
    let system = build_system(&config).unwrap();
    assert_eq!(system.provider.nao(), 6);
    assert!(system.orbsym.is_none());

    let problem = build_problem(&system, &config, backend.clone()).unwrap();
    assert_eq!(problem.nroots(), 2);
    let las = run_las(&problem, &args, &config).unwrap();
    let lassi = run_lassi(&problem, &las, &args, &config, backend).unwrap();
    assert_eq!(lassi.model.len(), 2);
    assert!(lassi.e_tot() <= las.e_states[0] + 1e-10);
}

#[test]
fn test_configuration_errors() {
    assert!(select_backend(Some("gpu")).is_err());

    let mut config: Config = serde_yml::from_str::<Config>(LATTICE_CONFIG).unwrap().with_defaults();
    config.system.integrals = Some("sparse".to_string());
    assert!(build_system(&config).is_err());

    config.system.integrals = None;
    config.system.fcidump = Some("FCIDUMP".to_string());
    assert!(build_system(&config).is_err());

    config.system.fcidump = None;
    config.las.rootspaces.as_mut().unwrap()[0].weight = 1.0;
    assert!(build_rootspaces(&config.las).is_err());
}

#[test]
fn test_duplicate_rootspaces_are_rejected() {
    let mut config: Config = serde_yml::from_str::<Config>(LATTICE_CONFIG).unwrap().with_defaults();
    config.las.rootspaces.as_mut().unwrap()[0].nelec = vec![(1, 1), (1, 1)];
    assert!(build_rootspaces(&config.las).is_ok());

    let system = build_system(&config).unwrap();
    let backend = select_backend(Some("serial")).unwrap();
    assert!(build_problem(&system, &config, backend).is_err());
}

#[test]
fn test_lassis_settings_reach_the_solver() {
    let yaml = format!("{}  ncharge: 2\n  conv_tol_self: 1.0e-9\n  max_cycle_macro: 7\n", LATTICE_CONFIG);
    let config: Config = serde_yml::from_str::<Config>(&yaml).unwrap().with_defaults();
    let options = configure_lassis(&Args::parse_from(["lasscf"]), &config);
    assert_eq!(options.ncharge, 2);
    assert_eq!(options.nspin, 1);
    assert_eq!(options.max_cycle_macro, 7);
    assert_eq!(options.conv_tol_self, 1e-9);

    let args = Args::parse_from(["lasscf", "--lassis", "--ncharge", "3"]);
    let options = configure_lassis(&args, &config);
    assert_eq!(options.ncharge, 3);
    assert_eq!(options.conv_tol_self, 1e-9);

    let defaults = configure_lassis(&args, &serde_yml::from_str::<Config>(LATTICE_CONFIG).unwrap().with_defaults());
    assert_eq!(defaults.conv_tol_self, LassisOptions::default().conv_tol_self);
}
