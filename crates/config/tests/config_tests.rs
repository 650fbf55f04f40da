// vharness - HDL Simulation Test Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::path::PathBuf;
use vharness_config::{load_run_manifest, BuiltinLibrary, GenericValue, RunManifest};

fn demo_manifest(component: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../demos/libs/rtu/components")
        .join(component)
        .join("sim/run.yaml")
}

#[test]
fn test_demo_manifests_parse() {
    for component in [
        "piso_register",
        "sipo_register",
        "register_map",
        "uart_tx_master",
    ] {
        let manifest = load_run_manifest(demo_manifest(component))
            .unwrap_or_else(|e| panic!("{}: {:#}", component, e));
        assert_eq!(manifest.name.as_deref(), Some(component));
        assert_eq!(
            manifest.builtins,
            vec![BuiltinLibrary::Osvvm, BuiltinLibrary::VerificationComponents]
        );
        assert!(manifest.runner.is_some());
    }
}

#[test]
fn test_register_map_matrix() {
    let manifest = load_run_manifest(demo_manifest("register_map")).unwrap();
    let names: Vec<_> = manifest.libraries.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, ["rtu", "rtu_test", "edi"]);
    assert!(manifest.libraries.iter().all(|l| l.discover));

    let tb = &manifest.testbenches[0];
    assert_eq!(tb.configurations.len(), 2);
    assert_eq!(tb.configurations[0].name, "RC=4;DW=8");
    assert_eq!(tb.configurations[1].name, "RC=7;DW=10");
    assert_eq!(
        tb.configurations[1].generics["REGISTER_COUNT"],
        GenericValue::Integer(7)
    );
}

#[test]
fn test_uart_tx_master_has_no_configurations() {
    let manifest = load_run_manifest(demo_manifest("uart_tx_master")).unwrap();
    assert_eq!(manifest.testbenches.len(), 1);
    assert!(manifest.testbenches[0].configurations.is_empty());
}

#[test]
fn test_missing_manifest_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_run_manifest(dir.path().join("missing.yaml")).unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to read run manifest"));
}

#[test]
fn test_test_level_configuration() {
    let yaml = r#"
schema_version: "1.0"
testbenches:
  - library: rtu
    name: tb
    configurations:
      - name: "data_width=9"
        test: randomized
        generics: { DATA_WIDTH: 9, RANDOMIZED_TEST_COUNT: 100 }
"#;
    let manifest = RunManifest::from_yaml(yaml).unwrap();
    let cfg = &manifest.testbenches[0].configurations[0];
    assert_eq!(cfg.test.as_deref(), Some("randomized"));
    assert_eq!(cfg.generics.len(), 2);
}
