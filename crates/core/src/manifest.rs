// vharness - HDL Simulation Test Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::error::{HarnessError, Result};
use crate::project::ProjectBuilder;
use crate::resolver::LibraryLayout;
use std::path::Path;
use tracing::info;
use vharness_config::{resolve_manifest_path, RunManifest};

/// Replay a run manifest onto a fresh builder.
///
/// Order: builtins, all library registrations, then per library the
/// packages/components discovery followed by its explicit sources, and last
/// the testbench configurations. Relative paths resolve against the
/// directory holding `manifest_path`.
pub fn builder_from_manifest(
    manifest: &RunManifest,
    manifest_path: &Path,
) -> Result<ProjectBuilder> {
    manifest
        .validate()
        .map_err(|e| HarnessError::Manifest(format!("{:#}", e)))?;

    let mut builder = ProjectBuilder::new();
    for builtin in &manifest.builtins {
        builder.add_builtin(*builtin)?;
    }

    for lib in &manifest.libraries {
        builder.register_library(&lib.name)?;
    }

    let root = resolve_manifest_path(manifest_path, manifest.root.as_deref().unwrap_or("."));
    for lib in &manifest.libraries {
        if lib.discover {
            let layout = LibraryLayout::new(&root, &lib.name).with_extension(&lib.extension);
            let found = builder.discover(&layout)?;
            info!("Discovered {} source(s) for library '{}' under {:?}", found, lib.name, root);
        }
        let explicit = lib
            .sources
            .iter()
            .map(|s| resolve_manifest_path(manifest_path, s));
        builder.add_sources(&lib.name, explicit)?;
    }

    for tb in &manifest.testbenches {
        if tb.configurations.is_empty() {
            builder.declare_testbench(&tb.library, &tb.name)?;
            continue;
        }
        for cfg in &tb.configurations {
            match &cfg.test {
                Some(test) => builder.add_test_configuration(
                    &tb.library,
                    &tb.name,
                    test,
                    &cfg.name,
                    cfg.generics.clone(),
                )?,
                None => builder.add_configuration(
                    &tb.library,
                    &tb.name,
                    &cfg.name,
                    cfg.generics.clone(),
                )?,
            }
        }
    }

    Ok(builder)
}

/// Load, validate and replay the manifest at `path`.
pub fn load_project_builder(path: &Path) -> Result<ProjectBuilder> {
    let manifest =
        RunManifest::from_file(path).map_err(|e| HarnessError::Manifest(format!("{:#}", e)))?;
    builder_from_manifest(&manifest, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::TestSelection;
    use std::fs;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "-- vhdl\n").unwrap();
    }

    #[test]
    fn test_register_map_manifest_layout() {
        let dir = tempfile::tempdir().unwrap();
        let libs = dir.path().join("libs");
        touch(&libs, "rtu/pkg/data_types.vhd");
        touch(&libs, "rtu/components/register_map/src/register_map.vhd");
        touch(&libs, "rtu/components/piso_register/src/piso_register.vhd");
        touch(&libs, "rtu/components/register_map/tb/tb.vhd");
        touch(&libs, "rtu/components/piso_register/tb/tb.vhd");
        touch(&libs, "edi/pkg/edi_pkg.vhd");
        fs::create_dir_all(libs.join("rtu/components/register_map/sim")).unwrap();

        let manifest_path = libs.join("rtu/components/register_map/sim/run.yaml");
        let manifest = RunManifest::from_yaml(
            r#"
schema_version: "1.0"
root: "../../../.."
libraries:
  - name: rtu
    discover: true
    sources: ["../tb/tb.vhd"]
  - name: rtu_test
    discover: true
  - name: edi
    discover: true
testbenches:
  - library: rtu
    name: tb
    configurations:
      - name: "RC=4;DW=8"
        generics: { REGISTER_COUNT: 4, DATA_WIDTH: 8 }
      - name: "RC=7;DW=10"
        generics: { REGISTER_COUNT: 7, DATA_WIDTH: 10 }
"#,
        )
        .unwrap();

        let mut builder = builder_from_manifest(&manifest, &manifest_path).unwrap();
        let project = builder.assemble().unwrap();

        let rtu = project.libraries.library("rtu").unwrap();
        let stems: Vec<_> = rtu.sources.iter().filter_map(|s| s.stem()).collect();
        assert_eq!(stems, ["data_types", "piso_register", "register_map", "tb"]);
        assert_eq!(
            rtu.sources[3].path,
            libs.join("rtu/components/register_map/tb/tb.vhd")
        );
        assert!(project.libraries.library("rtu_test").unwrap().sources.is_empty());
        assert_eq!(project.libraries.library("edi").unwrap().sources.len(), 1);

        let names: Vec<_> = project.dispatch_units().iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, ["rtu.tb.RC=4;DW=8", "rtu.tb.RC=7;DW=10"]);
    }

    #[test]
    fn test_discovery_root_does_not_need_manifest_dir() {
        let dir = tempfile::tempdir().unwrap();
        let libs = dir.path().join("libs");
        touch(&libs, "rtu/pkg/data_types.vhd");
        touch(&libs, "rtu/components/uart_tx_master/src/uart_tx_master.vhd");

        // No sim/ directory: the root is resolved lexically.
        let manifest_path = libs.join("rtu/components/uart_tx_master/sim/run.yaml");
        let manifest = RunManifest::from_yaml(
            r#"
schema_version: "1.0"
root: "../../../.."
libraries:
  - name: rtu
    discover: true
    sources: ["../tb/tb.vhd"]
"#,
        )
        .unwrap();
        let mut builder = builder_from_manifest(&manifest, &manifest_path).unwrap();
        let project = builder.assemble().unwrap();
        let stems: Vec<_> = project
            .libraries
            .library("rtu")
            .unwrap()
            .sources
            .iter()
            .filter_map(|s| s.stem())
            .collect();
        assert_eq!(stems, ["data_types", "uart_tx_master", "tb"]);
        let names: Vec<_> = project.dispatch_units().iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, ["rtu.tb"]);
    }

    #[test]
    fn test_manifest_unknown_testbench() {
        let dir = tempfile::tempdir().unwrap();
        let manifest_path = dir.path().join("run.yaml");
        let manifest = RunManifest::from_yaml(
            r#"
schema_version: "1.0"
libraries:
  - name: rtu
    sources: ["../src/piso_register.vhd"]
testbenches:
  - library: rtu
    name: tb
"#,
        )
        .unwrap();
        let err = builder_from_manifest(&manifest, &manifest_path).unwrap_err();
        assert!(matches!(err, HarnessError::UnknownTestbench { .. }));
    }

    #[test]
    fn test_manifest_test_level_configuration() {
        let dir = tempfile::tempdir().unwrap();
        let manifest_path = dir.path().join("sim/run.yaml");
        let manifest = RunManifest::from_yaml(
            r#"
schema_version: "1.0"
libraries:
  - name: rtu
    sources: ["../src/sipo_register.vhd", "../tb/tb.vhd"]
testbenches:
  - library: rtu
    name: tb
    configurations:
      - name: "data_width=8"
        test: randomized
        generics: { DATA_WIDTH: 8, RANDOMIZED_TEST_COUNT: 100 }
"#,
        )
        .unwrap();
        let mut builder = builder_from_manifest(&manifest, &manifest_path).unwrap();
        let project = builder.assemble().unwrap();
        let units = project.dispatch_units();
        assert_eq!(units.len(), 2);
        assert_eq!(
            units[0].selection,
            TestSelection::AllExcept(vec!["randomized".into()])
        );
        assert_eq!(units[1].selection, TestSelection::Only("randomized".into()));
    }

    #[test]
    fn test_load_project_builder_reports_manifest_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.yaml");
        fs::write(&path, "schema_version: \"0.9\"\n").unwrap();
        let err = load_project_builder(&path).unwrap_err();
        assert!(matches!(err, HarnessError::Manifest(_)));
        assert!(err.to_string().contains("schema_version"));
    }
}
