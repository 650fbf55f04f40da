// vharness - HDL Simulation Test Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Project assembly.
//!
//! A [`ProjectBuilder`] is threaded through the assembly pass, then frozen
//! into a [`Project`] that the runner only ever reads.

use crate::dispatch::{DispatchReport, RunDispatcher};
use crate::error::{ErrorKind, HarnessError, Result};
use crate::library::LibraryRegistry;
use crate::matrix::{resolve_testbench, ConfigScope, ConfigurationMatrix, TestbenchId};
use crate::resolver::{expand_pattern, resolve_explicit, LibraryLayout, SourcePass};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};
use vharness_config::{BuiltinLibrary, Generics};

/// Pipeline progress. Only moves forward; `Failed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Empty,
    LibrariesRegistered,
    SourcesAdded,
    ConfigurationsAttached,
    Assembled,
    Dispatched,
    Failed(ErrorKind),
}

impl PipelineState {
    fn rank(&self) -> u8 {
        match self {
            PipelineState::Empty => 0,
            PipelineState::LibrariesRegistered => 1,
            PipelineState::SourcesAdded => 2,
            PipelineState::ConfigurationsAttached => 3,
            PipelineState::Assembled => 4,
            PipelineState::Dispatched => 5,
            PipelineState::Failed(_) => 6,
        }
    }
}

/// Which tests of a testbench a dispatch unit runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "tests")]
pub enum TestSelection {
    All,
    Only(String),
    /// Every test except those that carry their own configurations.
    AllExcept(Vec<String>),
}

/// One runner invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchUnit {
    pub name: String,
    pub testbench: TestbenchId,
    /// `None` for a run with the design's default generics.
    pub configuration: Option<String>,
    pub selection: TestSelection,
    pub generics: Generics,
}

impl DispatchUnit {
    fn new(
        testbench: &TestbenchId,
        configuration: Option<&str>,
        selection: TestSelection,
        generics: Generics,
    ) -> Self {
        let mut name = testbench.to_string();
        if let Some(cfg) = configuration {
            name.push('.');
            name.push_str(cfg);
        }
        if let TestSelection::Only(test) = &selection {
            name.push('.');
            name.push_str(test);
        }
        Self {
            name,
            testbench: testbench.clone(),
            configuration: configuration.map(str::to_string),
            selection,
            generics,
        }
    }
}

/// Frozen result of assembly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub builtins: Vec<BuiltinLibrary>,
    pub libraries: LibraryRegistry,
    pub testbenches: Vec<TestbenchId>,
    pub configurations: ConfigurationMatrix,
    units: Vec<DispatchUnit>,
}

impl Project {
    /// Units in dispatch order: libraries by registration, testbenches by
    /// source order, configurations by addition order.
    pub fn dispatch_units(&self) -> &[DispatchUnit] {
        &self.units
    }

    pub fn unit(&self, name: &str) -> Option<&DispatchUnit> {
        self.units.iter().find(|u| u.name == name)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[derive(Debug, Clone)]
pub struct ProjectBuilder {
    registry: LibraryRegistry,
    matrix: ConfigurationMatrix,
    builtins: Vec<BuiltinLibrary>,
    declared: Vec<TestbenchId>,
    state: PipelineState,
    assembled: Option<Project>,
}

impl Default for ProjectBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectBuilder {
    pub fn new() -> Self {
        Self {
            registry: LibraryRegistry::new(),
            matrix: ConfigurationMatrix::new(),
            builtins: Vec::new(),
            declared: Vec::new(),
            state: PipelineState::Empty,
            assembled: None,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn registry(&self) -> &LibraryRegistry {
        &self.registry
    }

    pub fn matrix(&self) -> &ConfigurationMatrix {
        &self.matrix
    }

    fn guard(&self) -> Result<()> {
        match self.state {
            PipelineState::Assembled | PipelineState::Dispatched => {
                Err(HarnessError::FrozenProject)
            }
            PipelineState::Failed(kind) => Err(HarnessError::Assembly(format!(
                "pipeline already failed ({:?})",
                kind
            ))),
            _ => Ok(()),
        }
    }

    fn advance(&mut self, next: PipelineState) {
        if next.rank() > self.state.rank() {
            debug!("Pipeline {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }

    fn record<T>(&mut self, result: Result<T>, next: PipelineState) -> Result<T> {
        match result {
            Ok(v) => {
                self.advance(next);
                Ok(v)
            }
            Err(e) => {
                self.state = PipelineState::Failed(e.kind());
                Err(e)
            }
        }
    }

    /// Pre-built library supplied by the runner (OSVVM, verification components).
    pub fn add_builtin(&mut self, builtin: BuiltinLibrary) -> Result<()> {
        self.guard()?;
        if !self.builtins.contains(&builtin) {
            info!("Using builtin library '{}'", builtin.library_name());
            self.builtins.push(builtin);
        }
        self.advance(PipelineState::LibrariesRegistered);
        Ok(())
    }

    pub fn register_library(&mut self, name: &str) -> Result<()> {
        self.guard()?;
        if self.registry.register_library(name) {
            info!("Registered library '{}'", name);
        }
        self.advance(PipelineState::LibrariesRegistered);
        Ok(())
    }

    pub fn add_source(&mut self, library: &str, path: impl Into<PathBuf>) -> Result<()> {
        self.guard()?;
        let result = self.registry.add_source(library, path).map(|_| ());
        self.record(result, PipelineState::SourcesAdded)
    }

    /// Explicit mode: paths are added in the order given, without existence checks.
    pub fn add_sources<I, P>(&mut self, library: &str, paths: I) -> Result<usize>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.guard()?;
        let result = self.registry.add_sources(library, resolve_explicit(paths));
        self.record(result, PipelineState::SourcesAdded)
    }

    /// Pattern mode: expand `pattern` and add the sorted matches as `pass`.
    pub fn add_pattern(&mut self, library: &str, pass: SourcePass, pattern: &str) -> Result<usize> {
        self.guard()?;
        let result = self
            .registry
            .begin_pass(library, pass)
            .and_then(|_| expand_pattern(pattern))
            .and_then(|paths| self.registry.add_sources(library, paths));
        let added = self.record(result, PipelineState::SourcesAdded)?;
        info!(
            "Library '{}': {:?} pattern '{}' added {} source(s)",
            library, pass, pattern, added
        );
        Ok(added)
    }

    /// Packages pass then components pass for a conventional library layout.
    pub fn discover(&mut self, layout: &LibraryLayout) -> Result<usize> {
        let packages = self.add_pattern(
            &layout.library,
            SourcePass::Packages,
            &layout.packages_pattern(),
        )?;
        let components = self.add_pattern(
            &layout.library,
            SourcePass::Components,
            &layout.components_pattern(),
        )?;
        Ok(packages + components)
    }

    /// Mark `library.name` as a testbench that runs even without configurations.
    pub fn declare_testbench(&mut self, library: &str, name: &str) -> Result<()> {
        self.guard()?;
        let result = resolve_testbench(&self.registry, library, name);
        let id = self.record(result, PipelineState::ConfigurationsAttached)?;
        if !self.declared.contains(&id) {
            self.declared.push(id);
        }
        Ok(())
    }

    pub fn add_configuration(
        &mut self,
        library: &str,
        testbench: &str,
        name: &str,
        generics: Generics,
    ) -> Result<()> {
        self.attach(library, testbench, name, ConfigScope::Testbench, generics)
    }

    /// Configuration that applies to one test of the testbench only.
    pub fn add_test_configuration(
        &mut self,
        library: &str,
        testbench: &str,
        test: &str,
        name: &str,
        generics: Generics,
    ) -> Result<()> {
        self.attach(
            library,
            testbench,
            name,
            ConfigScope::Test(test.to_string()),
            generics,
        )
    }

    fn attach(
        &mut self,
        library: &str,
        testbench: &str,
        name: &str,
        scope: ConfigScope,
        generics: Generics,
    ) -> Result<()> {
        self.guard()?;
        debug!(
            "Attaching configuration '{}' ({:?}) to {}.{}",
            name, scope, library, testbench
        );
        let result = self
            .matrix
            .add(&self.registry, library, testbench, name, scope, generics);
        self.record(result, PipelineState::ConfigurationsAttached)
    }

    /// Freeze the builder and produce the project.
    ///
    /// Calling this again returns an equal project; every mutating call
    /// afterwards fails with [`HarnessError::FrozenProject`].
    pub fn assemble(&mut self) -> Result<Project> {
        if let Some(project) = &self.assembled {
            return Ok(project.clone());
        }
        self.guard()?;
        let result = self.build_project();
        let project = self.record(result, PipelineState::Assembled)?;
        info!(
            "Assembled project: {} libraries, {} sources, {} testbenches, {} dispatch units",
            project.libraries.len(),
            project.libraries.source_count(),
            project.testbenches.len(),
            project.units.len()
        );
        self.assembled = Some(project.clone());
        Ok(project)
    }

    fn build_project(&self) -> Result<Project> {
        for entry in self.matrix.iter() {
            let tb = &entry.testbench;
            let present = self
                .registry
                .library(&tb.library)
                .is_some_and(|l| l.has_testbench(&tb.name));
            if !present {
                return Err(HarnessError::Assembly(format!(
                    "configurations refer to missing testbench '{}'",
                    tb
                )));
            }
        }

        let testbenches = self.collect_testbenches()?;
        if testbenches.is_empty() {
            warn!("Project has no testbenches; nothing will be dispatched");
        }

        let mut units = Vec::new();
        for tb in &testbenches {
            let Some(entry) = self.matrix.for_testbench(&tb.library, &tb.name) else {
                units.push(DispatchUnit::new(tb, None, TestSelection::All, Generics::new()));
                continue;
            };

            let overridden = entry.overridden_tests();
            let rest = if overridden.is_empty() {
                TestSelection::All
            } else {
                TestSelection::AllExcept(overridden)
            };

            if entry.testbench_level().next().is_none() {
                units.push(DispatchUnit::new(tb, None, rest.clone(), Generics::new()));
            }
            for cfg in &entry.configurations {
                let selection = match &cfg.scope {
                    ConfigScope::Testbench => rest.clone(),
                    ConfigScope::Test(test) => TestSelection::Only(test.clone()),
                };
                units.push(DispatchUnit::new(
                    tb,
                    Some(&cfg.name),
                    selection,
                    cfg.generics.clone(),
                ));
            }
        }

        Ok(Project {
            builtins: self.builtins.clone(),
            libraries: self.registry.clone(),
            testbenches,
            configurations: self.matrix.clone(),
            units,
        })
    }

    /// Testbench sources in registry order. Two testbenches with the same
    /// name in one library are rejected.
    fn collect_testbenches(&self) -> Result<Vec<TestbenchId>> {
        let mut found: Vec<TestbenchId> = Vec::new();
        for lib in self.registry.iter() {
            for source in &lib.sources {
                let Some(stem) = source.stem() else {
                    continue;
                };
                let configured = self.matrix.for_testbench(&lib.name, stem).is_some();
                let declared = self
                    .declared
                    .iter()
                    .any(|d| d.library == lib.name && d.name.eq_ignore_ascii_case(stem));
                if !(source.looks_like_testbench() || configured || declared) {
                    continue;
                }
                if found
                    .iter()
                    .any(|t| t.library == lib.name && t.name.eq_ignore_ascii_case(stem))
                {
                    return Err(HarnessError::Assembly(format!(
                        "testbench '{}' is defined by more than one source in library '{}'",
                        stem, lib.name
                    )));
                }
                found.push(TestbenchId::new(&lib.name, stem));
            }
        }
        Ok(found)
    }

    /// Hand the assembled project to `dispatcher`. Allowed exactly once.
    pub fn dispatch(&mut self, dispatcher: &mut dyn RunDispatcher) -> Result<DispatchReport> {
        let project = match (self.state, &self.assembled) {
            (PipelineState::Assembled, Some(project)) => project.clone(),
            (PipelineState::Dispatched, _) => {
                return Err(HarnessError::Assembly(
                    "project has already been dispatched".to_string(),
                ))
            }
            _ => {
                return Err(HarnessError::Assembly(
                    "project must be assembled before dispatch".to_string(),
                ))
            }
        };

        info!("Dispatching {} unit(s)", project.units.len());
        let result = dispatcher.dispatch(&project);
        self.record(result, PipelineState::Dispatched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vharness_config::GenericValue;

    fn rtu_builder() -> ProjectBuilder {
        let mut b = ProjectBuilder::new();
        b.register_library("rtu").unwrap();
        b.add_source("rtu", "piso_register.vhd").unwrap();
        b.add_source("rtu", "tb.vhd").unwrap();
        b
    }

    fn generics(pairs: &[(&str, i64)]) -> Generics {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), GenericValue::Integer(*v)))
            .collect()
    }

    #[test]
    fn test_state_progression() {
        let mut b = ProjectBuilder::new();
        assert_eq!(b.state(), PipelineState::Empty);
        b.register_library("rtu").unwrap();
        assert_eq!(b.state(), PipelineState::LibrariesRegistered);
        b.add_source("rtu", "tb.vhd").unwrap();
        assert_eq!(b.state(), PipelineState::SourcesAdded);
        b.add_configuration("rtu", "tb", "a", Generics::new()).unwrap();
        assert_eq!(b.state(), PipelineState::ConfigurationsAttached);
        b.add_source("rtu", "extra.vhd").unwrap();
        assert_eq!(b.state(), PipelineState::ConfigurationsAttached);
        b.assemble().unwrap();
        assert_eq!(b.state(), PipelineState::Assembled);
    }

    #[test]
    fn test_failure_is_terminal() {
        let mut b = rtu_builder();
        let err = b.add_source("edi", "x.vhd").unwrap_err();
        assert!(matches!(err, HarnessError::UnknownLibrary(_)));
        assert_eq!(
            b.state(),
            PipelineState::Failed(ErrorKind::UnknownLibrary)
        );
        let err = b.add_source("rtu", "y.vhd").unwrap_err();
        assert!(matches!(err, HarnessError::Assembly(_)));
        assert!(b.assemble().is_err());
    }

    #[test]
    fn test_rtu_register_example() {
        let mut b = rtu_builder();
        b.add_configuration(
            "rtu",
            "tb",
            "RC=4;DW=8",
            generics(&[("REGISTER_COUNT", 4), ("DATA_WIDTH", 8)]),
        )
        .unwrap();
        let project = b.assemble().unwrap();

        let units = project.dispatch_units();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].name, "rtu.tb.RC=4;DW=8");
        assert_eq!(units[0].testbench, TestbenchId::new("rtu", "tb"));
        assert_eq!(units[0].selection, TestSelection::All);
        assert_eq!(units[0].generics.len(), 2);
        assert_eq!(units[0].generics["REGISTER_COUNT"], GenericValue::Integer(4));
        assert_eq!(units[0].generics["DATA_WIDTH"], GenericValue::Integer(8));
    }

    #[test]
    fn test_default_run_without_configurations() {
        let mut b = rtu_builder();
        let project = b.assemble().unwrap();
        let units = project.dispatch_units();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].name, "rtu.tb");
        assert!(units[0].configuration.is_none());
        assert!(units[0].generics.is_empty());
    }

    #[test]
    fn test_declared_testbench_without_naming_convention() {
        let mut b = ProjectBuilder::new();
        b.register_library("rtu").unwrap();
        b.add_sources("rtu", ["uart_tx_master.vhd", "stimulus.vhd"])
            .unwrap();
        assert!(b.assemble().is_ok_and(|p| p.dispatch_units().is_empty()));

        let mut b = ProjectBuilder::new();
        b.register_library("rtu").unwrap();
        b.add_sources("rtu", ["uart_tx_master.vhd", "stimulus.vhd"])
            .unwrap();
        b.declare_testbench("rtu", "stimulus").unwrap();
        let project = b.assemble().unwrap();
        assert_eq!(project.dispatch_units().len(), 1);
        assert_eq!(project.dispatch_units()[0].name, "rtu.stimulus");
    }

    #[test]
    fn test_test_level_precedence() {
        let mut b = rtu_builder();
        b.add_configuration("rtu", "tb", "RC=4", generics(&[("REGISTER_COUNT", 4)]))
            .unwrap();
        b.add_test_configuration("rtu", "tb", "randomized", "data_width=8", generics(&[("DATA_WIDTH", 8)]))
            .unwrap();
        b.add_test_configuration("rtu", "tb", "randomized", "data_width=9", generics(&[("DATA_WIDTH", 9)]))
            .unwrap();
        let project = b.assemble().unwrap();

        let units = project.dispatch_units();
        let names: Vec<_> = units.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "rtu.tb.RC=4",
                "rtu.tb.data_width=8.randomized",
                "rtu.tb.data_width=9.randomized"
            ]
        );
        assert_eq!(
            units[0].selection,
            TestSelection::AllExcept(vec!["randomized".to_string()])
        );
        assert_eq!(units[1].selection, TestSelection::Only("randomized".into()));
    }

    #[test]
    fn test_only_test_level_keeps_default_run() {
        let mut b = rtu_builder();
        b.add_test_configuration("rtu", "tb", "randomized", "dw8", generics(&[("DATA_WIDTH", 8)]))
            .unwrap();
        let project = b.assemble().unwrap();
        let units = project.dispatch_units();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].name, "rtu.tb");
        assert_eq!(
            units[0].selection,
            TestSelection::AllExcept(vec!["randomized".to_string()])
        );
        assert_eq!(units[1].name, "rtu.tb.dw8.randomized");
    }

    #[test]
    fn test_duplicate_testbench_names_rejected() {
        let mut b = ProjectBuilder::new();
        b.register_library("rtu").unwrap();
        b.add_sources("rtu", ["piso/tb/tb.vhd", "sipo/tb/tb.vhd"])
            .unwrap();
        let err = b.assemble().unwrap_err();
        assert!(matches!(err, HarnessError::Assembly(_)));
        assert_eq!(b.state(), PipelineState::Failed(ErrorKind::Assembly));
    }

    #[test]
    fn test_builtins_recorded_once() {
        let mut b = rtu_builder();
        b.add_builtin(BuiltinLibrary::Osvvm).unwrap();
        b.add_builtin(BuiltinLibrary::Osvvm).unwrap();
        b.add_builtin(BuiltinLibrary::VerificationComponents).unwrap();
        let project = b.assemble().unwrap();
        assert_eq!(
            project.builtins,
            vec![BuiltinLibrary::Osvvm, BuiltinLibrary::VerificationComponents]
        );
    }

    #[test]
    fn test_project_json_shape() {
        let mut b = rtu_builder();
        let project = b.assemble().unwrap();
        let json: serde_json::Value = serde_json::from_str(&project.to_json().unwrap()).unwrap();
        assert_eq!(json["libraries"][0]["name"], "rtu");
        assert_eq!(json["libraries"][0]["sources"][1]["path"], "tb.vhd");
        assert_eq!(json["units"][0]["selection"]["kind"], "all");
    }
}
