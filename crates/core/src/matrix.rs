// vharness - HDL Simulation Test Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Configuration matrix: named generic sets attached to testbenches.

use crate::error::{HarnessError, Result};
use crate::library::LibraryRegistry;
use serde::{Deserialize, Serialize};
use vharness_config::Generics;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TestbenchId {
    pub library: String,
    pub name: String,
}

impl TestbenchId {
    pub fn new(library: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            library: library.into(),
            name: name.into(),
        }
    }

    fn same_as(&self, library: &str, name: &str) -> bool {
        self.library == library && self.name.eq_ignore_ascii_case(name)
    }
}

impl std::fmt::Display for TestbenchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.library, self.name)
    }
}

/// Whole testbench, or a single named test inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "test")]
pub enum ConfigScope {
    Testbench,
    Test(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    pub name: String,
    pub scope: ConfigScope,
    pub generics: Generics,
}

/// All configurations of one testbench, in the order they were added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestbenchConfigs {
    pub testbench: TestbenchId,
    pub configurations: Vec<Configuration>,
}

impl TestbenchConfigs {
    pub fn testbench_level(&self) -> impl Iterator<Item = &Configuration> {
        self.configurations
            .iter()
            .filter(|c| c.scope == ConfigScope::Testbench)
    }

    /// Tests that carry their own configurations, first-seen order, no repeats.
    pub fn overridden_tests(&self) -> Vec<String> {
        let mut tests: Vec<String> = Vec::new();
        for cfg in &self.configurations {
            if let ConfigScope::Test(test) = &cfg.scope {
                if !tests.contains(test) {
                    tests.push(test.clone());
                }
            }
        }
        tests
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigurationMatrix {
    entries: Vec<TestbenchConfigs>,
}

impl ConfigurationMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `name` to `library.testbench`.
    ///
    /// The testbench must match a source already present in `library`, and
    /// configuration names are unique per testbench across both scopes.
    pub fn add(
        &mut self,
        registry: &LibraryRegistry,
        library: &str,
        testbench: &str,
        name: &str,
        scope: ConfigScope,
        generics: Generics,
    ) -> Result<()> {
        let id = resolve_testbench(registry, library, testbench)?;

        let idx = match self
            .entries
            .iter()
            .position(|e| e.testbench.same_as(library, testbench))
        {
            Some(idx) => idx,
            None => {
                self.entries.push(TestbenchConfigs {
                    testbench: id,
                    configurations: Vec::new(),
                });
                self.entries.len() - 1
            }
        };

        let entry = &mut self.entries[idx];
        if entry.configurations.iter().any(|c| c.name == name) {
            return Err(HarnessError::DuplicateConfigurationName {
                library: library.to_string(),
                testbench: entry.testbench.name.clone(),
                name: name.to_string(),
            });
        }

        entry.configurations.push(Configuration {
            name: name.to_string(),
            scope,
            generics,
        });
        Ok(())
    }

    pub fn for_testbench(&self, library: &str, testbench: &str) -> Option<&TestbenchConfigs> {
        self.entries
            .iter()
            .find(|e| e.testbench.same_as(library, testbench))
    }

    pub fn iter(&self) -> impl Iterator<Item = &TestbenchConfigs> {
        self.entries.iter()
    }

    pub fn configuration_count(&self) -> usize {
        self.entries.iter().map(|e| e.configurations.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Look up `testbench` in `library`, returning its canonical id (the source
/// file stem as written on disk).
pub fn resolve_testbench(
    registry: &LibraryRegistry,
    library: &str,
    testbench: &str,
) -> Result<TestbenchId> {
    let unknown = || HarnessError::UnknownTestbench {
        library: library.to_string(),
        testbench: testbench.to_string(),
    };
    let lib = registry.library(library).ok_or_else(unknown)?;
    let source = lib.testbench_sources(testbench).next().ok_or_else(unknown)?;
    let name = source.stem().unwrap_or(testbench);
    Ok(TestbenchId::new(library, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vharness_config::GenericValue;

    fn registry() -> LibraryRegistry {
        let mut reg = LibraryRegistry::new();
        reg.register_library("rtu");
        reg.add_sources("rtu", ["piso_register.vhd", "tb.vhd", "tb_uart.vhd"])
            .unwrap();
        reg
    }

    fn generics(pairs: &[(&str, i64)]) -> Generics {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), GenericValue::Integer(*v)))
            .collect()
    }

    #[test]
    fn test_unknown_testbench() {
        let reg = registry();
        let mut matrix = ConfigurationMatrix::new();
        let err = matrix
            .add(&reg, "rtu", "tb_missing", "a", ConfigScope::Testbench, Generics::new())
            .unwrap_err();
        assert!(matches!(err, HarnessError::UnknownTestbench { .. }));

        let err = matrix
            .add(&reg, "edi", "tb", "a", ConfigScope::Testbench, Generics::new())
            .unwrap_err();
        assert!(matches!(err, HarnessError::UnknownTestbench { .. }));
    }

    #[test]
    fn test_duplicate_name_per_testbench() {
        let reg = registry();
        let mut matrix = ConfigurationMatrix::new();
        let g = generics(&[("DATA_WIDTH", 8)]);
        matrix.add(&reg, "rtu", "tb", "DW=8", ConfigScope::Testbench, g.clone()).unwrap();
        matrix.add(&reg, "rtu", "tb_uart", "DW=8", ConfigScope::Testbench, g.clone()).unwrap();

        let err = matrix
            .add(&reg, "rtu", "TB", "DW=8", ConfigScope::Test("randomized".into()), g)
            .unwrap_err();
        assert!(matches!(err, HarnessError::DuplicateConfigurationName { .. }));
        assert_eq!(matrix.configuration_count(), 2);
    }

    #[test]
    fn test_order_and_overridden_tests() {
        let reg = registry();
        let mut matrix = ConfigurationMatrix::new();
        for (name, scope) in [
            ("data_width=8", ConfigScope::Test("randomized".into())),
            ("RC=4", ConfigScope::Testbench),
            ("data_width=9", ConfigScope::Test("randomized".into())),
            ("burst", ConfigScope::Test("burst_write".into())),
        ] {
            matrix.add(&reg, "rtu", "tb", name, scope, Generics::new()).unwrap();
        }
        let entry = matrix.for_testbench("rtu", "tb").unwrap();
        let names: Vec<_> = entry.configurations.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["data_width=8", "RC=4", "data_width=9", "burst"]);
        assert_eq!(entry.overridden_tests(), ["randomized", "burst_write"]);
        assert_eq!(entry.testbench_level().count(), 1);
    }
}
