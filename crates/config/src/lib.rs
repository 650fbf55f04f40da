// vharness - HDL Simulation Test Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// The only run manifest schema currently understood.
pub const SCHEMA_VERSION: &str = "1.0";

fn default_extension() -> String {
    "vhd".to_string()
}

fn default_jobs() -> usize {
    1
}

/// Literal bound to a design generic at elaboration time.
///
/// Values are never checked against the declared generic type; a mismatch is
/// reported by the simulator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GenericValue {
    Boolean(bool),
    Integer(i64),
    String(String),
}

impl fmt::Display for GenericValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenericValue::Boolean(v) => write!(f, "{}", v),
            GenericValue::Integer(v) => write!(f, "{}", v),
            GenericValue::String(v) => f.write_str(v),
        }
    }
}

impl From<i64> for GenericValue {
    fn from(v: i64) -> Self {
        GenericValue::Integer(v)
    }
}

impl From<bool> for GenericValue {
    fn from(v: bool) -> Self {
        GenericValue::Boolean(v)
    }
}

impl From<&str> for GenericValue {
    fn from(v: &str) -> Self {
        GenericValue::String(v.to_string())
    }
}

impl From<String> for GenericValue {
    fn from(v: String) -> Self {
        GenericValue::String(v)
    }
}

/// Generic name -> value. Ordered by name so reports and runner command lines are stable.
pub type Generics = BTreeMap<String, GenericValue>;

/// Pre-compiled libraries provided by the runner rather than built from sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinLibrary {
    Osvvm,
    #[serde(alias = "vc")]
    VerificationComponents,
}

impl BuiltinLibrary {
    pub fn library_name(&self) -> &'static str {
        match self {
            BuiltinLibrary::Osvvm => "osvvm",
            BuiltinLibrary::VerificationComponents => "vunit_lib",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LibraryEntry {
    pub name: String,
    /// Glob `pkg/*` then `components/*/src/*.<extension>` under `<root>/<name>`.
    #[serde(default)]
    pub discover: bool,
    #[serde(default = "default_extension")]
    pub extension: String,
    /// Explicit sources, relative to the manifest. Added after discovered ones.
    #[serde(default)]
    pub sources: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConfigurationEntry {
    pub name: String,
    /// Restrict the configuration to a single test of the testbench.
    #[serde(default)]
    pub test: Option<String>,
    #[serde(default)]
    pub generics: Generics,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TestbenchEntry {
    pub library: String,
    pub name: String,
    #[serde(default)]
    pub configurations: Vec<ConfigurationEntry>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RunnerConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Template appended once per generic, e.g. `-g{name}={value}`.
    #[serde(default)]
    pub generic_arg: Option<String>,
    /// Template used when a unit runs a single test, e.g. `--test={test}`.
    #[serde(default)]
    pub test_arg: Option<String>,
    /// Template appended per test a unit must skip.
    #[serde(default)]
    pub exclude_test_arg: Option<String>,
    #[serde(default = "default_jobs")]
    pub jobs: usize,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Cap on the captured stdout/stderr of one unit.
    #[serde(default)]
    pub max_log_bytes: Option<u64>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RunManifest {
    pub schema_version: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Library root used for discovery, relative to the manifest.
    #[serde(default)]
    pub root: Option<String>,
    #[serde(default)]
    pub builtins: Vec<BuiltinLibrary>,
    #[serde(default)]
    pub libraries: Vec<LibraryEntry>,
    #[serde(default)]
    pub testbenches: Vec<TestbenchEntry>,
    #[serde(default)]
    pub runner: Option<RunnerConfig>,
}

impl RunManifest {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read run manifest at {:?}", path.as_ref()))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let manifest: Self =
            serde_yaml::from_str(yaml).context("Failed to parse Run Manifest YAML")?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != SCHEMA_VERSION {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '{}'",
                self.schema_version,
                SCHEMA_VERSION
            );
        }

        for lib in &self.libraries {
            if lib.name.trim().is_empty() {
                anyhow::bail!("Library name cannot be empty");
            }
            if lib.discover && lib.extension.trim().is_empty() {
                anyhow::bail!("Library '{}': 'extension' cannot be empty", lib.name);
            }
            if lib.sources.iter().any(|s| s.trim().is_empty()) {
                anyhow::bail!("Library '{}': source paths cannot be empty", lib.name);
            }
        }

        for tb in &self.testbenches {
            if tb.library.trim().is_empty() || tb.name.trim().is_empty() {
                anyhow::bail!("Testbench entries need both 'library' and 'name'");
            }
            for cfg in &tb.configurations {
                if cfg.name.trim().is_empty() {
                    anyhow::bail!(
                        "Testbench '{}.{}': configuration name cannot be empty",
                        tb.library,
                        tb.name
                    );
                }
                if cfg.test.as_deref().is_some_and(|t| t.trim().is_empty()) {
                    anyhow::bail!(
                        "Testbench '{}.{}': configuration '{}' has an empty 'test'",
                        tb.library,
                        tb.name,
                        cfg.name
                    );
                }
            }
        }

        if let Some(runner) = &self.runner {
            if runner.program.trim().is_empty() {
                anyhow::bail!("Runner 'program' cannot be empty");
            }
            if runner.jobs == 0 {
                anyhow::bail!("Runner 'jobs' must be greater than zero");
            }
            if runner.timeout_ms == Some(0) {
                anyhow::bail!("Runner 'timeout_ms' must be greater than zero");
            }
        }

        if self.libraries.iter().any(|l| l.discover) && self.root.is_none() {
            tracing::warn!(
                "Run manifest enables discovery without 'root'; using the manifest directory"
            );
        }

        Ok(())
    }

    /// Name used in reports: the manifest `name`, or the library of the first testbench.
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.testbenches.first().map(|t| t.library.clone()))
            .unwrap_or_else(|| "vharness".to_string())
    }
}

/// Load and validate a run manifest from YAML.
pub fn load_run_manifest<P: AsRef<Path>>(path: P) -> Result<RunManifest> {
    RunManifest::from_file(path)
}

/// Resolve `value` relative to the directory holding `manifest_path`.
///
/// The result is normalized lexically, so `sim/../../..` works even when
/// `sim/` itself does not exist.
pub fn resolve_manifest_path(manifest_path: &Path, value: &str) -> PathBuf {
    let p = PathBuf::from(value);
    if p.is_absolute() {
        return normalize_path(&p);
    }
    normalize_path(
        &manifest_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(p),
    )
}

/// Drop `.` components and fold `dir/..` pairs without touching the filesystem.
///
/// Leading `..` of a relative path are kept; `..` at the root is dropped.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        out
    }
}
