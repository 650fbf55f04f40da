// vharness - HDL Simulation Test Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Ordered library registry.
//!
//! Registration order of libraries and addition order of sources are the
//! compile order handed to the runner. The registry never reorders anything.

use crate::error::{HarnessError, Result};
use crate::resolver::SourcePass;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use vharness_config::normalize_path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEntry {
    pub library: String,
    pub path: PathBuf,
}

impl SourceEntry {
    pub fn stem(&self) -> Option<&str> {
        self.path.file_stem().and_then(|s| s.to_str())
    }

    /// VHDL identifiers are case-insensitive, so testbench names are too.
    pub fn matches_testbench(&self, name: &str) -> bool {
        self.stem().is_some_and(|s| s.eq_ignore_ascii_case(name))
    }

    /// Sources under a `tb/` directory, or named `tb`, `tb_*` or `*_tb`.
    pub fn looks_like_testbench(&self) -> bool {
        let in_tb_dir = self
            .path
            .parent()
            .and_then(Path::file_name)
            .is_some_and(|d| d == "tb");
        let Some(stem) = self.stem() else {
            return in_tb_dir;
        };
        let stem = stem.to_ascii_lowercase();
        in_tb_dir || stem == "tb" || stem.starts_with("tb_") || stem.ends_with("_tb")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Library {
    pub name: String,
    pub sources: Vec<SourceEntry>,
    #[serde(skip)]
    passes: Vec<SourcePass>,
}

impl Library {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            sources: Vec::new(),
            passes: Vec::new(),
        }
    }

    pub fn contains(&self, path: &Path) -> bool {
        let path = normalize_path(path);
        self.sources.iter().any(|s| s.path == path)
    }

    pub fn testbench_sources<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a SourceEntry> {
        self.sources.iter().filter(move |s| s.matches_testbench(name))
    }

    pub fn has_testbench(&self, name: &str) -> bool {
        self.testbench_sources(name).next().is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LibraryRegistry {
    libraries: Vec<Library>,
}

impl LibraryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `name` if absent. Returns `false` when it was already registered.
    pub fn register_library(&mut self, name: &str) -> bool {
        if self.contains(name) {
            debug!("Library '{}' already registered", name);
            return false;
        }
        self.libraries.push(Library::new(name));
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.library(name).is_some()
    }

    pub fn library(&self, name: &str) -> Option<&Library> {
        self.libraries.iter().find(|l| l.name == name)
    }

    fn library_mut(&mut self, name: &str) -> Result<&mut Library> {
        self.libraries
            .iter_mut()
            .find(|l| l.name == name)
            .ok_or_else(|| HarnessError::UnknownLibrary(name.to_string()))
    }

    /// Append `path` to `library`. A path already present, compared after
    /// lexical normalization, is ignored and `Ok(false)` is returned; the
    /// original position is kept.
    pub fn add_source(&mut self, library: &str, path: impl Into<PathBuf>) -> Result<bool> {
        let path = normalize_path(&path.into());
        let lib = self.library_mut(library)?;
        if lib.contains(&path) {
            warn!("Source {:?} already added to library '{}'", path, library);
            return Ok(false);
        }
        debug!("Adding source {:?} to library '{}'", path, library);
        lib.sources.push(SourceEntry {
            library: library.to_string(),
            path,
        });
        Ok(true)
    }

    /// Append several paths in order. Returns how many were new.
    pub fn add_sources<I, P>(&mut self, library: &str, paths: I) -> Result<usize>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut added = 0;
        for path in paths {
            if self.add_source(library, path)? {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Record the start of a pattern pass for `library`.
    ///
    /// Components must follow the packages pass of the same library, and a
    /// packages pass may not come after components.
    pub fn begin_pass(&mut self, library: &str, pass: SourcePass) -> Result<()> {
        let lib = self.library_mut(library)?;
        match pass {
            SourcePass::Components if !lib.passes.contains(&SourcePass::Packages) => {
                return Err(HarnessError::Assembly(format!(
                    "components of library '{}' registered before its packages",
                    library
                )));
            }
            SourcePass::Packages if lib.passes.contains(&SourcePass::Components) => {
                return Err(HarnessError::Assembly(format!(
                    "packages of library '{}' registered after its components",
                    library
                )));
            }
            _ => {}
        }
        lib.passes.push(pass);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Library> {
        self.libraries.iter()
    }

    pub fn libraries(&self) -> &[Library] {
        &self.libraries
    }

    pub fn len(&self) -> usize {
        self.libraries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty()
    }

    pub fn source_count(&self) -> usize {
        self.libraries.iter().map(|l| l.sources.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_is_idempotent() {
        let mut reg = LibraryRegistry::new();
        assert!(reg.register_library("rtu"));
        assert!(!reg.register_library("rtu"));
        assert!(reg.register_library("rtu_test"));
        let names: Vec<_> = reg.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, ["rtu", "rtu_test"]);
    }

    #[test]
    fn test_add_source_unknown_library() {
        let mut reg = LibraryRegistry::new();
        reg.register_library("rtu");
        assert!(reg.add_source("rtu", "piso_register.vhd").unwrap());
        let err = reg.add_source("edi", "x.vhd").unwrap_err();
        assert!(matches!(err, HarnessError::UnknownLibrary(ref l) if l == "edi"));
    }

    #[test]
    fn test_source_order_preserved() {
        let mut reg = LibraryRegistry::new();
        reg.register_library("rtu");
        reg.add_sources("rtu", ["a.vhd", "b.vhd", "c.vhd"]).unwrap();
        let paths: Vec<_> = reg.library("rtu").unwrap().sources.iter().map(|s| s.path.clone()).collect();
        assert_eq!(
            paths,
            vec![PathBuf::from("a.vhd"), PathBuf::from("b.vhd"), PathBuf::from("c.vhd")]
        );
    }

    #[test]
    fn test_duplicate_source_keeps_first_position() {
        let mut reg = LibraryRegistry::new();
        reg.register_library("rtu");
        let added = reg.add_sources("rtu", ["a.vhd", "b.vhd", "a.vhd", "c.vhd"]).unwrap();
        assert_eq!(added, 3);
        let stems: Vec<_> = reg.library("rtu").unwrap().sources.iter().filter_map(|s| s.stem()).collect();
        assert_eq!(stems, ["a", "b", "c"]);
    }

    #[test]
    fn test_duplicate_detected_across_path_spellings() {
        let mut reg = LibraryRegistry::new();
        reg.register_library("rtu");
        assert!(reg
            .add_source("rtu", "libs/rtu/components/piso/sim/../../../../rtu/pkg/data_types.vhd")
            .unwrap());
        assert!(!reg.add_source("rtu", "libs/rtu/./pkg/data_types.vhd").unwrap());
        assert!(reg
            .library("rtu")
            .unwrap()
            .contains(Path::new("libs/rtu/pkg/x/../data_types.vhd")));
        assert_eq!(reg.source_count(), 1);
    }

    #[test]
    fn test_components_before_packages_rejected() {
        let mut reg = LibraryRegistry::new();
        reg.register_library("rtu");
        reg.register_library("edi");
        let err = reg.begin_pass("rtu", SourcePass::Components).unwrap_err();
        assert!(matches!(err, HarnessError::Assembly(_)));

        reg.begin_pass("edi", SourcePass::Packages).unwrap();
        reg.begin_pass("edi", SourcePass::Components).unwrap();
        let err = reg.begin_pass("edi", SourcePass::Packages).unwrap_err();
        assert!(matches!(err, HarnessError::Assembly(_)));
    }

    #[test]
    fn test_testbench_detection() {
        let entry = |p: &str| SourceEntry {
            library: "rtu".into(),
            path: PathBuf::from(p),
        };
        assert!(entry("../tb/tb.vhd").looks_like_testbench());
        assert!(entry("tb_uart.vhd").looks_like_testbench());
        assert!(entry("uart_TB.vhd").looks_like_testbench());
        assert!(entry("components/uart/tb/stimulus.vhd").looks_like_testbench());
        assert!(!entry("../src/piso_register.vhd").looks_like_testbench());
        assert!(entry("../tb/TB.vhd").matches_testbench("tb"));
        assert!(!entry("../tb/tb.vhd").matches_testbench("tb_uart"));
    }
}
