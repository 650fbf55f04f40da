// vharness - HDL Simulation Test Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Test-harness composition for HDL simulation runs.
//!
//! Sources are resolved into ordered libraries, named generic configurations
//! are attached to testbenches, and the frozen [`Project`] is handed to a
//! [`RunDispatcher`].

pub mod dispatch;
pub mod error;
pub mod library;
pub mod manifest;
pub mod matrix;
pub mod project;
pub mod resolver;

pub use dispatch::{DispatchReport, RunDispatcher, UnitOutcome, UnitStatus};
pub use error::{ErrorKind, HarnessError, Result};
pub use library::{Library, LibraryRegistry, SourceEntry};
pub use manifest::{builder_from_manifest, load_project_builder};
pub use matrix::{ConfigScope, Configuration, ConfigurationMatrix, TestbenchId};
pub use project::{DispatchUnit, PipelineState, Project, ProjectBuilder, TestSelection};
pub use resolver::{expand_pattern, LibraryLayout, SourcePass};
pub use vharness_config::{BuiltinLibrary, GenericValue, Generics};
