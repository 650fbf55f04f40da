// vharness - HDL Simulation Test Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};

/// Errors raised while assembling or dispatching a project.
///
/// Everything except [`HarnessError::Dispatch`] is a static configuration
/// mistake detected before the runner is invoked, so none of them are retried.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("Unknown library '{0}'")]
    UnknownLibrary(String),
    #[error("Unknown testbench '{testbench}' in library '{library}'")]
    UnknownTestbench { library: String, testbench: String },
    #[error("Configuration '{name}' already exists for testbench '{library}.{testbench}'")]
    DuplicateConfigurationName {
        library: String,
        testbench: String,
        name: String,
    },
    #[error("Project is frozen; no further changes are allowed after assembly")]
    FrozenProject,
    #[error("Assembly error: {0}")]
    Assembly(String),
    #[error("Invalid source pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
    #[error("Run manifest error: {0}")]
    Manifest(String),
    #[error("Dispatch failed: {0}")]
    Dispatch(String),
}

/// Discriminant of [`HarnessError`], kept by the builder once it has failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnknownLibrary,
    UnknownTestbench,
    DuplicateConfigurationName,
    FrozenProject,
    Assembly,
    InvalidPattern,
    Manifest,
    Dispatch,
}

impl HarnessError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HarnessError::UnknownLibrary(_) => ErrorKind::UnknownLibrary,
            HarnessError::UnknownTestbench { .. } => ErrorKind::UnknownTestbench,
            HarnessError::DuplicateConfigurationName { .. } => {
                ErrorKind::DuplicateConfigurationName
            }
            HarnessError::FrozenProject => ErrorKind::FrozenProject,
            HarnessError::Assembly(_) => ErrorKind::Assembly,
            HarnessError::InvalidPattern { .. } => ErrorKind::InvalidPattern,
            HarnessError::Manifest(_) => ErrorKind::Manifest,
            HarnessError::Dispatch(_) => ErrorKind::Dispatch,
        }
    }

    /// True for errors detected before the runner was ever invoked.
    pub fn is_configuration_error(&self) -> bool {
        !matches!(self, HarnessError::Dispatch(_))
    }
}

pub type Result<T> = std::result::Result<T, HarnessError>;
