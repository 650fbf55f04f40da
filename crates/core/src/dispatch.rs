// vharness - HDL Simulation Test Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::error::Result;
use crate::project::Project;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The simulation runner. It receives the frozen project and owns everything
/// that happens afterwards: compilation, elaboration, simulation, timeouts.
pub trait RunDispatcher {
    fn dispatch(&mut self, project: &Project) -> Result<DispatchReport>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Pass,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitOutcome {
    pub unit: String,
    pub status: UnitStatus,
    /// Exit code reported by the runner, if it exited normally.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl UnitOutcome {
    pub fn passed(&self) -> bool {
        self.status == UnitStatus::Pass
    }
}

/// Per-unit results, in dispatch-unit order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub outcomes: Vec<UnitOutcome>,
}

impl DispatchReport {
    pub fn passed(&self) -> bool {
        self.outcomes.iter().all(UnitOutcome::passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &UnitOutcome> {
        self.outcomes.iter().filter(|o| !o.passed())
    }

    /// Exit code to hand back to the caller: 0 if everything passed,
    /// otherwise the first failing unit's runner code (1 if it had none).
    pub fn exit_code(&self) -> i32 {
        match self.failures().next() {
            None => 0,
            Some(o) => o.exit_code.filter(|c| *c != 0).unwrap_or(1),
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}
