// vharness - HDL Simulation Test Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use vharness_core::{DispatchReport, UnitOutcome};

pub const RESULT_SCHEMA_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pass,
    Fail,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pass => "pass",
            RunStatus::Fail => "fail",
            RunStatus::Error => "error",
        }
    }
}

/// Contents of `result.json`.
#[derive(Debug, Serialize, Deserialize)]
pub struct RunResult {
    pub result_schema_version: String,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub manifest: PathBuf,
    /// SHA-256 of the `project.json` bytes; empty when assembly never finished.
    pub project_hash: String,
    #[serde(with = "secs")]
    pub duration: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub units: Vec<UnitOutcome>,
}

impl RunResult {
    pub fn from_report(
        name: Option<String>,
        manifest: &Path,
        project_hash: String,
        duration: Duration,
        report: &DispatchReport,
    ) -> Self {
        Self {
            result_schema_version: RESULT_SCHEMA_VERSION.to_string(),
            status: if report.passed() {
                RunStatus::Pass
            } else {
                RunStatus::Fail
            },
            name,
            manifest: manifest.to_path_buf(),
            project_hash,
            duration,
            message: None,
            units: report.outcomes.clone(),
        }
    }

    pub fn error(
        name: Option<String>,
        manifest: &Path,
        project_hash: String,
        message: String,
    ) -> Self {
        Self {
            result_schema_version: RESULT_SCHEMA_VERSION.to_string(),
            status: RunStatus::Error,
            name,
            manifest: manifest.to_path_buf(),
            project_hash,
            duration: Duration::ZERO,
            message: Some(message),
            units: Vec::new(),
        }
    }
}

mod secs {
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

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub fn write_result_json(path: &Path, result: &RunResult) -> std::io::Result<()> {
    let file = std::fs::File::create(path)?;
    serde_json::to_writer_pretty(file, result).map_err(std::io::Error::from)
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Split `lib.tb.rest` into a JUnit classname (`lib.tb`) and test name.
fn junit_names(unit: &str) -> (String, String) {
    let mut parts = unit.splitn(3, '.');
    let library = parts.next().unwrap_or_default();
    let testbench = parts.next().unwrap_or_default();
    let rest = parts.next().unwrap_or("default");
    (format!("{}.{}", library, testbench), rest.to_string())
}

pub fn write_junit_xml(path: &Path, result: &RunResult) -> std::io::Result<()> {
    let time_secs = result.duration.as_secs_f64();
    let mut tests: u64 = 0;
    let mut failures: u64 = 0;
    let mut errors: u64 = 0;
    let mut testcases = String::new();

    // Configuration and dispatch errors have no units; report them as one errored case.
    if result.status == RunStatus::Error {
        tests += 1;
        errors += 1;
        testcases.push_str(&format!(
            "  <testcase classname=\"vharness\" name=\"run\" time=\"{:.6}\">\n",
            time_secs
        ));
        testcases.push_str(&format!(
            "    <error message=\"{}\">{}</error>\n",
            xml_escape("run error"),
            xml_escape(result.message.as_deref().unwrap_or_default())
        ));
        testcases.push_str("  </testcase>\n");
    }

    for outcome in &result.units {
        tests += 1;
        let (classname, name) = junit_names(&outcome.unit);
        testcases.push_str(&format!(
            "  <testcase classname=\"{}\" name=\"{}\" time=\"{:.6}\">\n",
            xml_escape(&classname),
            xml_escape(&name),
            outcome.duration.as_secs_f64()
        ));
        if !outcome.passed() {
            failures += 1;
            let message = outcome.message.as_deref().unwrap_or("failure");
            let details = match outcome.exit_code {
                Some(code) => format!("unit={}\nexit_code={}\n", outcome.unit, code),
                None => format!("unit={}\n", outcome.unit),
            };
            testcases.push_str(&format!(
                "    <failure message=\"{}\">{}</failure>\n",
                xml_escape(message),
                xml_escape(&details)
            ));
        }
        testcases.push_str("  </testcase>\n");
    }

    let mut xml = String::new();
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    xml.push('\n');
    xml.push_str(&format!(
        r#"<testsuite name="vharness" tests="{}" failures="{}" errors="{}" time="{:.6}">"#,
        tests, failures, errors, time_secs
    ));
    xml.push('\n');
    xml.push_str("  <properties>\n");
    xml.push_str(&format!(
        "    <property name=\"result_schema_version\" value=\"{}\"/>\n",
        xml_escape(RESULT_SCHEMA_VERSION)
    ));
    if let Some(name) = &result.name {
        xml.push_str(&format!(
            "    <property name=\"project\" value=\"{}\"/>\n",
            xml_escape(name)
        ));
    }
    xml.push_str(&format!(
        "    <property name=\"project_hash\" value=\"{}\"/>\n",
        xml_escape(&result.project_hash)
    ));
    xml.push_str("  </properties>\n");
    xml.push_str(&testcases);
    xml.push_str("</testsuite>\n");

    std::fs::write(path, xml)
}
