// vharness - HDL Simulation Test Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::log_capture::{pump, CappedLog, DEFAULT_MAX_LOG_BYTES};
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use vharness_config::RunnerConfig;
use vharness_core::{
    DispatchReport, DispatchUnit, HarnessError, Project, Result, RunDispatcher, TestSelection,
    UnitOutcome, UnitStatus,
};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Runs every dispatch unit as an external simulator process.
pub struct CommandDispatcher {
    runner: RunnerConfig,
    program: PathBuf,
    project_file: PathBuf,
    output_dir: PathBuf,
    forwarded: Vec<String>,
    jobs: usize,
}

impl CommandDispatcher {
    pub fn new(
        runner: RunnerConfig,
        program: PathBuf,
        project_file: PathBuf,
        output_dir: PathBuf,
    ) -> Self {
        let jobs = runner.jobs.max(1);
        Self {
            runner,
            program,
            project_file,
            output_dir,
            forwarded: Vec::new(),
            jobs,
        }
    }

    /// Arguments appended after everything derived from the unit.
    pub fn with_forwarded_args(mut self, args: Vec<String>) -> Self {
        self.forwarded = args;
        self
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.output_dir.join("logs")
    }

    /// Per-unit scratch directory handed to the runner as `{output}`.
    pub fn unit_dir(&self, index: usize, unit: &DispatchUnit) -> PathBuf {
        self.output_dir.join("units").join(unit_slug(index, &unit.name))
    }

    pub fn log_path(&self, index: usize, unit: &DispatchUnit) -> PathBuf {
        self.logs_dir().join(format!("{}.log", unit_slug(index, &unit.name)))
    }

    /// Full argument vector for one unit, program excluded.
    pub fn command_line(&self, unit: &DispatchUnit, unit_dir: &Path) -> Vec<String> {
        let project = self.project_file.display().to_string();
        let output = unit_dir.display().to_string();
        let config = unit.configuration.as_deref().unwrap_or("");
        let base = [
            ("project", project.as_str()),
            ("library", unit.testbench.library.as_str()),
            ("testbench", unit.testbench.name.as_str()),
            ("config", config),
            ("unit", unit.name.as_str()),
            ("output", output.as_str()),
        ];
        let with_test = |test: &str, template: &str| {
            let mut vars = base.to_vec();
            vars.push(("test", test));
            expand_template(template, &vars)
        };

        let mut args: Vec<String> = self
            .runner
            .args
            .iter()
            .map(|a| expand_template(a, &base))
            .collect();

        if let Some(template) = &self.runner.generic_arg {
            for (name, value) in &unit.generics {
                let value = value.to_string();
                let mut vars = base.to_vec();
                vars.push(("name", name.as_str()));
                vars.push(("value", value.as_str()));
                args.push(expand_template(template, &vars));
            }
        }

        match &unit.selection {
            TestSelection::All => {}
            TestSelection::Only(test) => match &self.runner.test_arg {
                Some(template) => args.push(with_test(test, template)),
                None => warn!(
                    "Unit {} selects test '{}' but the runner has no test_arg",
                    unit.name, test
                ),
            },
            TestSelection::AllExcept(tests) => match &self.runner.exclude_test_arg {
                Some(template) => {
                    for test in tests {
                        args.push(with_test(test, template));
                    }
                }
                None => warn!(
                    "Unit {} excludes {} test(s) but the runner has no exclude_test_arg",
                    unit.name,
                    tests.len()
                ),
            },
        }

        args.extend(self.forwarded.iter().cloned());
        args
    }

    fn run_unit(&self, index: usize, unit: &DispatchUnit) -> Result<UnitOutcome> {
        let unit_dir = self.unit_dir(index, unit);
        fs::create_dir_all(&unit_dir).map_err(|e| {
            HarnessError::Dispatch(format!("Failed to create {:?}: {}", unit_dir, e))
        })?;
        let log_path = self.log_path(index, unit);
        let log_file = File::create(&log_path).map_err(|e| {
            HarnessError::Dispatch(format!("Failed to create log {:?}: {}", log_path, e))
        })?;
        let max_log_bytes = self.runner.max_log_bytes.unwrap_or(DEFAULT_MAX_LOG_BYTES);
        let log = Arc::new(Mutex::new(CappedLog::new(log_file, max_log_bytes)));

        let args = self.command_line(unit, &unit_dir);
        info!("Running {}", unit.name);
        debug!("{} {}", self.program.display(), args.join(" "));

        let start = Instant::now();
        let mut command = Command::new(&self.program);
        command
            .args(&args)
            .envs(&self.runner.env)
            .env("VHARNESS_UNIT", &unit.name)
            .env("VHARNESS_OUTPUT", &unit_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // Own process group, so a timeout reaches whatever the runner spawned.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        let mut child = command.spawn().map_err(|e| {
            HarnessError::Dispatch(format!(
                "Failed to start runner {:?} for {}: {}",
                self.program, unit.name, e
            ))
        })?;

        let streams: Vec<Box<dyn Read + Send>> = [
            child.stdout.take().map(|s| Box::new(s) as Box<dyn Read + Send>),
            child.stderr.take().map(|s| Box::new(s) as Box<dyn Read + Send>),
        ]
        .into_iter()
        .flatten()
        .collect();
        let pumps: Vec<_> = streams
            .into_iter()
            .map(|stream| {
                let log = Arc::clone(&log);
                thread::spawn(move || pump(stream, &log))
            })
            .collect();

        let timeout = self.runner.timeout_ms.map(Duration::from_millis);
        let status = wait_with_timeout(&mut child, timeout).map_err(|e| {
            HarnessError::Dispatch(format!("Failed waiting for {}: {}", unit.name, e))
        })?;

        for handle in pumps {
            match handle.join() {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!("Lost runner output for {}: {}", unit.name, e),
                Err(_) => warn!("Output pump for {} panicked", unit.name),
            }
        }
        let duration = start.elapsed();

        if let Ok(mut log) = log.lock() {
            if log.truncated() {
                warn!("Log for {} truncated at {} bytes", unit.name, max_log_bytes);
            }
            if let Err(e) = log.finish() {
                warn!("Failed to flush log {:?}: {}", log_path, e);
            }
        }

        let outcome = match status {
            None => UnitOutcome {
                unit: unit.name.clone(),
                status: UnitStatus::Fail,
                exit_code: None,
                duration,
                message: Some(format!(
                    "timed out after {} ms",
                    self.runner.timeout_ms.unwrap_or_default()
                )),
            },
            Some(status) if status.success() => UnitOutcome {
                unit: unit.name.clone(),
                status: UnitStatus::Pass,
                exit_code: Some(0),
                duration,
                message: None,
            },
            Some(status) => UnitOutcome {
                unit: unit.name.clone(),
                status: UnitStatus::Fail,
                exit_code: status.code(),
                duration,
                message: Some(match status.code() {
                    Some(code) => format!("runner exited with code {}", code),
                    None => "runner terminated by signal".to_string(),
                }),
            },
        };

        info!(
            "{} {} ({:.3}s)",
            unit.name,
            if outcome.passed() { "passed" } else { "FAILED" },
            duration.as_secs_f64()
        );
        Ok(outcome)
    }
}

impl RunDispatcher for CommandDispatcher {
    fn dispatch(&mut self, project: &Project) -> Result<DispatchReport> {
        let logs_dir = self.logs_dir();
        fs::create_dir_all(&logs_dir).map_err(|e| {
            HarnessError::Dispatch(format!("Failed to create {:?}: {}", logs_dir, e))
        })?;

        let units = project.dispatch_units();
        let jobs = self.jobs.min(units.len()).max(1);
        info!("Dispatching {} unit(s) with {} job(s)", units.len(), jobs);

        let results: Vec<Result<UnitOutcome>> = if jobs == 1 {
            units
                .iter()
                .enumerate()
                .map(|(i, unit)| self.run_unit(i, unit))
                .collect()
        } else {
            let next = AtomicUsize::new(0);
            let slots: Mutex<Vec<Option<Result<UnitOutcome>>>> =
                Mutex::new((0..units.len()).map(|_| None).collect());
            let this = &*self;
            thread::scope(|s| {
                for _ in 0..jobs {
                    s.spawn(|| loop {
                        let i = next.fetch_add(1, Ordering::SeqCst);
                        let Some(unit) = units.get(i) else { break };
                        let result = this.run_unit(i, unit);
                        if let Ok(mut slots) = slots.lock() {
                            slots[i] = Some(result);
                        }
                    });
                }
            });
            slots
                .into_inner()
                .map_err(|_| HarnessError::Dispatch("worker pool poisoned".to_string()))?
                .into_iter()
                .zip(units)
                .map(|(slot, unit)| {
                    slot.unwrap_or_else(|| {
                        Err(HarnessError::Dispatch(format!(
                            "Unit {} was never run",
                            unit.name
                        )))
                    })
                })
                .collect()
        };

        let mut report = DispatchReport::default();
        for result in results {
            report.outcomes.push(result?);
        }
        Ok(report)
    }
}

/// `None` when the child was killed for exceeding `timeout`.
fn wait_with_timeout(
    child: &mut Child,
    timeout: Option<Duration>,
) -> std::io::Result<Option<ExitStatus>> {
    let Some(timeout) = timeout else {
        return child.wait().map(Some);
    };
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if start.elapsed() >= timeout {
            kill_runner(child)?;
            child.wait()?;
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Kill the runner and everything left in its process group.
///
/// Grandchildren hold the output pipes open, so killing only the direct
/// child would leave the log pumps blocked until the simulator exits.
fn kill_runner(child: &mut Child) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
            let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
            if rc == 0 {
                return Ok(());
            }
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ESRCH) {
                warn!("Failed to kill process group {}: {}", pgid, err);
            }
        }
    }
    match child.kill() {
        Err(e) if e.kind() != std::io::ErrorKind::InvalidInput => Err(e),
        _ => Ok(()),
    }
}

/// Substitute `{key}` placeholders in one pass. Unknown keys stay literal.
fn expand_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after
            .find('}')
            .and_then(|close| {
                let key = &after[..close];
                vars.iter().find(|(k, _)| *k == key).map(|(_, v)| (*v, close))
            });
        match value {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Filesystem-safe name for a unit, prefixed by its dispatch position.
fn unit_slug(index: usize, name: &str) -> String {
    let safe: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{:03}_{}", index, safe)
}
