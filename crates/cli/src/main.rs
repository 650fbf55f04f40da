// vharness - HDL Simulation Test Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

mod dispatch;
mod log_capture;
mod report;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;
use tracing::{error, info};

use dispatch::CommandDispatcher;
use report::{sha256_hex, write_junit_xml, write_result_json, RunResult};
use vharness_config::{resolve_manifest_path, RunManifest};
use vharness_core::{builder_from_manifest, Project, ProjectBuilder};

const EXIT_PASS: u8 = 0;
const EXIT_UNIT_FAIL: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_RUNTIME_ERROR: u8 = 3;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "HDL simulation test harness",
    long_about = None
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Assemble the project and run every dispatch unit through the runner
    Run(RunArgs),
    /// Assemble the project and print its dispatch units
    List(ListArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Path to the run manifest (YAML)
    #[arg(short, long)]
    manifest: PathBuf,

    /// Directory for project.json, result.json and unit logs
    #[arg(long, default_value = "vharness_out")]
    output_dir: PathBuf,

    /// Write a JUnit XML report to this path
    #[arg(long)]
    junit: Option<PathBuf>,

    /// Number of units to run concurrently (overrides runner.jobs)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Arguments passed to every runner invocation
    #[arg(last = true)]
    runner_args: Vec<String>,
}

#[derive(Args, Debug)]
struct ListArgs {
    /// Path to the run manifest (YAML)
    #[arg(short, long)]
    manifest: PathBuf,

    /// Print the assembled project as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr so `list` output stays machine readable.
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Run(args) => run(args),
        Commands::List(args) => list(args),
    }
}

struct Assembled {
    manifest: RunManifest,
    builder: ProjectBuilder,
    project: Project,
}

fn load_and_assemble(manifest_path: &Path) -> anyhow::Result<Assembled> {
    let manifest = RunManifest::from_file(manifest_path)?;
    let mut builder = builder_from_manifest(&manifest, manifest_path)
        .with_context(|| format!("Invalid run manifest {:?}", manifest_path))?;
    let project = builder.assemble().context("Project assembly failed")?;
    Ok(Assembled {
        manifest,
        builder,
        project,
    })
}

fn list(args: ListArgs) -> ExitCode {
    let project = match load_and_assemble(&args.manifest) {
        Ok(assembled) => assembled.project,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    if args.json {
        match project.to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("Failed to serialize project: {}", e);
                return ExitCode::from(EXIT_RUNTIME_ERROR);
            }
        }
    } else {
        for unit in project.dispatch_units() {
            println!("{}", unit.name);
        }
    }
    ExitCode::from(EXIT_PASS)
}

fn run(args: RunArgs) -> ExitCode {
    info!("Loading run manifest: {:?}", args.manifest);
    let Assembled {
        manifest,
        mut builder,
        project,
    } = match load_and_assemble(&args.manifest) {
        Ok(assembled) => assembled,
        Err(e) => {
            let msg = format!("{:#}", e);
            error!("{}", msg);
            write_error_outputs(&args, None, String::new(), msg);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    let name = Some(manifest.display_name());

    let Some(runner) = manifest.runner.clone() else {
        let msg = "Run manifest has no 'runner' section".to_string();
        error!("{}", msg);
        write_error_outputs(&args, name, String::new(), msg);
        return ExitCode::from(EXIT_CONFIG_ERROR);
    };

    if let Err(e) = std::fs::create_dir_all(&args.output_dir) {
        error!("Failed to create output dir {:?}: {}", args.output_dir, e);
        return ExitCode::from(EXIT_RUNTIME_ERROR);
    }

    let project_json = match project.to_json() {
        Ok(json) => json,
        Err(e) => {
            let msg = format!("Failed to serialize project: {}", e);
            error!("{}", msg);
            write_error_outputs(&args, name, String::new(), msg);
            return ExitCode::from(EXIT_RUNTIME_ERROR);
        }
    };
    let project_file = args.output_dir.join("project.json");
    if let Err(e) = std::fs::write(&project_file, &project_json) {
        error!("Failed to write {:?}: {}", project_file, e);
        return ExitCode::from(EXIT_RUNTIME_ERROR);
    }
    let project_hash = sha256_hex(project_json.as_bytes());

    let program = runner_program(&args.manifest, &runner.program);
    let mut dispatcher = CommandDispatcher::new(
        runner,
        program,
        absolute(&project_file),
        absolute(&args.output_dir),
    )
    .with_forwarded_args(args.runner_args.clone());
    if let Some(jobs) = args.jobs {
        dispatcher = dispatcher.with_jobs(jobs);
    }

    let start = Instant::now();
    let report = match builder.dispatch(&mut dispatcher) {
        Ok(report) => report,
        Err(e) => {
            error!("{}", e);
            let code = if e.is_configuration_error() {
                EXIT_CONFIG_ERROR
            } else {
                EXIT_RUNTIME_ERROR
            };
            write_error_outputs(&args, name, project_hash, e.to_string());
            return ExitCode::from(code);
        }
    };

    let result = RunResult::from_report(
        name,
        &args.manifest,
        project_hash,
        start.elapsed(),
        &report,
    );
    write_outputs(&args, &result);

    let failed = report.failures().count();
    info!(
        "{}: {} unit(s), {} failed",
        result.status.as_str(),
        report.outcomes.len(),
        failed
    );
    ExitCode::from(exit_code_for(report.exit_code()))
}

/// Runner exit codes pass through; anything outside 1..=255 collapses to 1.
fn exit_code_for(code: i32) -> u8 {
    if code == 0 {
        return EXIT_PASS;
    }
    u8::try_from(code)
        .ok()
        .filter(|c| *c != 0)
        .unwrap_or(EXIT_UNIT_FAIL)
}

/// Bare program names are looked up on PATH; anything with a separator is
/// relative to the manifest.
fn runner_program(manifest_path: &Path, program: &str) -> PathBuf {
    if program.contains('/') || program.contains('\\') {
        absolute(&resolve_manifest_path(manifest_path, program))
    } else {
        PathBuf::from(program)
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

fn write_outputs(args: &RunArgs, result: &RunResult) {
    let result_path = args.output_dir.join("result.json");
    if let Err(e) = write_result_json(&result_path, result) {
        error!("Failed to write {:?}: {}", result_path, e);
    }
    if let Some(junit) = &args.junit {
        if let Some(parent) = junit.parent().filter(|p| !p.as_os_str().is_empty()) {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = write_junit_xml(junit, result) {
            error!("Failed to write JUnit report {:?}: {}", junit, e);
        }
    }
}

fn write_error_outputs(
    args: &RunArgs,
    name: Option<String>,
    project_hash: String,
    message: String,
) {
    // Best-effort: the run already failed, a missing report is only logged.
    if let Err(e) = std::fs::create_dir_all(&args.output_dir) {
        error!("Failed to create output dir {:?}: {}", args.output_dir, e);
        return;
    }
    let result = RunResult::error(name, &args.manifest, project_hash, message);
    write_outputs(args, &result);
}

#[cfg(test)]
mod tests {
    use super::*;
    use vharness_core::HarnessError;

    #[test]
    fn test_exit_code_passthrough() {
        assert_eq!(exit_code_for(0), EXIT_PASS);
        assert_eq!(exit_code_for(5), 5);
        assert_eq!(exit_code_for(256), EXIT_UNIT_FAIL);
        assert_eq!(exit_code_for(-1), EXIT_UNIT_FAIL);
    }

    #[test]
    fn test_runner_program_resolution() {
        let manifest = Path::new("/work/sim/run.yaml");
        assert_eq!(runner_program(manifest, "ghdl-vharness"), PathBuf::from("ghdl-vharness"));
        assert_eq!(
            runner_program(manifest, "./scripts/run.sh"),
            PathBuf::from("/work/sim/scripts/run.sh")
        );
    }

    #[test]
    fn test_dispatch_error_is_not_configuration_error() {
        assert!(!HarnessError::Dispatch("spawn".into()).is_configuration_error());
        assert!(HarnessError::UnknownLibrary("rtu".into()).is_configuration_error());
    }
}
