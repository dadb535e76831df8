use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use repave_core::{ProbeOutcome, Severity};
use repave_engine::{run_reconcile, AppInstaller, BlockingClock, PackageStore};
use repave_platform::{PowerShellAppxStore, WingetCli, DEFAULT_WINGET_BINARY};

mod config;
mod logsink;
mod render;


use config::RunOverrides;
use logsink::{LogSink, DEFAULT_LOG_FILE};
use render::Renderer;

#[derive(Parser, Debug)]
#[command(name = "repave")]
#[command(about = "Removes a broken AppX package and reinstalls it through winget", long_about = None)]
#[command(version)]
struct Cli {
    /// Reconcile manifest to run from.
    #[arg(long, global = true, default_value = "repave.toml")]
    manifest: PathBuf,
    /// Append run events to this file.
    #[arg(long, global = true, default_value = DEFAULT_LOG_FILE)]
    log_file: PathBuf,
    /// Truncate the log file before the run instead of appending.
    #[arg(long, global = true)]
    log_reset: bool,
    /// Force plain output.
    #[arg(long, global = true)]
    plain: bool,
    /// Package manager binary name to resolve and invoke.
    #[arg(long, global = true, default_value = DEFAULT_WINGET_BINARY)]
    winget_binary: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Remove the package for every user and reinstall it through winget.
    Reset(ReconcileArgs),
    /// Remove the package and its provisioned record without reinstalling.
    Remove(ReconcileArgs),
    /// Show the package, provisioning, and package manager state.
    Status,
    /// Check that this host can run a reset.
    Doctor,
    /// Generate a shell completion script.
    Completions { shell: Shell },
}

/// Flag overrides for the manifest fields; every field stays optional so the
/// manifest remains the single reviewed source of truth.
#[derive(Args, Debug)]
struct ReconcileArgs {
    /// AppX package family name, overriding the manifest.
    #[arg(long)]
    package: Option<String>,
    /// winget app id, overriding the manifest.
    #[arg(long)]
    app_id: Option<String>,
    /// winget display name, overriding the manifest.
    #[arg(long)]
    app_name: Option<String>,
    /// winget source, overriding the manifest.
    #[arg(long)]
    source: Option<String>,
    /// Install by display name instead of id.
    #[arg(long)]
    by_name: bool,
    #[arg(long)]
    max_attempts: Option<u32>,
    /// Seconds to wait before re-confirming a package query.
    #[arg(long)]
    settle_delay: Option<u64>,
}

impl ReconcileArgs {
    fn into_overrides(self, reinstall: bool) -> RunOverrides {
        RunOverrides {
            reinstall: Some(reinstall),
            package: self.package,
            app_id: self.app_id,
            app_name: self.app_name,
            source: self.source,
            by_name: self.by_name,
            max_attempts: self.max_attempts,
            settle_delay_seconds: self.settle_delay,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> ExitResult {
    let Cli {
        manifest,
        log_file,
        log_reset,
        plain,
        winget_binary,
        command,
    } = cli;
    let renderer = Renderer::from_style(render::output_style(plain));

    match command {
        Commands::Reset(args) => reconcile_command(
            &manifest,
            &log_file,
            log_reset,
            renderer,
            &winget_binary,
            args.into_overrides(true),
        ),
        Commands::Remove(args) => reconcile_command(
            &manifest,
            &log_file,
            log_reset,
            renderer,
            &winget_binary,
            args.into_overrides(false),
        ),
        Commands::Status => status_command(&manifest, renderer, &winget_binary),
        Commands::Doctor => doctor_command(renderer, &winget_binary),
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "repave", &mut std::io::stdout());
            Ok(true)
        }
    }
}

/// `Ok(true)` maps to exit code 0, everything else to 1.
type ExitResult = Result<bool>;

fn reconcile_command(
    manifest_path: &Path,
    log_file: &Path,
    log_reset: bool,
    renderer: Renderer,
    winget_binary: &str,
    overrides: RunOverrides,
) -> ExitResult {
    let manifest = config::load_manifest(manifest_path)?;
    let request = config::build_request(&manifest, &overrides)?;
    let mut sink = LogSink::open(log_file, log_reset)?;

    let mut store = PowerShellAppxStore::new()?;
    let mut installer = WingetCli::new(winget_binary);
    let mut clock = BlockingClock;

    let label = if request.reinstall { "reset" } else { "remove" };
    let spinner = renderer.start_spinner(label, &request.package_name);
    let outcome = run_reconcile(&mut store, &mut installer, &mut clock, &request);
    renderer.finish_spinner(spinner);

    let report = match outcome {
        Ok(report) => report,
        Err(err) => {
            // A fatal introspection failure still deserves a log line even
            // though no report was produced.
            sink.record_event(Severity::Error, "loop", &format!("{err:#}"))?;
            return Err(err);
        }
    };

    sink.record_report(&report)?;
    renderer.print_report(&report);
    Ok(report.converged && !report.errored)
}

fn status_command(manifest_path: &Path, renderer: Renderer, winget_binary: &str) -> ExitResult {
    let manifest = config::load_manifest(manifest_path)?;

    let mut store = PowerShellAppxStore::new()?;
    let state = store.query_package(&manifest.package_name)?;
    let provisioned = store.query_provisioned(&manifest.package_name)?;

    let mut installer = WingetCli::new(winget_binary);
    let probe = installer.probe()?;
    let manager_installed = if probe.passed() {
        Some(installer.is_app_installed(&manifest.app)?)
    } else {
        None
    };

    for line in render::format_status_lines(
        &state,
        provisioned.as_ref(),
        &probe,
        manager_installed,
        &manifest.app.id,
    ) {
        renderer.print_line(&line);
    }
    Ok(true)
}

fn doctor_command(renderer: Renderer, winget_binary: &str) -> ExitResult {
    let mut healthy = true;

    match PowerShellAppxStore::new() {
        Ok(_) => renderer.print_status("ok", "PowerShell AppX host available"),
        Err(err) => {
            healthy = false;
            renderer.print_status("fail", &format!("AppX store unavailable: {err:#}"));
        }
    }

    let mut installer = WingetCli::new(winget_binary);
    match installer.probe() {
        Ok(ProbeOutcome::Passed {
            binary_path,
            version,
        }) => renderer.print_status(
            "ok",
            &format!("winget {} at {}", version, binary_path.display()),
        ),
        Ok(ProbeOutcome::Failed { detail }) => {
            healthy = false;
            renderer.print_status("fail", &format!("winget probe failed: {detail}"));
        }
        Err(err) => {
            healthy = false;
            renderer.print_status("fail", &format!("winget probe errored: {err:#}"));
        }
    }

    Ok(healthy)
}
