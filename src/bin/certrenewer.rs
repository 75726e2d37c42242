// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Certificate renewal daemon and command-line tool.
//!
//! # Usage
//!
//! ```text
//! certrenewer [OPTIONS] <COMMAND>
//!
//! Commands:
//!   run     Renew certificates periodically until stopped
//!   once    Run a single renewal pass
//!   status  Show the expiry of the installed certificates
//!   config  Configuration management
//!
//! Options:
//!   -c, --config <PATH>   Path to configuration file
//!   -v, --verbose         Enable verbose output
//!   -q, --quiet           Suppress non-error output
//!   -h, --help            Print help
//!   -V, --version         Print version
//! ```
//!
//! # Environment
//!
//! - `CERTRENEWER_CONFIG`: configuration file path
//! - `CERTRENEWER_IAM_TOKEN`: use this IAM token instead of asking the
//!   instance metadata service
//! - `RUST_LOG`: log filter, overrides the configured level

use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use certrenewer::config::{ConfigLoader, LogLevel, RenewerConfig, write_default_config};
use certrenewer::duration::format_duration;
use certrenewer::expiry::{ExpiryInspector, PemChainInspector};
use certrenewer::metadata::{InstanceMetadataClient, StaticToken, TokenProvider};
use certrenewer::renewal::{JobOutcome, RenewalOrchestrator, RenewalReport};
use certrenewer::scheduler::{RenewalScheduler, ScheduleConfig};
use certrenewer::source::CertificateManagerClient;

/// Environment variable holding a pre-issued IAM token.
const TOKEN_ENV_VAR: &str = "CERTRENEWER_IAM_TOKEN";

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Certificate renewal daemon
#[derive(Parser)]
#[command(name = "certrenewer")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Keeps deployed TLS certificates in sync with the cloud certificate manager", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Renew certificates periodically until interrupted
    Run,

    /// Run a single renewal pass and exit
    Once {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show the expiry of the installed certificates
    Status {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate the configuration file
    Validate,

    /// Show the effective configuration
    Show,

    /// Write a configuration template
    Init {
        /// Where to write the template
        #[arg(value_name = "PATH", default_value = "certrenewer.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run_command(cli)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_command(cli: Cli) -> CliResult<ExitCode> {
    match &cli.command {
        Commands::Run => cmd_run(&cli).await,
        Commands::Once { format } => cmd_once(&cli, *format).await,
        Commands::Status { format } => cmd_status(&cli, *format).await,
        Commands::Config { action } => cmd_config(&cli, action),
    }
}

fn load_config(cli: &Cli) -> CliResult<RenewerConfig> {
    let mut loader = ConfigLoader::new();
    if let Some(ref path) = cli.config {
        loader = loader.with_path(path);
    }
    Ok(loader.load()?)
}

/// Install the configured logger, with `-v`/`-q` overriding the level.
fn init_logging(cli: &Cli, config: &RenewerConfig) -> CliResult<()> {
    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = LogLevel::Debug;
    } else if cli.quiet {
        logging.level = LogLevel::Error;
    }
    Ok(certrenewer::logging::init(&logging)?)
}

/// Cancel `token` on Ctrl-C or SIGTERM.
fn spawn_shutdown_listener(token: CancellationToken) {
    tokio::spawn(async move {
        wait_for_shutdown().await;
        tracing::info!("shutdown requested");
        token.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_shutdown() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "could not install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Build the orchestrator: token source, folder id, adapters.
async fn build_orchestrator(
    config: &RenewerConfig,
    cancel: &CancellationToken,
) -> CliResult<RenewalOrchestrator> {
    let metadata = InstanceMetadataClient::new(
        &config.remote.metadata_url,
        config.remote.request_timeout,
    )?;

    let folder_id = match &config.folder_id {
        Some(folder) => folder.clone(),
        None => {
            let identity = metadata.identity(cancel).await?;
            tracing::info!(
                instance = %identity.name,
                folder = %identity.vendor.folder_id,
                "resolved folder from instance metadata"
            );
            identity.vendor.folder_id
        }
    };

    let tokens: Arc<dyn TokenProvider> = match std::env::var(TOKEN_ENV_VAR) {
        Ok(token) if !token.is_empty() => {
            tracing::debug!("using IAM token from {}", TOKEN_ENV_VAR);
            Arc::new(StaticToken::new(token))
        }
        _ => Arc::new(metadata),
    };

    let source = CertificateManagerClient::new(config.remote.certificate_manager()?, tokens)?;
    let restarter = config.restart.restarter()?;

    Ok(RenewalOrchestrator::new(
        folder_id,
        Arc::new(source),
        Arc::new(restarter),
    ))
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn cmd_run(cli: &Cli) -> CliResult<ExitCode> {
    let config = load_config(cli)?;
    init_logging(cli, &config)?;

    let cancel = CancellationToken::new();
    spawn_shutdown_listener(cancel.clone());

    let orchestrator = build_orchestrator(&config, &cancel).await?;
    tracing::info!(
        version = certrenewer::VERSION,
        folder = orchestrator.folder_id(),
        "certificate renewer started"
    );

    let scheduler = RenewalScheduler::new(
        orchestrator,
        config.certs.clone(),
        ScheduleConfig::from(&config),
    );
    scheduler.run(&cancel).await;

    Ok(ExitCode::SUCCESS)
}

async fn cmd_once(cli: &Cli, format: OutputFormat) -> CliResult<ExitCode> {
    let config = load_config(cli)?;
    init_logging(cli, &config)?;

    let cancel = CancellationToken::new();
    spawn_shutdown_listener(cancel.clone());

    let orchestrator = build_orchestrator(&config, &cancel).await?;
    let report = orchestrator.run(&config.certs, &cancel).await;

    match format {
        OutputFormat::Text => print_report_text(&report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report_json(&report))?),
    }

    if report.aggregate.success < report.aggregate.total {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn outcome_label(outcome: &JobOutcome) -> String {
    match outcome {
        JobOutcome::Installed => "installed".to_string(),
        JobOutcome::UpToDate => "up to date".to_string(),
        JobOutcome::Failed(e) => format!("failed ({}): {}", e.stage(), e),
    }
}

fn print_report_text(report: &RenewalReport) {
    println!("Certificates:");
    for job in &report.jobs {
        println!("  {:<24} {}", job.name, outcome_label(&job.outcome));
    }
    println!();
    println!("Services:");
    for service in &report.services {
        let result = match &service.result {
            Ok(()) => "restarted".to_string(),
            Err(e) => format!("failed: {e}"),
        };
        println!("  {:<24} {} ({} certificates)", service.service, result, service.jobs);
    }
    println!();
    println!(
        "Total: {}  Success: {}  Installed: {}",
        report.aggregate.total,
        report.aggregate.success,
        report.installed()
    );
}

fn report_json(report: &RenewalReport) -> serde_json::Value {
    let jobs: Vec<_> = report
        .jobs
        .iter()
        .map(|job| {
            let (outcome, error) = match &job.outcome {
                JobOutcome::Installed => ("installed", None),
                JobOutcome::UpToDate => ("up_to_date", None),
                JobOutcome::Failed(e) => ("failed", Some(e.to_string())),
            };
            json!({
                "name": job.name,
                "service": job.service,
                "outcome": outcome,
                "error": error,
            })
        })
        .collect();

    let services: Vec<_> = report
        .services
        .iter()
        .map(|s| {
            json!({
                "service": s.service,
                "jobs": s.jobs,
                "restarted": s.result.is_ok(),
                "error": s.result.as_ref().err().map(|e| e.to_string()),
            })
        })
        .collect();

    json!({
        "total": report.aggregate.total,
        "success": report.aggregate.success,
        "installed": report.installed(),
        "jobs": jobs,
        "services": services,
    })
}

async fn cmd_status(cli: &Cli, format: OutputFormat) -> CliResult<ExitCode> {
    let config = load_config(cli)?;
    let inspector = PemChainInspector;

    let mut entries = Vec::with_capacity(config.certs.len());
    for job in &config.certs {
        let expiry = inspector.leaf_expiry(&job.chain_path).await;
        entries.push((job, expiry));
    }

    match format {
        OutputFormat::Text => {
            for (job, expiry) in &entries {
                let state = match expiry {
                    Ok(t) => format!("expires {}", t.to_rfc3339()),
                    Err(e) => format!("unknown expiry: {e}"),
                };
                println!("{:<24} {:<12} {}", job.name, job.service_name, state);
                if !cli.quiet {
                    println!("  chain: {}", job.chain_path.display());
                    println!("  key:   {}", job.private_key_path.display());
                }
            }
        }
        OutputFormat::Json => {
            let value: Vec<_> = entries
                .iter()
                .map(|(job, expiry)| {
                    json!({
                        "name": job.name,
                        "service": job.service_name,
                        "chain": job.chain_path,
                        "priv_key": job.private_key_path,
                        "not_after": expiry.as_ref().ok().map(|t| t.to_rfc3339()),
                        "error": expiry.as_ref().err().map(|e| e.to_string()),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn cmd_config(cli: &Cli, action: &ConfigAction) -> CliResult<ExitCode> {
    match action {
        ConfigAction::Validate => {
            println!("Validating configuration...");

            let config = match load_config(cli) {
                Ok(config) => config,
                Err(e) => {
                    println!("Failed to load configuration:");
                    println!("  {}", e);
                    return Ok(ExitCode::FAILURE);
                }
            };

            println!("Configuration is valid.");
            println!();
            println!("Summary:");
            println!("  Renewal period: {}", format_duration(config.renewal_period));
            println!("  Heartbeat period: {}", format_duration(config.heartbeat_period()));
            println!("  Run on start: {}", config.run_on_start);
            println!(
                "  Folder: {}",
                config.folder_id.as_deref().unwrap_or("(from instance metadata)")
            );
            println!("  Restart command: {}", config.restart.command.join(" "));
            println!("  Certificates: {}", config.certs.len());
            for cert in &config.certs {
                println!("    - {} -> {}", cert.name, cert.service_name);
            }
        }
        ConfigAction::Show => {
            let config = load_config(cli)?;
            println!("{}", config.to_toml()?);
        }
        ConfigAction::Init { path, force } => {
            if path.exists() && !force {
                return Err(format!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                )
                .into());
            }
            write_default_config(path)?;
            println!("Wrote configuration template to {}", path.display());
        }
    }

    Ok(ExitCode::SUCCESS)
}
