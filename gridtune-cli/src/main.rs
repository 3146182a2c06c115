//! gridtune CLI: exhaustive hyperparameter grid search from the terminal.
//!
//! Trains the built-in softmax regression model over every grid cell, retrains
//! the best configuration and prints a report.

mod commands;
mod data;
mod progress;
mod softmax;

use anyhow::Context;
use clap::Parser;
use gridtune_core::ReportFormat;
use gridtune_core::config::{LoggingConfig, default_log_dir, load_config};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// gridtune: grid-search hyperparameters, then retrain the winner
#[derive(Parser, Debug)]
#[command(name = "gridtune", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (looked up for .gridtune/config.toml)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress progress output and non-error logs
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run the grid search, retrain the best configuration and report
    Run(RunArgs),
    /// Print the configurations the grid would visit, without training
    Grid(GridArgs),
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Write a default .gridtune/config.toml into the workspace
    Init,
}

#[derive(clap::Args, Debug)]
struct GridArgs {
    /// Candidate epoch counts, comma separated (e.g. 5,10)
    #[arg(long, value_delimiter = ',')]
    epochs: Option<Vec<u64>>,

    /// Candidate batch sizes, comma separated (e.g. 32,64)
    #[arg(long, value_delimiter = ',')]
    batch_size: Option<Vec<u64>>,
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    grid: GridArgs,

    /// JSON dataset file (synthetic data when omitted)
    #[arg(long)]
    data: Option<PathBuf>,

    /// Report format: text or json
    #[arg(short, long)]
    format: Option<ReportFormat>,

    /// Also save the JSON sweep report to this file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Number of grid cells trained concurrently
    #[arg(short, long)]
    parallelism: Option<usize>,

    /// Abort if the run takes longer than this many seconds
    #[arg(long)]
    timeout: Option<u64>,
}

/// Daily rolling JSON log file in `log_dir`, created if missing.
fn open_log_file(log_dir: &Path) -> anyhow::Result<RollingFileAppender> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("gridtune")
        .filename_suffix("log")
        .build(log_dir)
        .with_context(|| format!("failed to open log file in {}", log_dir.display()))
}

/// Human-readable stderr logs, plus JSON file logs when enabled.
///
/// A log file that cannot be opened falls back to stderr-only logging.
fn init_tracing(verbose: u8, quiet: bool, logging: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = match verbose {
        0 if quiet => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(console_filter);

    let mut guard = None;
    let mut file_error = None;
    let json_layer = if logging.json_file {
        let log_dir = logging
            .log_dir
            .clone()
            .or_else(default_log_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        match open_log_file(&log_dir) {
            Ok(file_appender) => {
                let (non_blocking, worker_guard) = tracing_appender::non_blocking(file_appender);
                guard = Some(worker_guard);
                Some(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking)
                        .with_filter(EnvFilter::new("debug")),
                )
            }
            Err(e) => {
                file_error = Some(e);
                None
            }
        }
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    if let Some(e) = file_error {
        tracing::warn!("JSON file logging disabled: {e:#}");
    }
    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| cli.workspace.clone());

    let config = load_config(Some(&workspace), cli.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    let guard = init_tracing(cli.verbose, cli.quiet, &config.logging);
    tracing::debug!(workspace = %workspace.display(), "Configuration loaded");

    let result = commands::handle_command(cli.command, config, &workspace, !cli.quiet).await;

    if let Some(aborted) = result
        .as_ref()
        .err()
        .and_then(|e| e.downcast_ref::<commands::Aborted>())
    {
        tracing::error!("{aborted}");
        let code = aborted.exit_code();
        // Flush file logs; exiting skips the still-running blocking sweep.
        drop(guard);
        std::process::exit(code);
    }
    result
}
