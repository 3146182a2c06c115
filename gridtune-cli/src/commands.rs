//! Subcommand handlers.

use crate::progress::ProgressPrinter;
use crate::softmax::SoftmaxFactory;
use crate::{Commands, ConfigAction, GridArgs, RunArgs, data};
use anyhow::Context;
use gridtune_core::config::{TuneConfig, init_workspace_config};
use gridtune_core::{
    NoopObserver, ResultReporter, SearchOptions, SweepObserver, SweepReport, TuneError,
    TuningOrchestrator,
};
use std::path::Path;
use std::time::Duration;

/// The sweep was stopped from outside before it finished.
#[derive(Debug, thiserror::Error)]
pub enum Aborted {
    #[error("sweep exceeded the {0}s timeout")]
    TimedOut(u64),
    #[error("sweep interrupted")]
    Interrupted,
}

impl Aborted {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::TimedOut(_) => 124,
            Self::Interrupted => 130,
        }
    }
}

pub async fn handle_command(
    command: Commands,
    mut config: TuneConfig,
    workspace: &Path,
    show_progress: bool,
) -> anyhow::Result<()> {
    match command {
        Commands::Run(args) => {
            args.apply(&mut config);
            run(config, show_progress).await
        }
        Commands::Grid(args) => {
            args.apply(&mut config);
            print_grid(&config)
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                print!("{}", config.to_toml()?);
                Ok(())
            }
            ConfigAction::Init => {
                let path = init_workspace_config(workspace)
                    .context("failed to write workspace config")?;
                println!("Wrote {}", path.display());
                Ok(())
            }
        },
    }
}

impl GridArgs {
    fn apply(&self, config: &mut TuneConfig) {
        if let Some(epochs) = &self.epochs {
            config.grid.epochs = epochs.clone();
        }
        if let Some(batch_size) = &self.batch_size {
            config.grid.batch_size = batch_size.clone();
        }
    }
}

impl RunArgs {
    fn apply(&self, config: &mut TuneConfig) {
        self.grid.apply(config);
        if let Some(path) = &self.data {
            config.data.path = Some(path.clone());
        }
        if let Some(format) = self.format {
            config.report.format = format;
        }
        if let Some(output) = &self.output {
            config.report.output = Some(output.clone());
        }
        if let Some(parallelism) = self.parallelism {
            config.run.parallelism = parallelism;
        }
        if let Some(timeout) = self.timeout {
            config.run.timeout_secs = Some(timeout);
        }
    }
}

/// Search, retrain the winner, and report.
async fn run(config: TuneConfig, show_progress: bool) -> anyhow::Result<()> {
    config.validate().context("invalid configuration")?;
    let shape = config.input_shape()?;
    let num_classes = config.model.num_classes;
    let dataset = data::load(&config.data, &shape, num_classes)?;
    let grid = config.grid.to_grid();
    tracing::info!(
        train = dataset.train().len(),
        test = dataset.test().len(),
        cells = grid.len(),
        "Dataset ready"
    );

    let orchestrator = TuningOrchestrator::new(SoftmaxFactory {
        learning_rate: config.model.learning_rate,
        seed: config.model.seed,
    })
    .with_options(SearchOptions::with_parallelism(config.run.parallelism));

    let sweep = tokio::task::spawn_blocking(move || -> Result<SweepReport, TuneError> {
        let mut progress = ProgressPrinter::new(std::io::stderr());
        let mut noop = NoopObserver;
        let observer: &mut dyn SweepObserver = if show_progress {
            &mut progress
        } else {
            &mut noop
        };
        let outcome =
            orchestrator.search_with_observer(&dataset, &grid, &shape, num_classes, observer)?;
        let artifact = orchestrator.finalize(&dataset, &outcome.best, &shape, num_classes)?;
        Ok(SweepReport::new(&outcome, &artifact.result))
    });

    // The orchestrator has no timeout of its own; the process enforces it.
    let limit = config.run.timeout_secs;
    let report = tokio::select! {
        joined = sweep => joined.context("sweep worker panicked")??,
        _ = tokio::signal::ctrl_c() => return Err(Aborted::Interrupted.into()),
        _ = deadline(limit) => return Err(Aborted::TimedOut(limit.unwrap_or_default()).into()),
    };

    ResultReporter::new(config.report.format).write(&mut std::io::stdout().lock(), &report)?;

    if let Some(path) = &config.report.output {
        report
            .save(path)
            .with_context(|| format!("failed to save report to {}", path.display()))?;
        tracing::info!(path = %path.display(), id = %report.id, "Saved sweep report");
    }
    Ok(())
}

async fn deadline(limit: Option<u64>) {
    match limit {
        Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
        None => std::future::pending().await,
    }
}

/// List the configurations a run would visit, in order.
fn print_grid(config: &TuneConfig) -> anyhow::Result<()> {
    let grid = config.grid.to_grid();
    let configs = grid.configurations().context("invalid grid")?;
    let width = configs.len().to_string().len();
    for (i, c) in configs.iter().enumerate() {
        println!("{:>width$}  {c}", i + 1);
    }
    println!("{} configurations", configs.len());
    Ok(())
}
