//! Exhaustive grid search over hyperparameter configurations.
//!
//! Every cell of the grid is trained on a freshly built model and scored on the
//! held-out split. There is no early termination; total work is one training
//! run per cell. Failed cells stay in the log but never compete for best.
//!
//! With `parallelism > 1`, independent cells run on scoped worker threads in
//! chunks. Outcomes are still logged and folded into [`BestSelection`] in grid
//! order, so the result is identical to a sequential sweep.

mod observer;
mod selection;

pub use observer::{NoopObserver, SweepObserver};
pub use selection::BestSelection;

use crate::dataset::{Dataset, InputShape};
use crate::error::{ConfigError, ModelError, RunFailure, TuneError};
use crate::finalize::{FinalArtifact, FinalModelRunner};
use crate::grid::{HyperparameterConfig, HyperparameterGrid};
use crate::training::model::ModelFactory;
use crate::training::run::{TrainingRun, TuningResult};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use tracing::{Span, debug, info, info_span, warn};

/// Result of one grid cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CellOutcome {
    Completed(TuningResult),
    Failed(RunFailure),
}

impl CellOutcome {
    pub fn config(&self) -> &HyperparameterConfig {
        match self {
            Self::Completed(result) => &result.config,
            Self::Failed(failure) => &failure.config,
        }
    }

    pub fn result(&self) -> Option<&TuningResult> {
        match self {
            Self::Completed(result) => Some(result),
            Self::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&RunFailure> {
        match self {
            Self::Completed(_) => None,
            Self::Failed(failure) => Some(failure),
        }
    }

    /// Whether this cell may become the best selection.
    pub fn is_competing(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// Ordered result log plus the winning configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub log: Vec<CellOutcome>,
    pub best: BestSelection,
}

impl SearchOutcome {
    pub fn completed(&self) -> impl Iterator<Item = &TuningResult> {
        self.log.iter().filter_map(CellOutcome::result)
    }

    pub fn failures(&self) -> impl Iterator<Item = &RunFailure> {
        self.log.iter().filter_map(CellOutcome::failure)
    }

    /// The full result of the winning cell.
    pub fn best_result(&self) -> Option<&TuningResult> {
        self.log.get(self.best.index).and_then(CellOutcome::result)
    }
}

/// Sweep execution options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    /// Maximum number of cells trained at the same time.
    pub parallelism: NonZeroUsize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            parallelism: NonZeroUsize::MIN,
        }
    }
}

impl SearchOptions {
    /// Zero is treated as one.
    pub fn with_parallelism(parallelism: usize) -> Self {
        Self {
            parallelism: NonZeroUsize::new(parallelism).unwrap_or(NonZeroUsize::MIN),
        }
    }
}

/// Drives the grid sweep and selects the best configuration.
#[derive(Debug, Clone)]
pub struct TuningOrchestrator<F> {
    factory: F,
    options: SearchOptions,
}

impl<F: ModelFactory> TuningOrchestrator<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            options: SearchOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SearchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn options(&self) -> SearchOptions {
        self.options
    }

    /// Evaluate every cell of `grid` and select the best by test accuracy.
    pub fn search(
        &self,
        dataset: &Dataset,
        grid: &HyperparameterGrid,
        input_shape: &InputShape,
        num_classes: usize,
    ) -> Result<SearchOutcome, TuneError>
    where
        F: Sync,
    {
        self.search_with_observer(dataset, grid, input_shape, num_classes, &mut NoopObserver)
    }

    /// Like [`search`](Self::search), reporting progress to `observer`.
    pub fn search_with_observer(
        &self,
        dataset: &Dataset,
        grid: &HyperparameterGrid,
        input_shape: &InputShape,
        num_classes: usize,
        observer: &mut dyn SweepObserver,
    ) -> Result<SearchOutcome, TuneError>
    where
        F: Sync,
    {
        let configs = grid.configurations()?;
        dataset.check_contract(input_shape, num_classes)?;

        let total = configs.len();
        let span = info_span!("sweep", cells = total, %input_shape, num_classes);
        let _enter = span.enter();
        info!(
            cells = total,
            knobs = ?grid.knob_names(),
            parallelism = self.options.parallelism.get(),
            "Starting grid search"
        );
        observer.on_sweep_start(total);

        let mut log = Vec::with_capacity(total);
        let mut best: Option<BestSelection> = None;

        for chunk in configs.chunks(self.options.parallelism.get()) {
            let outcomes = self.run_chunk(&span, dataset, chunk, input_shape, num_classes);
            for outcome in outcomes {
                let outcome = outcome.map_err(|e| ConfigError::ModelBuild {
                    reason: e.to_string(),
                })?;
                let index = log.len();

                match &outcome {
                    CellOutcome::Completed(result) => info!(
                        cell = index,
                        config = %result.config,
                        test_loss = result.test_loss,
                        test_accuracy = result.test_accuracy,
                        "Cell completed"
                    ),
                    CellOutcome::Failed(failure) => warn!(
                        cell = index,
                        config = %failure.config,
                        stage = %failure.stage,
                        reason = %failure.reason,
                        "Cell failed; excluded from selection"
                    ),
                }
                observer.on_cell_complete(index, &outcome);

                let previous = best.as_ref().map(|b| b.index);
                best = BestSelection::advance(best, index, &outcome);
                if let Some(current) = best.as_ref().filter(|b| Some(b.index) != previous) {
                    info!(
                        cell = current.index,
                        config = %current.config,
                        accuracy = current.accuracy,
                        "New best configuration"
                    );
                    observer.on_new_best(current);
                }

                log.push(outcome);
            }
        }

        let Some(best) = best else {
            let failures: Vec<RunFailure> = log
                .iter()
                .filter_map(CellOutcome::failure)
                .cloned()
                .collect();
            warn!(cells = total, "Every grid cell failed");
            return Err(TuneError::NoViableConfiguration {
                attempted: total,
                failures,
            });
        };

        info!(
            config = %best.config,
            accuracy = best.accuracy,
            failed = log.iter().filter(|o| !o.is_competing()).count(),
            "Grid search finished"
        );
        Ok(SearchOutcome { log, best })
    }

    /// Retrain the selected configuration on a fresh model.
    pub fn finalize(
        &self,
        dataset: &Dataset,
        best: &BestSelection,
        input_shape: &InputShape,
        num_classes: usize,
    ) -> Result<FinalArtifact<F::Model>, TuneError> {
        FinalModelRunner::new(&self.factory).finalize(dataset, best, input_shape, num_classes)
    }

    fn run_chunk(
        &self,
        parent: &Span,
        dataset: &Dataset,
        chunk: &[HyperparameterConfig],
        input_shape: &InputShape,
        num_classes: usize,
    ) -> Vec<Result<CellOutcome, ModelError>>
    where
        F: Sync,
    {
        if chunk.len() == 1 {
            return chunk
                .iter()
                .map(|config| self.run_cell(parent, dataset, config, input_shape, num_classes))
                .collect();
        }

        std::thread::scope(|scope| {
            let handles: Vec<_> = chunk
                .iter()
                .map(|config| {
                    scope.spawn(move || {
                        self.run_cell(parent, dataset, config, input_shape, num_classes)
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
                })
                .collect()
        })
    }

    /// `Err` only when the factory cannot build the architecture at all.
    fn run_cell(
        &self,
        parent: &Span,
        dataset: &Dataset,
        config: &HyperparameterConfig,
        input_shape: &InputShape,
        num_classes: usize,
    ) -> Result<CellOutcome, ModelError> {
        let span = info_span!(parent: parent, "cell", config = %config);
        let _enter = span.enter();
        debug!("Building model");

        let model = self.factory.build(input_shape, num_classes)?;
        let outcome = match TrainingRun::new(dataset).execute(model, config) {
            Ok((_model, result)) => CellOutcome::Completed(result),
            Err(failure) => CellOutcome::Failed(failure),
        };
        Ok(outcome)
    }
}
