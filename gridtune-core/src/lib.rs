//! # gridtune-core: hyperparameter grid search and final-model training
//!
//! Builds a model per grid cell through a [`ModelFactory`], fits and evaluates it
//! with a [`TrainingRun`], selects the most accurate configuration, then retrains
//! that configuration from scratch for the reported artifact.
//!
//! ```text
//! Dataset ─▶ TuningOrchestrator ─▶ [ModelFactory ─▶ TrainingRun] × |grid|
//!                  │ BestSelection
//!                  ▼
//!           FinalModelRunner ─▶ FinalArtifact ─▶ ResultReporter
//! ```
//!
//! The learning algorithm itself lives behind [`TrainableModel`]; this crate
//! never looks inside a model.

pub mod config;
pub mod dataset;
pub mod error;
pub mod finalize;
pub mod grid;
pub mod report;
pub mod search;
pub mod training;

// Re-exports
pub use config::{TuneConfig, load_config};
pub use dataset::{Dataset, InputShape, Split};
pub use error::{ConfigError, ModelError, RunFailure, RunStage, TuneError};
pub use finalize::{FinalArtifact, FinalModelRunner};
pub use grid::{HyperparameterConfig, HyperparameterGrid, Knob, ParamValue};
pub use report::{FinalSummary, GridRecord, ReportFormat, ResultReporter, SweepReport};
pub use search::{
    BestSelection, CellOutcome, NoopObserver, SearchOptions, SearchOutcome, SweepObserver,
    TuningOrchestrator,
};
pub use training::{
    EpochMetrics, Evaluation, ModelFactory, TrainableModel, TrainingHistory, TrainingRun,
    TuningResult,
};
