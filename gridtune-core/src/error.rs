//! Error types for the gridtune-core crate.
//!
//! Three tiers, matching how far a failure reaches:
//! - [`ConfigError`] is fatal and always raised before any training starts.
//! - [`RunFailure`] is scoped to one grid cell; the sweep records it and keeps going.
//! - [`TuneError`] is what callers of the sweep and the final retrain see.

use crate::grid::HyperparameterConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level error type for tuning operations.
#[derive(Debug, thiserror::Error)]
pub enum TuneError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("No viable configuration found: all {attempted} grid cells failed")]
    NoViableConfiguration {
        attempted: usize,
        failures: Vec<RunFailure>,
    },

    #[error("Finalization failed for [{config}]: {source}")]
    Finalization {
        config: HyperparameterConfig,
        source: RunFailure,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML serialization error: {0}")]
    Toml(#[from] toml::ser::Error),
}

/// Structural problems with the grid, the model contract, or the dataset.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("knob '{knob}' has an empty candidate set")]
    EmptyKnob { knob: String },

    #[error("required knob '{knob}' is missing from the grid")]
    MissingKnob { knob: String },

    #[error("knob '{knob}' is declared more than once")]
    DuplicateKnob { knob: String },

    #[error("invalid value {value} for knob '{knob}': {reason}")]
    InvalidValue {
        knob: String,
        value: String,
        reason: String,
    },

    #[error("grid size overflows the addressable number of cells")]
    GridTooLarge,

    #[error("invalid input shape {shape:?}: every dimension must be positive")]
    InvalidInputShape { shape: Vec<usize> },

    #[error("invalid class count {num_classes}: must be positive")]
    InvalidClassCount { num_classes: usize },

    #[error("dataset does not match the model contract: {reason}")]
    DatasetMismatch { reason: String },

    #[error("model factory rejected the architecture: {reason}")]
    ModelBuild { reason: String },

    #[error("invalid setting '{field}': {reason}")]
    InvalidSetting { field: String, reason: String },

    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
}

impl ConfigError {
    pub fn dataset(reason: impl Into<String>) -> Self {
        Self::DatasetMismatch {
            reason: reason.into(),
        }
    }

    pub fn setting(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSetting {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Errors reported by a trainable model from `fit` or `evaluate`.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("training diverged at epoch {epoch} (loss = {loss})")]
    Diverged { epoch: usize, loss: f64 },

    #[error("shape mismatch: expected {expected} features, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("split contains no samples")]
    EmptySplit,

    #[error("{0}")]
    Other(String),
}

impl ModelError {
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

/// Which step of a training run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    Fit,
    Evaluate,
    Validate,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fit => write!(f, "fit"),
            Self::Evaluate => write!(f, "evaluate"),
            Self::Validate => write!(f, "validate"),
        }
    }
}

/// A failed training run, always attached to the configuration that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{stage} failed for [{config}]: {reason}")]
pub struct RunFailure {
    pub config: HyperparameterConfig,
    pub stage: RunStage,
    pub reason: String,
}

impl RunFailure {
    pub fn new(config: &HyperparameterConfig, stage: RunStage, reason: impl fmt::Display) -> Self {
        Self {
            config: config.clone(),
            stage,
            reason: reason.to_string(),
        }
    }
}
