//! Training infrastructure: the trainable-model capability, per-epoch history, single runs.

pub mod history;
pub mod model;
pub mod run;

pub use history::{EpochMetrics, TrainingHistory};
pub use model::{Evaluation, ModelFactory, TrainableModel};
pub use run::{TrainingRun, TuningResult};
