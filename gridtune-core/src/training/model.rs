//! The trainable-model capability and the factory that builds fresh instances.
//!
//! The sweep never looks inside a model. Anything that can be fit on a train
//! split and evaluated on a held-out split works, including deterministic stubs.

use crate::dataset::{InputShape, Split};
use crate::error::ModelError;
use crate::grid::HyperparameterConfig;
use crate::training::history::TrainingHistory;
use serde::{Deserialize, Serialize};

/// Loss and accuracy of a model on one split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub loss: f64,
    pub accuracy: f64,
}

/// A stateful model that is fit once and then evaluated.
pub trait TrainableModel {
    /// Fit on `train` for `config.epochs()` epochs.
    ///
    /// `validation` is only for per-epoch monitoring in the returned history;
    /// it must not influence the learned parameters.
    fn fit(
        &mut self,
        train: &Split,
        validation: &Split,
        config: &HyperparameterConfig,
    ) -> Result<TrainingHistory, ModelError>;

    /// Score the fitted model on a held-out split.
    fn evaluate(&self, split: &Split) -> Result<Evaluation, ModelError>;
}

impl<M: TrainableModel + ?Sized> TrainableModel for Box<M> {
    fn fit(
        &mut self,
        train: &Split,
        validation: &Split,
        config: &HyperparameterConfig,
    ) -> Result<TrainingHistory, ModelError> {
        (**self).fit(train, validation, config)
    }

    fn evaluate(&self, split: &Split) -> Result<Evaluation, ModelError> {
        (**self).evaluate(split)
    }
}

/// Builds a freshly initialized model for an architecture.
///
/// Two calls must return independent instances; nothing may be shared
/// between them that training could mutate.
pub trait ModelFactory {
    type Model: TrainableModel;

    fn build(&self, input_shape: &InputShape, num_classes: usize)
    -> Result<Self::Model, ModelError>;
}

impl<F, M> ModelFactory for F
where
    F: Fn(&InputShape, usize) -> Result<M, ModelError>,
    M: TrainableModel,
{
    type Model = M;

    fn build(&self, input_shape: &InputShape, num_classes: usize) -> Result<M, ModelError> {
        self(input_shape, num_classes)
    }
}
