//! Final retraining of the selected configuration.
//!
//! The winning grid-cell model is never reused. A new instance is built and
//! trained from scratch so the reported artifact is independently reproducible.

use crate::dataset::{Dataset, InputShape};
use crate::error::{ConfigError, TuneError};
use crate::grid::HyperparameterConfig;
use crate::search::BestSelection;
use crate::training::model::ModelFactory;
use crate::training::run::{TrainingRun, TuningResult};
use tracing::{info, info_span};

/// The retrained model and its own result.
#[derive(Debug)]
pub struct FinalArtifact<M> {
    pub model: M,
    pub result: TuningResult,
}

impl<M> FinalArtifact<M> {
    pub fn config(&self) -> &HyperparameterConfig {
        &self.result.config
    }

    pub fn into_model(self) -> M {
        self.model
    }
}

/// Rebuilds and retrains a model for a chosen configuration.
#[derive(Debug, Clone, Copy)]
pub struct FinalModelRunner<'f, F> {
    factory: &'f F,
}

impl<'f, F: ModelFactory> FinalModelRunner<'f, F> {
    pub fn new(factory: &'f F) -> Self {
        Self { factory }
    }

    pub fn finalize(
        &self,
        dataset: &Dataset,
        best: &BestSelection,
        input_shape: &InputShape,
        num_classes: usize,
    ) -> Result<FinalArtifact<F::Model>, TuneError> {
        self.finalize_config(dataset, &best.config, input_shape, num_classes)
    }

    /// Train `config` on a fresh model. An invalid config is rejected before the
    /// factory is called. A run failure here is fatal: there is no fallback
    /// configuration to substitute.
    pub fn finalize_config(
        &self,
        dataset: &Dataset,
        config: &HyperparameterConfig,
        input_shape: &InputShape,
        num_classes: usize,
    ) -> Result<FinalArtifact<F::Model>, TuneError> {
        let span = info_span!("finalize", config = %config);
        let _enter = span.enter();

        config.validate()?;
        dataset.check_contract(input_shape, num_classes)?;
        let model = self
            .factory
            .build(input_shape, num_classes)
            .map_err(|e| ConfigError::ModelBuild {
                reason: e.to_string(),
            })?;

        let (model, result) = TrainingRun::new(dataset)
            .execute(model, config)
            .map_err(|source| TuneError::Finalization {
                config: config.clone(),
                source,
            })?;

        info!(
            test_loss = result.test_loss,
            test_accuracy = result.test_accuracy,
            "Final model trained"
        );
        Ok(FinalArtifact { model, result })
    }
}
