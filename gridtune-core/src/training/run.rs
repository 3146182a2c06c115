//! A single (model, config, dataset) training run.

use crate::dataset::Dataset;
use crate::error::{RunFailure, RunStage};
use crate::grid::HyperparameterConfig;
use crate::training::history::TrainingHistory;
use crate::training::model::TrainableModel;
use serde::{Deserialize, Serialize};

/// Outcome of fitting and evaluating one configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningResult {
    pub config: HyperparameterConfig,
    pub test_loss: f64,
    pub test_accuracy: f64,
    pub history: TrainingHistory,
}

/// Fits a model on the train split and scores it on the test split.
#[derive(Debug, Clone, Copy)]
pub struct TrainingRun<'a> {
    dataset: &'a Dataset,
}

impl<'a> TrainingRun<'a> {
    pub fn new(dataset: &'a Dataset) -> Self {
        Self { dataset }
    }

    /// Run one configuration to completion.
    ///
    /// Takes the model by value: an instance is fit exactly once. On success the
    /// fitted model is handed back alongside its result.
    pub fn execute<M: TrainableModel>(
        &self,
        mut model: M,
        config: &HyperparameterConfig,
    ) -> Result<(M, TuningResult), RunFailure> {
        let history = model
            .fit(self.dataset.train(), self.dataset.test(), config)
            .map_err(|e| RunFailure::new(config, RunStage::Fit, e))?;

        if history.len() != config.epochs() {
            return Err(RunFailure::new(
                config,
                RunStage::Validate,
                format!(
                    "history has {} epochs, expected {}",
                    history.len(),
                    config.epochs()
                ),
            ));
        }
        if let Some(bad) = history.first_non_finite() {
            return Err(RunFailure::new(
                config,
                RunStage::Validate,
                format!("non-finite training metrics at epoch {}", bad.epoch),
            ));
        }

        let eval = model
            .evaluate(self.dataset.test())
            .map_err(|e| RunFailure::new(config, RunStage::Evaluate, e))?;

        if !eval.loss.is_finite() || !eval.accuracy.is_finite() {
            return Err(RunFailure::new(
                config,
                RunStage::Validate,
                format!(
                    "non-finite test metrics (loss = {}, accuracy = {})",
                    eval.loss, eval.accuracy
                ),
            ));
        }

        let result = TuningResult {
            config: config.clone(),
            test_loss: eval.loss,
            test_accuracy: eval.accuracy,
            history,
        };
        Ok((model, result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Split;
    use crate::error::ModelError;
    use crate::training::model::Evaluation;

    #[derive(Debug)]
    struct Fixed {
        epochs_reported: Option<usize>,
        eval: Result<Evaluation, &'static str>,
        fit_calls: usize,
    }

    impl Fixed {
        fn ok(accuracy: f64) -> Self {
            Self {
                epochs_reported: None,
                eval: Ok(Evaluation {
                    loss: 1.0 - accuracy,
                    accuracy,
                }),
                fit_calls: 0,
            }
        }
    }

    impl TrainableModel for Fixed {
        fn fit(
            &mut self,
            _train: &Split,
            _validation: &Split,
            config: &HyperparameterConfig,
        ) -> Result<TrainingHistory, ModelError> {
            self.fit_calls += 1;
            let mut history = TrainingHistory::new();
            for _ in 0..self.epochs_reported.unwrap_or(config.epochs()) {
                history.record(0.5, 0.5, None, None);
            }
            Ok(history)
        }

        fn evaluate(&self, _split: &Split) -> Result<Evaluation, ModelError> {
            self.eval.map_err(ModelError::other)
        }
    }

    fn dataset() -> Dataset {
        let split = Split::new(vec![vec![0.0], vec![1.0]], vec![0, 1]).unwrap();
        Dataset::new(split.clone(), split).unwrap()
    }

    #[test]
    fn test_execute_bundles_result() {
        let ds = dataset();
        let config = HyperparameterConfig::new(3, 1);
        let (model, result) = TrainingRun::new(&ds).execute(Fixed::ok(0.75), &config).unwrap();
        assert_eq!(model.fit_calls, 1);
        assert_eq!(result.config, config);
        assert_eq!(result.test_accuracy, 0.75);
        assert_eq!(result.test_loss, 0.25);
        assert_eq!(result.history.len(), 3);
    }

    #[test]
    fn test_execute_reports_evaluate_failure() {
        let ds = dataset();
        let config = HyperparameterConfig::new(2, 1);
        let model = Fixed {
            eval: Err("device lost"),
            ..Fixed::ok(0.0)
        };
        let failure = TrainingRun::new(&ds).execute(model, &config).unwrap_err();
        assert_eq!(failure.stage, RunStage::Evaluate);
        assert_eq!(failure.config, config);
        assert_eq!(failure.reason, "device lost");
    }

    #[test]
    fn test_execute_rejects_short_history() {
        let ds = dataset();
        let model = Fixed {
            epochs_reported: Some(1),
            ..Fixed::ok(0.9)
        };
        let failure = TrainingRun::new(&ds)
            .execute(model, &HyperparameterConfig::new(4, 1))
            .unwrap_err();
        assert_eq!(failure.stage, RunStage::Validate);
        assert!(failure.reason.contains("history has 1 epochs, expected 4"));
    }

    #[test]
    fn test_execute_rejects_non_finite_metrics() {
        let ds = dataset();
        let failure = TrainingRun::new(&ds)
            .execute(Fixed::ok(f64::NAN), &HyperparameterConfig::new(1, 1))
            .unwrap_err();
        assert_eq!(failure.stage, RunStage::Validate);
        assert!(failure.reason.contains("non-finite test metrics"));
    }
}
