//! Built-in reference model: multinomial logistic regression over flattened
//! features, trained with mini-batch SGD.
//!
//! Weights start at zero and batches are shuffled from a seeded RNG, so a fit is
//! fully determined by the data, the configuration and the seed.

use gridtune_core::{
    Evaluation, HyperparameterConfig, InputShape, ModelError, ModelFactory, Split,
    TrainableModel, TrainingHistory,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Grid knob that overrides the factory's learning rate.
pub const LEARNING_RATE: &str = "learning_rate";

/// Builds untrained [`SoftmaxRegression`] models.
#[derive(Debug, Clone, Copy)]
pub struct SoftmaxFactory {
    pub learning_rate: f64,
    pub seed: u64,
}

impl ModelFactory for SoftmaxFactory {
    type Model = SoftmaxRegression;

    fn build(
        &self,
        input_shape: &InputShape,
        num_classes: usize,
    ) -> Result<SoftmaxRegression, ModelError> {
        if num_classes < 2 {
            return Err(ModelError::other(format!(
                "softmax regression needs at least 2 classes, got {num_classes}"
            )));
        }
        Ok(SoftmaxRegression::new(
            input_shape.flat_len(),
            num_classes,
            self.learning_rate,
            self.seed,
        ))
    }
}

#[derive(Debug, Clone)]
pub struct SoftmaxRegression {
    num_features: usize,
    num_classes: usize,
    /// Row-major `num_classes x (num_features + 1)`; the bias is the last column.
    weights: Vec<f64>,
    learning_rate: f64,
    seed: u64,
    fitted: bool,
}

impl SoftmaxRegression {
    fn new(num_features: usize, num_classes: usize, learning_rate: f64, seed: u64) -> Self {
        Self {
            num_features,
            num_classes,
            weights: vec![0.0; num_classes * (num_features + 1)],
            learning_rate,
            seed,
            fitted: false,
        }
    }

    fn stride(&self) -> usize {
        self.num_features + 1
    }

    /// Class probabilities for one sample, written into `out`.
    fn probabilities(&self, x: &[f64], out: &mut [f64]) {
        let stride = self.stride();
        for (c, p) in out.iter_mut().enumerate() {
            let row = &self.weights[c * stride..(c + 1) * stride];
            let dot: f64 = row[..self.num_features]
                .iter()
                .zip(x)
                .map(|(w, v)| w * v)
                .sum();
            *p = dot + row[self.num_features];
        }
        let max = out.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mut total = 0.0;
        for p in out.iter_mut() {
            *p = (*p - max).exp();
            total += *p;
        }
        for p in out.iter_mut() {
            *p /= total;
        }
    }

    fn check_split(&self, split: &Split) -> Result<(), ModelError> {
        match split.feature_dim() {
            None => Err(ModelError::EmptySplit),
            Some(dim) if dim != self.num_features => Err(ModelError::ShapeMismatch {
                expected: self.num_features,
                actual: dim,
            }),
            Some(_) => Ok(()),
        }
    }

    /// Mean cross-entropy and accuracy; NaN loss if the weights have blown up.
    fn score(&self, split: &Split) -> Evaluation {
        let mut probs = vec![0.0; self.num_classes];
        let mut loss = 0.0;
        let mut correct = 0usize;
        for (x, y) in split.iter() {
            self.probabilities(x, &mut probs);
            let p = probs[y];
            loss -= if p.is_nan() { f64::NAN } else { p.max(1e-12).ln() };
            let predicted = probs
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
                .map(|(c, _)| c);
            if predicted == Some(y) {
                correct += 1;
            }
        }
        let n = split.len().max(1) as f64;
        Evaluation {
            loss: loss / n,
            accuracy: correct as f64 / n,
        }
    }
}

impl TrainableModel for SoftmaxRegression {
    fn fit(
        &mut self,
        train: &Split,
        validation: &Split,
        config: &HyperparameterConfig,
    ) -> Result<TrainingHistory, ModelError> {
        if self.fitted {
            return Err(ModelError::other("model instance has already been fitted"));
        }
        self.fitted = true;
        if config.batch_size() == 0 {
            return Err(ModelError::other("batch size must be positive"));
        }
        self.check_split(train)?;
        if !validation.is_empty() {
            self.check_split(validation)?;
        }

        let learning_rate = config
            .get_f64(LEARNING_RATE)
            .unwrap_or(self.learning_rate);
        if !(learning_rate.is_finite() && learning_rate > 0.0) {
            return Err(ModelError::other(format!(
                "learning rate must be positive and finite, got {learning_rate}"
            )));
        }

        let stride = self.stride();
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut order: Vec<usize> = (0..train.len()).collect();
        let mut grad = vec![0.0; self.weights.len()];
        let mut probs = vec![0.0; self.num_classes];
        let mut history = TrainingHistory::new();

        for epoch in 1..=config.epochs() {
            order.shuffle(&mut rng);
            for batch in order.chunks(config.batch_size()) {
                grad.fill(0.0);
                for &i in batch {
                    let x = &train.features()[i];
                    let y = train.labels()[i];
                    self.probabilities(x, &mut probs);
                    for (c, p) in probs.iter().enumerate() {
                        let delta = p - if c == y { 1.0 } else { 0.0 };
                        let g = &mut grad[c * stride..(c + 1) * stride];
                        for (gj, xj) in g.iter_mut().zip(x) {
                            *gj += delta * xj;
                        }
                        g[self.num_features] += delta;
                    }
                }
                let scale = learning_rate / batch.len() as f64;
                for (w, g) in self.weights.iter_mut().zip(&grad) {
                    *w -= scale * g;
                }
            }

            let train_eval = self.score(train);
            if !train_eval.loss.is_finite() {
                return Err(ModelError::Diverged {
                    epoch,
                    loss: train_eval.loss,
                });
            }
            let (val_loss, val_accuracy) = if validation.is_empty() {
                (None, None)
            } else {
                let v = self.score(validation);
                (Some(v.loss), Some(v.accuracy))
            };
            history.record(train_eval.loss, train_eval.accuracy, val_loss, val_accuracy);
        }

        Ok(history)
    }

    fn evaluate(&self, split: &Split) -> Result<Evaluation, ModelError> {
        if !self.fitted {
            return Err(ModelError::other("evaluate called before fit"));
        }
        self.check_split(split)?;
        Ok(self.score(split))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridtune_core::{ConfigError, Dataset, FinalModelRunner, TuneError};

    fn separable() -> Split {
        let mut features = Vec::new();
        let mut labels = Vec::new();
        for i in 0..40 {
            let t = i as f64 / 40.0;
            features.push(vec![-2.0 + t, 1.0 - t]);
            labels.push(0);
            features.push(vec![2.0 - t, -1.0 + t]);
            labels.push(1);
        }
        Split::new(features, labels).unwrap()
    }

    fn model() -> SoftmaxRegression {
        SoftmaxFactory {
            learning_rate: 0.5,
            seed: 1,
        }
        .build(&InputShape::new([2]).unwrap(), 2)
        .unwrap()
    }

    #[test]
    fn test_learns_separable_data() {
        let data = separable();
        let mut m = model();
        let history = m
            .fit(&data, &data, &HyperparameterConfig::new(20, 8))
            .unwrap();
        assert_eq!(history.len(), 20);
        let first = history.epochs[0].loss;
        let last = history.last().unwrap().loss;
        assert!(last < first);
        assert!(m.evaluate(&data).unwrap().accuracy >= 0.95);
    }

    #[test]
    fn test_fit_is_deterministic() {
        let data = separable();
        let config = HyperparameterConfig::new(5, 16);
        let mut a = model();
        let mut b = model();
        assert_eq!(
            a.fit(&data, &data, &config).unwrap(),
            b.fit(&data, &data, &config).unwrap()
        );
        assert_eq!(a.evaluate(&data).unwrap(), b.evaluate(&data).unwrap());
    }

    #[test]
    fn test_learning_rate_knob_overrides_default() {
        let data = separable();
        let mut slow = model();
        let mut fast = model();
        let h_slow = slow
            .fit(&data, &data, &HyperparameterConfig::new(1, 80).with(LEARNING_RATE, 0.001))
            .unwrap();
        let h_fast = fast
            .fit(&data, &data, &HyperparameterConfig::new(1, 80).with(LEARNING_RATE, 1.0))
            .unwrap();
        assert!(h_fast.epochs[0].loss < h_slow.epochs[0].loss);
    }

    #[test]
    fn test_second_fit_rejected() {
        let data = separable();
        let mut m = model();
        let config = HyperparameterConfig::new(1, 8);
        m.fit(&data, &data, &config).unwrap();
        assert!(m.fit(&data, &data, &config).is_err());
    }

    #[test]
    fn test_non_finite_input_diverges() {
        let train = Split::new(vec![vec![f64::NAN, 0.0], vec![1.0, 1.0]], vec![0, 1]).unwrap();
        let mut m = model();
        let err = m
            .fit(&train, &train, &HyperparameterConfig::new(3, 2))
            .unwrap_err();
        assert!(matches!(err, ModelError::Diverged { epoch: 1, .. }));
    }

    #[test]
    fn test_shape_mismatch() {
        let train = Split::new(vec![vec![1.0, 2.0, 3.0]], vec![0]).unwrap();
        let mut m = model();
        let err = m
            .fit(&train, &train, &HyperparameterConfig::new(1, 1))
            .unwrap_err();
        assert!(matches!(
            err,
            ModelError::ShapeMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_factory_rejects_single_class() {
        let factory = SoftmaxFactory {
            learning_rate: 0.1,
            seed: 0,
        };
        assert!(factory.build(&InputShape::new([2]).unwrap(), 1).is_err());
    }

    #[test]
    fn test_zero_batch_size_is_an_error() {
        let data = separable();
        let err = model()
            .fit(&data, &data, &HyperparameterConfig::new(2, 0))
            .unwrap_err();
        assert!(err.to_string().contains("batch size"));
    }

    #[test]
    fn test_finalize_rejects_zero_batch_size() {
        let factory = SoftmaxFactory {
            learning_rate: 0.1,
            seed: 3,
        };
        let ds = Dataset::new(separable(), separable()).unwrap();
        let shape = InputShape::new([2]).unwrap();
        let err = FinalModelRunner::new(&factory)
            .finalize_config(&ds, &HyperparameterConfig::new(2, 0), &shape, 2)
            .unwrap_err();
        assert!(matches!(
            err,
            TuneError::Config(ConfigError::InvalidValue { .. })
        ));
    }
}
