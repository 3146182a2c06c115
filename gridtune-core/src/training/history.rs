//! Per-epoch training metrics.

use serde::{Deserialize, Serialize};

/// Metrics recorded at the end of one epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// 1-based epoch number.
    pub epoch: usize,
    pub loss: f64,
    pub accuracy: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub val_loss: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub val_accuracy: Option<f64>,
}

impl EpochMetrics {
    fn is_finite(&self) -> bool {
        self.loss.is_finite()
            && self.accuracy.is_finite()
            && self.val_loss.is_none_or(f64::is_finite)
            && self.val_accuracy.is_none_or(f64::is_finite)
    }
}

/// Ordered per-epoch snapshots of one fit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochMetrics>,
}

impl TrainingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the next epoch; the epoch number is assigned from the current length.
    pub fn record(
        &mut self,
        loss: f64,
        accuracy: f64,
        val_loss: Option<f64>,
        val_accuracy: Option<f64>,
    ) {
        self.epochs.push(EpochMetrics {
            epoch: self.epochs.len() + 1,
            loss,
            accuracy,
            val_loss,
            val_accuracy,
        });
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    pub fn last(&self) -> Option<&EpochMetrics> {
        self.epochs.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EpochMetrics> {
        self.epochs.iter()
    }

    /// Epoch with the lowest validation loss, falling back to training loss.
    pub fn best_epoch(&self) -> Option<&EpochMetrics> {
        self.epochs.iter().min_by(|a, b| {
            let la = a.val_loss.unwrap_or(a.loss);
            let lb = b.val_loss.unwrap_or(b.loss);
            la.partial_cmp(&lb).unwrap_or(std::cmp::Ordering::Equal)
        })
    }

    /// First epoch carrying a NaN or infinite metric.
    pub fn first_non_finite(&self) -> Option<&EpochMetrics> {
        self.epochs.iter().find(|m| !m.is_finite())
    }
}
