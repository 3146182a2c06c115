//! Best-configuration selection over the result log.

use crate::grid::HyperparameterConfig;
use crate::search::CellOutcome;
use crate::training::run::TuningResult;
use serde::{Deserialize, Serialize};

/// The highest-accuracy configuration seen so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestSelection {
    pub config: HyperparameterConfig,
    pub accuracy: f64,
    /// Position of the winning cell in the result log.
    pub index: usize,
}

impl BestSelection {
    pub fn from_result(index: usize, result: &TuningResult) -> Self {
        Self {
            config: result.config.clone(),
            accuracy: result.test_accuracy,
            index,
        }
    }

    /// Fold step: a result replaces the current best only with strictly higher accuracy.
    ///
    /// Ties keep the earlier cell, so the winner depends on grid order alone.
    pub fn advance(current: Option<Self>, index: usize, outcome: &CellOutcome) -> Option<Self> {
        let Some(result) = outcome.result() else {
            return current;
        };
        match current {
            Some(best) if result.test_accuracy <= best.accuracy => Some(best),
            _ => Some(Self::from_result(index, result)),
        }
    }

    /// Select the best completed cell of a log, `None` if every cell failed.
    pub fn select<'a, I>(log: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a CellOutcome>,
    {
        log.into_iter()
            .enumerate()
            .fold(None, |best, (index, outcome)| {
                Self::advance(best, index, outcome)
            })
    }
}
