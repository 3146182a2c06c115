//! Hyperparameter configurations and the N-dimensional grid they are drawn from.
//!
//! A [`HyperparameterGrid`] is an ordered list of [`Knob`]s, each with an ordered,
//! finite set of candidate values. Enumeration walks the Cartesian product
//! outer-to-inner in declared knob order: the last declared knob varies fastest.
//! `epochs` and `batch_size` are required knobs; any other knob is carried through
//! to the model untouched in [`HyperparameterConfig::extra`].

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Knob name for the epoch count.
pub const EPOCHS: &str = "epochs";
/// Knob name for the batch size.
pub const BATCH_SIZE: &str = "batch_size";

/// A single candidate value of a knob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for ParamValue {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<usize> for ParamValue {
    fn from(v: usize) -> Self {
        Self::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// A named tuning knob and its ordered candidate values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Knob {
    pub name: String,
    pub values: Vec<ParamValue>,
}

/// One point of the grid.
///
/// A value type: cloned into every result that refers to it and compared by value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HyperparameterConfig {
    epochs: usize,
    batch_size: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    extra: Vec<(String, ParamValue)>,
}

impl HyperparameterConfig {
    pub fn new(epochs: usize, batch_size: usize) -> Self {
        Self {
            epochs,
            batch_size,
            extra: Vec::new(),
        }
    }

    /// Attach an additional knob value, replacing any previous value of that knob.
    pub fn with(mut self, name: &str, value: impl Into<ParamValue>) -> Self {
        let value = value.into();
        match self.extra.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = value,
            None => self.extra.push((name.to_string(), value)),
        }
        self
    }

    pub fn epochs(&self) -> usize {
        self.epochs
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Knobs other than `epochs` and `batch_size`, in declared order.
    pub fn extra(&self) -> &[(String, ParamValue)] {
        &self.extra
    }

    /// Look up a knob value by name, including the two required knobs.
    pub fn get(&self, name: &str) -> Option<ParamValue> {
        match name {
            EPOCHS => Some(ParamValue::from(self.epochs)),
            BATCH_SIZE => Some(ParamValue::from(self.batch_size)),
            _ => self
                .extra
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.clone()),
        }
    }

    /// Numeric extra knob, e.g. a learning rate.
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(|v| v.as_f64())
    }

    /// Apply the per-value grid rules to a single configuration.
    ///
    /// Configurations enumerated from a validated grid always pass; this guards
    /// ones built by hand or deserialized.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive_count(EPOCHS, &ParamValue::from(self.epochs))?;
        positive_count(BATCH_SIZE, &ParamValue::from(self.batch_size))?;

        let mut seen = HashSet::from([EPOCHS, BATCH_SIZE]);
        for (name, value) in &self.extra {
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::DuplicateKnob { knob: name.clone() });
            }
            check_finite(name, value)?;
        }
        Ok(())
    }
}

impl fmt::Display for HyperparameterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{EPOCHS}={}, {BATCH_SIZE}={}",
            self.epochs, self.batch_size
        )?;
        for (name, value) in &self.extra {
            write!(f, ", {name}={value}")?;
        }
        Ok(())
    }
}

/// The Cartesian product of the declared knobs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HyperparameterGrid {
    knobs: Vec<Knob>,
}

impl HyperparameterGrid {
    pub fn new() -> Self {
        Self { knobs: Vec::new() }
    }

    /// The common two-knob grid: epochs outer, batch size inner.
    pub fn epochs_by_batch_size(epochs: &[usize], batch_sizes: &[usize]) -> Self {
        Self::new()
            .knob(EPOCHS, epochs.iter().copied())
            .knob(BATCH_SIZE, batch_sizes.iter().copied())
    }

    /// Declare another knob. Knobs are enumerated in the order they are declared.
    pub fn knob<I, V>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<ParamValue>,
    {
        self.knobs.push(Knob {
            name: name.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn knobs(&self) -> &[Knob] {
        &self.knobs
    }

    pub fn knob_names(&self) -> Vec<&str> {
        self.knobs.iter().map(|k| k.name.as_str()).collect()
    }

    /// Number of cells: the product of candidate-set sizes (saturating).
    pub fn len(&self) -> usize {
        self.knobs
            .iter()
            .try_fold(1usize, |acc, k| acc.checked_mul(k.values.len()))
            .unwrap_or(usize::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check every structural rule without enumerating.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.axes().map(|_| ())
    }

    /// Lazily enumerate the grid in deterministic declared order.
    pub fn iter(&self) -> Result<GridIter<'_>, ConfigError> {
        let axes = self.axes()?;
        let total = self.len();
        Ok(GridIter {
            indices: vec![0; axes.len()],
            axes,
            remaining: total,
        })
    }

    /// Materialize every configuration of the grid.
    pub fn configurations(&self) -> Result<Vec<HyperparameterConfig>, ConfigError> {
        Ok(self.iter()?.collect())
    }

    fn axes(&self) -> Result<Vec<Axis<'_>>, ConfigError> {
        let mut seen = HashSet::new();
        let mut axes = Vec::with_capacity(self.knobs.len());

        for knob in &self.knobs {
            if !seen.insert(knob.name.as_str()) {
                return Err(ConfigError::DuplicateKnob {
                    knob: knob.name.clone(),
                });
            }
            if knob.values.is_empty() {
                return Err(ConfigError::EmptyKnob {
                    knob: knob.name.clone(),
                });
            }
            let axis = match knob.name.as_str() {
                EPOCHS => Axis::Epochs(positive_counts(knob)?),
                BATCH_SIZE => Axis::BatchSize(positive_counts(knob)?),
                _ => {
                    for value in &knob.values {
                        check_finite(&knob.name, value)?;
                    }
                    Axis::Extra {
                        name: &knob.name,
                        values: &knob.values,
                    }
                }
            };
            axes.push(axis);
        }

        for required in [EPOCHS, BATCH_SIZE] {
            if !seen.contains(required) {
                return Err(ConfigError::MissingKnob {
                    knob: required.to_string(),
                });
            }
        }

        self.knobs
            .iter()
            .try_fold(1usize, |acc, k| acc.checked_mul(k.values.len()))
            .ok_or(ConfigError::GridTooLarge)?;

        Ok(axes)
    }
}

fn positive_counts(knob: &Knob) -> Result<Vec<usize>, ConfigError> {
    knob.values
        .iter()
        .map(|value| positive_count(&knob.name, value))
        .collect()
}

fn positive_count(knob: &str, value: &ParamValue) -> Result<usize, ConfigError> {
    value
        .as_i64()
        .filter(|v| *v > 0)
        .and_then(|v| usize::try_from(v).ok())
        .ok_or_else(|| ConfigError::InvalidValue {
            knob: knob.to_string(),
            value: value.to_string(),
            reason: "must be a positive integer".into(),
        })
}

fn check_finite(knob: &str, value: &ParamValue) -> Result<(), ConfigError> {
    match value {
        ParamValue::Float(f) if !f.is_finite() => Err(ConfigError::InvalidValue {
            knob: knob.to_string(),
            value: value.to_string(),
            reason: "must be finite".into(),
        }),
        _ => Ok(()),
    }
}

/// A validated knob, ready for enumeration.
#[derive(Debug)]
enum Axis<'a> {
    Epochs(Vec<usize>),
    BatchSize(Vec<usize>),
    Extra {
        name: &'a str,
        values: &'a [ParamValue],
    },
}

impl Axis<'_> {
    fn len(&self) -> usize {
        match self {
            Self::Epochs(v) | Self::BatchSize(v) => v.len(),
            Self::Extra { values, .. } => values.len(),
        }
    }
}

/// Odometer over the grid; the last axis advances first.
#[derive(Debug)]
pub struct GridIter<'a> {
    axes: Vec<Axis<'a>>,
    indices: Vec<usize>,
    remaining: usize,
}

impl Iterator for GridIter<'_> {
    type Item = HyperparameterConfig;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let mut config = HyperparameterConfig::new(0, 0);
        for (axis, &i) in self.axes.iter().zip(&self.indices) {
            match axis {
                Axis::Epochs(values) => config.epochs = values[i],
                Axis::BatchSize(values) => config.batch_size = values[i],
                Axis::Extra { name, values } => {
                    config.extra.push((name.to_string(), values[i].clone()));
                }
            }
        }

        self.remaining -= 1;
        for (axis, index) in self.axes.iter().zip(self.indices.iter_mut()).rev() {
            *index += 1;
            if *index < axis.len() {
                break;
            }
            *index = 0;
        }

        Some(config)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for GridIter<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pairs(grid: &HyperparameterGrid) -> Vec<(usize, usize)> {
        grid.configurations()
            .unwrap()
            .iter()
            .map(|c| (c.epochs(), c.batch_size()))
            .collect()
    }

    #[test]
    fn test_two_knob_grid_order() {
        let grid = HyperparameterGrid::epochs_by_batch_size(&[5, 10], &[32, 64]);
        assert_eq!(grid.len(), 4);
        assert_eq!(pairs(&grid), vec![(5, 32), (5, 64), (10, 32), (10, 64)]);
    }

    #[test]
    fn test_declared_order_controls_nesting() {
        let grid = HyperparameterGrid::new()
            .knob(BATCH_SIZE, [32, 64])
            .knob(EPOCHS, [5, 10]);
        assert_eq!(pairs(&grid), vec![(5, 32), (10, 32), (5, 64), (10, 64)]);
    }

    #[test]
    fn test_extra_knob_composes() {
        let grid = HyperparameterGrid::epochs_by_batch_size(&[5], &[32, 64])
            .knob("learning_rate", [0.1, 0.01]);
        let configs = grid.configurations().unwrap();
        assert_eq!(configs.len(), 4);
        assert_eq!(configs[0].get_f64("learning_rate"), Some(0.1));
        assert_eq!(configs[1].get_f64("learning_rate"), Some(0.01));
        assert_eq!(configs[2].batch_size(), 64);
        assert_eq!(
            configs[3].to_string(),
            "epochs=5, batch_size=64, learning_rate=0.01"
        );
    }

    #[test]
    fn test_iter_is_exact_size() {
        let grid = HyperparameterGrid::epochs_by_batch_size(&[1, 2, 3], &[8, 16]);
        let iter = grid.iter().unwrap();
        assert_eq!(iter.len(), 6);
        assert_eq!(iter.count(), 6);
    }

    #[test]
    fn test_empty_knob_rejected() {
        let grid = HyperparameterGrid::epochs_by_batch_size(&[5, 10], &[]);
        assert!(grid.is_empty());
        assert!(matches!(
            grid.validate(),
            Err(ConfigError::EmptyKnob { knob }) if knob == BATCH_SIZE
        ));
    }

    #[test]
    fn test_missing_required_knob() {
        let grid = HyperparameterGrid::new().knob(EPOCHS, [5]);
        assert!(matches!(
            grid.validate(),
            Err(ConfigError::MissingKnob { knob }) if knob == BATCH_SIZE
        ));
    }

    #[test]
    fn test_duplicate_knob_rejected() {
        let grid = HyperparameterGrid::epochs_by_batch_size(&[5], &[32]).knob(EPOCHS, [7]);
        assert!(matches!(
            grid.validate(),
            Err(ConfigError::DuplicateKnob { .. })
        ));
    }

    #[test]
    fn test_non_positive_values_rejected() {
        let grid = HyperparameterGrid::new()
            .knob(EPOCHS, [5, 0])
            .knob(BATCH_SIZE, [32]);
        assert!(matches!(
            grid.validate(),
            Err(ConfigError::InvalidValue { value, .. }) if value == "0"
        ));

        let grid = HyperparameterGrid::new()
            .knob(EPOCHS, [5])
            .knob(BATCH_SIZE, [-32]);
        assert!(grid.validate().is_err());

        let grid = HyperparameterGrid::new()
            .knob(EPOCHS, [2.5])
            .knob(BATCH_SIZE, [32]);
        assert!(grid.validate().is_err());
    }

    #[test]
    fn test_non_finite_extra_rejected() {
        let grid =
            HyperparameterGrid::epochs_by_batch_size(&[5], &[32]).knob("lr", [0.1, f64::NAN]);
        assert!(matches!(
            grid.validate(),
            Err(ConfigError::InvalidValue { knob, .. }) if knob == "lr"
        ));
    }

    #[test]
    fn test_config_validate() {
        assert!(HyperparameterConfig::new(5, 32).with("lr", 0.1).validate().is_ok());
        assert!(matches!(
            HyperparameterConfig::new(0, 32).validate(),
            Err(ConfigError::InvalidValue { knob, .. }) if knob == EPOCHS
        ));
        assert!(matches!(
            HyperparameterConfig::new(5, 0).validate(),
            Err(ConfigError::InvalidValue { knob, .. }) if knob == BATCH_SIZE
        ));
        assert!(matches!(
            HyperparameterConfig::new(5, 32).with("lr", f64::INFINITY).validate(),
            Err(ConfigError::InvalidValue { knob, .. }) if knob == "lr"
        ));
    }

    #[test]
    fn test_deserialized_config_validate() {
        let zero: HyperparameterConfig =
            serde_json::from_str(r#"{"epochs": 3, "batch_size": 0}"#).unwrap();
        assert!(zero.validate().is_err());

        let shadowed: HyperparameterConfig =
            serde_json::from_str(r#"{"epochs": 3, "batch_size": 8, "extra": [["epochs", 9]]}"#)
                .unwrap();
        assert!(matches!(
            shadowed.validate(),
            Err(ConfigError::DuplicateKnob { .. })
        ));
    }

    #[test]
    fn test_config_with_replaces_value() {
        let config = HyperparameterConfig::new(5, 32)
            .with("lr", 0.1)
            .with("lr", 0.2);
        assert_eq!(config.extra().len(), 1);
        assert_eq!(config.get_f64("lr"), Some(0.2));
        assert_eq!(config.get(EPOCHS), Some(ParamValue::Int(5)));
        assert_eq!(config.get("missing"), None);
    }

    #[test]
    fn test_param_value_untagged_serde() {
        let values: Vec<ParamValue> = serde_json::from_str(r#"[1, 0.5, "adam", true]"#).unwrap();
        assert_eq!(
            values,
            vec![
                ParamValue::Int(1),
                ParamValue::Float(0.5),
                ParamValue::Text("adam".into()),
                ParamValue::Bool(true),
            ]
        );
    }

    #[test]
    fn test_config_serialization_shape() {
        let json = serde_json::to_value(HyperparameterConfig::new(10, 64)).unwrap();
        assert_eq!(json, serde_json::json!({"epochs": 10, "batch_size": 64}));
    }
}
