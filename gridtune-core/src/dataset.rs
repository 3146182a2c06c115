//! Prepared train/test data and the input shape a model is built for.
//!
//! Loading, scaling and encoding happen before data reaches this crate; a
//! [`Dataset`] only guarantees the structural invariants the sweep relies on.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One split of feature rows with a class index per row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSplit")]
pub struct Split {
    features: Vec<Vec<f64>>,
    labels: Vec<usize>,
}

#[derive(Deserialize)]
struct RawSplit {
    features: Vec<Vec<f64>>,
    labels: Vec<usize>,
}

impl TryFrom<RawSplit> for Split {
    type Error = ConfigError;

    fn try_from(raw: RawSplit) -> Result<Self, Self::Error> {
        Split::new(raw.features, raw.labels)
    }
}

impl Split {
    /// Rows must all have the same width and there must be one label per row.
    pub fn new(features: Vec<Vec<f64>>, labels: Vec<usize>) -> Result<Self, ConfigError> {
        if features.len() != labels.len() {
            return Err(ConfigError::dataset(format!(
                "{} feature rows but {} labels",
                features.len(),
                labels.len()
            )));
        }
        if let Some(first) = features.first() {
            let width = first.len();
            if let Some((row, bad)) = features
                .iter()
                .enumerate()
                .find(|(_, r)| r.len() != width)
            {
                return Err(ConfigError::dataset(format!(
                    "row {row} has {} features, expected {width}",
                    bad.len()
                )));
            }
        }
        Ok(Self { features, labels })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Width of a feature row, `None` for an empty split.
    pub fn feature_dim(&self) -> Option<usize> {
        self.features.first().map(Vec::len)
    }

    pub fn features(&self) -> &[Vec<f64>] {
        &self.features
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Iterate `(features, label)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&[f64], usize)> {
        self.features
            .iter()
            .map(Vec::as_slice)
            .zip(self.labels.iter().copied())
    }

    fn max_label(&self) -> Option<usize> {
        self.labels.iter().copied().max()
    }
}

/// Immutable train/test pair. Owned by the caller and only borrowed by a sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDataset")]
pub struct Dataset {
    train: Split,
    test: Split,
}

#[derive(Deserialize)]
struct RawDataset {
    train: Split,
    test: Split,
}

impl TryFrom<RawDataset> for Dataset {
    type Error = ConfigError;

    fn try_from(raw: RawDataset) -> Result<Self, Self::Error> {
        Dataset::new(raw.train, raw.test)
    }
}

impl Dataset {
    /// Both splits must share the same feature width.
    pub fn new(train: Split, test: Split) -> Result<Self, ConfigError> {
        if let (Some(a), Some(b)) = (train.feature_dim(), test.feature_dim()) {
            if a != b {
                return Err(ConfigError::dataset(format!(
                    "train rows have {a} features but test rows have {b}"
                )));
            }
        }
        Ok(Self { train, test })
    }

    pub fn train(&self) -> &Split {
        &self.train
    }

    pub fn test(&self) -> &Split {
        &self.test
    }

    /// Verify the dataset can feed a model built for `input_shape` and `num_classes`.
    pub fn check_contract(
        &self,
        input_shape: &InputShape,
        num_classes: usize,
    ) -> Result<(), ConfigError> {
        if num_classes == 0 {
            return Err(ConfigError::InvalidClassCount { num_classes });
        }
        for (name, split) in [("train", &self.train), ("test", &self.test)] {
            let dim = split
                .feature_dim()
                .ok_or_else(|| ConfigError::dataset(format!("{name} split is empty")))?;
            if dim != input_shape.flat_len() {
                return Err(ConfigError::dataset(format!(
                    "{name} rows have {dim} features but input shape {input_shape} needs {}",
                    input_shape.flat_len()
                )));
            }
            if let Some(max) = split.max_label() {
                if max >= num_classes {
                    return Err(ConfigError::dataset(format!(
                        "{name} split has label {max} but only {num_classes} classes"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Dimensions of a single input sample, e.g. `[28, 28, 1]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<usize>", into = "Vec<usize>")]
pub struct InputShape(Vec<usize>);

impl InputShape {
    pub fn new(dims: impl Into<Vec<usize>>) -> Result<Self, ConfigError> {
        let dims = dims.into();
        if dims.is_empty() || dims.contains(&0) {
            return Err(ConfigError::InvalidInputShape { shape: dims });
        }
        Ok(Self(dims))
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Number of scalar features once the sample is flattened.
    pub fn flat_len(&self) -> usize {
        self.0.iter().product()
    }
}

impl TryFrom<Vec<usize>> for InputShape {
    type Error = ConfigError;

    fn try_from(dims: Vec<usize>) -> Result<Self, Self::Error> {
        Self::new(dims)
    }
}

impl From<InputShape> for Vec<usize> {
    fn from(shape: InputShape) -> Self {
        shape.0
    }
}

impl fmt::Display for InputShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "{}", dims.join("x"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(rows: &[[f64; 2]], labels: &[usize]) -> Split {
        Split::new(rows.iter().map(|r| r.to_vec()).collect(), labels.to_vec()).unwrap()
    }

    #[test]
    fn test_split_rejects_count_mismatch() {
        let err = Split::new(vec![vec![1.0], vec![2.0]], vec![0]).unwrap_err();
        assert!(err.to_string().contains("2 feature rows but 1 labels"));
    }

    #[test]
    fn test_split_rejects_ragged_rows() {
        let err = Split::new(vec![vec![1.0, 2.0], vec![3.0]], vec![0, 1]).unwrap_err();
        assert!(err.to_string().contains("row 1 has 1 features"));
    }

    #[test]
    fn test_dataset_rejects_width_mismatch() {
        let train = split(&[[0.0, 1.0]], &[0]);
        let test = Split::new(vec![vec![0.0]], vec![0]).unwrap();
        assert!(Dataset::new(train, test).is_err());
    }

    #[test]
    fn test_check_contract() {
        let ds = Dataset::new(
            split(&[[0.0, 1.0], [1.0, 0.0]], &[0, 1]),
            split(&[[0.5, 0.5]], &[1]),
        )
        .unwrap();
        let shape = InputShape::new([2]).unwrap();
        assert!(ds.check_contract(&shape, 2).is_ok());
        assert!(matches!(
            ds.check_contract(&shape, 0),
            Err(ConfigError::InvalidClassCount { .. })
        ));
        assert!(ds.check_contract(&shape, 1).is_err());

        let wrong = InputShape::new([3, 1]).unwrap();
        assert!(ds.check_contract(&wrong, 2).is_err());
    }

    #[test]
    fn test_check_contract_rejects_empty_split() {
        let ds = Dataset::new(
            split(&[[0.0, 1.0]], &[0]),
            Split::new(Vec::new(), Vec::new()).unwrap(),
        )
        .unwrap();
        let err = ds
            .check_contract(&InputShape::new([2]).unwrap(), 2)
            .unwrap_err();
        assert!(err.to_string().contains("test split is empty"));
    }

    #[test]
    fn test_input_shape() {
        let shape = InputShape::new([28, 28, 1]).unwrap();
        assert_eq!(shape.flat_len(), 784);
        assert_eq!(shape.to_string(), "28x28x1");
        assert!(InputShape::new(Vec::<usize>::new()).is_err());
        assert!(InputShape::new([28, 0]).is_err());
    }

    #[test]
    fn test_dataset_deserialize_validates() {
        let ok: Dataset = serde_json::from_str(
            r#"{"train": {"features": [[1.0]], "labels": [0]},
                "test": {"features": [[2.0]], "labels": [0]}}"#,
        )
        .unwrap();
        assert_eq!(ok.train().len(), 1);

        let bad = serde_json::from_str::<Dataset>(
            r#"{"train": {"features": [[1.0]], "labels": [0, 1]},
                "test": {"features": [[2.0]], "labels": [0]}}"#,
        );
        assert!(bad.is_err());
    }
}
