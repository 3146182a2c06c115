//! Dataset acquisition for the CLI: a JSON file or a seeded synthetic set.

use anyhow::Context;
use gridtune_core::config::DataConfig;
use gridtune_core::{Dataset, InputShape, Split};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::TAU;
use std::path::Path;

/// Load the configured dataset.
pub fn load(
    settings: &DataConfig,
    shape: &InputShape,
    num_classes: usize,
) -> anyhow::Result<Dataset> {
    match &settings.path {
        Some(path) => load_json(path),
        None => synthetic(settings, shape, num_classes),
    }
}

/// Read a `{ "train": {features, labels}, "test": {features, labels} }` file.
pub fn load_json(path: &Path) -> anyhow::Result<Dataset> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read dataset {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse dataset {}", path.display()))
}

/// One jittered blob per class around evenly spaced centres.
pub fn synthetic(
    settings: &DataConfig,
    shape: &InputShape,
    num_classes: usize,
) -> anyhow::Result<Dataset> {
    anyhow::ensure!(num_classes > 0, "synthetic data needs at least one class");
    let dim = shape.flat_len();
    let centres: Vec<Vec<f64>> = (0..num_classes)
        .map(|c| centre(c, num_classes, dim))
        .collect();
    let mut rng = StdRng::seed_from_u64(settings.seed);

    let mut split = |n: usize| -> anyhow::Result<Split> {
        let mut features = Vec::with_capacity(n);
        let mut labels = Vec::with_capacity(n);
        for i in 0..n {
            let label = i % num_classes;
            let row: Vec<f64> = centres[label]
                .iter()
                .map(|c| {
                    if settings.noise > 0.0 {
                        c + rng.gen_range(-settings.noise..=settings.noise)
                    } else {
                        *c
                    }
                })
                .collect();
            features.push(row);
            labels.push(label);
        }
        Ok(Split::new(features, labels)?)
    };

    let train = split(settings.train_samples)?;
    let test = split(settings.test_samples)?;
    Ok(Dataset::new(train, test)?)
}

fn centre(class: usize, num_classes: usize, dim: usize) -> Vec<f64> {
    if dim == 1 {
        return vec![2.0 * class as f64];
    }
    let theta = TAU * class as f64 / num_classes as f64;
    (0..dim)
        .map(|d| {
            let harmonic = (d / 2 + 1) as f64;
            if d % 2 == 0 {
                2.0 * (harmonic * theta).cos()
            } else {
                2.0 * (harmonic * theta).sin()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> DataConfig {
        DataConfig {
            train_samples: 30,
            test_samples: 9,
            ..DataConfig::default()
        }
    }

    #[test]
    fn test_synthetic_shapes() {
        let shape = InputShape::new([2]).unwrap();
        let ds = synthetic(&settings(), &shape, 3).unwrap();
        assert_eq!(ds.train().len(), 30);
        assert_eq!(ds.test().len(), 9);
        assert_eq!(ds.train().feature_dim(), Some(2));
        assert!(ds.check_contract(&shape, 3).is_ok());
    }

    #[test]
    fn test_synthetic_is_seeded() {
        let shape = InputShape::new([4]).unwrap();
        let a = synthetic(&settings(), &shape, 3).unwrap();
        let b = synthetic(&settings(), &shape, 3).unwrap();
        assert_eq!(a, b);

        let other = DataConfig {
            seed: 99,
            ..settings()
        };
        assert_ne!(synthetic(&other, &shape, 3).unwrap(), a);
    }

    #[test]
    fn test_synthetic_without_noise_sits_on_centres() {
        let shape = InputShape::new([1]).unwrap();
        let cfg = DataConfig {
            noise: 0.0,
            ..settings()
        };
        let ds = synthetic(&cfg, &shape, 2).unwrap();
        assert_eq!(ds.train().features()[0], vec![0.0]);
        assert_eq!(ds.train().features()[1], vec![2.0]);
    }

    #[test]
    fn test_load_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(
            &path,
            r#"{"train": {"features": [[0.0, 1.0], [1.0, 0.0]], "labels": [0, 1]},
                "test": {"features": [[0.5, 0.5]], "labels": [1]}}"#,
        )
        .unwrap();
        let ds = load_json(&path).unwrap();
        assert_eq!(ds.train().len(), 2);
        assert!(load_json(&dir.path().join("missing.json")).is_err());
    }
}
