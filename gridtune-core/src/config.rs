//! Configuration system for gridtune.
//!
//! Uses `figment` for layered configuration: defaults -> user config -> workspace
//! config -> explicit file -> environment. Configuration is loaded from
//! `~/.config/gridtune/config.toml` and/or `.gridtune/config.toml` in the workspace.

use crate::dataset::InputShape;
use crate::error::{ConfigError, TuneError};
use crate::grid::{BATCH_SIZE, EPOCHS, HyperparameterGrid, Knob, ParamValue};
use crate::report::ReportFormat;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TuneConfig {
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub run: RunConfig,
}

/// Candidate values per knob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    #[serde(default = "default_epochs")]
    pub epochs: Vec<u64>,
    #[serde(default = "default_batch_sizes")]
    pub batch_size: Vec<u64>,
    /// Additional knobs, enumerated after epochs and batch size in the order listed.
    #[serde(default)]
    pub extra: Vec<Knob>,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            epochs: default_epochs(),
            batch_size: default_batch_sizes(),
            extra: Vec::new(),
        }
    }
}

fn default_epochs() -> Vec<u64> {
    vec![5, 10]
}

fn default_batch_sizes() -> Vec<u64> {
    vec![32, 64]
}

impl GridConfig {
    pub fn to_grid(&self) -> HyperparameterGrid {
        let as_values = |v: &[u64]| -> Vec<ParamValue> {
            v.iter()
                .map(|n| ParamValue::Int(i64::try_from(*n).unwrap_or(i64::MAX)))
                .collect()
        };
        let mut grid = HyperparameterGrid::new()
            .knob(EPOCHS, as_values(&self.epochs))
            .knob(BATCH_SIZE, as_values(&self.batch_size));
        for knob in &self.extra {
            grid = grid.knob(&knob.name, knob.values.iter().cloned());
        }
        grid
    }
}

/// Architecture and optimizer settings for the built-in model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_input_shape")]
    pub input_shape: Vec<usize>,
    #[serde(default = "default_num_classes")]
    pub num_classes: usize,
    /// Used unless the grid declares a `learning_rate` knob.
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// Seed for weight shuffling; fixed so retraining is reproducible.
    #[serde(default = "default_model_seed")]
    pub seed: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            input_shape: default_input_shape(),
            num_classes: default_num_classes(),
            learning_rate: default_learning_rate(),
            seed: default_model_seed(),
        }
    }
}

fn default_input_shape() -> Vec<usize> {
    vec![2]
}

fn default_num_classes() -> usize {
    3
}

fn default_learning_rate() -> f64 {
    0.1
}

fn default_model_seed() -> u64 {
    42
}

/// Where the prepared dataset comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    /// JSON dataset file; a synthetic dataset is generated when unset.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_train_samples")]
    pub train_samples: usize,
    #[serde(default = "default_test_samples")]
    pub test_samples: usize,
    /// Half-width of the uniform jitter around each synthetic class centre.
    #[serde(default = "default_noise")]
    pub noise: f64,
    #[serde(default = "default_data_seed")]
    pub seed: u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            path: None,
            train_samples: default_train_samples(),
            test_samples: default_test_samples(),
            noise: default_noise(),
            seed: default_data_seed(),
        }
    }
}

fn default_train_samples() -> usize {
    300
}

fn default_test_samples() -> usize {
    90
}

fn default_noise() -> f64 {
    0.35
}

fn default_data_seed() -> u64 {
    7
}

/// Report output settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default)]
    pub format: ReportFormat,
    /// Also persist the JSON sweep report to this file.
    #[serde(default)]
    pub output: Option<PathBuf>,
}

/// Log file settings. Console verbosity comes from the command line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory for JSON log files (platform data dir when unset).
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    /// Write structured JSON logs to a daily rolling file.
    #[serde(default)]
    pub json_file: bool,
}

/// Execution settings for the sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Abort the whole process if search plus finalize exceed this many seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Number of grid cells trained concurrently.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            timeout_secs: None,
            parallelism: default_parallelism(),
        }
    }
}

fn default_parallelism() -> usize {
    1
}

impl TuneConfig {
    pub fn input_shape(&self) -> Result<InputShape, ConfigError> {
        InputShape::new(self.model.input_shape.clone())
    }

    /// Reject settings that would fail before or during the sweep.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.grid.to_grid().validate()?;
        self.input_shape()?;
        if self.model.num_classes == 0 {
            return Err(ConfigError::InvalidClassCount {
                num_classes: self.model.num_classes,
            });
        }
        if !(self.model.learning_rate.is_finite() && self.model.learning_rate > 0.0) {
            return Err(ConfigError::setting(
                "model.learning_rate",
                "must be a positive finite number",
            ));
        }
        if self.data.path.is_none() {
            if self.data.train_samples == 0 || self.data.test_samples == 0 {
                return Err(ConfigError::setting(
                    "data.train_samples",
                    "synthetic splits need at least one sample each",
                ));
            }
            if !(self.data.noise.is_finite() && self.data.noise >= 0.0) {
                return Err(ConfigError::setting(
                    "data.noise",
                    "must be a non-negative finite number",
                ));
            }
        }
        if self.run.parallelism == 0 {
            return Err(ConfigError::setting("run.parallelism", "must be at least 1"));
        }
        if self.run.timeout_secs == Some(0) {
            return Err(ConfigError::setting("run.timeout_secs", "must be positive"));
        }
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, TuneError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("dev", "gridtune", "gridtune")
}

/// Path of the workspace-level config file.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".gridtune").join("config.toml")
}

/// Path of the user-level config file, if the platform has a config directory.
pub fn user_config_path() -> Option<PathBuf> {
    project_dirs().map(|d| d.config_dir().join("config.toml"))
}

/// Platform data directory for log files.
pub fn default_log_dir() -> Option<PathBuf> {
    project_dirs().map(|d| d.data_dir().join("logs"))
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with `GRIDTUNE_`, nested with `__`)
/// 2. An explicit config file, if given
/// 3. Workspace-local config (`.gridtune/config.toml`)
/// 4. User config (`~/.config/gridtune/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    config_file: Option<&Path>,
) -> Result<TuneConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(TuneConfig::default()));

    if let Some(user_config) = user_config_path().filter(|p| p.exists()) {
        figment = figment.merge(Toml::file(user_config));
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(ws_config));
        }
    }

    // An explicitly requested file must exist.
    if let Some(file) = config_file {
        if !file.exists() {
            return Err(ConfigError::setting(
                "config",
                format!("file not found: {}", file.display()),
            ));
        }
        figment = figment.merge(Toml::file(file));
    }

    // GRIDTUNE_GRID__EPOCHS=[5,10], GRIDTUNE_RUN__PARALLELISM=4, etc.
    figment = figment.merge(Env::prefixed("GRIDTUNE_").split("__"));

    figment
        .extract()
        .map_err(|e| ConfigError::Load(Box::new(e)))
}

/// Write a default config file into the workspace, refusing to overwrite.
pub fn init_workspace_config(workspace: &Path) -> Result<PathBuf, TuneError> {
    let path = workspace_config_path(workspace);
    if path.exists() {
        return Err(TuneError::Io(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("{} already exists", path.display()),
        )));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, TuneConfig::default().to_toml()?)?;
    Ok(path)
}
