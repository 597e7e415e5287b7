//! Run configuration for a single benchmark run.

use crate::types::ModelKind;
use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;

/// Environment variable that overrides the default dataset root
pub const DATA_ROOT_ENV: &str = "MEDMNIST_ROOT";

/// All parameters of one benchmark run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunConfig {
    /// Dataset key, e.g. `pathmnist`
    pub dataset: String,
    /// Model variant; `None` picks one from the dataset's dimensionality
    pub model: Option<ModelKind>,
    /// Number of training epochs
    pub epochs: usize,
    /// Batch size for all three splits
    pub batch_size: usize,
    /// Adam learning rate
    pub lr: f64,
    /// Optional cap on training samples (val/test get a quarter)
    pub limit_samples: Option<usize>,
    /// Worker threads used to build batch items
    pub num_workers: usize,
    /// Random seed for reproducibility
    pub seed: u64,
    /// Directory holding `<dataset>.npz` archives
    pub data_root: PathBuf,
    /// Root of the per-run output directories
    pub output_root: PathBuf,
    /// Download missing archives
    pub download: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            dataset: "pathmnist".to_string(),
            model: None,
            epochs: 1,
            batch_size: 64,
            lr: 1e-3,
            limit_samples: None,
            num_workers: 2,
            seed: 42,
            data_root: default_data_root(),
            output_root: PathBuf::from("outputs"),
            download: true,
        }
    }
}

impl RunConfig {
    /// Rejects parameter values no run can use
    pub fn validate(&self) -> Result<()> {
        if self.dataset.trim().is_empty() {
            return Err(Error::Config("Dataset name must not be empty".to_string()));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("Batch size must be greater than 0".to_string()));
        }
        if !(self.lr > 0.0) {
            return Err(Error::Config(format!(
                "Learning rate must be positive, got {}",
                self.lr
            )));
        }
        if self.limit_samples == Some(0) {
            return Err(Error::Config(
                "limit_samples must be greater than 0 when set".to_string(),
            ));
        }
        Ok(())
    }

    /// Applies every key present in a config file over this configuration
    pub fn apply_overrides(&mut self, overrides: RunConfigOverrides) {
        if let Some(dataset) = overrides.dataset {
            self.dataset = dataset;
        }
        if let Some(model) = overrides.model {
            self.model = model;
        }
        if let Some(epochs) = overrides.epochs {
            self.epochs = epochs;
        }
        if let Some(batch_size) = overrides.batch_size {
            self.batch_size = batch_size;
        }
        if let Some(lr) = overrides.lr {
            self.lr = lr;
        }
        if let Some(limit_samples) = overrides.limit_samples {
            self.limit_samples = limit_samples;
        }
        if let Some(num_workers) = overrides.num_workers {
            self.num_workers = num_workers;
        }
        if let Some(seed) = overrides.seed {
            self.seed = seed;
        }
        if let Some(data_root) = overrides.data_root {
            self.data_root = data_root;
        }
        if let Some(output_root) = overrides.output_root {
            self.output_root = output_root;
        }
        if let Some(download) = overrides.download {
            self.download = download;
        }
    }
}

/// Keys a config file may set. A key that is present wins over the CLI,
/// and an explicit `null` clears optional values.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RunConfigOverrides {
    pub dataset: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub model: Option<Option<ModelKind>>,
    pub epochs: Option<usize>,
    pub batch_size: Option<usize>,
    pub lr: Option<f64>,
    #[serde(default, deserialize_with = "present")]
    pub limit_samples: Option<Option<usize>>,
    pub num_workers: Option<usize>,
    pub seed: Option<u64>,
    pub data_root: Option<PathBuf>,
    pub output_root: Option<PathBuf>,
    pub download: Option<bool>,
    /// Accepted so a file may name itself; never applied
    pub config: Option<PathBuf>,
}

/// Distinguishes a key set to `null` from a missing key.
fn present<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Default dataset root: `$MEDMNIST_ROOT`, then `$HOME/.medmnist`, then `./data`
pub fn default_data_root() -> PathBuf {
    if let Some(root) = std::env::var_os(DATA_ROOT_ENV) {
        return PathBuf::from(root);
    }
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".medmnist"),
        None => PathBuf::from("data"),
    }
}
