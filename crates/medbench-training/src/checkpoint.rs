//! Run artifacts: output directory layout, model weights and metrics.

use burn::module::Module;
use burn::record::{BinBytesRecorder, FullPrecisionSettings, Recorder};
use burn::tensor::backend::Backend;
use chrono::Local;
use medbench_core::{Error, ModelKind, Result, RunMetrics};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::model::MedClassifier;

pub const BEST_MODEL_FILE: &str = "best.pt";
pub const METRICS_FILE: &str = "metrics.json";
pub const CONFUSION_MATRIX_FILE: &str = "confusion_matrix.png";

/// Directory receiving everything one run writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunArtifacts {
    dir: PathBuf,
}

impl RunArtifacts {
    /// `<output_root>/<dataset>/<model>/<YYYYmmdd-HHMMSS>`, created on disk
    pub fn create(output_root: &Path, dataset: &str, model: ModelKind) -> Result<Self> {
        let stamp = Local::now().format("%Y%m%d-%H%M%S").to_string();
        Self::at(output_root.join(dataset).join(model.to_string()).join(stamp))
    }

    /// Uses `dir` as is, creating it when missing
    pub fn at(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn best_model_path(&self) -> PathBuf {
        self.dir.join(BEST_MODEL_FILE)
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.dir.join(METRICS_FILE)
    }

    pub fn confusion_matrix_path(&self) -> PathBuf {
        self.dir.join(CONFUSION_MATRIX_FILE)
    }
}

fn recorder() -> BinBytesRecorder<FullPrecisionSettings> {
    BinBytesRecorder::<FullPrecisionSettings>::default()
}

/// Writes the model record at full precision to `path`.
///
/// File recorders append their own extension, so the bytes are written
/// directly to keep the `.pt` name.
pub fn save_model<B: Backend>(model: &MedClassifier<B>, path: &Path) -> Result<()> {
    let bytes = recorder()
        .record(model.clone().into_record(), ())
        .map_err(|e| Error::Model(format!("Failed to encode model: {e:?}")))?;
    fs::write(path, bytes)?;
    info!("Saved model weights to {}", path.display());
    Ok(())
}

/// Loads weights written by [`save_model`] into a model of the same shape
pub fn load_model<B: Backend>(
    model: MedClassifier<B>,
    path: &Path,
    device: &B::Device,
) -> Result<MedClassifier<B>> {
    let bytes = fs::read(path)
        .map_err(|e| Error::NotFound(format!("Failed to read {}: {e}", path.display())))?;
    let record = recorder()
        .load(bytes, device)
        .map_err(|e| Error::Model(format!("Failed to decode {}: {e:?}", path.display())))?;
    Ok(model.load_record(record))
}

/// Writes `metrics.json` with two-space indentation
pub fn save_metrics(metrics: &RunMetrics, path: &Path) -> Result<()> {
    fs::write(path, metrics.to_json_pretty()?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::build_model;
    use burn::backend::NdArray;
    use burn::tensor::Tensor;
    use tempfile::TempDir;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_run_dir_layout() {
        let root = TempDir::new().unwrap();
        let artifacts = RunArtifacts::create(root.path(), "pathmnist", ModelKind::Cnn).unwrap();

        assert!(artifacts.dir().is_dir());
        let relative = artifacts.dir().strip_prefix(root.path()).unwrap();
        let parts: Vec<_> = relative.iter().map(|p| p.to_string_lossy().to_string()).collect();
        assert_eq!(parts[0], "pathmnist");
        assert_eq!(parts[1], "cnn");
        assert_eq!(parts[2].len(), "20240101-120000".len());
        assert!(artifacts.best_model_path().ends_with("best.pt"));
    }

    #[test]
    fn test_model_weights_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(BEST_MODEL_FILE);
        let device = Default::default();

        let model = build_model::<TestBackend>(ModelKind::Cnn, 1, 3, &device).unwrap();
        save_model(&model, &path).unwrap();

        let fresh = build_model::<TestBackend>(ModelKind::Cnn, 1, 3, &device).unwrap();
        let loaded = load_model(fresh, &path, &device).unwrap();

        let input = Tensor::<TestBackend, 5>::ones([1, 1, 1, 8, 8], &device);
        let expected = model.forward(input.clone()).into_data().to_vec::<f32>().unwrap();
        let actual = loaded.forward(input).into_data().to_vec::<f32>().unwrap();
        for (e, a) in expected.iter().zip(&actual) {
            assert!((e - a).abs() < 1e-6);
        }
    }

    #[test]
    fn test_metrics_json_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(METRICS_FILE);
        let metrics = RunMetrics {
            val_acc_best: 0.5,
            test_acc: 0.25,
            test_auc: f64::NAN,
            epochs: 2,
            lr: 0.001,
        };
        save_metrics(&metrics, &path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        for key in ["val_acc_best", "test_acc", "test_auc", "epochs", "lr"] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        assert!(value["test_auc"].is_null());
        assert!(text.contains("\n  \"epochs\": 2"));
    }
}
