//! MedMNIST benchmark CLI
//!
//! Trains a small CNN on one MedMNIST dataset, evaluates it and writes
//! `best.pt`, `confusion_matrix.png` and `metrics.json` to a fresh run
//! directory.

use anyhow::{Context, Result};
use clap::Parser;
use medbench_core::{
    backend_name, default_data_root, default_device, load_config_file, setup_cli_logging,
    ModelKind, RunConfig, RunConfigOverrides, RunMetrics, TrainingBackend,
};
use medbench_dataset::{get_dataloaders, get_dataset_info, LoaderOptions};
use medbench_training::{build_model, set_seed, train_and_eval, RunArtifacts, TrainerConfig};
use std::path::PathBuf;
use tracing::info;

/// MedMNIST benchmark harness
#[derive(Parser, Debug)]
#[command(
    name = "medbench-train",
    about = "Train and evaluate a baseline CNN on a MedMNIST dataset",
    long_about = "Train and evaluate a baseline CNN on a MedMNIST dataset. Keys in a \
                  --config file (YAML, or TOML for .toml files) override command-line values."
)]
struct Args {
    /// Dataset key, e.g. pathmnist or organmnist3d
    #[arg(long, default_value = "pathmnist")]
    dataset: String,

    /// Model variant (cnn or cnn3d); picked from the dataset when omitted
    #[arg(long, value_name = "MODEL")]
    model: Option<ModelKind>,

    #[arg(long, default_value_t = 1)]
    epochs: usize,

    #[arg(long, default_value_t = 64)]
    batch_size: usize,

    #[arg(long, default_value_t = 1e-3)]
    lr: f64,

    /// Cap on training samples; validation and test get a quarter
    #[arg(long, value_name = "N")]
    limit_samples: Option<usize>,

    /// Threads that build batch items
    #[arg(long, default_value_t = 2)]
    num_workers: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// YAML or TOML file whose keys override the flags above
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory holding <dataset>.npz archives [default: $MEDMNIST_ROOT or ~/.medmnist]
    #[arg(long, value_name = "DIR")]
    data_root: Option<PathBuf>,

    /// Root of the run output directories
    #[arg(long, value_name = "DIR", default_value = "outputs")]
    output_root: PathBuf,

    /// Fail instead of downloading a missing archive
    #[arg(long)]
    no_download: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    setup_cli_logging(args.verbose)?;

    let config = resolve_config(&args)?;
    print_config_summary(&config);

    let (metrics, out_dir) = run(&config)?;

    println!("{}", metrics.to_json_pretty()?);
    println!("Saved to: {}", out_dir.display());
    Ok(())
}

/// CLI values, then every key of the config file on top
fn resolve_config(args: &Args) -> Result<RunConfig> {
    let mut config = RunConfig {
        dataset: args.dataset.clone(),
        model: args.model,
        epochs: args.epochs,
        batch_size: args.batch_size,
        lr: args.lr,
        limit_samples: args.limit_samples,
        num_workers: args.num_workers,
        seed: args.seed,
        data_root: args.data_root.clone().unwrap_or_else(default_data_root),
        output_root: args.output_root.clone(),
        download: !args.no_download,
    };

    if let Some(path) = &args.config {
        let overrides: RunConfigOverrides = load_config_file(path)
            .with_context(|| format!("Failed to load config file: {}", path.display()))?;
        config.apply_overrides(overrides);
        info!("Applied config file {}", path.display());
    }

    config.validate()?;
    Ok(config)
}

fn print_config_summary(config: &RunConfig) {
    info!("MedMNIST benchmark run");
    info!("  Dataset: {}", config.dataset);
    info!(
        "  Model: {}",
        config.model.map(|m| m.to_string()).unwrap_or_else(|| "auto".to_string())
    );
    info!("  Epochs: {}", config.epochs);
    info!("  Batch size: {}", config.batch_size);
    info!("  Learning rate: {}", config.lr);
    if let Some(limit) = config.limit_samples {
        info!("  Sample limit: {}", limit);
    }
    info!("  Workers: {}", config.num_workers);
    info!("  Seed: {}", config.seed);
    info!("  Data root: {}", config.data_root.display());
    info!("  Backend: {}", backend_name());
}

fn run(config: &RunConfig) -> Result<(RunMetrics, PathBuf)> {
    let device = default_device();
    set_seed::<TrainingBackend>(config.seed, &device);

    let info = get_dataset_info(&config.dataset)?;
    let kind = config.model.unwrap_or_else(|| ModelKind::for_dims(info.is_3d));
    if kind != ModelKind::for_dims(info.is_3d) {
        anyhow::bail!(
            "Model {kind} does not fit {} ({} data)",
            info.key,
            if info.is_3d { "3D" } else { "2D" }
        );
    }
    let model = build_model::<TrainingBackend>(kind, info.in_channels(), info.n_classes, &device)?;

    let options = LoaderOptions {
        batch_size: config.batch_size,
        num_workers: config.num_workers,
        download: config.download,
        limit_samples: config.limit_samples,
        data_root: config.data_root.clone(),
        seed: config.seed,
    };
    let (train, val, test, info) = get_dataloaders(&info.key, &options)
        .with_context(|| format!("Failed to load dataset {}", info.key))?;

    let artifacts = RunArtifacts::create(&config.output_root, &info.key, kind)?;
    info!("Writing run artifacts to {}", artifacts.dir().display());

    let report = train_and_eval(
        model,
        &train,
        &val,
        &test,
        &info,
        &TrainerConfig::from(config),
        &artifacts,
        &device,
    )?;

    Ok((report.metrics, artifacts.dir().to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn parse(args: &[&str]) -> Args {
        let mut argv = vec!["medbench-train"];
        argv.extend_from_slice(args);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]);
        assert_eq!(args.dataset, "pathmnist");
        assert_eq!(args.epochs, 1);
        assert_eq!(args.batch_size, 64);
        assert_eq!(args.lr, 1e-3);
        assert_eq!(args.num_workers, 2);
        assert_eq!(args.seed, 42);
        assert!(args.model.is_none());
        assert!(args.limit_samples.is_none());
    }

    #[test]
    fn test_cli_values_reach_config() {
        let args = parse(&[
            "--dataset",
            "organmnist3d",
            "--model",
            "cnn3d",
            "--limit-samples",
            "32",
            "--no-download",
        ]);
        let config = resolve_config(&args).unwrap();
        assert_eq!(config.dataset, "organmnist3d");
        assert_eq!(config.model, Some(ModelKind::Cnn3d));
        assert_eq!(config.limit_samples, Some(32));
        assert!(!config.download);
    }

    #[test]
    fn test_config_file_beats_cli() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.yaml");
        fs::write(&path, "epochs: 2\nbatch_size: 16\n").unwrap();

        let args = parse(&["--epochs", "5", "--lr", "0.01", "--config", path.to_str().unwrap()]);
        let config = resolve_config(&args).unwrap();
        assert_eq!(config.epochs, 2);
        assert_eq!(config.batch_size, 16);
        assert_eq!(config.lr, 0.01);
    }

    #[test]
    fn test_toml_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.toml");
        fs::write(&path, "dataset = \"bloodmnist\"\nseed = 7\n").unwrap();

        let args = parse(&["--config", path.to_str().unwrap()]);
        let config = resolve_config(&args).unwrap();
        assert_eq!(config.dataset, "bloodmnist");
        assert_eq!(config.seed, 7);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let args = parse(&["--batch-size", "0"]);
        assert!(resolve_config(&args).is_err());

        assert!(Args::try_parse_from(["medbench-train", "--model", "resnet"]).is_err());
    }
}
