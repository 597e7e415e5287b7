//! Training loop with per-epoch validation and best-model selection.

use burn::{
    data::dataloader::batcher::Batcher,
    module::AutodiffModule,
    nn::loss::{BinaryCrossEntropyLossConfig, CrossEntropyLossConfig},
    optim::{AdamConfig, GradientsParams, Optimizer},
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion, Tensor,
    },
};
use indicatif::{ProgressBar, ProgressStyle};
use medbench_core::{Result, RunConfig, RunMetrics, TaskKind, TrainingMetrics};
use medbench_dataset::{DatasetInfo, MedBatch, MedBatcher, MedLoader};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::checkpoint::{save_metrics, save_model, RunArtifacts};
use crate::evaluator::{EvaluationResult, Evaluator};
use crate::model::MedClassifier;
use crate::plot::save_confusion_matrix;

/// Parameters of the optimization loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerConfig {
    pub learning_rate: f64,
    pub num_epochs: usize,
    pub seed: u64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            num_epochs: 1,
            seed: 42,
        }
    }
}

impl From<&RunConfig> for TrainerConfig {
    fn from(config: &RunConfig) -> Self {
        Self {
            learning_rate: config.lr,
            num_epochs: config.epochs,
            seed: config.seed,
        }
    }
}

/// Training objective
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LossKind {
    CrossEntropy,
    /// Binary cross-entropy on logits, one term per output column
    BinaryCrossEntropy,
}

impl LossKind {
    pub fn for_task(task: TaskKind, num_classes: usize) -> Self {
        if task.uses_sigmoid(num_classes) {
            LossKind::BinaryCrossEntropy
        } else {
            LossKind::CrossEntropy
        }
    }

    /// Mean loss of a batch
    pub fn forward<B: Backend>(&self, logits: Tensor<B, 2>, batch: &MedBatch<B>) -> Tensor<B, 1> {
        let device = logits.device();
        match self {
            LossKind::CrossEntropy => CrossEntropyLossConfig::new()
                .init(&device)
                .forward(logits, batch.targets.clone()),
            LossKind::BinaryCrossEntropy => BinaryCrossEntropyLossConfig::new()
                .with_logits(true)
                .init(&device)
                .forward(logits, indicator_targets(batch)),
        }
    }

    /// Correct predictions and number of predictions in a batch.
    ///
    /// Sigmoid outputs count every label column separately.
    pub fn count_correct<B: Backend>(&self, logits: Tensor<B, 2>, batch: &MedBatch<B>) -> (usize, usize) {
        let [batch_size, k] = logits.dims();
        match self {
            LossKind::CrossEntropy => {
                let predictions = logits.argmax(1).reshape([batch_size]);
                let correct: i64 = predictions
                    .equal(batch.targets.clone())
                    .int()
                    .sum()
                    .into_scalar()
                    .elem();
                (correct as usize, batch_size)
            }
            LossKind::BinaryCrossEntropy => {
                // sigmoid(x) > 0.5 exactly when x > 0
                let predictions = logits.greater_elem(0.0).int();
                let correct: i64 = predictions
                    .equal(indicator_targets(batch))
                    .int()
                    .sum()
                    .into_scalar()
                    .elem();
                (correct as usize, batch_size * k)
            }
        }
    }
}

fn indicator_targets<B: Backend>(batch: &MedBatch<B>) -> Tensor<B, 2, burn::tensor::Int> {
    match &batch.multi_targets {
        Some(targets) => targets.clone(),
        None => {
            let [batch_size] = batch.targets.dims();
            batch.targets.clone().reshape([batch_size, 1])
        }
    }
}

/// Seeds the backend RNG used for weight init and dropout.
///
/// The data order is seeded separately through the loader options.
pub fn set_seed<B: Backend>(seed: u64, device: &B::Device) {
    B::seed(device, seed);
}

/// Keeps the model with the highest validation accuracy seen so far.
///
/// Starts at -1.0, so the first observed epoch always becomes the best.
/// Later epochs replace it only on a strictly higher accuracy.
#[derive(Debug)]
pub struct BestTracker<M> {
    accuracy: f64,
    model: Option<M>,
}

impl<M> Default for BestTracker<M> {
    fn default() -> Self {
        Self {
            accuracy: -1.0,
            model: None,
        }
    }
}

impl<M> BestTracker<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `model` if `accuracy` beats the current best; returns whether it did
    pub fn observe(&mut self, accuracy: f64, model: M) -> bool {
        if accuracy > self.accuracy {
            self.accuracy = accuracy;
            self.model = Some(model);
            true
        } else {
            false
        }
    }

    /// Best accuracy so far, -1.0 before any improvement
    pub fn accuracy(&self) -> f64 {
        self.accuracy
    }

    pub fn into_model(self) -> Option<M> {
        self.model
    }
}

/// Everything a finished run produced
#[derive(Debug)]
pub struct TrainingReport<B: Backend> {
    pub metrics: RunMetrics,
    pub history: TrainingMetrics,
    pub test: EvaluationResult,
    /// The best model, or the final one when no epoch ran
    pub model: MedClassifier<B>,
}

fn epoch_progress(num_batches: usize, epoch: usize, num_epochs: usize) -> ProgressBar {
    let progress = ProgressBar::new(num_batches as u64);
    progress.set_style(
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} batches {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-"),
    );
    progress.set_message(format!("epoch {}/{}", epoch + 1, num_epochs));
    progress
}

/// One pass over the training loader
#[allow(clippy::too_many_arguments)]
fn train_epoch<B, O>(
    mut model: MedClassifier<B>,
    optimizer: &mut O,
    loader: &MedLoader,
    batcher: &MedBatcher,
    loss_kind: LossKind,
    learning_rate: f64,
    epoch: usize,
    num_epochs: usize,
    device: &B::Device,
) -> Result<(MedClassifier<B>, f64, f64)>
where
    B: AutodiffBackend,
    O: Optimizer<MedClassifier<B>, B>,
{
    let progress = epoch_progress(loader.num_batches(), epoch, num_epochs);
    let mut loss_sum = 0.0f64;
    let mut num_batches = 0usize;
    let mut correct = 0usize;
    let mut total = 0usize;

    for (batch_idx, items) in loader.iter(epoch).enumerate() {
        let batch: MedBatch<B> = batcher.batch(items?, device);

        let logits = model.forward(batch.images.clone());
        let loss = loss_kind.forward(logits.clone(), &batch);
        let loss_value: f64 = loss.clone().into_scalar().elem();

        let (batch_correct, batch_total) = loss_kind.count_correct(logits, &batch);
        correct += batch_correct;
        total += batch_total;
        loss_sum += loss_value;
        num_batches += 1;

        let grads = GradientsParams::from_grads(loss.backward(), &model);
        model = optimizer.step(learning_rate, model, grads);

        debug!("Epoch {} batch {}: loss = {:.4}", epoch + 1, batch_idx + 1, loss_value);
        progress.inc(1);
    }
    progress.finish_and_clear();

    let mean_loss = if num_batches == 0 {
        0.0
    } else {
        loss_sum / num_batches as f64
    };
    let accuracy = if total == 0 {
        0.0
    } else {
        correct as f64 / total as f64
    };
    Ok((model, mean_loss, accuracy))
}

/// Trains `model`, keeps the weights with the best validation accuracy and
/// evaluates them on the test split.
///
/// Writes `best.pt` (when at least one epoch ran), `confusion_matrix.png`
/// and `metrics.json` into `artifacts`.
#[allow(clippy::too_many_arguments)]
pub fn train_and_eval<B: AutodiffBackend>(
    model: MedClassifier<B>,
    train_loader: &MedLoader,
    val_loader: &MedLoader,
    test_loader: &MedLoader,
    info: &DatasetInfo,
    config: &TrainerConfig,
    artifacts: &RunArtifacts,
    device: &B::Device,
) -> Result<TrainingReport<B::InnerBackend>> {
    let loss_kind = LossKind::for_task(info.task, info.n_classes);
    let batcher = MedBatcher::new(info.n_classes, info.task.is_multi_label());
    let evaluator = Evaluator::<B::InnerBackend>::new(info.task, info.n_classes, device.clone());
    let mut optimizer = AdamConfig::new().init::<B, MedClassifier<B>>();
    // dropout masks draw from the backend RNG
    set_seed::<B>(config.seed, device);

    info!(
        "Training {} on {} for {} epochs ({:?}, lr = {})",
        model.kind(),
        info.key,
        config.num_epochs,
        loss_kind,
        config.learning_rate
    );

    let mut model = model;
    let mut history = TrainingMetrics::new();
    let mut best = BestTracker::<MedClassifier<B::InnerBackend>>::new();

    for epoch in 0..config.num_epochs {
        let (trained, train_loss, train_acc) = train_epoch(
            model,
            &mut optimizer,
            train_loader,
            &batcher,
            loss_kind,
            config.learning_rate,
            epoch,
            config.num_epochs,
            device,
        )?;
        model = trained;

        let valid_model = model.valid();
        let val = evaluator.evaluate(&valid_model, val_loader)?;
        history.add_epoch(train_loss, train_acc, val.accuracy, val.auc);
        let is_best = best.observe(val.accuracy, valid_model);

        info!(
            "Epoch {}/{}: loss = {:.4}, train acc = {:.4}, val acc = {:.4}, val auc = {:.4}{}",
            epoch + 1,
            config.num_epochs,
            train_loss,
            train_acc,
            val.accuracy,
            val.auc,
            if is_best { " (best)" } else { "" }
        );
    }

    let best_val_acc = best.accuracy();
    if let Some(epoch) = history.best_epoch() {
        info!("Best validation accuracy {:.4} at epoch {}", best_val_acc, epoch + 1);
    }
    let final_model = match best.into_model() {
        Some(best_model) => {
            save_model(&best_model, &artifacts.best_model_path())?;
            best_model
        }
        None => model.valid(),
    };

    let test = evaluator.evaluate(&final_model, test_loader)?;
    info!(
        "Test: acc = {:.4}, auc = {:.4} over {} samples",
        test.accuracy, test.auc, test.total_samples
    );
    save_confusion_matrix(&test.confusion, &artifacts.confusion_matrix_path())?;

    let metrics = RunMetrics {
        val_acc_best: best_val_acc,
        test_acc: test.accuracy,
        test_auc: test.auc,
        epochs: config.num_epochs,
        lr: config.learning_rate,
    };
    save_metrics(&metrics, &artifacts.metrics_path())?;

    Ok(TrainingReport {
        metrics,
        history,
        test,
        model: final_model,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use medbench_dataset::{MedItem, MedLabel};

    type TestBackend = NdArray<f32>;

    fn batch(labels: Vec<MedLabel>, num_classes: usize, multi: bool) -> MedBatch<TestBackend> {
        let items = labels
            .into_iter()
            .map(|label| MedItem {
                image: vec![0.0; 4],
                shape: vec![1, 2, 2],
                label,
            })
            .collect();
        MedBatcher::new(num_classes, multi).batch(items, &Default::default())
    }

    #[test]
    fn test_loss_selection() {
        assert_eq!(LossKind::for_task(TaskKind::MultiLabel, 14), LossKind::BinaryCrossEntropy);
        assert_eq!(LossKind::for_task(TaskKind::MultiClass, 1), LossKind::BinaryCrossEntropy);
        assert_eq!(LossKind::for_task(TaskKind::BinaryClass, 2), LossKind::CrossEntropy);
        assert_eq!(LossKind::for_task(TaskKind::OrdinalRegression, 5), LossKind::CrossEntropy);
    }

    #[test]
    fn test_cross_entropy_counts_argmax_hits() {
        let batch = batch(vec![MedLabel::Class(0), MedLabel::Class(2)], 3, false);
        let logits = Tensor::<TestBackend, 2>::from_floats([[2.0, 0.0, 0.0], [3.0, 0.0, 1.0]], &Default::default());

        let (correct, total) = LossKind::CrossEntropy.count_correct(logits.clone(), &batch);
        assert_eq!((correct, total), (1, 2));

        let loss: f64 = LossKind::CrossEntropy.forward(logits, &batch).into_scalar().elem();
        assert!(loss.is_finite() && loss > 0.0);
    }

    #[test]
    fn test_binary_cross_entropy_counts_columns() {
        let batch = batch(
            vec![MedLabel::Multi(vec![1.0, 0.0]), MedLabel::Multi(vec![0.0, 0.0])],
            2,
            true,
        );
        let logits = Tensor::<TestBackend, 2>::from_floats([[1.0, -1.0], [1.0, -1.0]], &Default::default());

        let (correct, total) = LossKind::BinaryCrossEntropy.count_correct(logits.clone(), &batch);
        assert_eq!((correct, total), (3, 4));

        let loss: f64 = LossKind::BinaryCrossEntropy.forward(logits, &batch).into_scalar().elem();
        assert!(loss.is_finite() && loss > 0.0);
    }

    #[test]
    fn test_best_tracker_keeps_first_of_equal_accuracies() {
        let mut best = BestTracker::new();
        assert_eq!(best.accuracy(), -1.0);

        assert!(best.observe(0.5, "epoch 1"));
        assert!(!best.observe(0.5, "epoch 2"));
        assert!(!best.observe(0.4, "epoch 3"));

        assert_eq!(best.accuracy(), 0.5);
        assert_eq!(best.into_model(), Some("epoch 1"));
    }

    #[test]
    fn test_best_tracker_replaces_on_higher_accuracy() {
        let mut best = BestTracker::new();
        best.observe(0.5, "epoch 1");
        assert!(best.observe(0.75, "epoch 2"));
        best.observe(0.6, "epoch 3");

        assert_eq!(best.accuracy(), 0.75);
        assert_eq!(best.into_model(), Some("epoch 2"));
    }

    #[test]
    fn test_best_tracker_zero_accuracy_still_beats_initial() {
        let mut best = BestTracker::new();
        assert!(best.observe(0.0, 1));
        assert_eq!(best.into_model(), Some(1));

        let empty: BestTracker<u8> = BestTracker::new();
        assert!(empty.into_model().is_none());
    }

    #[test]
    fn test_set_seed_makes_init_repeatable() {
        use crate::model::build_model;
        use medbench_core::ModelKind;

        let device = Default::default();
        let input = Tensor::<TestBackend, 5>::ones([1, 1, 1, 8, 8], &device);
        let outputs: Vec<Vec<f32>> = (0..2)
            .map(|_| {
                set_seed::<TestBackend>(11, &device);
                let model = build_model::<TestBackend>(ModelKind::Cnn, 1, 3, &device).unwrap();
                model.forward(input.clone()).into_data().to_vec::<f32>().unwrap()
            })
            .collect();
        assert_eq!(outputs[0], outputs[1]);
    }

    #[test]
    fn test_trainer_config_from_run_config() {
        let run = RunConfig {
            epochs: 3,
            lr: 0.01,
            seed: 7,
            ..RunConfig::default()
        };
        let config = TrainerConfig::from(&run);
        assert_eq!(config.num_epochs, 3);
        assert_eq!(config.learning_rate, 0.01);
        assert_eq!(config.seed, 7);
    }
}
