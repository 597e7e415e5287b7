//! Model evaluation: probabilities, predictions, accuracy, AUC and the
//! confusion matrix.

use burn::data::dataloader::batcher::Batcher;
use burn::tensor::{activation, backend::Backend, Tensor};
use medbench_core::{
    accuracy, multi_label_accuracy, multi_label_auc, one_vs_rest_auc, roc_auc, ConfusionMatrix,
    Error, Result, TaskKind,
};
use medbench_dataset::{MedBatch, MedBatcher, MedItem, MedLabel, MedLoader};
use serde::Serialize;
use tracing::{debug, warn};

use crate::model::MedClassifier;

/// Outcome of evaluating one split
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationResult {
    pub accuracy: f64,
    /// NaN when the AUC is undefined for this split
    pub auc: f64,
    pub confusion: ConfusionMatrix,
    pub total_samples: usize,
}

/// Ground truth and model outputs gathered over a split
#[derive(Debug, Clone, Default)]
pub struct Collected {
    /// Class index per sample (single-label tasks)
    pub labels: Vec<usize>,
    /// Indicator row per sample (sigmoid outputs)
    pub indicator_labels: Vec<Vec<u8>>,
    /// Probability row per sample
    pub probabilities: Vec<Vec<f64>>,
}

/// Evaluates models on a loader for one task
#[derive(Debug, Clone)]
pub struct Evaluator<B: Backend> {
    task: TaskKind,
    num_classes: usize,
    batcher: MedBatcher,
    device: B::Device,
}

impl<B: Backend> Evaluator<B> {
    pub fn new(task: TaskKind, num_classes: usize, device: B::Device) -> Self {
        Self {
            task,
            num_classes,
            batcher: MedBatcher::new(num_classes, task.is_multi_label()),
            device,
        }
    }

    /// Whether outputs are read through a sigmoid rather than a softmax
    pub fn uses_sigmoid(&self) -> bool {
        self.task.uses_sigmoid(self.num_classes)
    }

    /// Runs `model` over every batch of `loader` in file order
    pub fn evaluate(&self, model: &MedClassifier<B>, loader: &MedLoader) -> Result<EvaluationResult> {
        let mut collected = Collected::default();

        for (batch_idx, items) in loader.iter(0).enumerate() {
            let items = items?;
            self.collect_labels(&items, &mut collected);

            let batch: MedBatch<B> = self.batcher.batch(items, &self.device);
            let logits = model.forward(batch.images);
            collected.probabilities.extend(self.probabilities(logits)?);
            debug!("Evaluated batch {}", batch_idx + 1);
        }

        Ok(self.summarize(&collected))
    }

    fn collect_labels(&self, items: &[MedItem], collected: &mut Collected) {
        for item in items {
            if self.uses_sigmoid() {
                let row = match &item.label {
                    MedLabel::Multi(values) => values.iter().map(|&v| u8::from(v > 0.5)).collect(),
                    MedLabel::Class(idx) => vec![*idx as u8],
                };
                collected.indicator_labels.push(row);
            } else {
                collected.labels.push(item.label.class_index());
            }
        }
    }

    /// Logits `[B, K]` → per-sample probability rows
    fn probabilities(&self, logits: Tensor<B, 2>) -> Result<Vec<Vec<f64>>> {
        let [_, k] = logits.dims();
        let probs = if self.uses_sigmoid() {
            activation::sigmoid(logits)
        } else {
            activation::softmax(logits, 1)
        };
        let values = probs
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| Error::Training(format!("Failed to read model outputs: {e:?}")))?;

        Ok(values
            .chunks(k.max(1))
            .map(|row| row.iter().map(|&p| p as f64).collect())
            .collect())
    }

    /// Accuracy, AUC and confusion matrix of collected outputs
    pub fn summarize(&self, collected: &Collected) -> EvaluationResult {
        let auc = self.auc(collected);

        if self.uses_sigmoid() {
            let predictions: Vec<Vec<u8>> = collected
                .probabilities
                .iter()
                .map(|row| row.iter().map(|&p| u8::from(p > 0.5)).collect())
                .collect();
            let mut confusion = ConfusionMatrix::new(2);
            for (t_row, p_row) in collected.indicator_labels.iter().zip(&predictions) {
                for (&t, &p) in t_row.iter().zip(p_row) {
                    confusion.update(t as usize, p as usize);
                }
            }
            return EvaluationResult {
                accuracy: multi_label_accuracy(&collected.indicator_labels, &predictions),
                auc,
                confusion,
                total_samples: predictions.len(),
            };
        }

        let predictions: Vec<usize> = collected.probabilities.iter().map(|row| argmax(row)).collect();
        EvaluationResult {
            accuracy: accuracy(&collected.labels, &predictions),
            auc,
            confusion: ConfusionMatrix::from_predictions(
                &collected.labels,
                &predictions,
                self.num_classes,
            ),
            total_samples: predictions.len(),
        }
    }

    fn auc(&self, collected: &Collected) -> f64 {
        let result = if self.uses_sigmoid() {
            multi_label_auc(&collected.indicator_labels, &collected.probabilities)
        } else if self.num_classes == 2 {
            let positives: Vec<bool> = collected.labels.iter().map(|&y| y == 1).collect();
            let scores: Vec<f64> = collected
                .probabilities
                .iter()
                .map(|row| row.get(1).copied().unwrap_or(f64::NAN))
                .collect();
            roc_auc(&positives, &scores)
        } else {
            one_vs_rest_auc(&collected.labels, &collected.probabilities, self.num_classes)
        };

        result.unwrap_or_else(|e| {
            warn!("AUC undefined, reporting NaN: {e}");
            f64::NAN
        })
    }
}

fn argmax(row: &[f64]) -> usize {
    row.iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(best_i, best), (i, &p)| {
            if p > best {
                (i, p)
            } else {
                (best_i, best)
            }
        })
        .0
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn evaluator(task: TaskKind, num_classes: usize) -> Evaluator<TestBackend> {
        Evaluator::new(task, num_classes, Default::default())
    }

    #[test]
    fn test_argmax_prefers_first_maximum() {
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), 1);
        assert_eq!(argmax(&[0.5, 0.5]), 0);
    }

    #[test]
    fn test_multi_class_summary() {
        let collected = Collected {
            labels: vec![0, 1, 2, 2],
            indicator_labels: vec![],
            probabilities: vec![
                vec![0.8, 0.1, 0.1],
                vec![0.2, 0.7, 0.1],
                vec![0.1, 0.2, 0.7],
                vec![0.6, 0.3, 0.1],
            ],
        };
        let result = evaluator(TaskKind::MultiClass, 3).summarize(&collected);
        assert!((result.accuracy - 0.75).abs() < 1e-12);
        assert_eq!(result.confusion.get(2, 0), 1);
        assert_eq!(result.confusion.total(), 4);
        assert!(result.auc.is_finite());
    }

    #[test]
    fn test_binary_auc_uses_positive_column() {
        let collected = Collected {
            labels: vec![0, 0, 1, 1],
            indicator_labels: vec![],
            probabilities: vec![
                vec![0.9, 0.1],
                vec![0.6, 0.4],
                vec![0.65, 0.35],
                vec![0.2, 0.8],
            ],
        };
        let result = evaluator(TaskKind::BinaryClass, 2).summarize(&collected);
        assert!((result.auc - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_single_class_split_gives_nan_auc() {
        let collected = Collected {
            labels: vec![1, 1],
            indicator_labels: vec![],
            probabilities: vec![vec![0.3, 0.7], vec![0.6, 0.4]],
        };
        let result = evaluator(TaskKind::BinaryClass, 2).summarize(&collected);
        assert!(result.auc.is_nan());
        assert!((result.accuracy - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_multi_label_summary() {
        let collected = Collected {
            labels: vec![],
            indicator_labels: vec![vec![1, 0], vec![0, 1]],
            probabilities: vec![vec![0.9, 0.2], vec![0.3, 0.4]],
        };
        let result = evaluator(TaskKind::MultiLabel, 2).summarize(&collected);
        assert!((result.accuracy - 0.75).abs() < 1e-12);
        assert_eq!(result.confusion.num_classes(), 2);
        assert_eq!(result.confusion.get(1, 0), 1);
        assert_eq!(result.confusion.total(), 4);
        assert!((result.auc - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_probabilities_are_normalized() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::from_floats([[1.0, 2.0, 3.0], [0.0, 0.0, 0.0]], &device);
        let rows = evaluator(TaskKind::MultiClass, 3).probabilities(logits).unwrap();
        assert_eq!(rows.len(), 2);
        for row in rows {
            assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-5);
        }

        let logits = Tensor::<TestBackend, 2>::from_floats([[0.0, 100.0]], &device);
        let rows = evaluator(TaskKind::MultiLabel, 2).probabilities(logits).unwrap();
        assert!((rows[0][0] - 0.5).abs() < 1e-6);
        assert!(rows[0][1] > 0.99);
    }
}
