//! Evaluation metrics: accuracy, ROC AUC, confusion matrix and the run record.

use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};

/// Final metrics of a run, written once as `metrics.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetrics {
    /// Best validation accuracy over all epochs (-1.0 when no epoch ran)
    pub val_acc_best: f64,
    /// Test accuracy of the best model
    pub test_acc: f64,
    /// Test ROC AUC of the best model; NaN is written as `null`
    #[serde(deserialize_with = "nan_from_null")]
    pub test_auc: f64,
    /// Configured number of epochs
    pub epochs: usize,
    /// Learning rate
    pub lr: f64,
}

impl RunMetrics {
    /// Pretty JSON with two-space indentation
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn nan_from_null<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

/// Per-epoch history tracked during training
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingMetrics {
    /// Mean training loss per epoch
    pub train_loss: Vec<f64>,
    /// Training accuracy per epoch
    pub train_accuracy: Vec<f64>,
    /// Validation accuracy per epoch
    pub val_accuracy: Vec<f64>,
    /// Validation AUC per epoch (may contain NaN)
    pub val_auc: Vec<f64>,
}

impl TrainingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds metrics for an epoch
    pub fn add_epoch(&mut self, train_loss: f64, train_acc: f64, val_acc: f64, val_auc: f64) {
        self.train_loss.push(train_loss);
        self.train_accuracy.push(train_acc);
        self.val_accuracy.push(val_acc);
        self.val_auc.push(val_auc);
    }

    /// Number of recorded epochs
    pub fn num_epochs(&self) -> usize {
        self.val_accuracy.len()
    }

    /// Gets the best validation accuracy
    pub fn best_val_accuracy(&self) -> Option<f64> {
        self.val_accuracy.iter().copied().reduce(f64::max)
    }

    /// Gets the (zero-based) epoch that first reached the best validation accuracy
    pub fn best_epoch(&self) -> Option<usize> {
        let best = self.best_val_accuracy()?;
        self.val_accuracy.iter().position(|&acc| acc == best)
    }
}

/// Confusion matrix with rows = true class, columns = predicted class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    counts: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    pub fn new(num_classes: usize) -> Self {
        Self {
            counts: vec![vec![0; num_classes]; num_classes],
        }
    }

    /// Builds a matrix from paired true/predicted class indices
    pub fn from_predictions(y_true: &[usize], y_pred: &[usize], num_classes: usize) -> Self {
        let mut matrix = Self::new(num_classes);
        for (&actual, &predicted) in y_true.iter().zip(y_pred) {
            matrix.update(actual, predicted);
        }
        matrix
    }

    /// Records one prediction; out-of-range indices are ignored
    pub fn update(&mut self, actual: usize, predicted: usize) {
        let n = self.counts.len();
        if actual < n && predicted < n {
            self.counts[actual][predicted] += 1;
        }
    }

    pub fn num_classes(&self) -> usize {
        self.counts.len()
    }

    pub fn get(&self, actual: usize, predicted: usize) -> usize {
        self.counts[actual][predicted]
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    /// Largest single cell, used to scale plots
    pub fn max_count(&self) -> usize {
        self.counts.iter().flatten().copied().max().unwrap_or(0)
    }
}

/// Fraction of predictions equal to the labels
pub fn accuracy(y_true: &[usize], y_pred: &[usize]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let correct = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    correct as f64 / y_true.len() as f64
}

/// Element-wise agreement of multi-label indicator rows
pub fn multi_label_accuracy(y_true: &[Vec<u8>], y_pred: &[Vec<u8>]) -> f64 {
    let mut equal = 0usize;
    let mut total = 0usize;
    for (t_row, p_row) in y_true.iter().zip(y_pred) {
        for (t, p) in t_row.iter().zip(p_row) {
            equal += (t == p) as usize;
            total += 1;
        }
    }
    if total == 0 {
        0.0
    } else {
        equal as f64 / total as f64
    }
}

/// Binary ROC AUC via the rank-sum statistic, ties get their average rank.
///
/// Fails when the input is empty, a score is not finite, or only one class
/// is present.
pub fn roc_auc(labels: &[bool], scores: &[f64]) -> Result<f64> {
    if labels.is_empty() || labels.len() != scores.len() {
        return Err(Error::Metric(format!(
            "ROC AUC needs matching non-empty inputs, got {} labels and {} scores",
            labels.len(),
            scores.len()
        )));
    }
    if scores.iter().any(|s| !s.is_finite()) {
        return Err(Error::Metric("ROC AUC got a non-finite score".to_string()));
    }

    let n_pos = labels.iter().filter(|&&l| l).count();
    let n_neg = labels.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return Err(Error::Metric(
            "Only one class present in y_true. ROC AUC score is not defined in that case."
                .to_string(),
        ));
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut ranks = vec![0.0f64; scores.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // ranks are 1-based; a tie group shares the mean of its positions
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = avg_rank;
        }
        i = j + 1;
    }

    let pos_rank_sum: f64 = labels
        .iter()
        .zip(&ranks)
        .filter(|(&l, _)| l)
        .map(|(_, &r)| r)
        .sum();
    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    Ok((pos_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}

/// Macro average of per-column ROC AUC; any failing column fails the whole
fn macro_roc_auc(columns: &[(Vec<bool>, Vec<f64>)]) -> Result<f64> {
    if columns.is_empty() {
        return Err(Error::Metric("ROC AUC needs at least one column".to_string()));
    }
    let mut sum = 0.0;
    for (labels, scores) in columns {
        sum += roc_auc(labels, scores)?;
    }
    Ok(sum / columns.len() as f64)
}

/// One-vs-rest macro ROC AUC for single-label problems.
///
/// `probs` holds one row of class probabilities per sample.
pub fn one_vs_rest_auc(y_true: &[usize], probs: &[Vec<f64>], num_classes: usize) -> Result<f64> {
    if y_true.len() != probs.len() {
        return Err(Error::Metric("Labels and probabilities differ in length".to_string()));
    }
    let columns: Vec<(Vec<bool>, Vec<f64>)> = (0..num_classes)
        .map(|class| {
            let labels = y_true.iter().map(|&y| y == class).collect();
            let scores = probs.iter().map(|row| row.get(class).copied().unwrap_or(f64::NAN)).collect();
            (labels, scores)
        })
        .collect();
    macro_roc_auc(&columns)
}

/// Macro ROC AUC over label columns for multi-label problems
pub fn multi_label_auc(y_true: &[Vec<u8>], probs: &[Vec<f64>]) -> Result<f64> {
    if y_true.len() != probs.len() {
        return Err(Error::Metric("Labels and probabilities differ in length".to_string()));
    }
    let num_labels = y_true.first().map(Vec::len).unwrap_or(0);
    let columns: Vec<(Vec<bool>, Vec<f64>)> = (0..num_labels)
        .map(|col| {
            let labels = y_true.iter().map(|row| row.get(col).copied().unwrap_or(0) > 0).collect();
            let scores = probs.iter().map(|row| row.get(col).copied().unwrap_or(f64::NAN)).collect();
            (labels, scores)
        })
        .collect();
    macro_roc_auc(&columns)
}
