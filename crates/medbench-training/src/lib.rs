//! Models, training and evaluation for the MedMNIST benchmark harness.
//!
//! This crate provides:
//! - Small 2D and 3D CNN baselines
//! - The training loop with best-model selection
//! - Evaluation (accuracy, ROC AUC, confusion matrix)
//! - Run artifacts (weights, metrics JSON, confusion-matrix PNG)

pub mod checkpoint;
pub mod evaluator;
pub mod model;
pub mod plot;
pub mod trainer;

pub use checkpoint::{load_model, save_metrics, save_model, RunArtifacts};
pub use evaluator::{EvaluationResult, Evaluator};
pub use model::{build_model, MedClassifier, SmallCnn2d, SmallCnn3d, SmallCnnConfig};
pub use plot::{render_confusion_matrix, save_confusion_matrix};
pub use trainer::{
    set_seed, train_and_eval, BestTracker, LossKind, TrainerConfig, TrainingReport,
};
