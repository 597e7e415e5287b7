//! Core type definitions shared across the harness.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::Error;

/// Classification task kind as declared by the dataset metadata
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TaskKind {
    /// One label out of `n_classes`
    MultiClass,
    /// Independent binary decision per label column
    MultiLabel,
    /// Two-class problem
    BinaryClass,
    /// Ordered classes, trained as multi-class
    OrdinalRegression,
}

impl TaskKind {
    /// Whether labels are a per-class indicator vector rather than an index
    pub fn is_multi_label(&self) -> bool {
        matches!(self, TaskKind::MultiLabel)
    }

    /// Whether the model should be trained with binary cross-entropy
    pub fn uses_sigmoid(&self, num_classes: usize) -> bool {
        self.is_multi_label() || num_classes == 1
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskKind::MultiClass => write!(f, "multi-class"),
            TaskKind::MultiLabel => write!(f, "multi-label"),
            TaskKind::BinaryClass => write!(f, "binary-class"),
            TaskKind::OrdinalRegression => write!(f, "ordinal-regression"),
        }
    }
}

impl FromStr for TaskKind {
    type Err = Error;

    /// Parses MedMNIST task strings, e.g. `"multi-label, binary-class"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        if s.starts_with("multi-label") {
            return Ok(TaskKind::MultiLabel);
        }
        match s.as_str() {
            "multi-class" => Ok(TaskKind::MultiClass),
            "binary-class" => Ok(TaskKind::BinaryClass),
            "ordinal-regression" => Ok(TaskKind::OrdinalRegression),
            other => Err(Error::InvalidArgument(format!("Unknown task kind: {other}"))),
        }
    }
}

/// Model variant.
///
/// Config files and the command line share the case-insensitive `FromStr` parser.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum ModelKind {
    /// Small 2D CNN
    Cnn,
    /// Small 3D CNN
    Cnn3d,
}

impl ModelKind {
    /// Default model for a dataset's dimensionality
    pub fn for_dims(is_3d: bool) -> Self {
        if is_3d {
            ModelKind::Cnn3d
        } else {
            ModelKind::Cnn
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelKind::Cnn => write!(f, "cnn"),
            ModelKind::Cnn3d => write!(f, "cnn3d"),
        }
    }
}

impl FromStr for ModelKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cnn" => Ok(ModelKind::Cnn),
            "cnn3d" => Ok(ModelKind::Cnn3d),
            other => Err(Error::InvalidArgument(format!(
                "Unknown model: {other}. Valid options: cnn, cnn3d"
            ))),
        }
    }
}

impl TryFrom<String> for ModelKind {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Data split type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DataSplit {
    /// Training data
    Train,
    /// Validation data
    Validation,
    /// Test data
    Test,
}

impl DataSplit {
    /// Prefix of this split's arrays inside a MedMNIST archive
    pub fn archive_prefix(&self) -> &'static str {
        match self {
            DataSplit::Train => "train",
            DataSplit::Validation => "val",
            DataSplit::Test => "test",
        }
    }
}

impl std::fmt::Display for DataSplit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataSplit::Train => write!(f, "train"),
            DataSplit::Validation => write!(f, "validation"),
            DataSplit::Test => write!(f, "test"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_kind_parsing() {
        assert_eq!("multi-class".parse::<TaskKind>().unwrap(), TaskKind::MultiClass);
        assert_eq!(
            "multi-label, binary-class".parse::<TaskKind>().unwrap(),
            TaskKind::MultiLabel
        );
        assert_eq!("binary-class".parse::<TaskKind>().unwrap(), TaskKind::BinaryClass);
        assert!("regression".parse::<TaskKind>().is_err());
    }

    #[test]
    fn test_uses_sigmoid() {
        assert!(TaskKind::MultiLabel.uses_sigmoid(14));
        assert!(TaskKind::MultiClass.uses_sigmoid(1));
        assert!(!TaskKind::BinaryClass.uses_sigmoid(2));
    }

    #[test]
    fn test_model_kind_round_trip() {
        assert_eq!("CNN3D".parse::<ModelKind>().unwrap(), ModelKind::Cnn3d);
        assert_eq!(ModelKind::Cnn.to_string(), "cnn");
        assert!("resnet".parse::<ModelKind>().is_err());
    }

    #[test]
    fn test_model_kind_deserializes_like_cli() {
        let upper: ModelKind = serde_json::from_str("\"CNN3D\"").unwrap();
        assert_eq!(upper, ModelKind::Cnn3d);
        let lower: ModelKind = serde_json::from_str("\"cnn\"").unwrap();
        assert_eq!(lower, ModelKind::Cnn);
        assert!(serde_json::from_str::<ModelKind>("\"resnet\"").is_err());
        assert_eq!(serde_json::to_string(&ModelKind::Cnn3d).unwrap(), "\"cnn3d\"");
    }

    #[test]
    fn test_model_kind_for_dims() {
        assert_eq!(ModelKind::for_dims(true), ModelKind::Cnn3d);
        assert_eq!(ModelKind::for_dims(false), ModelKind::Cnn);
    }

    #[test]
    fn test_data_split_display() {
        assert_eq!(DataSplit::Train.to_string(), "train");
        assert_eq!(DataSplit::Validation.archive_prefix(), "val");
        assert_eq!(DataSplit::Test.archive_prefix(), "test");
    }
}
