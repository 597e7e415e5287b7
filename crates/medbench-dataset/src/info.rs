//! Registry of MedMNIST datasets and their metadata.

use medbench_core::{Error, Result, TaskKind};
use serde::Serialize;

/// Base URL of the MedMNIST archive record
const ARCHIVE_BASE_URL: &str = "https://zenodo.org/records/10519652/files";

/// Published sample counts per split
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct SplitSizes {
    pub train: usize,
    pub val: usize,
    pub test: usize,
}

/// Metadata of one dataset
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DatasetInfo {
    /// Lowercase dataset key
    pub key: String,
    pub n_classes: usize,
    pub task: TaskKind,
    /// True iff the key ends with `3d`
    pub is_3d: bool,
    pub n_channels: usize,
    /// Download location of `<key>.npz`
    pub url: String,
    pub n_samples: SplitSizes,
}

impl DatasetInfo {
    /// Channels the model sees: the declared count for 2D, always 1 for volumes
    pub fn in_channels(&self) -> usize {
        if self.is_3d {
            1
        } else {
            self.n_channels
        }
    }

    /// File name of the dataset archive
    pub fn archive_name(&self) -> String {
        format!("{}.npz", self.key)
    }
}

struct Entry {
    key: &'static str,
    task: &'static str,
    n_channels: usize,
    n_classes: usize,
    sizes: (usize, usize, usize),
}

const REGISTRY: &[Entry] = &[
    Entry { key: "pathmnist", task: "multi-class", n_channels: 3, n_classes: 9, sizes: (89996, 10004, 7180) },
    Entry { key: "chestmnist", task: "multi-label, binary-class", n_channels: 1, n_classes: 14, sizes: (78468, 11219, 22433) },
    Entry { key: "dermamnist", task: "multi-class", n_channels: 3, n_classes: 7, sizes: (7007, 1003, 2005) },
    Entry { key: "octmnist", task: "multi-class", n_channels: 1, n_classes: 4, sizes: (97477, 10832, 1000) },
    Entry { key: "pneumoniamnist", task: "binary-class", n_channels: 1, n_classes: 2, sizes: (4708, 524, 624) },
    Entry { key: "retinamnist", task: "ordinal-regression", n_channels: 3, n_classes: 5, sizes: (1080, 120, 400) },
    Entry { key: "breastmnist", task: "binary-class", n_channels: 1, n_classes: 2, sizes: (546, 78, 156) },
    Entry { key: "bloodmnist", task: "multi-class", n_channels: 3, n_classes: 8, sizes: (11959, 1712, 3421) },
    Entry { key: "tissuemnist", task: "multi-class", n_channels: 1, n_classes: 8, sizes: (165466, 23640, 47280) },
    Entry { key: "organamnist", task: "multi-class", n_channels: 1, n_classes: 11, sizes: (34561, 6491, 17778) },
    Entry { key: "organcmnist", task: "multi-class", n_channels: 1, n_classes: 11, sizes: (12975, 2392, 8216) },
    Entry { key: "organsmnist", task: "multi-class", n_channels: 1, n_classes: 11, sizes: (13932, 2452, 8827) },
    Entry { key: "organmnist3d", task: "multi-class", n_channels: 1, n_classes: 11, sizes: (972, 161, 610) },
    Entry { key: "nodulemnist3d", task: "binary-class", n_channels: 1, n_classes: 2, sizes: (1158, 165, 310) },
    Entry { key: "adrenalmnist3d", task: "binary-class", n_channels: 1, n_classes: 2, sizes: (1188, 98, 298) },
    Entry { key: "fracturemnist3d", task: "multi-class", n_channels: 1, n_classes: 3, sizes: (1027, 103, 240) },
    Entry { key: "vesselmnist3d", task: "binary-class", n_channels: 1, n_classes: 2, sizes: (1335, 192, 382) },
    Entry { key: "synapsemnist3d", task: "binary-class", n_channels: 1, n_classes: 2, sizes: (1230, 177, 352) },
];

/// Looks up a dataset by name, ignoring case.
pub fn get_dataset_info(name: &str) -> Result<DatasetInfo> {
    let key = name.trim().to_lowercase();
    let entry = REGISTRY.iter().find(|e| e.key == key).ok_or_else(|| {
        Error::InvalidArgument(format!(
            "Unknown dataset: {name}. Try 'pathmnist' or 'organmnist3d'."
        ))
    })?;

    Ok(DatasetInfo {
        key: entry.key.to_string(),
        n_classes: entry.n_classes,
        task: entry.task.parse()?,
        is_3d: entry.key.ends_with("3d"),
        n_channels: entry.n_channels,
        url: format!("{ARCHIVE_BASE_URL}/{}.npz?download=1", entry.key),
        n_samples: SplitSizes {
            train: entry.sizes.0,
            val: entry.sizes.1,
            test: entry.sizes.2,
        },
    })
}

/// All dataset keys known to the registry
pub fn available_datasets() -> Vec<&'static str> {
    REGISTRY.iter().map(|e| e.key).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let info = get_dataset_info("PathMNIST").unwrap();
        assert_eq!(info.key, "pathmnist");
        assert_eq!(info.n_classes, 9);
        assert_eq!(info.n_channels, 3);
        assert_eq!(info.task, TaskKind::MultiClass);
        assert!(!info.is_3d);
        assert_eq!(info.in_channels(), 3);
    }

    #[test]
    fn test_3d_dataset() {
        let info = get_dataset_info("organmnist3d").unwrap();
        assert!(info.is_3d);
        assert_eq!(info.n_classes, 11);
        assert_eq!(info.in_channels(), 1);
        assert_eq!(info.archive_name(), "organmnist3d.npz");
        assert!(info.url.ends_with("organmnist3d.npz?download=1"));
    }

    #[test]
    fn test_multi_label_task() {
        let info = get_dataset_info("chestmnist").unwrap();
        assert_eq!(info.task, TaskKind::MultiLabel);
        assert_eq!(info.n_classes, 14);
    }

    #[test]
    fn test_unknown_dataset_is_invalid_argument() {
        let err = get_dataset_info("cifar10").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(err.to_string().contains("Unknown dataset: cifar10"));
    }

    #[test]
    fn test_registry_is_consistent() {
        let keys = available_datasets();
        assert_eq!(keys.len(), 18);
        for key in keys {
            let info = get_dataset_info(key).unwrap();
            assert!(info.n_channels == 1 || info.n_channels == 3);
            if info.is_3d {
                assert_eq!(info.n_channels, 1);
            }
        }
    }
}
