//! MedMNIST dataset loading.
//!
//! This crate resolves dataset metadata, fetches and reads `.npz` archives,
//! normalizes samples to channel-first tensors and serves them in batches.

pub mod batcher;
pub mod dataset;
pub mod download;
pub mod info;
pub mod loader;
pub mod npz;
pub mod sample;

pub use batcher::{MedBatch, MedBatcher};
pub use dataset::MedMnistDataset;
pub use download::ensure_archive;
pub use info::{available_datasets, get_dataset_info, DatasetInfo, SplitSizes};
pub use loader::{get_dataloaders, split_limits, LoaderOptions, MedLoader};
pub use npz::{archive_path, read_split, RawSplit};
pub use sample::{MedItem, MedLabel, SampleAdapter};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::batcher::*;
    pub use crate::dataset::*;
    pub use crate::info::*;
    pub use crate::loader::*;
    pub use crate::sample::*;
}
