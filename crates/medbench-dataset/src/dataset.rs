//! Burn dataset over one split of a MedMNIST archive.

use burn::data::dataset::Dataset;
use medbench_core::{DataSplit, Error, Result};
use ndarray::Axis;
use std::path::Path;

use crate::info::DatasetInfo;
use crate::npz::{read_split, RawSplit};
use crate::sample::{MedItem, SampleAdapter};

/// One split held in memory as raw `u8` arrays.
///
/// Items are normalized lazily in [`MedMnistDataset::try_get`], so only
/// the compact archive data stays resident.
#[derive(Debug, Clone)]
pub struct MedMnistDataset {
    split: DataSplit,
    raw: RawSplit,
    adapter: SampleAdapter,
    len: usize,
}

impl MedMnistDataset {
    /// Wraps raw arrays, exposing at most `limit` samples
    pub fn new(split: DataSplit, raw: RawSplit, adapter: SampleAdapter, limit: Option<usize>) -> Self {
        let len = match limit {
            Some(limit) => limit.min(raw.len()),
            None => raw.len(),
        };
        Self {
            split,
            raw,
            adapter,
            len,
        }
    }

    /// Reads `split` from the archive at `path`
    pub fn load(path: &Path, info: &DatasetInfo, split: DataSplit, limit: Option<usize>) -> Result<Self> {
        let raw = read_split(path, split)?;
        if !info.is_3d {
            let channels = if raw.images.ndim() == 4 {
                raw.images.len_of(Axis(3))
            } else {
                1
            };
            if channels != 1 && channels != info.n_channels {
                return Err(Error::Dataset(format!(
                    "{} declares {} channels but the {split} images have {channels}",
                    info.key, info.n_channels
                )));
            }
        }
        Ok(Self::new(split, raw, SampleAdapter::from_info(info), limit))
    }

    pub fn split(&self) -> DataSplit {
        self.split
    }

    /// Samples available before any limit was applied
    pub fn full_len(&self) -> usize {
        self.raw.len()
    }

    /// Normalized sample at `index`
    pub fn try_get(&self, index: usize) -> Result<MedItem> {
        if index >= self.len {
            return Err(Error::InvalidArgument(format!(
                "Index {index} out of range for {} split of {} samples",
                self.split, self.len
            )));
        }
        let image = self.raw.images.index_axis(Axis(0), index);
        let label = self.raw.labels.index_axis(Axis(0), index);
        self.adapter.adapt(image, label)
    }
}

impl Dataset<MedItem> for MedMnistDataset {
    fn get(&self, index: usize) -> Option<MedItem> {
        self.try_get(index).ok()
    }

    fn len(&self) -> usize {
        self.len
    }
}
