//! Batched iteration over the three splits of a dataset.

use burn::data::dataset::Dataset;
use medbench_core::{config::default_data_root, DataSplit, Error, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use rayon::ThreadPool;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::dataset::MedMnistDataset;
use crate::download::ensure_archive;
use crate::info::{get_dataset_info, DatasetInfo};
use crate::sample::MedItem;

/// How the three loaders are built
#[derive(Debug, Clone)]
pub struct LoaderOptions {
    pub batch_size: usize,
    /// Threads used to build batch items; 0 or 1 builds them inline
    pub num_workers: usize,
    pub download: bool,
    /// Training cap; validation and test get a quarter of it
    pub limit_samples: Option<usize>,
    pub data_root: PathBuf,
    /// Base seed of the per-epoch shuffle
    pub seed: u64,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            batch_size: 64,
            num_workers: 2,
            download: true,
            limit_samples: None,
            data_root: default_data_root(),
            seed: 42,
        }
    }
}

/// Per-split sample caps derived from `limit_samples`
pub fn split_limits(limit_samples: Option<usize>) -> (Option<usize>, Option<usize>) {
    match limit_samples {
        Some(n) => (Some(n), Some((n / 4).max(1))),
        None => (None, None),
    }
}

/// Iterates one split in batches.
///
/// The training loader reshuffles every epoch with a seed derived from the
/// base seed, so a run is reproducible. Evaluation loaders keep file order.
#[derive(Clone)]
pub struct MedLoader {
    dataset: Arc<MedMnistDataset>,
    batch_size: usize,
    shuffle: bool,
    seed: u64,
    pool: Option<Arc<ThreadPool>>,
}

impl MedLoader {
    pub fn new(dataset: MedMnistDataset, batch_size: usize, shuffle: bool, seed: u64) -> Self {
        Self {
            dataset: Arc::new(dataset),
            batch_size: batch_size.max(1),
            shuffle,
            seed,
            pool: None,
        }
    }

    /// Builds batch items on a shared worker pool
    pub fn with_pool(mut self, pool: Option<Arc<ThreadPool>>) -> Self {
        self.pool = pool;
        self
    }

    pub fn dataset(&self) -> &MedMnistDataset {
        &self.dataset
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of samples served per epoch
    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of batches per epoch, counting a trailing partial batch
    pub fn num_batches(&self) -> usize {
        self.len().div_ceil(self.batch_size)
    }

    /// Sample order for `epoch`
    pub fn indices(&self, epoch: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.len()).collect();
        if self.shuffle {
            let mut rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(epoch as u64));
            indices.shuffle(&mut rng);
        }
        indices
    }

    /// Batches of `epoch` in order; the last one may be smaller
    pub fn iter(&self, epoch: usize) -> BatchIter<'_> {
        BatchIter {
            loader: self,
            indices: self.indices(epoch),
            cursor: 0,
        }
    }

    fn load_items(&self, indices: &[usize]) -> Result<Vec<MedItem>> {
        let dataset = &self.dataset;
        match &self.pool {
            Some(pool) => pool.install(|| {
                indices
                    .par_iter()
                    .map(|&i| dataset.try_get(i))
                    .collect::<Result<Vec<_>>>()
            }),
            None => indices.iter().map(|&i| dataset.try_get(i)).collect(),
        }
    }
}

impl std::fmt::Debug for MedLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MedLoader")
            .field("split", &self.dataset.split())
            .field("len", &self.len())
            .field("batch_size", &self.batch_size)
            .field("shuffle", &self.shuffle)
            .field("workers", &self.pool.as_ref().map(|p| p.current_num_threads()))
            .finish()
    }
}

/// Iterator over the batches of one epoch
pub struct BatchIter<'a> {
    loader: &'a MedLoader,
    indices: Vec<usize>,
    cursor: usize,
}

impl Iterator for BatchIter<'_> {
    type Item = Result<Vec<MedItem>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.indices.len() {
            return None;
        }
        let end = (self.cursor + self.loader.batch_size).min(self.indices.len());
        let chunk = &self.indices[self.cursor..end];
        self.cursor = end;
        Some(self.loader.load_items(chunk))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.indices.len() - self.cursor).div_ceil(self.loader.batch_size);
        (remaining, Some(remaining))
    }
}

fn worker_pool(num_workers: usize) -> Result<Option<Arc<ThreadPool>>> {
    if num_workers <= 1 {
        return Ok(None);
    }
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_workers)
        .thread_name(|i| format!("medbench-loader-{i}"))
        .build()
        .map(|pool| Some(Arc::new(pool)))
        .map_err(|e| Error::Dataset(format!("Failed to start loader workers: {e}")))
}

/// Builds train, validation and test loaders for `name`.
///
/// The archive is downloaded first when missing and `options.download` is set.
pub fn get_dataloaders(
    name: &str,
    options: &LoaderOptions,
) -> Result<(MedLoader, MedLoader, MedLoader, DatasetInfo)> {
    let info = get_dataset_info(name)?;
    let path = ensure_archive(&info, &options.data_root, options.download)?;
    let (train_limit, eval_limit) = split_limits(options.limit_samples);
    let pool = worker_pool(options.num_workers)?;

    let train = MedMnistDataset::load(&path, &info, DataSplit::Train, train_limit)?;
    let val = MedMnistDataset::load(&path, &info, DataSplit::Validation, eval_limit)?;
    let test = MedMnistDataset::load(&path, &info, DataSplit::Test, eval_limit)?;
    info!(
        "Loaded {}: {} train / {} val / {} test samples",
        info.key,
        train.len(),
        val.len(),
        test.len()
    );

    let batch_size = options.batch_size;
    let train = MedLoader::new(train, batch_size, true, options.seed).with_pool(pool.clone());
    let val = MedLoader::new(val, batch_size, false, options.seed).with_pool(pool.clone());
    let test = MedLoader::new(test, batch_size, false, options.seed).with_pool(pool);

    Ok((train, val, test, info))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::npz::RawSplit;
    use crate::sample::SampleAdapter;
    use medbench_core::TaskKind;
    use ndarray::{ArrayD, IxDyn};

    fn loader(n: usize, batch_size: usize, shuffle: bool) -> MedLoader {
        let images = ArrayD::<u8>::from_shape_fn(IxDyn(&[n, 2, 2]), |idx| idx[0] as u8);
        let labels = ArrayD::<u8>::zeros(IxDyn(&[n, 1]));
        let raw = RawSplit::new(images, labels).unwrap();
        let adapter = SampleAdapter::new(false, TaskKind::MultiClass, 1, 2);
        MedLoader::new(MedMnistDataset::new(DataSplit::Train, raw, adapter, None), batch_size, shuffle, 7)
    }

    #[test]
    fn test_split_limits() {
        assert_eq!(split_limits(None), (None, None));
        assert_eq!(split_limits(Some(32)), (Some(32), Some(8)));
        assert_eq!(split_limits(Some(3)), (Some(3), Some(1)));
    }

    #[test]
    fn test_partial_last_batch_is_kept() {
        let loader = loader(10, 4, false);
        let sizes: Vec<usize> = loader.iter(0).map(|b| b.unwrap().len()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
        assert_eq!(loader.num_batches(), 3);
    }

    #[test]
    fn test_shuffle_is_seeded_per_epoch() {
        let loader = loader(50, 8, true);
        assert_eq!(loader.indices(0), loader.indices(0));
        assert_ne!(loader.indices(0), loader.indices(1));

        let mut sorted = loader.indices(3);
        sorted.sort_unstable();
        assert_eq!(sorted, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_eval_order_is_stable() {
        let loader = loader(6, 4, false);
        assert_eq!(loader.indices(5), vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_worker_pool_preserves_order() {
        let pool = worker_pool(3).unwrap();
        let loader = loader(9, 9, false).with_pool(pool);
        let batch = loader.iter(0).next().unwrap().unwrap();
        let firsts: Vec<f32> = batch.iter().map(|item| item.image[0]).collect();
        let expected: Vec<f32> = (0..9).map(|i| (i as f32 / 255.0 - 0.5) / 0.5).collect();
        assert_eq!(firsts, expected);
    }
}
