//! Batching of normalized samples into burn tensors.

use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;

use crate::sample::{MedItem, MedLabel};

/// A batch of samples.
///
/// Images are always rank 5: `[B, C, 1, H, W]` for 2D datasets and
/// `[B, 1, D, H, W]` for volumes.
#[derive(Clone, Debug)]
pub struct MedBatch<B: Backend> {
    pub images: Tensor<B, 5>,
    /// Class indices `[B]`; zeros for multi-label batches
    pub targets: Tensor<B, 1, Int>,
    /// Indicator matrix `[B, n_classes]` for multi-label batches
    pub multi_targets: Option<Tensor<B, 2, Int>>,
}

impl<B: Backend> MedBatch<B> {
    pub fn len(&self) -> usize {
        self.images.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Stacks [`MedItem`]s of one split into a [`MedBatch`]
#[derive(Clone, Debug)]
pub struct MedBatcher {
    num_classes: usize,
    multi_label: bool,
}

impl MedBatcher {
    pub fn new(num_classes: usize, multi_label: bool) -> Self {
        Self {
            num_classes,
            multi_label,
        }
    }
}

/// Rank-5 layout of one item's shape
fn item_dims(shape: &[usize]) -> [usize; 4] {
    match shape {
        [c, h, w] => [*c, 1, *h, *w],
        [c, d, h, w] => [*c, *d, *h, *w],
        _ => [shape.iter().product(), 1, 1, 1],
    }
}

impl<B: Backend> Batcher<B, MedItem, MedBatch<B>> for MedBatcher {
    /// Items of one split share a shape because the archive arrays are rectangular.
    fn batch(&self, items: Vec<MedItem>, device: &B::Device) -> MedBatch<B> {
        let batch_size = items.len();
        let [c, d, h, w] = items
            .first()
            .map(|item| item_dims(&item.shape))
            .unwrap_or([1, 1, 1, 1]);

        let mut pixels = Vec::with_capacity(batch_size * c * d * h * w);
        let mut targets = Vec::with_capacity(batch_size);
        let mut indicators = Vec::with_capacity(if self.multi_label {
            batch_size * self.num_classes
        } else {
            0
        });

        for item in items {
            pixels.extend_from_slice(&item.image);
            targets.push(item.label.class_index() as i64);
            if self.multi_label {
                match &item.label {
                    MedLabel::Multi(values) => {
                        indicators.extend(values.iter().map(|&v| if v > 0.5 { 1i64 } else { 0 }))
                    }
                    MedLabel::Class(idx) => indicators
                        .extend((0..self.num_classes).map(|k| i64::from(k == *idx))),
                }
            }
        }

        let images = Tensor::<B, 5>::from_floats(
            TensorData::new(pixels, [batch_size, c, d, h, w]),
            device,
        );
        let targets = Tensor::<B, 1, Int>::from_data(TensorData::new(targets, [batch_size]), device);
        let multi_targets = self.multi_label.then(|| {
            Tensor::<B, 2, Int>::from_data(
                TensorData::new(indicators, [batch_size, self.num_classes]),
                device,
            )
        });

        MedBatch {
            images,
            targets,
            multi_targets,
        }
    }
}
