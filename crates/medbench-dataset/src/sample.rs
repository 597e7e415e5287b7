//! Shape normalization of raw MedMNIST samples.
//!
//! Every sample leaves here as a flat float buffer plus its shape:
//! `[C, H, W]` for images and `[1, D, H, W]` for volumes.

use medbench_core::{Error, Result, TaskKind};
use ndarray::ArrayViewD;
use serde::{Deserialize, Serialize};

use crate::info::DatasetInfo;

/// Training target of one sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MedLabel {
    /// Class index for single-label tasks
    Class(usize),
    /// Per-class indicator vector for multi-label tasks
    Multi(Vec<f32>),
}

impl MedLabel {
    /// Class index, or 0 for multi-label targets
    pub fn class_index(&self) -> usize {
        match self {
            MedLabel::Class(idx) => *idx,
            MedLabel::Multi(_) => 0,
        }
    }
}

/// A normalized sample
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedItem {
    /// Flat image data in channel-first order
    pub image: Vec<f32>,
    /// `[C, H, W]` or `[1, D, H, W]`
    pub shape: Vec<usize>,
    pub label: MedLabel,
}

/// Converts raw `u8` arrays into [`MedItem`]s for one dataset
#[derive(Debug, Clone)]
pub struct SampleAdapter {
    is_3d: bool,
    task: TaskKind,
    n_channels: usize,
    n_classes: usize,
}

impl SampleAdapter {
    pub fn new(is_3d: bool, task: TaskKind, n_channels: usize, n_classes: usize) -> Self {
        Self {
            is_3d,
            task,
            n_channels,
            n_classes,
        }
    }

    pub fn from_info(info: &DatasetInfo) -> Self {
        Self::new(info.is_3d, info.task, info.n_channels, info.n_classes)
    }

    pub fn adapt(&self, image: ArrayViewD<'_, u8>, label: ArrayViewD<'_, u8>) -> Result<MedItem> {
        let (image, shape) = if self.is_3d {
            volume_to_tensor(image)?
        } else {
            image_to_tensor(image, self.n_channels)?
        };
        let label = self.adapt_label(label)?;
        Ok(MedItem { image, shape, label })
    }

    fn adapt_label(&self, label: ArrayViewD<'_, u8>) -> Result<MedLabel> {
        if self.task.is_multi_label() {
            if label.len() != self.n_classes {
                return Err(Error::Dataset(format!(
                    "Multi-label target has {} entries, expected {}",
                    label.len(),
                    self.n_classes
                )));
            }
            return Ok(MedLabel::Multi(label.iter().map(|&v| v as f32).collect()));
        }

        // squeeze: a single-label target must hold exactly one value
        let mut values = label.iter();
        match (values.next(), values.next()) {
            (Some(&value), None) => {
                let idx = value as usize;
                if idx >= self.n_classes {
                    return Err(Error::Dataset(format!(
                        "Label {idx} out of range for {} classes",
                        self.n_classes
                    )));
                }
                Ok(MedLabel::Class(idx))
            }
            _ => Err(Error::Dataset(format!(
                "Expected a scalar label, got shape {:?}",
                label.shape()
            ))),
        }
    }
}

/// `H×W` or `H×W×C` pixels → `C×H×W`, scaled to `[-1, 1]`.
///
/// A grayscale image is replicated to three channels when the dataset
/// declares three.
pub fn image_to_tensor(image: ArrayViewD<'_, u8>, n_channels: usize) -> Result<(Vec<f32>, Vec<usize>)> {
    let shape = image.shape().to_vec();
    let (height, width, src_channels) = match shape.as_slice() {
        [h, w] => (*h, *w, 1),
        [h, w, c] => (*h, *w, *c),
        _ => {
            return Err(Error::Dataset(format!(
                "Unexpected 2D input shape: {shape:?}"
            )))
        }
    };
    let out_channels = if src_channels == 1 && n_channels == 3 {
        3
    } else {
        src_channels
    };

    let mut data = vec![0.0f32; out_channels * height * width];
    for c in 0..out_channels {
        let src_c = c.min(src_channels - 1);
        for y in 0..height {
            for x in 0..width {
                let raw = if shape.len() == 2 {
                    image[[y, x]]
                } else {
                    image[[y, x, src_c]]
                };
                data[c * height * width + y * width + x] = (raw as f32 / 255.0 - 0.5) / 0.5;
            }
        }
    }

    Ok((data, vec![out_channels, height, width]))
}

/// `D×H×W` voxels → `1×D×H×W`, scaled to `[0, 1]`
pub fn volume_to_tensor(volume: ArrayViewD<'_, u8>) -> Result<(Vec<f32>, Vec<usize>)> {
    if volume.ndim() != 3 {
        return Err(Error::Dataset(format!(
            "Unexpected 3D input shape: {:?}",
            volume.shape()
        )));
    }
    let mut shape = vec![1];
    shape.extend_from_slice(volume.shape());
    // standard-layout iteration is row-major, i.e. D, H, W
    let data = volume.iter().map(|&v| v as f32 / 255.0).collect();
    Ok((data, shape))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, ArrayD, IxDyn};

    #[test]
    fn test_grayscale_image_gets_channel_axis() {
        let image = ArrayD::<u8>::from_elem(IxDyn(&[4, 5]), 255);
        let (data, shape) = image_to_tensor(image.view(), 1).unwrap();
        assert_eq!(shape, vec![1, 4, 5]);
        assert!(data.iter().all(|&v| (v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_color_image_is_transposed_to_chw() {
        // pixel (0, 1) has channels (10, 20, 30)
        let mut image = ArrayD::<u8>::zeros(IxDyn(&[2, 2, 3]));
        image[[0, 1, 0]] = 10;
        image[[0, 1, 1]] = 20;
        image[[0, 1, 2]] = 30;

        let (data, shape) = image_to_tensor(image.view(), 3).unwrap();
        assert_eq!(shape, vec![3, 2, 2]);
        let at = |c: usize, y: usize, x: usize| data[c * 4 + y * 2 + x];
        let expect = |raw: f32| (raw / 255.0 - 0.5) / 0.5;
        assert!((at(0, 0, 1) - expect(10.0)).abs() < 1e-6);
        assert!((at(1, 0, 1) - expect(20.0)).abs() < 1e-6);
        assert!((at(2, 0, 1) - expect(30.0)).abs() < 1e-6);
        assert!((at(0, 0, 0) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_grayscale_replicated_for_rgb_dataset() {
        let image = ArrayD::<u8>::from_elem(IxDyn(&[3, 3]), 0);
        let (data, shape) = image_to_tensor(image.view(), 3).unwrap();
        assert_eq!(shape, vec![3, 3, 3]);
        assert_eq!(data.len(), 27);
    }

    #[test]
    fn test_volume_shape_and_range() {
        let volume = ArrayD::<u8>::from_elem(IxDyn(&[2, 3, 4]), 51);
        let (data, shape) = volume_to_tensor(volume.view()).unwrap();
        assert_eq!(shape, vec![1, 2, 3, 4]);
        assert_eq!(data.len(), 24);
        assert!(data.iter().all(|&v| (v - 0.2).abs() < 1e-6));
    }

    #[test]
    fn test_volume_rejects_wrong_rank() {
        let volume = ArrayD::<u8>::zeros(IxDyn(&[28, 28]));
        let err = volume_to_tensor(volume.view()).unwrap_err();
        assert!(err.to_string().contains("Unexpected 3D input shape"));
    }

    #[test]
    fn test_labels_per_task() {
        let single = SampleAdapter::new(false, TaskKind::MultiClass, 1, 9);
        let image = ArrayD::<u8>::zeros(IxDyn(&[2, 2]));
        let item = single
            .adapt(image.view(), arr1(&[4u8]).into_dyn().view())
            .unwrap();
        assert_eq!(item.label, MedLabel::Class(4));
        assert!(single.adapt(image.view(), arr1(&[9u8]).into_dyn().view()).is_err());
        assert!(single.adapt(image.view(), arr1(&[1u8, 0]).into_dyn().view()).is_err());

        let multi = SampleAdapter::new(false, TaskKind::MultiLabel, 1, 3);
        let item = multi
            .adapt(image.view(), arr1(&[1u8, 0, 1]).into_dyn().view())
            .unwrap();
        assert_eq!(item.label, MedLabel::Multi(vec![1.0, 0.0, 1.0]));
        assert_eq!(item.label.class_index(), 0);
    }
}
