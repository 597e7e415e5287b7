//! Reading MedMNIST `.npz` archives.
//!
//! Each archive stores `{train,val,test}_{images,labels}` as `uint8` arrays.
//! Images are `N×H×W`, `N×H×W×C` or `N×D×H×W`; labels are `N×L`.

use medbench_core::{DataSplit, Error, Result};
use ndarray::{ArrayD, Axis};
use ndarray_npy::NpzReader;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Raw arrays of one split
#[derive(Debug, Clone)]
pub struct RawSplit {
    pub images: ArrayD<u8>,
    pub labels: ArrayD<u8>,
}

impl RawSplit {
    /// Checks that images and labels agree on the sample count
    pub fn new(images: ArrayD<u8>, labels: ArrayD<u8>) -> Result<Self> {
        if images.ndim() < 3 {
            return Err(Error::Dataset(format!(
                "Image array must have at least 3 dimensions, got shape {:?}",
                images.shape()
            )));
        }
        let labels = if labels.ndim() == 1 {
            labels.insert_axis(Axis(1))
        } else {
            labels
        };
        if labels.ndim() != 2 {
            return Err(Error::Dataset(format!(
                "Label array must be N×L, got shape {:?}",
                labels.shape()
            )));
        }
        if images.len_of(Axis(0)) != labels.len_of(Axis(0)) {
            return Err(Error::Dataset(format!(
                "{} images but {} labels",
                images.len_of(Axis(0)),
                labels.len_of(Axis(0))
            )));
        }
        Ok(Self { images, labels })
    }

    pub fn len(&self) -> usize {
        self.images.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Location of a dataset archive below the data root
pub fn archive_path(root: &Path, key: &str) -> PathBuf {
    root.join(format!("{key}.npz"))
}

/// Reads one split from an archive
pub fn read_split(path: &Path, split: DataSplit) -> Result<RawSplit> {
    let file = File::open(path).map_err(|e| {
        Error::NotFound(format!("Failed to open archive {}: {e}", path.display()))
    })?;
    let mut npz = NpzReader::new(file)
        .map_err(|e| Error::Dataset(format!("Invalid archive {}: {e}", path.display())))?;

    let prefix = split.archive_prefix();
    let images: ArrayD<u8> = read_array(&mut npz, &format!("{prefix}_images"), path)?;
    let labels: ArrayD<u8> = read_array(&mut npz, &format!("{prefix}_labels"), path)?;
    debug!(
        "Read {} split from {}: images {:?}, labels {:?}",
        split,
        path.display(),
        images.shape(),
        labels.shape()
    );

    RawSplit::new(images, labels)
}

/// Checks that `path` is a readable archive holding all six split arrays
pub fn verify_archive(path: &Path) -> Result<()> {
    let file = File::open(path)?;
    let mut npz = NpzReader::new(file)
        .map_err(|e| Error::Dataset(format!("Invalid archive {}: {e}", path.display())))?;
    let names = npz
        .names()
        .map_err(|e| Error::Dataset(format!("Unreadable archive {}: {e}", path.display())))?;

    for split in [DataSplit::Train, DataSplit::Validation, DataSplit::Test] {
        for kind in ["images", "labels"] {
            let name = format!("{}_{kind}", split.archive_prefix());
            let present = names
                .iter()
                .any(|n| n.strip_suffix(".npy").unwrap_or(n) == name);
            if !present {
                return Err(Error::Dataset(format!(
                    "Archive {} has no '{name}' array",
                    path.display()
                )));
            }
        }
    }
    Ok(())
}

fn read_array(npz: &mut NpzReader<File>, name: &str, path: &Path) -> Result<ArrayD<u8>> {
    npz.by_name(&format!("{name}.npy")).map_err(|e| {
        Error::Dataset(format!(
            "Failed to read '{name}' from {}: {e}",
            path.display()
        ))
    })
}
