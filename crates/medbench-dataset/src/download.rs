//! Fetching dataset archives that are not yet on disk.

use crate::info::DatasetInfo;
use crate::npz::{archive_path, verify_archive};
use indicatif::{ProgressBar, ProgressStyle};
use medbench_core::{Error, Result};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Returns the archive path, downloading the archive first when allowed.
pub fn ensure_archive(info: &DatasetInfo, root: &Path, download: bool) -> Result<PathBuf> {
    let path = archive_path(root, &info.key);
    if path.exists() {
        return Ok(path);
    }

    if !download {
        return Err(Error::NotFound(format!(
            "Dataset archive not found: {} (downloads are disabled)",
            path.display()
        )));
    }

    fs::create_dir_all(root)?;
    download_file(&info.url, &path)?;
    Ok(path)
}

/// Downloads `url` to `dest` through a `.part` file renamed on success
fn download_file(url: &str, dest: &Path) -> Result<()> {
    info!("Downloading {} to {}", url, dest.display());

    let client = reqwest::blocking::Client::builder()
        .timeout(DOWNLOAD_TIMEOUT)
        .build()
        .map_err(|e| Error::Download(format!("Failed to build HTTP client: {e}")))?;

    let response = client
        .get(url)
        .send()
        .and_then(|r| r.error_for_status())
        .map_err(|e| Error::Download(format!("GET {url} failed: {e}")))?;

    let progress = match response.content_length() {
        Some(len) => ProgressBar::new(len),
        None => ProgressBar::new_spinner(),
    };
    progress.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );

    let part = dest.with_extension("npz.part");
    let mut file = File::create(&part)?;
    let mut reader = progress.wrap_read(response);
    if let Err(e) = std::io::copy(&mut reader, &mut file) {
        let _ = fs::remove_file(&part);
        return Err(Error::Download(format!("Interrupted download of {url}: {e}")));
    }
    progress.finish_and_clear();

    promote_part(&part, dest)
}

/// Moves a finished `.part` file into place once it reads as a full archive.
///
/// A rejected file is removed so the next run downloads again.
fn promote_part(part: &Path, dest: &Path) -> Result<()> {
    if let Err(e) = verify_archive(part) {
        let _ = fs::remove_file(part);
        return Err(Error::Download(format!(
            "Downloaded archive for {} is corrupt: {e}",
            dest.display()
        )));
    }
    fs::rename(part, dest)?;
    info!("Saved {}", dest.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::info::get_dataset_info;
    use ndarray::{Array2, Array3};
    use ndarray_npy::NpzWriter;
    use tempfile::TempDir;

    #[test]
    fn test_existing_archive_is_returned() {
        let dir = TempDir::new().unwrap();
        let info = get_dataset_info("pathmnist").unwrap();
        let path = dir.path().join("pathmnist.npz");
        fs::write(&path, b"placeholder").unwrap();

        assert_eq!(ensure_archive(&info, dir.path(), false).unwrap(), path);
    }

    #[test]
    fn test_missing_archive_without_download() {
        let dir = TempDir::new().unwrap();
        let info = get_dataset_info("pathmnist").unwrap();
        let result = ensure_archive(&info, dir.path(), false);
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_corrupt_part_is_discarded() {
        let dir = TempDir::new().unwrap();
        let part = dir.path().join("pathmnist.npz.part");
        let dest = dir.path().join("pathmnist.npz");
        fs::write(&part, b"truncated").unwrap();

        let result = promote_part(&part, &dest);
        assert!(matches!(result, Err(Error::Download(_))));
        assert!(!part.exists());
        assert!(!dest.exists());
    }

    #[test]
    fn test_complete_part_is_renamed() {
        let dir = TempDir::new().unwrap();
        let part = dir.path().join("breastmnist.npz.part");
        let dest = dir.path().join("breastmnist.npz");

        let mut npz = NpzWriter::new(File::create(&part).unwrap());
        for prefix in ["train", "val", "test"] {
            npz.add_array(format!("{prefix}_images"), &Array3::<u8>::zeros((1, 28, 28))).unwrap();
            npz.add_array(format!("{prefix}_labels"), &Array2::<u8>::zeros((1, 1))).unwrap();
        }
        npz.finish().unwrap();

        promote_part(&part, &dest).unwrap();
        assert!(dest.is_file());
        assert!(!part.exists());
    }
}
