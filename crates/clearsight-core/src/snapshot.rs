//! Enrollment snapshots: the accepted image written to disk as a JPEG.

use chrono::{DateTime, Local};
use image::RgbImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("failed to create snapshot directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write snapshot {path}: {source}")]
    Write {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error("identifier {0:?} has no usable filename characters")]
    InvalidIdentifier(String),
}

/// File name for a snapshot: `user_<YYYYmmdd_HHMMSS>_<identifier>.jpg`.
///
/// Characters outside `[A-Za-z0-9_-]` are dropped from the identifier.
pub fn snapshot_file_name(identifier: &str, at: DateTime<Local>) -> Result<String, SnapshotError> {
    let safe: String = identifier
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if safe.is_empty() {
        return Err(SnapshotError::InvalidIdentifier(identifier.to_string()));
    }
    Ok(format!("user_{}_{safe}.jpg", at.format("%Y%m%d_%H%M%S")))
}

/// Write `image` into `dir` (created if missing) and return the full path.
pub fn save_face_image(dir: &Path, identifier: &str, image: &RgbImage) -> Result<PathBuf, SnapshotError> {
    let file_name = snapshot_file_name(identifier, Local::now())?;

    std::fs::create_dir_all(dir).map_err(|source| SnapshotError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let path = dir.join(file_name);
    image
        .save_with_format(&path, image::ImageFormat::Jpeg)
        .map_err(|source| SnapshotError::Write { path: path.clone(), source })?;

    tracing::info!(path = %path.display(), "saved face snapshot");
    Ok(path)
}
