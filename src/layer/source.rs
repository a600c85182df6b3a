//! Where a layer's pixels came from, and how a path becomes a layer.

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::bitmap::Bitmap;
use crate::error::{BitmapError, CompositeError};

/// Provenance of a layer's current bitmap.
///
/// The compositor treats [`LayerSource::Blank`] and [`LayerSource::Failed`]
/// identically (a transparent canonical-size layer); the distinction is kept
/// for callers that want to surface it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerSource {
    /// Intentionally empty: an empty path or a fresh compositor.
    Blank,
    /// Decoded from this file.
    File(PathBuf),
    /// Decoding this file failed; the layer is blank.
    Failed { path: PathBuf, reason: String },
    /// Handed over as an already decoded bitmap.
    Provided,
    /// Computed by merging the input layers (working layer only).
    Merged,
}

impl LayerSource {
    /// The file this layer was loaded from, if it loaded successfully.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::File(path) => Some(path),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Loads a layer bitmap from `path`.
///
/// An empty path gives a blank `size`×`size` bitmap. A missing or corrupt
/// file does the same and is recorded as [`LayerSource::Failed`]. Only
/// allocation failure is an error.
pub(crate) fn load(path: &Path, size: u32) -> Result<(Bitmap, LayerSource), CompositeError> {
    if path.as_os_str().is_empty() {
        return Ok((Bitmap::blank(size, size)?, LayerSource::Blank));
    }

    match Bitmap::open(path) {
        Ok(bitmap) if !bitmap.is_empty() => Ok((bitmap, LayerSource::File(path.to_path_buf()))),
        Ok(_) => failed(path, "decoded image has no pixels".to_owned(), size),
        Err(err) if err.is_allocation() => Err(err.into()),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "undecodable layer image, using blank");
            failed(path, err.to_string(), size)
        }
    }
}

fn failed(path: &Path, reason: String, size: u32) -> Result<(Bitmap, LayerSource), CompositeError> {
    Ok((
        Bitmap::blank(size, size)?,
        LayerSource::Failed {
            path: path.to_path_buf(),
            reason,
        },
    ))
}

/// Normalizes a handed-over bitmap the same way [`load`] does.
pub(crate) fn provided(bitmap: Bitmap, size: u32) -> Result<(Bitmap, LayerSource), BitmapError> {
    if bitmap.is_empty() {
        Ok((Bitmap::blank(size, size)?, LayerSource::Blank))
    } else {
        Ok((bitmap, LayerSource::Provided))
    }
}
