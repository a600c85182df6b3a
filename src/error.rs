//! Error types shared across the crate.

use std::path::PathBuf;

/// Errors raised while decoding, encoding, allocating or adopting a [`Bitmap`](crate::Bitmap).
#[derive(thiserror::Error, Debug)]
pub enum BitmapError {
    /// The encoded input could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] image::ImageError),

    /// The encoder rejected the buffer or failed while writing.
    #[error("encode error for {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Encoding into an in-memory buffer failed.
    #[error("in-memory encode error: {0}")]
    EncodeMemory(#[source] image::ImageError),

    /// Reading or writing a file failed.
    #[error("io error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The pixel buffer could not be allocated.
    #[error("failed to allocate {bytes} bytes for a {width}x{height} bitmap")]
    Allocation {
        width: u32,
        height: u32,
        bytes: usize,
    },

    /// An adopted raw buffer does not match its declared dimensions.
    #[error("buffer holds {actual} bytes, expected {expected} for {width}x{height}x{channels}")]
    BufferSize {
        width: u32,
        height: u32,
        channels: u8,
        expected: usize,
        actual: usize,
    },

    /// An adopted raw buffer uses a channel layout we cannot normalize to RGBA.
    #[error("unsupported channel count: {0}")]
    UnsupportedChannels(u8),
}

impl BitmapError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn encode(path: impl Into<PathBuf>, source: image::ImageError) -> Self {
        Self::Encode {
            path: path.into(),
            source,
        }
    }

    /// Returns true if this error means the pixel buffer could not be allocated.
    pub fn is_allocation(&self) -> bool {
        matches!(self, Self::Allocation { .. })
    }
}

/// Errors raised by the merge kernel and the [`LayerCompositor`](crate::LayerCompositor).
///
/// Missing files and empty paths are not errors; they degrade to a blank layer.
#[derive(thiserror::Error, Debug)]
pub enum CompositeError {
    /// Layers handed to the merge kernel do not share the same extent.
    #[error("dimension mismatch: {layer} is {actual:?}, expected {expected:?}")]
    DimensionMismatch {
        layer: &'static str,
        expected: (u32, u32),
        actual: (u32, u32),
    },

    /// A bitmap operation failed in a way that cannot be substituted (allocation).
    #[error(transparent)]
    Bitmap(#[from] BitmapError),
}

/// Errors raised by the content-addressed [`Collection`](crate::Collection).
#[derive(thiserror::Error, Debug)]
pub enum CollectionError {
    /// An empty bitmap has no content to address.
    #[error("cannot save an empty image")]
    EmptyImage,

    /// Listing or removing collection entries failed.
    #[error("io error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing the PNG failed.
    #[error(transparent)]
    Bitmap(#[from] BitmapError),
}
