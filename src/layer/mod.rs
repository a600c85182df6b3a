//! Layer infrastructure for icon compositing.
//!
//! A compositor holds four [`Layer`]s: three inputs (frame, character,
//! background) and one derived output (working). Each layer owns its bitmap,
//! remembers where the bitmap came from, and carries a version number that
//! increments on every replacement.
//!
//! Versions let the compositor tell whether `working` still reflects the
//! inputs (see [`DependencyVersion`]) and give UIs a cheap change token to
//! poll after a mutator returns.

pub mod blend;
pub mod source;

pub use blend::{blend, merge, merge_pixel};
pub use source::LayerSource;

use std::fmt;

use crate::bitmap::Bitmap;
use crate::error::BitmapError;

// ============================================================================
// LayerKind
// ============================================================================

/// Names the four layers of a compositor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerKind {
    /// Decorative ring drawn on top.
    Frame,
    /// The character silhouette.
    Character,
    /// Backdrop shown wherever frame and character are transparent.
    Background,
    /// The composited output.
    Working,
}

impl LayerKind {
    /// The three layers that feed the merge, in stacking order top to bottom.
    pub const INPUTS: [Self; 3] = [Self::Frame, Self::Character, Self::Background];

    pub const ALL: [Self; 4] = [
        Self::Frame,
        Self::Character,
        Self::Background,
        Self::Working,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Frame => "frame",
            Self::Character => "character",
            Self::Background => "background",
            Self::Working => "working",
        }
    }

    /// Returns true for the layers that feed the merge.
    pub fn is_input(self) -> bool {
        !matches!(self, Self::Working)
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Layer Dependencies
// ============================================================================

/// The combined version of a set of layers.
///
/// Layer versions only ever grow, so any replacement changes the combined
/// value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DependencyVersion(u64);

impl DependencyVersion {
    /// Combines multiple layer versions into one.
    pub fn combine(versions: &[u64]) -> Self {
        Self(versions.iter().fold(0u64, |acc, v| acc.wrapping_add(*v)))
    }
}

// ============================================================================
// Layer
// ============================================================================

/// One named bitmap of a compositor, with provenance and version tracking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    bitmap: Bitmap,
    source: LayerSource,
    version: u64,
}

impl Layer {
    /// A transparent `size`×`size` layer.
    pub(crate) fn blank(size: u32) -> Result<Self, BitmapError> {
        Ok(Self {
            bitmap: Bitmap::blank(size, size)?,
            source: LayerSource::Blank,
            version: 0,
        })
    }

    pub fn bitmap(&self) -> &Bitmap {
        &self.bitmap
    }

    pub fn source(&self) -> &LayerSource {
        &self.source
    }

    /// Returns the current version number.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn bitmap_mut(&mut self) -> &mut Bitmap {
        &mut self.bitmap
    }

    /// Swaps in a new bitmap and increments the version.
    pub(crate) fn replace(&mut self, bitmap: Bitmap, source: LayerSource) {
        self.bitmap = bitmap;
        self.source = source;
        self.touch();
    }

    /// Marks the bitmap as recomputed in place.
    pub(crate) fn mark_merged(&mut self) {
        self.source = LayerSource::Merged;
        self.touch();
    }

    /// Forces a square `size`×`size` extent.
    ///
    /// Returns true if the bitmap was resampled. The version only changes
    /// when it was.
    pub(crate) fn resize(&mut self, size: u32) -> Result<bool, BitmapError> {
        if self.bitmap.dimensions() == (size, size) {
            return Ok(false);
        }
        self.bitmap.resize(size, size)?;
        self.touch();
        Ok(true)
    }

    fn touch(&mut self) {
        self.version = self.version.wrapping_add(1);
    }
}
