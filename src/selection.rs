//! Serializable layer selection.
//!
//! A [`LayerSelection`] records which file each layer was loaded from, so an
//! editing session can be saved and replayed later through
//! [`Configurable::apply_selection`](crate::Configurable::apply_selection).
//!
//! # Example
//!
//! ```
//! use avatar_compositor::{LayerKind, LayerSelection};
//!
//! let selection = LayerSelection::new()
//!     .with_layer(LayerKind::Frame, "frames/gold.png")
//!     .with_layer(LayerKind::Background, "backgrounds/sky.png");
//!
//! let json = selection.to_json().unwrap();
//! let restored = LayerSelection::from_json(&json).unwrap();
//! assert_eq!(restored, selection);
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::layer::LayerKind;

/// The files each layer should be loaded from.
///
/// # JSON Format
///
/// ```json
/// {
///   "frame": "frames/gold.png",
///   "background": "backgrounds/sky.png"
/// }
/// ```
///
/// Absent input layers are blank. An absent `working` means "merge the
/// inputs"; a present one is loaded as the final image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LayerSelection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<PathBuf>,

    /// A custom or previously composed image used as the result as-is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working: Option<PathBuf>,
}

impl LayerSelection {
    /// Creates an empty selection with every layer blank.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the file for one layer.
    pub fn with_layer(mut self, kind: LayerKind, path: impl AsRef<Path>) -> Self {
        *self.slot_mut(kind) = Some(path.as_ref().to_path_buf());
        self
    }

    /// The file chosen for `kind`, if any.
    pub fn path(&self, kind: LayerKind) -> Option<&Path> {
        let slot = match kind {
            LayerKind::Frame => &self.frame,
            LayerKind::Character => &self.character,
            LayerKind::Background => &self.background,
            LayerKind::Working => &self.working,
        };
        slot.as_deref()
    }

    fn slot_mut(&mut self, kind: LayerKind) -> &mut Option<PathBuf> {
        match kind {
            LayerKind::Frame => &mut self.frame,
            LayerKind::Character => &mut self.character,
            LayerKind::Background => &mut self.background,
            LayerKind::Working => &mut self.working,
        }
    }

    /// Returns true if no layer is selected.
    pub fn is_empty(&self) -> bool {
        LayerKind::ALL.iter().all(|kind| self.path(*kind).is_none())
    }

    /// Serializes the selection to a JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serializes the selection to a pretty-printed JSON string.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserializes a selection from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

// ============================================================================
// Tests
// ============================================================================
