//! avatar-compositor: layered profile icon compositing
//!
//! This crate composes a square profile icon from three image layers (a
//! decorative frame, a character and a background) and keeps the result
//! ready to display, hash or encode.
//!
//! # Example
//!
//! ```no_run
//! use avatar_compositor::{Collection, LayerCompositor};
//!
//! let mut compositor = LayerCompositor::new()?;
//! compositor.update_background("icons/backgrounds/stars.png")?;
//! compositor.update_character("icons/characters/link.png")?;
//! compositor.update_frame("icons/frames/silver.png")?;
//!
//! // Every layer is now 256x256 and `working` holds the composite.
//! let icon = compositor.working();
//! icon.encode_to_jpeg("/tmp/profile.jpg");
//!
//! // Keep a copy without duplicates.
//! Collection::new("collection").save(icon)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Compositing rule
//!
//! Per pixel, an opaque frame wins; over a transparent frame an opaque
//! character wins; where both are transparent the background is copied
//! with its own alpha. Everything else is blended character over
//! background, then frame over that, into an opaque pixel. See
//! [`merge_pixel`].
//!
//! # Threading
//!
//! Nothing here locks. A [`LayerCompositor`] is a plain value: decode
//! images off-thread into [`Bitmap`]s if needed, then hand them over with
//! [`LayerCompositor::set_layer`] on the thread that owns the compositor.

mod bitmap;
mod collection;
mod compositor;
mod error;
mod layer;
mod selection;

pub use bitmap::{Bitmap, CHANNELS, JPEG_QUALITY, Pixel};
pub use collection::{Collection, SaveOutcome};
pub use compositor::{CANONICAL_SIZE, Configurable, LayerCompositor};
pub use error::{BitmapError, CollectionError, CompositeError};
pub use layer::{DependencyVersion, Layer, LayerKind, LayerSource, blend, merge, merge_pixel};
pub use selection::LayerSelection;

#[cfg(test)]
pub(crate) mod testutil {
    use std::path::PathBuf;

    use crate::bitmap::Bitmap;

    /// A fresh, empty directory unique to this test process and `name`.
    pub fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "avatar-compositor-{}-{}",
            std::process::id(),
            name
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// A bitmap filled with one color.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Bitmap {
        let pixels = rgba.repeat((width * height) as usize);
        Bitmap::from_raw(pixels, width, height, 4).unwrap()
    }
}
