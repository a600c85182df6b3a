//! Layered icon compositor.

use std::path::Path;

use tracing::{debug, instrument};

use crate::bitmap::Bitmap;
use crate::error::CompositeError;
use crate::layer::{self, DependencyVersion, Layer, LayerKind, LayerSource, source};
use crate::selection::LayerSelection;

/// Edge length every layer is forced to after each mutation.
pub const CANONICAL_SIZE: u32 = 256;

// ============================================================================
// Configurable Trait
// ============================================================================

/// Trait for types that can be configured from a [`LayerSelection`].
pub trait Configurable {
    /// Loads every layer named by the selection.
    fn apply_selection(&mut self, selection: &LayerSelection) -> Result<(), CompositeError>;

    /// Exports the files currently loaded as a selection.
    fn export_selection(&self) -> LayerSelection;
}

// ============================================================================
// LayerCompositor
// ============================================================================

/// Holds the frame, character and background layers plus the composited
/// working layer, all at [`CANONICAL_SIZE`].
///
/// Replacing an input layer re-merges `working`. Replacing `working`
/// directly does not: the caller-supplied image *is* the result, and stays
/// so until the next input change. [`LayerCompositor::is_consistent`]
/// reports which of the two states the compositor is in.
///
/// Empty paths and undecodable files never fail a mutator; the layer simply
/// becomes transparent.
///
/// # Example
///
/// ```no_run
/// use avatar_compositor::LayerCompositor;
///
/// let mut compositor = LayerCompositor::new()?;
/// compositor.update_background("assets/backgrounds/sky.png")?;
/// compositor.update_character("assets/characters/hero.png")?;
/// compositor.update_frame("assets/frames/gold.png")?;
///
/// let working = compositor.working();
/// assert_eq!(working.dimensions(), (256, 256));
/// # Ok::<(), avatar_compositor::CompositeError>(())
/// ```
///
/// Cloning is a deep copy, which makes a cheap working copy for modal flows:
///
/// ```
/// use avatar_compositor::LayerCompositor;
///
/// let mut compositor = LayerCompositor::new()?;
/// let mut draft = compositor.preview();
/// draft.update_frame("")?;
/// compositor.commit(draft);
/// # Ok::<(), avatar_compositor::CompositeError>(())
/// ```
#[derive(Debug, Clone)]
pub struct LayerCompositor {
    frame: Layer,
    character: Layer,
    background: Layer,
    working: Layer,

    /// Combined version of all four layers right after the last merge.
    merged_at: Option<DependencyVersion>,
}

impl LayerCompositor {
    /// Creates a compositor with four transparent canonical-size layers.
    pub fn new() -> Result<Self, CompositeError> {
        let blank = Layer::blank(CANONICAL_SIZE)?;
        let mut compositor = Self {
            frame: blank.clone(),
            character: blank.clone(),
            background: blank.clone(),
            working: blank,
            merged_at: None,
        };
        compositor.merge()?;
        Ok(compositor)
    }

    pub fn layer(&self, kind: LayerKind) -> &Layer {
        match kind {
            LayerKind::Frame => &self.frame,
            LayerKind::Character => &self.character,
            LayerKind::Background => &self.background,
            LayerKind::Working => &self.working,
        }
    }

    fn layer_mut(&mut self, kind: LayerKind) -> &mut Layer {
        match kind {
            LayerKind::Frame => &mut self.frame,
            LayerKind::Character => &mut self.character,
            LayerKind::Background => &mut self.background,
            LayerKind::Working => &mut self.working,
        }
    }

    pub fn frame(&self) -> &Bitmap {
        self.frame.bitmap()
    }

    pub fn character(&self) -> &Bitmap {
        self.character.bitmap()
    }

    pub fn background(&self) -> &Bitmap {
        self.background.bitmap()
    }

    /// The composited (or directly substituted) result.
    pub fn working(&self) -> &Bitmap {
        self.working.bitmap()
    }

    /// Where the given layer's bitmap came from.
    pub fn source(&self, kind: LayerKind) -> &LayerSource {
        self.layer(kind).source()
    }

    /// Version of the given layer; changes whenever its bitmap does.
    pub fn version(&self, kind: LayerKind) -> u64 {
        self.layer(kind).version()
    }

    /// Returns true if `working` is the merge of the current inputs, false
    /// after a direct [`LayerCompositor::update_working`].
    pub fn is_consistent(&self) -> bool {
        self.merged_at == Some(self.all_versions())
    }

    fn all_versions(&self) -> DependencyVersion {
        DependencyVersion::combine(&LayerKind::ALL.map(|kind| self.version(kind)))
    }

    // ------------------------------------------------------------------------
    // Mutators
    // ------------------------------------------------------------------------

    /// Replaces the frame layer and re-merges. An empty path clears it.
    pub fn update_frame(&mut self, path: impl AsRef<Path>) -> Result<(), CompositeError> {
        self.update(LayerKind::Frame, path)
    }

    /// Replaces the character layer and re-merges. An empty path clears it.
    pub fn update_character(&mut self, path: impl AsRef<Path>) -> Result<(), CompositeError> {
        self.update(LayerKind::Character, path)
    }

    /// Replaces the background layer and re-merges. An empty path clears it.
    pub fn update_background(&mut self, path: impl AsRef<Path>) -> Result<(), CompositeError> {
        self.update(LayerKind::Background, path)
    }

    /// Replaces the working layer without re-merging.
    ///
    /// Used to load a previously saved or custom image as the final result.
    pub fn update_working(&mut self, path: impl AsRef<Path>) -> Result<(), CompositeError> {
        self.update(LayerKind::Working, path)
    }

    /// Replaces any layer from a file, then resizes all layers and, for an
    /// input layer, re-merges.
    pub fn update(
        &mut self,
        kind: LayerKind,
        path: impl AsRef<Path>,
    ) -> Result<(), CompositeError> {
        self.load(kind, path.as_ref())?;
        self.settle(kind)
    }

    /// Replaces any layer with an already decoded bitmap.
    ///
    /// Same rules as [`LayerCompositor::update`]; an empty bitmap clears the
    /// layer. Used to hand over images decoded off-thread.
    pub fn set_layer(&mut self, kind: LayerKind, bitmap: Bitmap) -> Result<(), CompositeError> {
        let (bitmap, source) = source::provided(bitmap, CANONICAL_SIZE)?;
        self.layer_mut(kind).replace(bitmap, source);
        self.settle(kind)
    }

    /// Recomputes `working` from the three input layers.
    #[instrument(level = "debug", skip(self))]
    pub fn merge(&mut self) -> Result<(), CompositeError> {
        layer::merge(
            self.frame.bitmap(),
            self.character.bitmap(),
            self.background.bitmap(),
            self.working.bitmap_mut(),
        )?;
        self.working.mark_merged();
        self.merged_at = Some(self.all_versions());
        Ok(())
    }

    /// Forces all four layers to [`CANONICAL_SIZE`].
    pub fn resize(&mut self) -> Result<(), CompositeError> {
        for kind in LayerKind::ALL {
            if self.layer_mut(kind).resize(CANONICAL_SIZE)? {
                debug!(layer = %kind, "resized to canonical size");
            }
        }
        Ok(())
    }

    #[instrument(level = "debug", skip(self, path), fields(path = %path.display()))]
    fn load(&mut self, kind: LayerKind, path: &Path) -> Result<(), CompositeError> {
        let (bitmap, source) = source::load(path, CANONICAL_SIZE)?;
        self.layer_mut(kind).replace(bitmap, source);
        Ok(())
    }

    fn settle(&mut self, kind: LayerKind) -> Result<(), CompositeError> {
        self.resize()?;
        if kind.is_input() {
            self.merge()?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Working copies
    // ------------------------------------------------------------------------

    /// Returns a deep copy to edit in a modal flow.
    ///
    /// Drop it to cancel, or hand it to [`LayerCompositor::commit`].
    pub fn preview(&self) -> Self {
        self.clone()
    }

    /// Adopts a working copy produced by [`LayerCompositor::preview`].
    pub fn commit(&mut self, preview: Self) {
        *self = preview;
    }
}

impl Configurable for LayerCompositor {
    /// Loads the selection's input layers (absent ones become blank),
    /// merges once, then loads `working` on top if the selection names one.
    fn apply_selection(&mut self, selection: &LayerSelection) -> Result<(), CompositeError> {
        for kind in LayerKind::INPUTS {
            let path = selection.path(kind).unwrap_or(Path::new(""));
            self.load(kind, path)?;
        }
        self.settle(LayerKind::Frame)?;

        if let Some(path) = selection.path(LayerKind::Working) {
            self.update_working(path)?;
        }
        Ok(())
    }

    /// Reports the files each layer was loaded from. Blank, failed and
    /// merged layers are omitted.
    fn export_selection(&self) -> LayerSelection {
        let path = |kind| self.source(kind).path().map(Path::to_path_buf);
        LayerSelection {
            frame: path(LayerKind::Frame),
            character: path(LayerKind::Character),
            background: path(LayerKind::Background),
            working: path(LayerKind::Working),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::Pixel;
    use crate::testutil::{scratch_dir, solid};
    use std::path::PathBuf;

    const RED: [u8; 4] = [255, 0, 0, 255];
    const GREEN: [u8; 4] = [0, 255, 0, 255];
    const BLUE: [u8; 4] = [0, 0, 255, 255];

    fn write(dir: &Path, name: &str, width: u32, height: u32, rgba: [u8; 4]) -> PathBuf {
        let path = dir.join(name);
        solid(width, height, rgba).write_png(path).unwrap()
    }

    /// A frame that is opaque in the top half and transparent below.
    fn half_frame(dir: &Path) -> PathBuf {
        let mut frame = Bitmap::blank(CANONICAL_SIZE, CANONICAL_SIZE).unwrap();
        let half = frame.byte_size() / 2;
        for px in frame.as_bytes_mut()[..half].chunks_exact_mut(4) {
            px.copy_from_slice(&RED);
        }
        frame.write_png(dir.join("half-frame.png")).unwrap()
    }

    fn is_solid(bitmap: &Bitmap, rgba: impl Into<Pixel>) -> bool {
        let expected = rgba.into();
        bitmap.iter_pixels().all(|px| px == expected)
    }

    fn assert_canonical(compositor: &LayerCompositor) {
        for kind in LayerKind::ALL {
            assert_eq!(
                compositor.layer(kind).bitmap().dimensions(),
                (CANONICAL_SIZE, CANONICAL_SIZE),
                "{kind} is not canonical"
            );
        }
    }

    #[test]
    fn new_compositor_is_blank_and_consistent() {
        let compositor = LayerCompositor::new().unwrap();
        assert_canonical(&compositor);
        assert!(compositor.is_consistent());
        assert!(is_solid(compositor.working(), Pixel::TRANSPARENT));
        assert_eq!(compositor.source(LayerKind::Working), &LayerSource::Merged);
    }

    #[test]
    fn updates_enforce_canonical_size() {
        let dir = scratch_dir("compositor-canonical");
        let mut compositor = LayerCompositor::new().unwrap();

        let frame = write(&dir, "f.png", 100, 40, RED);
        compositor.update_frame(frame).unwrap();
        assert_canonical(&compositor);

        let character = write(&dir, "c.png", 512, 512, GREEN);
        compositor.update_character(character).unwrap();
        assert_canonical(&compositor);

        let background = write(&dir, "b.png", 3, 700, BLUE);
        compositor.update_background(background).unwrap();
        assert_canonical(&compositor);

        let working = write(&dir, "w.png", 512, 384, GREEN);
        compositor.update_working(working).unwrap();
        assert_canonical(&compositor);
    }

    #[test]
    fn layers_stack_frame_over_character_over_background() {
        let dir = scratch_dir("compositor-stack");
        let mut compositor = LayerCompositor::new().unwrap();

        let background = write(&dir, "b.png", 64, 64, BLUE);
        compositor.update_background(background).unwrap();
        assert!(is_solid(compositor.working(), BLUE));

        compositor.update_frame(half_frame(&dir)).unwrap();
        let top = compositor.working().pixel(10, 10).unwrap();
        let bottom = compositor.working().pixel(10, 200).unwrap();
        assert_eq!(top, Pixel::from(RED));
        assert_eq!(bottom, Pixel::from(BLUE));

        let character = write(&dir, "c.png", 16, 16, GREEN);
        compositor.update_character(character).unwrap();
        let top = compositor.working().pixel(10, 10).unwrap();
        let bottom = compositor.working().pixel(10, 200).unwrap();
        assert_eq!(top, Pixel::from(RED));
        assert_eq!(bottom, Pixel::from(GREEN));
        assert!(compositor.is_consistent());
    }

    #[test]
    fn update_working_bypasses_merge() {
        let dir = scratch_dir("compositor-working");
        let mut compositor = LayerCompositor::new().unwrap();
        compositor.update_frame(half_frame(&dir)).unwrap();
        let character = write(&dir, "c.png", 32, 32, GREEN);
        compositor.update_character(character).unwrap();
        let background = write(&dir, "b.png", 32, 32, BLUE);
        compositor.update_background(background).unwrap();
        let merged = compositor.working().clone();

        let custom = write(&dir, "custom.png", 512, 384, [10, 20, 30, 255]);
        compositor.update_working(&custom).unwrap();

        let mut expected = Bitmap::open(&custom).unwrap();
        expected.resize(CANONICAL_SIZE, CANONICAL_SIZE).unwrap();
        assert_eq!(compositor.working(), &expected);
        assert_ne!(compositor.working(), &merged);
        assert!(!compositor.is_consistent());

        let source = compositor.source(LayerKind::Working);
        assert_eq!(source.path(), Some(custom.as_path()));

        // The next input change re-merges over the custom image.
        compositor.update_frame(half_frame(&dir)).unwrap();
        assert_eq!(compositor.working(), &merged);
        assert!(compositor.is_consistent());
    }

    #[test]
    fn empty_path_matches_explicit_blank_frame() {
        let dir = scratch_dir("compositor-empty-path");
        let mut via_path = LayerCompositor::new().unwrap();
        let character = write(&dir, "c.png", 8, 8, [50, 60, 70, 128]);
        via_path.update_character(character).unwrap();
        let background = write(&dir, "b.png", 8, 8, BLUE);
        via_path.update_background(background).unwrap();
        via_path.update_frame(half_frame(&dir)).unwrap();

        let mut via_bitmap = via_path.clone();
        via_path.update_frame("").unwrap();
        via_path.merge().unwrap();
        let blank = Bitmap::blank(CANONICAL_SIZE, CANONICAL_SIZE).unwrap();
        via_bitmap.set_layer(LayerKind::Frame, blank).unwrap();

        assert_eq!(via_path.frame(), via_bitmap.frame());
        assert_eq!(via_path.working(), via_bitmap.working());
        assert_eq!(via_path.source(LayerKind::Frame), &LayerSource::Blank);
    }

    #[test]
    fn undecodable_layer_degrades_to_blank() {
        let dir = scratch_dir("compositor-undecodable");
        let bogus = dir.join("bogus.png");
        std::fs::write(&bogus, b"definitely not a png").unwrap();

        let mut compositor = LayerCompositor::new().unwrap();
        let background = write(&dir, "b.png", 8, 8, BLUE);
        compositor.update_background(background).unwrap();
        compositor.update_character(&bogus).unwrap();

        assert!(compositor.source(LayerKind::Character).is_failed());
        assert!(is_solid(compositor.character(), Pixel::TRANSPARENT));
        assert!(is_solid(compositor.working(), BLUE));

        let missing = dir.join("does-not-exist.png");
        compositor.update_frame(missing).unwrap();
        assert!(compositor.source(LayerKind::Frame).is_failed());
        assert_canonical(&compositor);
    }

    #[test]
    fn merge_is_repeatable() {
        let dir = scratch_dir("compositor-repeat");
        let mut compositor = LayerCompositor::new().unwrap();
        let character = write(&dir, "c.png", 8, 8, [1, 2, 3, 100]);
        compositor.update_character(character).unwrap();
        let background = write(&dir, "b.png", 8, 8, [9, 8, 7, 255]);
        compositor.update_background(background).unwrap();
        let first = compositor.working().clone();

        compositor.merge().unwrap();
        compositor.merge().unwrap();
        assert_eq!(compositor.working(), &first);
    }

    #[test]
    fn versions_change_on_replacement() {
        let dir = scratch_dir("compositor-versions");
        let mut compositor = LayerCompositor::new().unwrap();
        let frame_v = compositor.version(LayerKind::Frame);
        let working_v = compositor.version(LayerKind::Working);

        let frame = write(&dir, "f.png", 4, 4, RED);
        compositor.update_frame(frame).unwrap();
        assert!(compositor.version(LayerKind::Frame) > frame_v);
        assert!(compositor.version(LayerKind::Working) > working_v);
    }

    #[test]
    fn set_layer_accepts_decoded_bitmaps() {
        let mut compositor = LayerCompositor::new().unwrap();
        compositor
            .set_layer(LayerKind::Background, solid(32, 16, GREEN))
            .unwrap();
        assert_canonical(&compositor);

        let source = compositor.source(LayerKind::Background);
        assert_eq!(source, &LayerSource::Provided);
        assert!(is_solid(compositor.working(), GREEN));

        let custom = solid(8, 8, RED);
        compositor.set_layer(LayerKind::Working, custom).unwrap();
        assert!(!compositor.is_consistent());
        assert!(is_solid(compositor.working(), RED));
    }

    #[test]
    fn preview_is_isolated_until_commit() {
        let dir = scratch_dir("compositor-preview");
        let mut compositor = LayerCompositor::new().unwrap();
        let original = compositor.working().clone();

        let mut draft = compositor.preview();
        let background = write(&dir, "b.png", 8, 8, BLUE);
        draft.update_background(background).unwrap();
        assert_eq!(compositor.working(), &original, "draft must not leak");

        drop(draft);
        assert_eq!(compositor.working(), &original);

        let mut draft = compositor.preview();
        let background = write(&dir, "b2.png", 8, 8, GREEN);
        draft.update_background(background).unwrap();
        compositor.commit(draft);
        assert!(is_solid(compositor.working(), GREEN));
    }

    #[test]
    fn selection_round_trip() {
        let dir = scratch_dir("compositor-selection");
        let frame = half_frame(&dir);
        let background = write(&dir, "b.png", 8, 8, BLUE);

        let mut compositor = LayerCompositor::new().unwrap();
        compositor.update_frame(&frame).unwrap();
        compositor.update_background(&background).unwrap();

        let selection = compositor.export_selection();
        assert_eq!(selection.frame.as_deref(), Some(frame.as_path()));
        assert!(selection.character.is_none());
        assert_eq!(selection.background.as_deref(), Some(background.as_path()));
        assert!(selection.working.is_none());

        let mut restored = LayerCompositor::new().unwrap();
        restored.apply_selection(&selection).unwrap();
        assert_eq!(restored.working(), compositor.working());
        assert!(restored.is_consistent());
    }

    #[test]
    fn selection_working_wins_over_inputs() {
        let dir = scratch_dir("compositor-selection-working");
        let custom = write(&dir, "custom.png", 300, 300, [5, 5, 5, 255]);
        let selection = LayerSelection::new()
            .with_layer(LayerKind::Background, write(&dir, "b.png", 8, 8, BLUE))
            .with_layer(LayerKind::Working, &custom);

        let mut compositor = LayerCompositor::new().unwrap();
        compositor.apply_selection(&selection).unwrap();

        assert!(!compositor.is_consistent());
        assert!(is_solid(compositor.working(), [5, 5, 5, 255]));
        assert!(is_solid(compositor.background(), BLUE));

        let exported = compositor.export_selection();
        assert_eq!(exported.working.as_deref(), Some(custom.as_path()));
    }

    #[test]
    fn selection_clears_absent_layers() {
        let dir = scratch_dir("compositor-selection-clear");
        let mut compositor = LayerCompositor::new().unwrap();
        compositor.update_frame(half_frame(&dir)).unwrap();

        compositor.apply_selection(&LayerSelection::new()).unwrap();
        assert_eq!(compositor.source(LayerKind::Frame), &LayerSource::Blank);
        assert!(is_solid(compositor.working(), Pixel::TRANSPARENT));
    }
}
