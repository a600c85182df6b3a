//! Per-pixel compositing of the frame, character and background layers.
//!
//! The rule is a three-tier fast path followed by a general blend:
//!
//! 1. An opaque frame pixel wins outright.
//! 2. Over a transparent frame pixel, an opaque character pixel wins.
//! 3. Where both frame and character are transparent, the background pixel
//!    is copied as-is, alpha included.
//! 4. Anything else blends character over background, then frame over that,
//!    producing an opaque pixel.

use crate::bitmap::{Bitmap, CHANNELS, Pixel};
use crate::error::CompositeError;

/// Blends `src` over `dst` using `src.a` as the weight.
///
/// Per channel `(src * a + dst * (255 - a)) / 255` with integer division.
/// The result is always opaque; `dst.a` is ignored.
pub fn blend(src: Pixel, dst: Pixel) -> Pixel {
    let alpha = u16::from(src.a);
    let mix = |s: u8, d: u8| ((u16::from(s) * alpha + u16::from(d) * (255 - alpha)) / 255) as u8;

    Pixel::new(
        mix(src.r, dst.r),
        mix(src.g, dst.g),
        mix(src.b, dst.b),
        u8::MAX,
    )
}

/// Composites one pixel of each layer.
pub fn merge_pixel(frame: Pixel, character: Pixel, background: Pixel) -> Pixel {
    if frame.is_opaque() {
        frame
    } else if frame.is_transparent() && character.is_opaque() {
        character
    } else if frame.is_transparent() && character.is_transparent() {
        background
    } else {
        blend(frame, blend(character, background))
    }
}

/// Composites whole bitmaps into `output`.
///
/// All four bitmaps must share the frame's dimensions; a mismatch fails
/// before `output` is touched.
pub fn merge(
    frame: &Bitmap,
    character: &Bitmap,
    background: &Bitmap,
    output: &mut Bitmap,
) -> Result<(), CompositeError> {
    let expected = frame.dimensions();
    let layers = [
        ("character", character.dimensions()),
        ("background", background.dimensions()),
        ("working", output.dimensions()),
    ];
    for (layer, actual) in layers {
        if actual != expected {
            return Err(CompositeError::DimensionMismatch {
                layer,
                expected,
                actual,
            });
        }
    }

    let inputs = frame
        .as_bytes()
        .chunks_exact(CHANNELS)
        .zip(character.as_bytes().chunks_exact(CHANNELS))
        .zip(background.as_bytes().chunks_exact(CHANNELS));

    for (out, ((f, c), b)) in output.as_bytes_mut().chunks_exact_mut(CHANNELS).zip(inputs) {
        let px = merge_pixel(
            Pixel::from_slice(f),
            Pixel::from_slice(c),
            Pixel::from_slice(b),
        );
        out.copy_from_slice(&px.to_rgba());
    }

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
