//! Owned RGBA8 rasters.
//!
//! [`Bitmap`] is the leaf type of the crate. It owns exactly one tightly packed
//! RGBA8 buffer (straight alpha, row-major) and knows how to decode it from and
//! encode it to PNG/JPEG, resample it, fade its alpha and hash its content.
//!
//! Ownership is plain Rust ownership: moving a `Bitmap` transfers the buffer,
//! [`Clone`] deep-copies it, and [`std::mem::take`] leaves an empty bitmap behind.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::error::{ParameterError, ParameterErrorKind};
use image::imageops::{self, FilterType};
use image::{ExtendedColorType, ImageEncoder, ImageError, ImageReader, Rgba32FImage, RgbaImage};
use tracing::{debug, warn};
use xxhash_rust::xxh3::xxh3_64;

use crate::error::BitmapError;

/// Bytes per pixel. Every bitmap is RGBA regardless of the source format.
pub const CHANNELS: usize = 4;

/// Quality used by the JPEG encoder (0-100).
pub const JPEG_QUALITY: u8 = 90;

// ============================================================================
// Pixel
// ============================================================================

/// A single straight-alpha RGBA8 pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Pixel {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Pixel {
    /// Fully transparent black.
    pub const TRANSPARENT: Self = Self::new(0, 0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Reads a pixel from the first four bytes of `bytes`.
    ///
    /// Callers pass `chunks_exact(CHANNELS)` slices.
    pub(crate) fn from_slice(bytes: &[u8]) -> Self {
        Self::new(bytes[0], bytes[1], bytes[2], bytes[3])
    }

    pub fn to_rgba(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    pub fn is_opaque(self) -> bool {
        self.a == u8::MAX
    }

    pub fn is_transparent(self) -> bool {
        self.a == 0
    }
}

impl From<[u8; 4]> for Pixel {
    fn from([r, g, b, a]: [u8; 4]) -> Self {
        Self::new(r, g, b, a)
    }
}

// ============================================================================
// Bitmap
// ============================================================================

/// An owned RGBA8 image buffer.
///
/// The buffer is either empty (zero dimensions, no bytes) or exactly
/// `width * height * 4` bytes long.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bitmap")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

fn byte_len(width: u32, height: u32, channels: usize) -> Option<usize> {
    (width as usize)
        .checked_mul(height as usize)?
        .checked_mul(channels)
}

fn overflow(width: u32, height: u32) -> BitmapError {
    BitmapError::Allocation {
        width,
        height,
        bytes: usize::MAX,
    }
}

/// Allocates a zero-filled RGBA buffer, reporting out-of-memory instead of aborting.
fn zeroed(width: u32, height: u32) -> Result<Vec<u8>, BitmapError> {
    let bytes = byte_len(width, height, CHANNELS).ok_or_else(|| overflow(width, height))?;

    let mut pixels = Vec::new();
    pixels
        .try_reserve_exact(bytes)
        .map_err(|_| BitmapError::Allocation {
            width,
            height,
            bytes,
        })?;
    pixels.resize(bytes, 0);
    Ok(pixels)
}

impl Bitmap {
    /// Creates an empty bitmap with no buffer.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Allocates a fully transparent black bitmap.
    ///
    /// A zero dimension yields an empty bitmap.
    pub fn blank(width: u32, height: u32) -> Result<Self, BitmapError> {
        if width == 0 || height == 0 {
            return Ok(Self::empty());
        }
        Ok(Self {
            width,
            height,
            pixels: zeroed(width, height)?,
        })
    }

    /// Takes ownership of an already decoded buffer.
    ///
    /// RGBA input (`channels == 4`) is adopted as-is without copying. Grey,
    /// grey+alpha and RGB input is expanded to RGBA, opaque where the source
    /// has no alpha.
    pub fn from_raw(
        pixels: Vec<u8>,
        width: u32,
        height: u32,
        channels: u8,
    ) -> Result<Self, BitmapError> {
        if !(1..=4).contains(&channels) {
            return Err(BitmapError::UnsupportedChannels(channels));
        }

        let expected = byte_len(width, height, channels as usize)
            .ok_or_else(|| overflow(width, height))?;
        if pixels.len() != expected {
            return Err(BitmapError::BufferSize {
                width,
                height,
                channels,
                expected,
                actual: pixels.len(),
            });
        }
        if expected == 0 {
            return Ok(Self::empty());
        }

        let pixels = if channels as usize == CHANNELS {
            pixels
        } else {
            expand_to_rgba(&pixels, channels, width, height)?
        };

        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Decodes an image file into RGBA8.
    ///
    /// The format is sniffed from the file content, so a mislabelled
    /// extension still decodes.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BitmapError> {
        let path = path.as_ref();
        let reader = ImageReader::open(path)
            .and_then(|reader| reader.with_guessed_format())
            .map_err(|e| BitmapError::io(path, e))?;
        let decoded = reader.decode()?;
        Ok(Self::from(decoded.into_rgba8()))
    }

    /// Decodes an in-memory encoded image into RGBA8.
    pub fn decode(bytes: &[u8]) -> Result<Self, BitmapError> {
        let decoded = image::load_from_memory(bytes)?;
        Ok(Self::from(decoded.into_rgba8()))
    }

    /// Like [`Bitmap::open`], but a failure yields an empty bitmap.
    ///
    /// Check [`Bitmap::is_empty`] afterwards.
    pub fn decode_from_file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        Self::open(path).unwrap_or_else(|err| {
            warn!(path = %path.display(), error = %err, "failed to decode image file");
            Self::empty()
        })
    }

    /// Like [`Bitmap::decode`], but a failure yields an empty bitmap.
    pub fn decode_from_memory(bytes: &[u8]) -> Self {
        Self::decode(bytes).unwrap_or_else(|err| {
            warn!(len = bytes.len(), error = %err, "failed to decode image buffer");
            Self::empty()
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns `(width, height)`.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn byte_size(&self) -> usize {
        self.pixels.len()
    }

    /// Returns true if the bitmap holds no buffer.
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// The raw RGBA bytes, row-major.
    pub fn as_bytes(&self) -> &[u8] {
        &self.pixels
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    /// Gives up the buffer without copying.
    pub fn into_raw(self) -> Vec<u8> {
        self.pixels
    }

    /// Returns the pixel at `(x, y)`, or `None` when out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> Option<Pixel> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * CHANNELS;
        Some(Pixel::from_slice(&self.pixels[offset..offset + CHANNELS]))
    }

    /// Iterates over all pixels in row-major order.
    pub fn iter_pixels(&self) -> impl Iterator<Item = Pixel> + '_ {
        self.pixels.chunks_exact(CHANNELS).map(Pixel::from_slice)
    }

    /// Copies the buffer into an [`RgbaImage`].
    pub fn to_rgba_image(&self) -> RgbaImage {
        RgbaImage::from_raw(self.width, self.height, self.pixels.clone())
            .unwrap_or_else(|| RgbaImage::new(0, 0))
    }

    /// Resamples the bitmap in place with a linear (triangle) filter.
    ///
    /// Colour is weighted by alpha during the resample, so transparent
    /// neighbours do not bleed their RGB into visible edges. Does nothing
    /// when the dimensions already match. An empty bitmap becomes a blank
    /// one of the target size; a zero target dimension empties the bitmap.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), BitmapError> {
        if self.dimensions() == (width, height) {
            return Ok(());
        }
        if width == 0 || height == 0 {
            *self = Self::empty();
            return Ok(());
        }
        if self.is_empty() {
            *self = Self::blank(width, height)?;
            return Ok(());
        }

        let premultiplied = self.premultiplied()?;
        let resized = imageops::resize(&premultiplied, width, height, FilterType::Triangle);
        let pixels = unpremultiply(resized.as_raw(), width, height)?;

        debug!(from = ?self.dimensions(), to = ?(width, height), "resized bitmap");
        *self = Self {
            width,
            height,
            pixels,
        };
        Ok(())
    }

    /// Normalized premultiplied-alpha copy for resampling.
    fn premultiplied(&self) -> Result<Rgba32FImage, BitmapError> {
        let samples = self
            .pixels
            .chunks_exact(CHANNELS)
            .flat_map(|px| {
                let a = f32::from(px[3]) / 255.0;
                let channel = |v: u8| f32::from(v) / 255.0 * a;
                [channel(px[0]), channel(px[1]), channel(px[2]), a]
            })
            .collect();

        let buffer = Rgba32FImage::from_raw(self.width, self.height, samples);
        buffer.ok_or(BitmapError::BufferSize {
            width: self.width,
            height: self.height,
            channels: CHANNELS as u8,
            expected: self.pixel_count() * CHANNELS,
            actual: self.pixels.len(),
        })
    }

    /// Multiplies every alpha byte by `factor`, clamped to `[0, 1]`.
    ///
    /// RGB bytes are left untouched. NaN is treated as zero.
    pub fn apply_alpha(&mut self, factor: f32) {
        let factor = if factor.is_nan() {
            0.0
        } else {
            factor.clamp(0.0, 1.0)
        };
        if factor == 1.0 {
            return;
        }

        for px in self.pixels.chunks_exact_mut(CHANNELS) {
            px[3] = (f32::from(px[3]) * factor) as u8;
        }
    }

    /// XXH3-64 of the raw bytes as a decimal string; empty for an empty bitmap.
    pub fn hash(&self) -> String {
        if self.pixels.is_empty() {
            return String::new();
        }
        xxh3_64(&self.pixels).to_string()
    }

    // ------------------------------------------------------------------------
    // Encoding
    // ------------------------------------------------------------------------

    /// Writes a PNG, forcing a `.png` extension. Returns the path written.
    pub fn write_png(&self, path: impl AsRef<Path>) -> Result<PathBuf, BitmapError> {
        let path = with_extension(path.as_ref(), "png");
        self.write_with(&path, |bitmap, writer| bitmap.encode_png(writer))?;
        Ok(path)
    }

    /// Writes a JPEG at [`JPEG_QUALITY`], forcing a `.jpg` extension.
    ///
    /// JPEG has no alpha channel; alpha is dropped, not composited.
    pub fn write_jpeg(&self, path: impl AsRef<Path>) -> Result<PathBuf, BitmapError> {
        let path = with_extension(path.as_ref(), "jpg");
        self.write_with(&path, |bitmap, writer| bitmap.encode_jpeg(writer))?;
        Ok(path)
    }

    /// [`Bitmap::write_png`] reporting only success.
    pub fn encode_to_png(&self, path: impl AsRef<Path>) -> bool {
        log_written(self.write_png(path), "png")
    }

    /// [`Bitmap::write_jpeg`] reporting only success.
    pub fn encode_to_jpeg(&self, path: impl AsRef<Path>) -> bool {
        log_written(self.write_jpeg(path), "jpeg")
    }

    /// Encodes a PNG into memory.
    pub fn to_png_bytes(&self) -> Result<Vec<u8>, BitmapError> {
        let mut buf = Vec::new();
        let encoded = self.encode_png(&mut buf);
        encoded.map_err(BitmapError::EncodeMemory)?;
        Ok(buf)
    }

    /// Encodes a JPEG into memory, e.g. for submission as an account icon.
    pub fn to_jpeg_bytes(&self) -> Result<Vec<u8>, BitmapError> {
        let mut buf = Vec::new();
        let encoded = self.encode_jpeg(&mut buf);
        encoded.map_err(BitmapError::EncodeMemory)?;
        Ok(buf)
    }

    /// Encodes fully in memory, then writes a sibling `.part` file and
    /// renames it over `path`. A failed write leaves no file at `path`.
    fn write_with(
        &self,
        path: &Path,
        encode: impl FnOnce(&Self, &mut Vec<u8>) -> image::ImageResult<()>,
    ) -> Result<(), BitmapError> {
        if self.is_empty() {
            return Err(BitmapError::encode(path, empty_image_error()));
        }

        let mut buf = Vec::new();
        encode(self, &mut buf).map_err(|e| BitmapError::encode(path, e))?;

        let partial = partial_path(path);
        let written = fs::write(&partial, &buf).and_then(|()| fs::rename(&partial, path));
        if let Err(err) = written {
            let _ = fs::remove_file(&partial);
            return Err(BitmapError::io(path, err));
        }
        Ok(())
    }

    fn encode_png<W: Write>(&self, writer: W) -> image::ImageResult<()> {
        if self.is_empty() {
            return Err(empty_image_error());
        }
        PngEncoder::new(writer).write_image(
            &self.pixels,
            self.width,
            self.height,
            ExtendedColorType::Rgba8,
        )
    }

    fn encode_jpeg<W: Write>(&self, writer: W) -> image::ImageResult<()> {
        if self.is_empty() {
            return Err(empty_image_error());
        }
        let rgb: Vec<u8> = self
            .pixels
            .chunks_exact(CHANNELS)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect();
        JpegEncoder::new_with_quality(writer, JPEG_QUALITY).write_image(
            &rgb,
            self.width,
            self.height,
            ExtendedColorType::Rgb8,
        )
    }
}

impl From<RgbaImage> for Bitmap {
    fn from(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Self::empty();
        }
        Self {
            width,
            height,
            pixels: image.into_raw(),
        }
    }
}

impl From<Bitmap> for RgbaImage {
    fn from(bitmap: Bitmap) -> Self {
        let (width, height) = bitmap.dimensions();
        RgbaImage::from_raw(width, height, bitmap.into_raw())
            .unwrap_or_else(|| RgbaImage::new(0, 0))
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn expand_to_rgba(
    src: &[u8],
    channels: u8,
    width: u32,
    height: u32,
) -> Result<Vec<u8>, BitmapError> {
    let mut out = zeroed(width, height)?;
    for (dst, px) in out
        .chunks_exact_mut(CHANNELS)
        .zip(src.chunks_exact(channels as usize))
    {
        let rgba = match *px {
            [l] => [l, l, l, u8::MAX],
            [l, a] => [l, l, l, a],
            [r, g, b] => [r, g, b, u8::MAX],
            _ => return Err(BitmapError::UnsupportedChannels(channels)),
        };
        dst.copy_from_slice(&rgba);
    }
    Ok(out)
}

/// Converts a premultiplied resample back to straight-alpha RGBA8.
///
/// Fully transparent output pixels stay transparent black.
fn unpremultiply(samples: &[f32], width: u32, height: u32) -> Result<Vec<u8>, BitmapError> {
    let to_byte = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;

    let mut out = zeroed(width, height)?;
    for (dst, px) in out
        .chunks_exact_mut(CHANNELS)
        .zip(samples.chunks_exact(CHANNELS))
    {
        let a = px[3];
        if a <= 0.0 {
            continue;
        }
        dst.copy_from_slice(&[
            to_byte(px[0] / a),
            to_byte(px[1] / a),
            to_byte(px[2] / a),
            to_byte(a),
        ]);
    }
    Ok(out)
}

/// `icon.png` -> `icon.png.part`
fn partial_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".part");
    PathBuf::from(name)
}

fn with_extension(path: &Path, ext: &str) -> PathBuf {
    if path.extension() == Some(OsStr::new(ext)) {
        path.to_path_buf()
    } else {
        path.with_extension(ext)
    }
}

fn empty_image_error() -> ImageError {
    ImageError::Parameter(ParameterError::from_kind(
        ParameterErrorKind::DimensionMismatch,
    ))
}

fn log_written(result: Result<PathBuf, BitmapError>, format: &str) -> bool {
    match result {
        Ok(path) => {
            debug!(path = %path.display(), format, "wrote image");
            true
        }
        Err(err) => {
            warn!(error = %err, format, "failed to write image");
            false
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
