//! Frame acquisition types and conversion.
//!
//! - `JpegFrame`: one compressed frame as delivered by the camera.
//! - `FrameBuffer`: packed RGB888 pixels owned by exactly one cycle.
//! - `PixelSource`: sized random-access view the inference engine pulls from.
//!
//! A `FrameBuffer` is not `Clone`. It is created by `decode`, replaced by
//! `resize`, and released (zeroized) when the owning cycle drops it, on every
//! exit path.

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use image::{ImageBuffer, ImageFormat, Rgb};
use std::fmt;
use std::time::Instant;
use zeroize::Zeroize;

use crate::error::CycleError;

/// Bytes per packed RGB888 pixel.
pub const RGB_CHANNELS: usize = 3;

const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];
const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

// ----------------------------------------------------------------------------
// JpegFrame: compressed camera output
// ----------------------------------------------------------------------------

/// One compressed frame. Construction checks the JPEG start/end markers.
pub struct JpegFrame {
    data: Vec<u8>,
    captured_at: Instant,
}

impl JpegFrame {
    pub fn new(data: Vec<u8>) -> Result<Self> {
        if data.len() < 4 || data[..2] != JPEG_SOI {
            return Err(anyhow!("frame does not start with a JPEG SOI marker"));
        }
        if data[data.len() - 2..] != JPEG_EOI {
            return Err(anyhow!("frame does not end with a JPEG EOI marker"));
        }
        Ok(Self {
            data,
            captured_at: Instant::now(),
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }
}

/// Encode packed RGB888 pixels as a JPEG frame.
pub fn encode_jpeg(rgb: &[u8], resolution: Resolution, quality: u8) -> Result<JpegFrame> {
    let mut out = Vec::with_capacity(rgb.len() / 8);
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, quality);
    encoder
        .encode(
            rgb,
            resolution.width,
            resolution.height,
            image::ExtendedColorType::Rgb8,
        )
        .context("encode jpeg")?;
    JpegFrame::new(out)
}

// ----------------------------------------------------------------------------
// FrameBuffer: per-cycle pixel storage
// ----------------------------------------------------------------------------

/// Packed RGB888 pixel buffer. Lives for exactly one cycle.
pub struct FrameBuffer {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

// Explicitly NOT implementing Clone: a buffer never outlives its cycle.

impl FrameBuffer {
    /// Allocate a zeroed buffer, reporting allocation failure instead of aborting.
    pub fn allocate(width: u32, height: u32) -> Result<Self, CycleError> {
        let len = Resolution::new(width, height)
            .pixel_count()
            .checked_mul(RGB_CHANNELS)
            .ok_or(CycleError::Memory {
                requested_bytes: usize::MAX,
            })?;
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| CycleError::Memory {
                requested_bytes: len,
            })?;
        data.resize(len, 0);
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Wrap already-decoded RGB888 pixels.
    pub fn from_rgb(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = Resolution::new(width, height).pixel_count() * RGB_CHANNELS;
        if data.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// RGB triple at (x, y).
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * RGB_CHANNELS;
        Some([self.data[idx], self.data[idx + 1], self.data[idx + 2]])
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let idx = (y as usize * self.width as usize + x as usize) * RGB_CHANNELS;
        self.data[idx..idx + RGB_CHANNELS].copy_from_slice(&rgb);
    }

    pub(crate) fn rgb(&self) -> &[u8] {
        &self.data
    }

    /// Byte length of the pixel data.
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

impl Drop for FrameBuffer {
    fn drop(&mut self) {
        self.data.zeroize();
    }
}

// ----------------------------------------------------------------------------
// PixelSource: pull-based accessor for the inference engine
// ----------------------------------------------------------------------------

/// Sized, randomly addressable pixel source.
///
/// One sample is one pixel packed as `(r << 16) | (g << 8) | b` in an `f32`,
/// the layout image classifiers on these boards expect.
pub trait PixelSource {
    /// Total number of samples.
    fn total_samples(&self) -> usize;

    /// Fill `out` with samples starting at `offset`.
    fn read_samples(&self, offset: usize, out: &mut [f32]) -> Result<()>;

    /// Resolution the samples are laid out at (row-major).
    fn resolution(&self) -> Resolution;
}

impl PixelSource for FrameBuffer {
    fn total_samples(&self) -> usize {
        self.resolution().pixel_count()
    }

    fn read_samples(&self, offset: usize, out: &mut [f32]) -> Result<()> {
        let end = offset
            .checked_add(out.len())
            .ok_or_else(|| anyhow!("pixel range overflow"))?;
        if end > self.total_samples() {
            return Err(anyhow!(
                "pixel range {}..{} outside buffer of {} samples",
                offset,
                end,
                self.total_samples()
            ));
        }
        let pixels = self.data[offset * RGB_CHANNELS..end * RGB_CHANNELS].chunks_exact(RGB_CHANNELS);
        for (sample, px) in out.iter_mut().zip(pixels) {
            *sample = pack_rgb(px[0], px[1], px[2]);
        }
        Ok(())
    }

    fn resolution(&self) -> Resolution {
        FrameBuffer::resolution(self)
    }
}

pub fn pack_rgb(r: u8, g: u8, b: u8) -> f32 {
    (((r as u32) << 16) | ((g as u32) << 8) | b as u32) as f32
}

pub fn unpack_rgb(sample: f32) -> [u8; 3] {
    let packed = sample as u32;
    [
        ((packed >> 16) & 0xFF) as u8,
        ((packed >> 8) & 0xFF) as u8,
        (packed & 0xFF) as u8,
    ]
}

// ----------------------------------------------------------------------------
// Conversion
// ----------------------------------------------------------------------------

/// Decode a compressed frame to RGB888 at its native resolution.
pub fn decode(frame: &JpegFrame) -> Result<FrameBuffer, CycleError> {
    let image = image::load_from_memory_with_format(frame.as_bytes(), ImageFormat::Jpeg)
        .context("decode jpeg")
        .map_err(CycleError::Conversion)?;
    let rgb = image.into_rgb8();
    let (width, height) = rgb.dimensions();
    if width == 0 || height == 0 {
        return Err(CycleError::Conversion(anyhow!("decoded frame is empty")));
    }
    FrameBuffer::from_rgb(rgb.into_raw(), width, height).map_err(CycleError::Conversion)
}

/// Crop window applied before scaling, in source pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CropWindow {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Largest centered window of `source` with the aspect ratio of `target`.
pub fn crop_window(source: Resolution, target: Resolution) -> CropWindow {
    let (sw, sh) = (source.width as u64, source.height as u64);
    let (tw, th) = (target.width as u64, target.height as u64);
    if sw * th > sh * tw {
        let width = ((sh * tw) / th).max(1) as u32;
        CropWindow {
            x: (source.width - width) / 2,
            y: 0,
            width,
            height: source.height,
        }
    } else {
        let height = ((sw * th) / tw).max(1) as u32;
        CropWindow {
            x: 0,
            y: (source.height - height) / 2,
            width: source.width,
            height,
        }
    }
}

/// Resize to the engine input resolution: center-crop to the target aspect
/// ratio, then scale. A buffer already at the target is returned unchanged.
pub fn resize(buffer: FrameBuffer, target: Resolution) -> Result<FrameBuffer, CycleError> {
    if target.width == 0 || target.height == 0 {
        return Err(CycleError::Conversion(anyhow!(
            "target resolution {} is empty",
            target
        )));
    }
    if buffer.resolution() == target {
        return Ok(buffer);
    }

    let window = crop_window(buffer.resolution(), target);
    let source: ImageBuffer<Rgb<u8>, Vec<u8>> =
        ImageBuffer::from_raw(buffer.width, buffer.height, buffer.rgb().to_vec())
            .ok_or_else(|| CycleError::Conversion(anyhow!("frame buffer has wrong length")))?;
    drop(buffer);
    let cropped =
        imageops::crop_imm(&source, window.x, window.y, window.width, window.height).to_image();
    source.into_raw().zeroize();
    let scaled = imageops::resize(&cropped, target.width, target.height, FilterType::Triangle);
    cropped.into_raw().zeroize();

    let mut out = FrameBuffer::allocate(target.width, target.height)?;
    out.data.copy_from_slice(scaled.as_raw());
    scaled.into_raw().zeroize();
    Ok(out)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
