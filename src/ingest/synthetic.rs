//! Synthetic camera (`stub://`).
//!
//! Renders a deterministic scene at the configured native resolution and
//! JPEG-encodes it, so the full capture/decode path runs without hardware.

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{Camera, CameraConfig, CameraStats};
use crate::frame::{encode_jpeg, JpegFrame, Resolution, RGB_CHANNELS};

const NOISE_SEED: u64 = 0x5eed_cafe;
const OBJECT_SIZE_DIVISOR: u32 = 4;

pub struct SyntheticCamera {
    config: CameraConfig,
    frame_count: u64,
    initialized: bool,
    rng: StdRng,
}

impl SyntheticCamera {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            frame_count: 0,
            initialized: false,
            rng: StdRng::seed_from_u64(NOISE_SEED),
        }
    }

    /// Background gradient with a bright square sweeping left to right.
    ///
    /// The square is present on even "scenes" (every 50 frames) and absent on
    /// odd ones, which gives detectors something to find and lose.
    fn render(&mut self) -> Vec<u8> {
        let Resolution { width, height } = self.config.resolution;
        let mut pixels = vec![0u8; self.config.resolution.pixel_count() * RGB_CHANNELS];

        let scene = self.frame_count / 50;
        let side = (width.min(height) / OBJECT_SIZE_DIVISOR).max(1);
        let travel = width.saturating_sub(side).max(1) as u64;
        let obj_x = ((self.frame_count * 4) % travel) as u32;
        let obj_y = (height - side) / 2;
        let object_visible = scene % 2 == 0;

        for y in 0..height {
            for x in 0..width {
                let idx = (y as usize * width as usize + x as usize) * RGB_CHANNELS;
                let inside = object_visible
                    && (obj_x..obj_x + side).contains(&x)
                    && (obj_y..obj_y + side).contains(&y);
                let noise: u8 = self.rng.gen_range(0..8);
                if inside {
                    pixels[idx] = 240 - noise;
                    pixels[idx + 1] = 220 - noise;
                    pixels[idx + 2] = 40 + noise;
                } else {
                    pixels[idx] = ((x * 64) / width.max(1)) as u8 + noise;
                    pixels[idx + 1] = ((y * 64) / height.max(1)) as u8 + noise;
                    pixels[idx + 2] = 96 + noise;
                }
            }
        }
        pixels
    }
}

impl Camera for SyntheticCamera {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    /// Synthetic cameras always initialise.
    fn init(&mut self) -> Result<()> {
        log::info!(
            "SyntheticCamera: ready at {} ({})",
            self.config.resolution,
            self.config.url
        );
        self.initialized = true;
        Ok(())
    }

    fn resolution(&self) -> Resolution {
        self.config.resolution
    }

    fn capture(&mut self) -> Result<JpegFrame> {
        self.frame_count += 1;
        let pixels = self.render();
        encode_jpeg(&pixels, self.config.resolution, self.config.jpeg_quality)
    }

    fn is_healthy(&self) -> bool {
        self.initialized
    }

    fn stats(&self) -> CameraStats {
        CameraStats {
            frames_captured: self.frame_count,
            source: self.config.url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::decode;

    fn small_config() -> CameraConfig {
        CameraConfig {
            url: "stub://test".to_string(),
            resolution: Resolution::new(64, 48),
            jpeg_quality: 75,
        }
    }

    #[test]
    fn synthetic_camera_produces_decodable_frames() -> Result<()> {
        let mut camera = SyntheticCamera::new(small_config());
        camera.init()?;
        let frame = camera.capture()?;
        let buffer = decode(&frame).map_err(|e| anyhow::anyhow!("{}", e))?;
        assert_eq!(buffer.resolution(), Resolution::new(64, 48));
        assert_eq!(camera.stats().frames_captured, 1);
        Ok(())
    }

    #[test]
    fn synthetic_camera_is_healthy_after_init() -> Result<()> {
        let mut camera = SyntheticCamera::new(small_config());
        assert!(!camera.is_healthy());
        camera.init()?;
        assert!(camera.is_healthy());
        Ok(())
    }
}
