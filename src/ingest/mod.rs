//! Camera drivers.
//!
//! This module provides the cameras a node can capture from:
//! - Synthetic scene (`stub://`), always available
//! - Directory of JPEG files (`file://` or a plain path)
//! - HTTP snapshot / MJPEG endpoints (feature: camera-http)
//! - USB/V4L2 devices in MJPG format (feature: camera-v4l2)
//!
//! Every driver produces validated `JpegFrame`s. The camera is one exclusively
//! owned resource: callers go through `SharedCamera::acquire`, so the
//! inference cycle and a stream session never hold a frame at the same time.

pub mod file;
#[cfg(feature = "camera-http")]
pub mod http;
mod jpeg;
pub mod synthetic;
#[cfg(feature = "camera-v4l2")]
pub mod v4l2;

use anyhow::{anyhow, Result};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::frame::{JpegFrame, Resolution};

pub use file::DirectoryCamera;
#[cfg(feature = "camera-http")]
pub use http::HttpCamera;
pub(crate) use jpeg::find_jpeg_bounds;
pub use synthetic::SyntheticCamera;
#[cfg(feature = "camera-v4l2")]
pub use v4l2::V4l2Camera;

/// Configuration for a camera.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    /// Source URL: `stub://name`, `file:///dir`, `/dir`, `http(s)://...`, `/dev/videoN`.
    pub url: String,
    /// Native capture resolution requested from the driver.
    pub resolution: Resolution,
    /// JPEG quality for drivers that encode frames themselves.
    pub jpeg_quality: u8,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            url: "stub://camera".to_string(),
            resolution: Resolution::new(320, 240),
            jpeg_quality: 80,
        }
    }
}

/// Statistics for a camera.
#[derive(Clone, Debug)]
pub struct CameraStats {
    pub frames_captured: u64,
    pub source: String,
}

/// Camera driver contract.
pub trait Camera: Send {
    /// Driver identifier.
    fn name(&self) -> &'static str;

    /// Bring the hardware up. Failure here is fatal for the daemon.
    fn init(&mut self) -> Result<()>;

    /// Native resolution frames are captured at.
    fn resolution(&self) -> Resolution;

    /// Capture one compressed frame.
    fn capture(&mut self) -> Result<JpegFrame>;

    /// Check if the camera is healthy.
    fn is_healthy(&self) -> bool;

    fn stats(&self) -> CameraStats;
}

/// Build the driver for `config.url`.
pub fn open_camera(config: &CameraConfig) -> Result<Box<dyn Camera>> {
    let url = config.url.as_str();
    if url.starts_with("stub://") {
        return Ok(Box::new(SyntheticCamera::new(config.clone())));
    }
    if url.starts_with("http://") || url.starts_with("https://") {
        #[cfg(feature = "camera-http")]
        {
            return Ok(Box::new(HttpCamera::new(config.clone())?));
        }
        #[cfg(not(feature = "camera-http"))]
        {
            return Err(anyhow!("http cameras require the camera-http feature"));
        }
    }
    if url.starts_with("/dev/video") {
        #[cfg(feature = "camera-v4l2")]
        {
            return Ok(Box::new(V4l2Camera::new(config.clone())));
        }
        #[cfg(not(feature = "camera-v4l2"))]
        {
            return Err(anyhow!("v4l2 cameras require the camera-v4l2 feature"));
        }
    }
    if url.contains("://") && !url.starts_with("file://") {
        return Err(anyhow!("unsupported camera url '{}'", url));
    }
    Ok(Box::new(DirectoryCamera::new(config.clone())))
}

/// Exclusively owned camera shared between the cycle and stream sessions.
#[derive(Clone)]
pub struct SharedCamera {
    inner: Arc<Mutex<Box<dyn Camera>>>,
}

impl SharedCamera {
    pub fn new(camera: Box<dyn Camera>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(camera)),
        }
    }

    /// Block until the camera is free and take exclusive ownership of it.
    pub fn acquire(&self) -> Result<CameraGuard<'_>> {
        let guard = self
            .inner
            .lock()
            .map_err(|_| anyhow!("camera lock poisoned"))?;
        Ok(CameraGuard { guard })
    }
}

/// Exclusive hold on the camera. Released on drop.
pub struct CameraGuard<'a> {
    guard: MutexGuard<'a, Box<dyn Camera>>,
}

impl CameraGuard<'_> {
    pub fn capture(&mut self) -> Result<JpegFrame> {
        self.guard.capture()
    }

    pub fn resolution(&self) -> Resolution {
        self.guard.resolution()
    }

    pub fn is_healthy(&self) -> bool {
        self.guard.is_healthy()
    }

    pub fn stats(&self) -> CameraStats {
        self.guard.stats()
    }
}
