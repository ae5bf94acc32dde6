//! V4L2 camera.
//!
//! Captures compressed MJPG frames from a local device node (e.g. /dev/video0).
//! Devices that cannot produce MJPG at the requested size fail `init`.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;
use std::time::{Duration, Instant};

use super::{find_jpeg_bounds, Camera, CameraConfig, CameraStats};
use crate::frame::{JpegFrame, Resolution};

pub struct V4l2Camera {
    config: CameraConfig,
    state: Option<DeviceState>,
    frame_count: u64,
    last_frame_at: Option<Instant>,
    last_error: Option<String>,
    active: Resolution,
}

#[self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[not_covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Camera {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            active: config.resolution,
            config,
            state: None,
            frame_count: 0,
            last_frame_at: None,
            last_error: None,
        }
    }
}

impl Camera for V4l2Camera {
    fn name(&self) -> &'static str {
        "v4l2"
    }

    fn init(&mut self) -> Result<()> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&self.config.url)
            .with_context(|| format!("open v4l2 device {}", self.config.url))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = self.config.resolution.width;
        format.height = self.config.resolution.height;
        format.fourcc = v4l::FourCC::new(b"MJPG");

        let format = device.set_format(&format).context("set v4l2 format")?;
        if format.fourcc != v4l::FourCC::new(b"MJPG") {
            return Err(anyhow!(
                "v4l2 device {} does not support MJPG capture",
                self.config.url
            ));
        }
        self.active = Resolution::new(format.width, format.height);
        self.last_error = None;

        let state = DeviceStateTryBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 2)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;
        self.state = Some(state);

        log::info!(
            "V4l2Camera: connected to {} ({})",
            self.config.url,
            self.active
        );
        Ok(())
    }

    fn resolution(&self) -> Resolution {
        self.active
    }

    fn capture(&mut self) -> Result<JpegFrame> {
        use v4l::io::traits::CaptureStream;

        let state = self.state.as_mut().context("v4l2 device not connected")?;
        let bytes = state.with_stream_mut(|stream| {
            stream
                .next()
                .map(|(buf, meta)| {
                    let used = (meta.bytesused as usize).min(buf.len());
                    buf[..used].to_vec()
                })
                .map_err(|err| anyhow::Error::new(err).context("capture v4l2 frame"))
        });
        let frame = bytes.and_then(|bytes| {
            let (start, end) =
                find_jpeg_bounds(&bytes).ok_or_else(|| anyhow!("v4l2 buffer holds no jpeg"))?;
            JpegFrame::new(bytes[start..end].to_vec())
        });

        match frame {
            Ok(frame) => {
                self.frame_count += 1;
                self.last_frame_at = Some(Instant::now());
                self.last_error = None;
                Ok(frame)
            }
            Err(err) => {
                self.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    fn is_healthy(&self) -> bool {
        if self.last_error.is_some() || self.state.is_none() {
            return false;
        }
        let Some(last_frame_at) = self.last_frame_at else {
            return true;
        };
        last_frame_at.elapsed() <= Duration::from_secs(2)
    }

    fn stats(&self) -> CameraStats {
        CameraStats {
            frames_captured: self.frame_count,
            source: self.config.url.clone(),
        }
    }
}
