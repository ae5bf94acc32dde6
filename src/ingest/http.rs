//! HTTP camera.
//!
//! Captures from network camera boards that serve either a single JPEG
//! snapshot per request or a multipart MJPEG stream. The mode is picked from
//! the response `Content-Type` at init.

use anyhow::{anyhow, Context, Result};
use std::io::Read;
use std::time::{Duration, Instant};

use url::Url;

use super::{find_jpeg_bounds, Camera, CameraConfig, CameraStats};
use crate::frame::{JpegFrame, Resolution};

const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;
/// A camera with no frame for this long reports unhealthy.
const STALE_AFTER: Duration = Duration::from_secs(5);

pub struct HttpCamera {
    config: CameraConfig,
    stream: Option<HttpStream>,
    last_capture: Option<Instant>,
    opened_at: Option<Instant>,
    frame_count: u64,
    last_error: Option<String>,
}

enum HttpStream {
    Mjpeg(MjpegReader),
    Snapshot,
}

impl HttpCamera {
    pub fn new(config: CameraConfig) -> Result<Self> {
        let url = Url::parse(&config.url).context("parse camera url")?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!(
                "unsupported camera scheme '{}'; expected http(s)",
                url.scheme()
            ));
        }
        Ok(Self {
            config,
            stream: None,
            last_capture: None,
            opened_at: None,
            frame_count: 0,
            last_error: None,
        })
    }

    fn read_frame(&mut self) -> Result<JpegFrame> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| anyhow!("http camera not connected; call init() first"))?;
        let bytes = match stream {
            HttpStream::Mjpeg(reader) => reader.read_next_jpeg()?,
            HttpStream::Snapshot => fetch_snapshot(&self.config.url)?,
        };
        JpegFrame::new(bytes)
    }
}

impl Camera for HttpCamera {
    fn name(&self) -> &'static str {
        "http"
    }

    fn init(&mut self) -> Result<()> {
        let response = ureq::get(&self.config.url)
            .call()
            .context("connect to camera http endpoint")?;
        let multipart = response
            .header("Content-Type")
            .is_some_and(|value| value.to_ascii_lowercase().starts_with("multipart/"));
        self.stream = Some(if multipart {
            HttpStream::Mjpeg(MjpegReader::new(response.into_reader()))
        } else {
            HttpStream::Snapshot
        });
        self.opened_at = Some(Instant::now());
        log::info!("HttpCamera: connected to {}", self.config.url);
        Ok(())
    }

    fn resolution(&self) -> Resolution {
        self.config.resolution
    }

    fn capture(&mut self) -> Result<JpegFrame> {
        match self.read_frame() {
            Ok(frame) => {
                self.frame_count += 1;
                self.last_capture = Some(Instant::now());
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
        self.last_error.is_none()
            && self
                .last_capture
                .or(self.opened_at)
                .is_some_and(|at| at.elapsed() <= STALE_AFTER)
    }

    fn stats(&self) -> CameraStats {
        CameraStats {
            frames_captured: self.frame_count,
            source: self.config.url.clone(),
        }
    }
}

struct MjpegReader {
    reader: Box<dyn Read + Send + Sync>,
    buffer: Vec<u8>,
}

impl MjpegReader {
    fn new(reader: Box<dyn Read + Send + Sync>) -> Self {
        Self {
            reader,
            buffer: Vec::new(),
        }
    }

    /// Next complete JPEG from the multipart body. Boundaries and part
    /// headers are skipped by scanning for SOI/EOI markers.
    fn read_next_jpeg(&mut self) -> Result<Vec<u8>> {
        let mut chunk = [0u8; 8192];
        loop {
            if let Some((start, end)) = find_jpeg_bounds(&self.buffer) {
                let jpeg: Vec<u8> = self.buffer.drain(..end).skip(start).collect();
                return Ok(jpeg);
            }
            let n = self.reader.read(&mut chunk).context("read mjpeg body")?;
            if n == 0 {
                return Err(anyhow!("mjpeg body ended"));
            }
            self.buffer.extend_from_slice(&chunk[..n]);
            if self.buffer.len() > MAX_JPEG_BYTES {
                // Oversized or garbage part: resync on the next marker.
                log::warn!("mjpeg part exceeds {} bytes; resyncing", MAX_JPEG_BYTES);
                self.buffer.clear();
            }
        }
    }
}

fn fetch_snapshot(url: &str) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    ureq::get(url)
        .call()
        .with_context(|| format!("GET {}", url))?
        .into_reader()
        .take(MAX_JPEG_BYTES as u64)
        .read_to_end(&mut body)
        .context("read snapshot body")?;
    match find_jpeg_bounds(&body) {
        Some((start, end)) => Ok(body[start..end].to_vec()),
        None => Err(anyhow!("snapshot from {} is not a complete jpeg", url)),
    }
}
