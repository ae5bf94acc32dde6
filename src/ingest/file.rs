//! Directory camera.
//!
//! Replays `*.jpg` / `*.jpeg` files from a local directory in sorted order,
//! wrapping around at the end. Useful for bench testing a model against
//! recorded frames.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

use super::{find_jpeg_bounds, Camera, CameraConfig, CameraStats};
use crate::frame::{JpegFrame, Resolution};

pub struct DirectoryCamera {
    config: CameraConfig,
    dir: PathBuf,
    files: Vec<PathBuf>,
    next_index: usize,
    frame_count: u64,
    last_error: Option<String>,
}

impl DirectoryCamera {
    pub fn new(config: CameraConfig) -> Self {
        let dir = PathBuf::from(config.url.strip_prefix("file://").unwrap_or(&config.url));
        Self {
            config,
            dir,
            files: Vec::new(),
            next_index: 0,
            frame_count: 0,
            last_error: None,
        }
    }
}

impl Camera for DirectoryCamera {
    fn name(&self) -> &'static str {
        "directory"
    }

    fn init(&mut self) -> Result<()> {
        self.files = list_jpegs(&self.dir)?;
        if self.files.is_empty() {
            return Err(anyhow!("no jpeg files in {}", self.dir.display()));
        }
        log::info!(
            "DirectoryCamera: {} frames from {}",
            self.files.len(),
            self.dir.display()
        );
        Ok(())
    }

    fn resolution(&self) -> Resolution {
        self.config.resolution
    }

    fn capture(&mut self) -> Result<JpegFrame> {
        if self.files.is_empty() {
            return Err(anyhow!("directory camera not initialised; call init() first"));
        }
        let path = &self.files[self.next_index];
        self.next_index = (self.next_index + 1) % self.files.len();

        let result = std::fs::read(path)
            .with_context(|| format!("read frame {}", path.display()))
            .and_then(|bytes| {
                let (start, end) = find_jpeg_bounds(&bytes)
                    .ok_or_else(|| anyhow!("{} is not a complete jpeg", path.display()))?;
                JpegFrame::new(bytes[start..end].to_vec())
            });
        match result {
            Ok(frame) => {
                self.frame_count += 1;
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
        !self.files.is_empty() && self.last_error.is_none()
    }

    fn stats(&self) -> CameraStats {
        CameraStats {
            frames_captured: self.frame_count,
            source: self.dir.display().to_string(),
        }
    }
}

fn list_jpegs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in
        std::fs::read_dir(dir).with_context(|| format!("read frame directory {}", dir.display()))?
    {
        let path = entry?.path();
        let is_jpeg = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"))
            .unwrap_or(false);
        if is_jpeg && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
