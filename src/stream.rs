//! MJPEG live feed.
//!
//! A `/stream` client gets a `multipart/x-mixed-replace` response whose parts
//! are raw camera JPEGs, pulled straight from the camera with no inference in
//! between. Each session runs on its own thread so the cycle and the control
//! surface keep making progress while a client watches. Only one session is
//! live at a time: a new request cancels the previous one.

use anyhow::{anyhow, Result};
use std::io::Write;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::ingest::SharedCamera;

pub const MJPEG_BOUNDARY: &str = "frame";

/// Response head for a stream session.
pub fn write_stream_header<W: Write>(w: &mut W) -> std::io::Result<()> {
    write!(
        w,
        "HTTP/1.1 200 OK\r\nContent-Type: multipart/x-mixed-replace; boundary={}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        MJPEG_BOUNDARY
    )?;
    w.flush()
}

/// One multipart part. `Content-Length` is exactly `jpeg.len()`.
pub fn write_part<W: Write>(w: &mut W, jpeg: &[u8]) -> std::io::Result<()> {
    write!(
        w,
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        MJPEG_BOUNDARY,
        jpeg.len()
    )?;
    w.write_all(jpeg)?;
    w.write_all(b"\r\n")?;
    w.flush()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamEnd {
    ClientGone,
    CaptureFailed,
    Cancelled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamSummary {
    pub parts_sent: u64,
    pub end: StreamEnd,
}

/// Capture/write loop for one client.
pub struct MjpegSession {
    frame_interval: Duration,
}

impl MjpegSession {
    pub fn new(frame_interval: Duration) -> Self {
        Self { frame_interval }
    }

    /// Stream parts to `writer` until the client goes away, a capture fails,
    /// or `cancel` is raised. The camera is held only for the capture itself.
    pub fn run<W: Write>(
        &self,
        writer: &mut W,
        camera: &SharedCamera,
        cancel: &AtomicBool,
    ) -> StreamSummary {
        let mut parts_sent = 0u64;
        let end = loop {
            if cancel.load(Ordering::SeqCst) {
                break StreamEnd::Cancelled;
            }
            let captured = camera.acquire().and_then(|mut guard| guard.capture());
            let frame = match captured {
                Ok(frame) => frame,
                Err(err) => {
                    log::warn!("stream capture failed: {:#}", err);
                    break StreamEnd::CaptureFailed;
                }
            };
            if let Err(err) = write_part(writer, frame.as_bytes()) {
                log::debug!("stream client write failed: {}", err);
                break StreamEnd::ClientGone;
            }
            parts_sent += 1;
            if !self.frame_interval.is_zero() {
                std::thread::sleep(self.frame_interval);
            }
        };
        StreamSummary { parts_sent, end }
    }
}

struct ActiveStream {
    cancel: Arc<AtomicBool>,
    join: JoinHandle<StreamSummary>,
}

/// Owns the single live stream session.
pub struct StreamHub {
    camera: SharedCamera,
    active: Option<ActiveStream>,
    write_timeout: Duration,
    frame_interval: Duration,
}

impl StreamHub {
    pub fn new(camera: SharedCamera, write_timeout: Duration, frame_interval: Duration) -> Self {
        Self {
            camera,
            active: None,
            write_timeout,
            frame_interval,
        }
    }

    /// Take over `stream` as the new live session, ending any previous one.
    pub fn start(&mut self, mut stream: TcpStream) -> Result<()> {
        self.stop_all();
        stream.set_nonblocking(false)?;
        stream.set_write_timeout(Some(self.write_timeout))?;
        write_stream_header(&mut stream)?;

        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let cancel = Arc::new(AtomicBool::new(false));
        let cancel_thread = cancel.clone();
        let camera = self.camera.clone();
        let session = MjpegSession::new(self.frame_interval);
        log::info!("stream session started for {}", peer);
        let join = std::thread::Builder::new()
            .name("mjpeg-stream".to_string())
            .spawn(move || {
                let summary = session.run(&mut stream, &camera, &cancel_thread);
                log::info!(
                    "stream session for {} ended ({:?}) after {} frames",
                    peer,
                    summary.end,
                    summary.parts_sent
                );
                summary
            })
            .map_err(|err| anyhow!("failed to spawn stream thread: {}", err))?;
        self.active = Some(ActiveStream { cancel, join });
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| !active.join.is_finished())
    }

    /// Cancel and join the live session, if any.
    pub fn stop_all(&mut self) -> Option<StreamSummary> {
        let active = self.active.take()?;
        active.cancel.store(true, Ordering::SeqCst);
        match active.join.join() {
            Ok(summary) => Some(summary),
            Err(_) => {
                log::error!("stream thread panicked");
                None
            }
        }
    }
}

impl Drop for StreamHub {
    fn drop(&mut self) {
        self.stop_all();
    }
}
