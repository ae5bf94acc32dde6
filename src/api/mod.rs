//! HTTP control surface.
//!
//! Read-only routes over the shared state, serviced inside the scheduler's own
//! turn. Nothing here blocks on a client: the listener and every accepted
//! socket are nonblocking, a request that has not fully arrived is carried
//! over to the next turn, and a connection that stays incomplete past
//! `read_timeout` is dropped. Each turn answers at most
//! `max_requests_per_turn` requests. `/stream` is the exception; its socket is
//! handed to the `StreamHub`.

mod html;

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::{Duration, Instant};

use crate::state::StateReader;
use crate::stream::StreamHub;

pub use html::INDEX_HTML;

const MAX_REQUEST_BYTES: usize = 8192;
/// Accepted connections still waiting for their request.
const MAX_PENDING: usize = 16;

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
    pub max_requests_per_turn: usize,
    /// How long an accepted connection may take to deliver its request.
    /// Also the write timeout for the response.
    pub read_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".to_string(),
            max_requests_per_turn: 4,
            read_timeout: Duration::from_secs(2),
        }
    }
}

pub struct ControlSurface {
    listener: TcpListener,
    cfg: ApiConfig,
    state: StateReader,
    streams: StreamHub,
    pending: Vec<PendingRequest>,
}

/// Accepted connection whose request is still arriving.
struct PendingRequest {
    stream: TcpStream,
    data: Vec<u8>,
    accepted: Instant,
}

impl PendingRequest {
    /// Read what has arrived without blocking. `Ok(true)` once the header
    /// block is complete.
    fn poll(&mut self) -> Result<bool> {
        let mut buf = [0u8; 1024];
        loop {
            match self.stream.read(&mut buf) {
                Ok(0) if self.data.is_empty() => {
                    return Err(anyhow!("connection closed before request"))
                }
                Ok(0) => return Ok(true),
                Ok(n) => {
                    self.data.extend_from_slice(&buf[..n]);
                    if self.data.len() > MAX_REQUEST_BYTES {
                        return Err(anyhow!("request too large"));
                    }
                    if self.data.windows(4).any(|w| w == b"\r\n\r\n") {
                        return Ok(true);
                    }
                }
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => return Ok(false),
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }
}

impl ControlSurface {
    pub fn bind(cfg: ApiConfig, state: StateReader, streams: StreamHub) -> Result<Self> {
        if cfg.max_requests_per_turn == 0 {
            return Err(anyhow!("max_requests_per_turn must be at least 1"));
        }
        let addr: SocketAddr = cfg.addr.parse()?;
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        log::info!("control surface listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            cfg,
            state,
            streams,
            pending: Vec::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept queued connections and answer those whose request has arrived,
    /// without waiting on any client. Returns how many requests were handled.
    pub fn service_pending(&mut self) -> Result<usize> {
        self.accept_queued()?;

        let mut handled = 0;
        let mut waiting = Vec::with_capacity(self.pending.len());
        for mut conn in std::mem::take(&mut self.pending) {
            if handled >= self.cfg.max_requests_per_turn {
                waiting.push(conn);
                continue;
            }
            match conn.poll() {
                Ok(true) => {
                    handled += 1;
                    if let Err(err) = self.handle_connection(conn) {
                        log::warn!("control surface request rejected: {:#}", err);
                    }
                }
                Ok(false) if conn.accepted.elapsed() < self.cfg.read_timeout => waiting.push(conn),
                Ok(false) => log::debug!(
                    "dropping connection idle for {} ms",
                    conn.accepted.elapsed().as_millis()
                ),
                Err(err) => {
                    handled += 1;
                    log::warn!("control surface request rejected: {:#}", err);
                }
            }
        }
        self.pending = waiting;
        Ok(handled)
    }

    /// Connections accepted but not yet answered.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn accept_queued(&mut self) -> Result<()> {
        while self.pending.len() < MAX_PENDING {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    if let Err(err) = stream.set_nonblocking(true) {
                        log::warn!("dropping connection from {}: {}", peer, err);
                        continue;
                    }
                    self.pending.push(PendingRequest {
                        stream,
                        data: Vec::new(),
                        accepted: Instant::now(),
                    });
                }
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    pub fn streams(&mut self) -> &mut StreamHub {
        &mut self.streams
    }

    fn handle_connection(&mut self, conn: PendingRequest) -> Result<()> {
        let PendingRequest { mut stream, data, .. } = conn;
        stream.set_nonblocking(false)?;
        stream.set_write_timeout(Some(self.cfg.read_timeout))?;
        let request = parse_request(&data)?;
        if request.method != "GET" {
            write_json_response(&mut stream, 405, r#"{"error":"method_not_allowed"}"#)?;
            return Ok(());
        }
        log::debug!(
            "GET {} ({})",
            request.path,
            request.header("user-agent").unwrap_or("-")
        );
        match request.path.as_str() {
            "/" => write_response(
                &mut stream,
                200,
                "text/html; charset=utf-8",
                INDEX_HTML.as_bytes(),
            ),
            "/api/status" => {
                let snapshot = self.state.snapshot()?;
                write_json(&mut stream, &snapshot.status_view())
            }
            "/api/detection" => {
                let snapshot = self.state.snapshot()?;
                write_json(&mut stream, &snapshot.detection_view())
            }
            "/stream" => self.streams.start(stream),
            _ => write_json_response(&mut stream, 404, r#"{"error":"not_found"}"#),
        }
    }
}

fn parse_request(data: &[u8]) -> Result<HttpRequest> {
    let text = String::from_utf8_lossy(data);
    let mut lines = text.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }
    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
        headers,
    })
}

fn write_json<T: Serialize>(stream: &mut TcpStream, body: &T) -> Result<()> {
    let payload = serde_json::to_vec(body)?;
    write_response(stream, 200, "application/json", &payload)
}

fn write_json_response(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    write_response(stream, status, "application/json", body.as_bytes())
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\nAccess-Control-Allow-Origin: *\r\nConnection: close\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    stream.flush()?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    headers: HashMap<String, String>,
}

impl HttpRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}
