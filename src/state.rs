//! Shared state between the scheduler and the control surface.
//!
//! The state is one immutable `Snapshot` behind an `Arc`. Publishing builds a
//! complete new snapshot and swaps the pointer under a short write lock, so a
//! reader always sees every field from the same publish.
//!
//! Access is split by role:
//! - `StateWriter`: the single writer. Not `Clone`; owned by the scheduler.
//! - `StateReader`: any number of readers. `Clone`; handed to HTTP handlers.

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, RwLock};

use crate::detect::DetectionResult;
use crate::status::SystemStatus;

/// Outcome of the network join, fixed after startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkInfo {
    pub connected: bool,
    pub ip: IpAddr,
}

impl NetworkInfo {
    pub fn offline() -> Self {
        Self {
            connected: false,
            ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        }
    }
}

impl Default for NetworkInfo {
    fn default() -> Self {
        Self::offline()
    }
}

/// Everything the control surface can observe, as one value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    pub result: DetectionResult,
    pub status: SystemStatus,
    pub network: NetworkInfo,
    /// Cycles completed so far.
    pub cycles: u64,
}

/// JSON body of `GET /api/status`.
#[derive(Serialize)]
pub struct StatusView<'a> {
    pub status: &'a SystemStatus,
    pub wifi_connected: bool,
    pub ip_address: String,
}

/// JSON body of `GET /api/detection`.
#[derive(Serialize)]
pub struct DetectionView<'a> {
    pub valid: bool,
    pub device_name: &'a str,
    pub confidence: f32,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub timestamp: u64,
}

impl Snapshot {
    pub fn status_view(&self) -> StatusView<'_> {
        StatusView {
            status: &self.status,
            wifi_connected: self.network.connected,
            ip_address: self.network.ip.to_string(),
        }
    }

    pub fn detection_view(&self) -> DetectionView<'_> {
        let r = &self.result;
        DetectionView {
            valid: r.valid,
            device_name: &r.label,
            confidence: r.confidence,
            x: r.bbox.x,
            y: r.bbox.y,
            width: r.bbox.width,
            height: r.bbox.height,
            timestamp: r.timestamp_ms,
        }
    }
}

/// Create the state pair. There is exactly one writer.
pub fn shared_state() -> (StateWriter, StateReader) {
    let inner = Arc::new(RwLock::new(Arc::new(Snapshot::default())));
    (
        StateWriter {
            inner: inner.clone(),
        },
        StateReader { inner },
    )
}

/// Single writer handle.
pub struct StateWriter {
    inner: Arc<RwLock<Arc<Snapshot>>>,
}

impl StateWriter {
    fn replace(&self, build: impl FnOnce(&Snapshot) -> Snapshot) -> Result<Arc<Snapshot>> {
        let current = self.current()?;
        let next = Arc::new(build(&current));
        let mut guard = self
            .inner
            .write()
            .map_err(|_| anyhow!("shared state lock poisoned"))?;
        *guard = next.clone();
        Ok(next)
    }

    /// Current snapshot as last published.
    pub fn current(&self) -> Result<Arc<Snapshot>> {
        let guard = self
            .inner
            .read()
            .map_err(|_| anyhow!("shared state lock poisoned"))?;
        Ok(guard.clone())
    }

    /// Publish a completed cycle: result and status replace the old pair together.
    pub fn publish_cycle(
        &self,
        result: DetectionResult,
        status: SystemStatus,
    ) -> Result<Arc<Snapshot>> {
        self.replace(|prev| Snapshot {
            result,
            status,
            network: prev.network.clone(),
            cycles: prev.cycles + 1,
        })
    }

    /// Publish a status-only event (startup step, aborted cycle, fatal error).
    /// The last published result stays in place.
    pub fn publish_status(&self, status: SystemStatus) -> Result<Arc<Snapshot>> {
        self.replace(|prev| Snapshot {
            status,
            ..prev.clone()
        })
    }

    pub fn set_network(&self, network: NetworkInfo) -> Result<Arc<Snapshot>> {
        self.replace(|prev| Snapshot {
            network,
            ..prev.clone()
        })
    }
}

/// Read-only handle; clone freely.
#[derive(Clone)]
pub struct StateReader {
    inner: Arc<RwLock<Arc<Snapshot>>>,
}

impl StateReader {
    pub fn snapshot(&self) -> Result<Arc<Snapshot>> {
        let guard = self
            .inner
            .read()
            .map_err(|_| anyhow!("shared state lock poisoned"))?;
        Ok(guard.clone())
    }
}
