//! Error taxonomy for the capture/inference pipeline.
//!
//! Per-cycle errors abandon the current cycle only; the scheduler surfaces them
//! through `SystemStatus` and moves on to the next cycle without retrying.
//! Initialisation errors are fatal and stop the daemon before the loop starts.

use std::fmt;

use crate::status::SystemStatus;

/// Non-success return from an inference engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineError {
    pub code: i32,
    pub message: String,
}

impl EngineError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "engine returned {}: {}", self.code, self.message)
    }
}

impl std::error::Error for EngineError {}

/// Transient error that aborts a single cycle.
#[derive(Debug)]
pub enum CycleError {
    Capture(anyhow::Error),
    Conversion(anyhow::Error),
    Memory { requested_bytes: usize },
    Inference(EngineError),
}

impl CycleError {
    /// Status published when a cycle aborts with this error.
    pub fn status(&self) -> SystemStatus {
        match self {
            CycleError::Capture(_) | CycleError::Conversion(_) => SystemStatus::CaptureError,
            CycleError::Memory { .. } => SystemStatus::MemoryError,
            CycleError::Inference(_) => SystemStatus::InferenceError,
        }
    }
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleError::Capture(err) => write!(f, "capture failed: {:#}", err),
            CycleError::Conversion(err) => write!(f, "frame conversion failed: {:#}", err),
            CycleError::Memory { requested_bytes } => {
                write!(f, "frame buffer allocation of {} bytes failed", requested_bytes)
            }
            CycleError::Inference(err) => write!(f, "inference failed: {}", err),
        }
    }
}

impl std::error::Error for CycleError {}

/// Hardware initialisation failure. Fatal.
#[derive(Debug)]
pub enum InitError {
    Camera(anyhow::Error),
    Display(anyhow::Error),
}

impl InitError {
    pub fn status(&self) -> SystemStatus {
        SystemStatus::CameraInitFailed
    }
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitError::Camera(err) => write!(f, "camera init failed: {:#}", err),
            InitError::Display(err) => write!(f, "display init failed: {:#}", err),
        }
    }
}

impl std::error::Error for InitError {}
