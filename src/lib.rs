//! Vision node
//!
//! A single-board vision device: every cycle it captures a camera frame, runs
//! an on-device classifier or detector, shows the result on a local display,
//! and exposes the result plus a live MJPEG feed over a small HTTP surface.
//!
//! # Architecture
//!
//! The pipeline keeps three guarantees:
//!
//! 1. **One frame owner**: a cycle's `FrameBuffer` is owned by that cycle alone
//!    and released on every exit path before the next cycle starts.
//! 2. **Exclusive camera**: the inference path and a stream session never hold
//!    a captured frame at the same time (`SharedCamera::acquire`).
//! 3. **Whole-snapshot publication**: result and status are published together
//!    as one immutable snapshot; readers never observe a mix of two cycles.
//!
//! # Module Structure
//!
//! - `frame`: compressed frames, pixel buffers, conversion (decode, crop, scale)
//! - `ingest`: camera drivers and the exclusive camera handle
//! - `detect`: inference engine contract, backends, result aggregation
//! - `state`: shared snapshot with one writer and many readers
//! - `scheduler`: the cooperative capture/infer/publish loop
//! - `api`, `stream`: HTTP control surface and MJPEG sessions
//! - `network`, `display`, `config`: startup collaborators

pub mod api;
pub mod config;
pub mod detect;
pub mod display;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod network;
pub mod scheduler;
pub mod state;
pub mod status;
pub mod stream;

pub use api::{ApiConfig, ControlSurface};
pub use config::VisionConfig;
pub use detect::{
    AggregatorConfig, BoundingBox, DetectionResult, EngineMode, EngineRegistry, InferenceEngine,
    ResultAggregator, StubEngine, StubEngineConfig,
};
pub use display::{ConsoleDisplay, DisplayMode, DisplayPresenter};
pub use error::{CycleError, EngineError, InitError};
pub use frame::{FrameBuffer, JpegFrame, PixelSource, Resolution};
pub use ingest::{open_camera, Camera, CameraConfig, SharedCamera};
pub use network::{join_network, HostLink, JoinPolicy, NetworkLink, OfflineLink};
pub use scheduler::{Scheduler, SchedulerConfig};
pub use state::{shared_state, NetworkInfo, Snapshot, StateReader, StateWriter};
pub use status::SystemStatus;
pub use stream::{MjpegSession, StreamHub};
