//! Cooperative cycle scheduler.
//!
//! One turn, in order:
//! 1. service pending control-surface requests (bounded)
//! 2. yield for a fixed interval
//! 3. capture and decode one frame under exclusive camera access
//! 4. resize to the engine input resolution
//! 5. run inference
//! 6. aggregate to one `DetectionResult`
//! 7. publish result and status as one snapshot
//! 8. present the snapshot on the local display
//! 9. release the frame buffer
//!
//! A failing step aborts the cycle: its status is published, the last result
//! stays, and nothing is retried until the next turn. The frame buffer is an
//! owned local, so it is released on every exit path.

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::api::ControlSurface;
use crate::detect::{DetectionResult, InferenceEngine, ResultAggregator, Timing};
use crate::display::DisplayPresenter;
use crate::error::CycleError;
use crate::frame;
use crate::ingest::SharedCamera;
use crate::state::{Snapshot, StateWriter};
use crate::status::SystemStatus;

#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// Pause between servicing requests and capturing.
    pub yield_interval: Duration,
    /// How often camera statistics are logged.
    pub health_log_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            yield_interval: Duration::from_millis(10),
            health_log_interval: Duration::from_secs(5),
        }
    }
}

struct CycleOutput {
    result: DetectionResult,
    timing: Timing,
}

pub struct Scheduler {
    camera: SharedCamera,
    engine: Box<dyn InferenceEngine>,
    aggregator: ResultAggregator,
    writer: StateWriter,
    display: Box<dyn DisplayPresenter>,
    surface: Option<ControlSurface>,
    config: SchedulerConfig,
    boot: Instant,
    last_health_log: Instant,
}

impl Scheduler {
    pub fn new(
        camera: SharedCamera,
        engine: Box<dyn InferenceEngine>,
        aggregator: ResultAggregator,
        writer: StateWriter,
        display: Box<dyn DisplayPresenter>,
        surface: Option<ControlSurface>,
        config: SchedulerConfig,
    ) -> Self {
        let now = Instant::now();
        Self {
            camera,
            engine,
            aggregator,
            writer,
            display,
            surface,
            config,
            boot: now,
            last_health_log: now,
        }
    }

    /// Measure timestamps from `boot` instead of scheduler construction.
    pub fn with_boot(mut self, boot: Instant) -> Self {
        self.boot = boot;
        self
    }

    fn execute_cycle(&mut self) -> Result<CycleOutput, CycleError> {
        let (native, captured_at) = {
            let mut camera = self.camera.acquire().map_err(CycleError::Capture)?;
            let jpeg = camera.capture().map_err(CycleError::Capture)?;
            (frame::decode(&jpeg)?, jpeg.captured_at())
        };
        let timestamp_ms = captured_at.saturating_duration_since(self.boot).as_millis() as u64;

        let buffer = frame::resize(native, self.engine.input_resolution())?;
        let report = self.engine.run(&buffer).map_err(CycleError::Inference)?;
        let result = self.aggregator.aggregate(&report.output, timestamp_ms);
        drop(buffer);

        Ok(CycleOutput {
            result,
            timing: report.timing,
        })
    }

    /// Run steps 3-9 once and publish the outcome.
    ///
    /// Cycle errors are not returned: they are logged and published as status.
    /// `Err` means the shared state itself is unusable.
    pub fn run_cycle(&mut self) -> Result<Arc<Snapshot>> {
        let started = Instant::now();
        let snapshot = match self.execute_cycle() {
            Ok(CycleOutput { result, timing }) => {
                let status = if result.valid {
                    SystemStatus::Detection(result.label.clone())
                } else {
                    SystemStatus::Scanning
                };
                log::debug!(
                    "cycle done in {} ms (dsp {} ms, classify {} ms, anomaly {} ms): {} {:.2}",
                    started.elapsed().as_millis(),
                    timing.dsp_ms,
                    timing.classification_ms,
                    timing.anomaly_ms,
                    status,
                    result.confidence
                );
                self.writer.publish_cycle(result, status)?
            }
            Err(err) => {
                log::warn!("cycle aborted: {}", err);
                self.writer.publish_status(err.status())?
            }
        };
        if let Err(err) = self.display.present(&snapshot) {
            log::warn!("display update failed: {:#}", err);
        }
        Ok(snapshot)
    }

    /// One full turn: requests, yield, cycle.
    pub fn turn(&mut self) -> Result<Arc<Snapshot>> {
        if let Some(surface) = self.surface.as_mut() {
            if let Err(err) = surface.service_pending() {
                log::warn!("control surface accept failed: {:#}", err);
            }
        }
        if !self.config.yield_interval.is_zero() {
            std::thread::sleep(self.config.yield_interval);
        }
        let snapshot = self.run_cycle()?;
        self.log_health(&snapshot);
        Ok(snapshot)
    }

    /// Turn until `shutdown` is raised, then end any live stream.
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<()> {
        while !shutdown.load(Ordering::SeqCst) {
            self.turn()?;
        }
        log::info!("scheduler stopping");
        if let Some(surface) = self.surface.as_mut() {
            surface.streams().stop_all();
        }
        Ok(())
    }

    fn log_health(&mut self, snapshot: &Snapshot) {
        if self.last_health_log.elapsed() < self.config.health_log_interval {
            return;
        }
        self.last_health_log = Instant::now();
        match self.camera.acquire() {
            Ok(camera) => {
                let stats = camera.stats();
                log::info!(
                    "camera {}: healthy={} frames={} cycles={} status={}",
                    stats.source,
                    camera.is_healthy(),
                    stats.frames_captured,
                    snapshot.cycles,
                    snapshot.status
                );
            }
            Err(err) => log::warn!("camera stats unavailable: {:#}", err),
        }
    }
}
