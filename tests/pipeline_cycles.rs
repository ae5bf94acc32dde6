use anyhow::{anyhow, Result};
use serde_json::Value;
use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use vision_node::api::{ApiConfig, ControlSurface};
use vision_node::detect::{
    AggregatorConfig, Detection, EngineMode, EngineOutput, InferenceEngine, InferenceReport,
    LabelScore, ResultAggregator, StubEngine, StubEngineConfig, Timing, ERR_CLASSIFIER,
};
use vision_node::display::DisplayPresenter;
use vision_node::error::EngineError;
use vision_node::frame::{encode_jpeg, JpegFrame, PixelSource, Resolution};
use vision_node::ingest::{Camera, CameraConfig, CameraStats, SharedCamera, SyntheticCamera};
use vision_node::scheduler::{Scheduler, SchedulerConfig};
use vision_node::state::{shared_state, Snapshot, StateReader};
use vision_node::status::SystemStatus;
use vision_node::stream::StreamHub;

const NATIVE: Resolution = Resolution::new(64, 48);
const INPUT: Resolution = Resolution::new(32, 32);

enum Shot {
    Frame,
    Fail,
    Corrupt,
    /// Frame taken, but the driver only returns it after the delay.
    Delayed(Duration),
}

struct ScriptedCamera {
    shots: VecDeque<Shot>,
    frame: Vec<u8>,
    captured: u64,
}

impl ScriptedCamera {
    fn new(shots: Vec<Shot>) -> Self {
        let rgb = vec![90u8; NATIVE.pixel_count() * 3];
        let frame = encode_jpeg(&rgb, NATIVE, 80).unwrap();
        Self {
            shots: shots.into(),
            frame: frame.as_bytes().to_vec(),
            captured: 0,
        }
    }
}

impl Camera for ScriptedCamera {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    fn resolution(&self) -> Resolution {
        NATIVE
    }

    fn capture(&mut self) -> Result<JpegFrame> {
        match self.shots.pop_front().unwrap_or(Shot::Frame) {
            Shot::Frame => {
                self.captured += 1;
                JpegFrame::new(self.frame.clone())
            }
            Shot::Fail => Err(anyhow!("sensor timeout")),
            Shot::Corrupt => JpegFrame::new(vec![0xFF, 0xD8, 0x00, 0x01, 0xFF, 0xD9]),
            Shot::Delayed(delay) => {
                self.captured += 1;
                let frame = JpegFrame::new(self.frame.clone());
                std::thread::sleep(delay);
                frame
            }
        }
    }

    fn is_healthy(&self) -> bool {
        true
    }

    fn stats(&self) -> CameraStats {
        CameraStats {
            frames_captured: self.captured,
            source: "scripted".to_string(),
        }
    }
}

type Outcome = std::result::Result<EngineOutput, EngineError>;

struct ScriptedEngine {
    mode: EngineMode,
    outcomes: VecDeque<Outcome>,
    labels: Vec<String>,
    seen: Arc<Mutex<Vec<Resolution>>>,
}

impl ScriptedEngine {
    fn new(mode: EngineMode, outcomes: Vec<Outcome>) -> (Self, Arc<Mutex<Vec<Resolution>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                mode,
                outcomes: outcomes.into(),
                labels: vec!["background".into(), "plug".into(), "switch".into()],
                seen: seen.clone(),
            },
            seen,
        )
    }
}

impl InferenceEngine for ScriptedEngine {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn mode(&self) -> EngineMode {
        self.mode
    }

    fn input_resolution(&self) -> Resolution {
        INPUT
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn run(&mut self, source: &dyn PixelSource) -> std::result::Result<InferenceReport, EngineError> {
        self.seen.lock().unwrap().push(source.resolution());
        let mut probe = [0f32; 4];
        source
            .read_samples(0, &mut probe)
            .map_err(|err| EngineError::new(-1, format!("{:#}", err)))?;
        let output = self
            .outcomes
            .pop_front()
            .unwrap_or(Ok(EngineOutput::Scores(Vec::new())))?;
        Ok(InferenceReport {
            output,
            timing: Timing::default(),
        })
    }
}

#[derive(Clone, Default)]
struct RecordingDisplay {
    frames: Arc<Mutex<Vec<Snapshot>>>,
}

impl DisplayPresenter for RecordingDisplay {
    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    fn present(&mut self, snapshot: &Snapshot) -> Result<()> {
        self.frames.lock().unwrap().push(snapshot.clone());
        Ok(())
    }
}

struct Rig {
    scheduler: Scheduler,
    reader: StateReader,
    camera: SharedCamera,
    display: RecordingDisplay,
}

fn rig(camera: Box<dyn Camera>, engine: Box<dyn InferenceEngine>) -> Rig {
    let (writer, reader) = shared_state();
    let camera = SharedCamera::new(camera);
    let display = RecordingDisplay::default();
    let aggregator = ResultAggregator::for_engine(AggregatorConfig::default(), engine.as_ref());
    let scheduler = Scheduler::new(
        camera.clone(),
        engine,
        aggregator,
        writer,
        Box::new(display.clone()),
        None,
        quick_turns(),
    );
    Rig {
        scheduler,
        reader,
        camera,
        display,
    }
}

fn quick_turns() -> SchedulerConfig {
    SchedulerConfig {
        yield_interval: Duration::ZERO,
        ..SchedulerConfig::default()
    }
}

fn scores(pairs: &[(&str, f32)]) -> Outcome {
    Ok(EngineOutput::Scores(
        pairs
            .iter()
            .map(|(label, score)| LabelScore {
                label: label.to_string(),
                score: *score,
            })
            .collect(),
    ))
}

#[test]
fn classification_cycle_publishes_detection() -> Result<()> {
    let (engine, seen) = ScriptedEngine::new(
        EngineMode::Classification,
        vec![scores(&[("background", 0.05), ("plug", 0.91), ("switch", 0.04)])],
    );
    let mut rig = rig(
        Box::new(ScriptedCamera::new(vec![Shot::Frame])),
        Box::new(engine),
    );

    let snapshot = rig.scheduler.turn()?;
    assert!(snapshot.result.valid);
    assert_eq!(snapshot.result.label, "plug");
    assert!((snapshot.result.confidence - 0.91).abs() < 1e-6);
    assert_eq!(snapshot.status, SystemStatus::Detection("plug".into()));
    assert_eq!(snapshot.cycles, 1);
    assert_eq!(rig.reader.snapshot()?.as_ref(), snapshot.as_ref());

    // The engine saw its own input resolution, not the camera's.
    assert_eq!(seen.lock().unwrap().as_slice(), &[INPUT]);
    Ok(())
}

#[test]
fn detection_cycle_drops_background_and_keeps_box() -> Result<()> {
    let (engine, _) = ScriptedEngine::new(
        EngineMode::ObjectDetection,
        vec![Ok(EngineOutput::Detections(vec![
            Detection {
                label: "background".into(),
                confidence: 0.99,
                x: 0,
                y: 0,
                width: 32,
                height: 32,
            },
            Detection {
                label: "switch".into(),
                confidence: 0.62,
                x: 3,
                y: 5,
                width: 10,
                height: 12,
            },
        ]))],
    );
    let mut rig = rig(Box::new(ScriptedCamera::new(vec![])), Box::new(engine));

    let snapshot = rig.scheduler.run_cycle()?;
    assert_eq!(snapshot.result.label, "switch");
    assert_eq!(
        (
            snapshot.result.bbox.x,
            snapshot.result.bbox.y,
            snapshot.result.bbox.width,
            snapshot.result.bbox.height
        ),
        (3, 5, 10, 12)
    );
    Ok(())
}

#[test]
fn empty_output_publishes_scanning_without_carry_over() -> Result<()> {
    let (engine, _) = ScriptedEngine::new(
        EngineMode::Classification,
        vec![
            scores(&[("plug", 0.8)]),
            Ok(EngineOutput::Detections(Vec::new())),
        ],
    );
    let mut rig = rig(Box::new(ScriptedCamera::new(vec![])), Box::new(engine));

    rig.scheduler.run_cycle()?;
    let second = rig.scheduler.run_cycle()?;
    assert!(!second.result.valid);
    assert_eq!(second.result.label, "");
    assert_eq!(second.result.confidence, 0.0);
    assert_eq!(second.result.bbox.width, 0);
    assert_eq!(second.status, SystemStatus::Scanning);
    assert_eq!(second.cycles, 2);
    Ok(())
}

#[test]
fn capture_failure_aborts_cycle_and_keeps_last_result() -> Result<()> {
    let (engine, seen) = ScriptedEngine::new(
        EngineMode::Classification,
        vec![scores(&[("switch", 0.7)])],
    );
    let mut rig = rig(
        Box::new(ScriptedCamera::new(vec![Shot::Frame, Shot::Fail])),
        Box::new(engine),
    );

    rig.scheduler.run_cycle()?;
    let aborted = rig.scheduler.run_cycle()?;
    assert_eq!(aborted.status, SystemStatus::CaptureError);
    assert_eq!(aborted.result.label, "switch");
    assert_eq!(aborted.cycles, 1);
    assert_eq!(seen.lock().unwrap().len(), 1, "engine must not run on a failed capture");

    // The camera is free again.
    drop(rig.camera.acquire()?);
    Ok(())
}

#[test]
fn undecodable_frame_is_a_capture_error() -> Result<()> {
    let (engine, seen) = ScriptedEngine::new(EngineMode::Classification, vec![]);
    let mut rig = rig(
        Box::new(ScriptedCamera::new(vec![Shot::Corrupt])),
        Box::new(engine),
    );

    let snapshot = rig.scheduler.run_cycle()?;
    assert_eq!(snapshot.status, SystemStatus::CaptureError);
    assert!(seen.lock().unwrap().is_empty());
    Ok(())
}

#[test]
fn engine_failure_publishes_inference_error() -> Result<()> {
    let (engine, _) = ScriptedEngine::new(
        EngineMode::Classification,
        vec![
            scores(&[("plug", 0.6)]),
            Err(EngineError::new(ERR_CLASSIFIER, "classifier failed")),
            scores(&[("switch", 0.9)]),
        ],
    );
    let mut rig = rig(Box::new(ScriptedCamera::new(vec![])), Box::new(engine));

    rig.scheduler.run_cycle()?;
    let failed = rig.scheduler.run_cycle()?;
    assert_eq!(failed.status, SystemStatus::InferenceError);
    assert_eq!(failed.result.label, "plug");

    // The next cycle recovers without any retry state.
    let recovered = rig.scheduler.run_cycle()?;
    assert_eq!(recovered.status, SystemStatus::Detection("switch".into()));
    assert_eq!(recovered.cycles, 2);
    Ok(())
}

#[test]
fn display_sees_every_published_snapshot() -> Result<()> {
    let (engine, _) = ScriptedEngine::new(
        EngineMode::Classification,
        vec![scores(&[("plug", 0.5)])],
    );
    let mut rig = rig(
        Box::new(ScriptedCamera::new(vec![Shot::Frame, Shot::Fail])),
        Box::new(engine),
    );

    rig.scheduler.turn()?;
    rig.scheduler.turn()?;
    let frames = rig.display.frames.lock().unwrap();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].status, SystemStatus::Detection("plug".into()));
    assert_eq!(frames[1].status, SystemStatus::CaptureError);
    Ok(())
}

#[test]
fn timestamps_are_monotonic() -> Result<()> {
    let (engine, _) = ScriptedEngine::new(EngineMode::Classification, vec![]);
    let mut rig = rig(Box::new(ScriptedCamera::new(vec![])), Box::new(engine));

    let first = rig.scheduler.run_cycle()?;
    std::thread::sleep(Duration::from_millis(3));
    let second = rig.scheduler.run_cycle()?;
    assert!(second.result.timestamp_ms >= first.result.timestamp_ms + 3);
    Ok(())
}

#[test]
fn timestamp_is_taken_at_capture() -> Result<()> {
    let (engine, _) = ScriptedEngine::new(EngineMode::Classification, vec![]);
    let mut rig = rig(
        Box::new(ScriptedCamera::new(vec![Shot::Delayed(Duration::from_millis(80))])),
        Box::new(engine),
    );
    let boot = Instant::now();
    rig.scheduler = rig.scheduler.with_boot(boot);

    let snapshot = rig.scheduler.run_cycle()?;
    assert!(boot.elapsed() >= Duration::from_millis(80));
    assert!(
        snapshot.result.timestamp_ms < 60,
        "stamped at {} ms",
        snapshot.result.timestamp_ms
    );
    Ok(())
}

#[test]
fn turn_answers_queued_requests_before_its_cycle() -> Result<()> {
    let (writer, reader) = shared_state();
    let camera = SharedCamera::new(Box::new(ScriptedCamera::new(vec![Shot::Frame])));
    let (engine, _) = ScriptedEngine::new(
        EngineMode::Classification,
        vec![scores(&[("background", 0.1), ("plug", 0.8)])],
    );
    let surface = ControlSurface::bind(
        ApiConfig {
            addr: "127.0.0.1:0".to_string(),
            ..ApiConfig::default()
        },
        reader.clone(),
        StreamHub::new(camera.clone(), Duration::from_secs(1), Duration::ZERO),
    )?;
    let addr = surface.local_addr()?;
    let aggregator = ResultAggregator::for_engine(AggregatorConfig::default(), &engine);
    let mut scheduler = Scheduler::new(
        camera,
        Box::new(engine),
        aggregator,
        writer,
        Box::new(RecordingDisplay::default()),
        Some(surface),
        quick_turns(),
    );

    let mut client = TcpStream::connect(addr)?;
    client.set_read_timeout(Some(Duration::from_secs(5)))?;
    client.write_all(b"GET /api/detection HTTP/1.1\r\nHost: localhost\r\n\r\n")?;

    let snapshot = scheduler.turn()?;
    assert!(snapshot.result.valid);
    assert_eq!(snapshot.result.label, "plug");

    // Answered from the state published before this turn's cycle ran.
    let mut response = String::new();
    client.read_to_string(&mut response)?;
    assert!(response.starts_with("HTTP/1.1 200 OK"));
    let body = response
        .split("\r\n\r\n")
        .nth(1)
        .ok_or_else(|| anyhow!("response without body"))?;
    let before: Value = serde_json::from_str(body)?;
    assert_eq!(before["valid"], false);
    assert_eq!(before["device_name"], "");

    let after = serde_json::to_value(reader.snapshot()?.detection_view())?;
    assert_eq!(after["valid"], true);
    assert_eq!(after["device_name"], "plug");
    Ok(())
}

#[test]
fn stub_engine_runs_end_to_end_on_synthetic_camera() -> Result<()> {
    let mut camera = SyntheticCamera::new(CameraConfig {
        resolution: Resolution::new(160, 120),
        ..CameraConfig::default()
    });
    camera.init()?;
    let engine = StubEngine::new(StubEngineConfig {
        mode: EngineMode::ObjectDetection,
        ..StubEngineConfig::default()
    });
    let mut rig = rig(Box::new(camera), Box::new(engine));

    for _ in 0..5 {
        let snapshot = rig.scheduler.turn()?;
        match &snapshot.status {
            SystemStatus::Detection(label) => {
                assert!(snapshot.result.valid);
                assert_eq!(&snapshot.result.label, label);
                assert_ne!(label, "background");
                assert!(snapshot.result.bbox.x + snapshot.result.bbox.width <= 96);
                assert!(snapshot.result.bbox.y + snapshot.result.bbox.height <= 96);
            }
            SystemStatus::Scanning => assert!(!snapshot.result.valid),
            other => panic!("unexpected status {}", other),
        }
    }
    assert_eq!(rig.reader.snapshot()?.cycles, 5);
    Ok(())
}
