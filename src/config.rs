use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::ApiConfig;
use crate::detect::{AggregatorConfig, EngineMode, StubEngineConfig};
use crate::display::DisplayMode;
use crate::frame::Resolution;
use crate::ingest::CameraConfig;
use crate::network::{JoinPolicy, DEFAULT_JOIN_ATTEMPTS};
use crate::scheduler::SchedulerConfig;

const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_MAX_REQUESTS_PER_TURN: usize = 4;
const DEFAULT_READ_TIMEOUT_MS: u64 = 2000;
const DEFAULT_STREAM_WRITE_TIMEOUT_MS: u64 = 5000;
const DEFAULT_CAMERA_URL: &str = "stub://camera";
const DEFAULT_CAMERA_WIDTH: u32 = 320;
const DEFAULT_CAMERA_HEIGHT: u32 = 240;
const DEFAULT_JPEG_QUALITY: u8 = 80;
const DEFAULT_ENGINE: &str = "stub";
const DEFAULT_INPUT_SIDE: u32 = 96;
const DEFAULT_YIELD_MS: u64 = 10;
const DEFAULT_JOIN_INTERVAL_MS: u64 = 1000;
const DEFAULT_PROBE_ADDR: &str = "8.8.8.8:80";

#[derive(Debug, Deserialize, Default)]
struct VisionConfigFile {
    http: Option<HttpConfigFile>,
    camera: Option<CameraConfigFile>,
    engine: Option<EngineConfigFile>,
    scheduler: Option<SchedulerConfigFile>,
    network: Option<NetworkConfigFile>,
    display: Option<DisplayConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct HttpConfigFile {
    addr: Option<String>,
    max_requests_per_turn: Option<usize>,
    read_timeout_ms: Option<u64>,
    stream_write_timeout_ms: Option<u64>,
    stream_frame_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    url: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    jpeg_quality: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
struct EngineConfigFile {
    name: Option<String>,
    mode: Option<String>,
    input_width: Option<u32>,
    input_height: Option<u32>,
    labels: Option<Vec<String>>,
    background_labels: Option<Vec<String>>,
    min_confidence: Option<f32>,
    model_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct SchedulerConfigFile {
    yield_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct NetworkConfigFile {
    join_attempts: Option<u32>,
    join_interval_ms: Option<u64>,
    offline: Option<bool>,
    probe_addr: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct DisplayConfigFile {
    mode: Option<String>,
}

#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub http: HttpSettings,
    pub camera: CameraConfig,
    pub engine: EngineSettings,
    pub scheduler: SchedulerConfig,
    pub network: NetworkSettings,
    pub display: DisplayMode,
}

#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub addr: String,
    pub max_requests_per_turn: usize,
    pub read_timeout: Duration,
    pub stream_write_timeout: Duration,
    pub stream_frame_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub name: String,
    pub mode: EngineMode,
    pub input: Resolution,
    pub labels: Vec<String>,
    pub background_labels: Vec<String>,
    pub min_confidence: f32,
    pub model_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct NetworkSettings {
    pub join_attempts: u32,
    pub join_interval: Duration,
    pub offline: bool,
    pub probe_addr: String,
}

impl VisionConfig {
    /// Defaults, then the file named by `VISION_CONFIG`, then env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("VISION_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Like `load`, with an explicit file path (e.g. from `--config`).
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: VisionConfigFile) -> Result<Self> {
        let http = file.http.unwrap_or_default();
        let camera = file.camera.unwrap_or_default();
        let engine = file.engine.unwrap_or_default();
        let scheduler = file.scheduler.unwrap_or_default();
        let network = file.network.unwrap_or_default();
        let display = file.display.unwrap_or_default();

        let mode = match engine.mode.as_deref() {
            Some(mode) => parse_engine_mode(mode)?,
            None => EngineMode::Classification,
        };
        let stub_defaults = StubEngineConfig::default();
        Ok(Self {
            http: HttpSettings {
                addr: http.addr.unwrap_or_else(|| DEFAULT_HTTP_ADDR.to_string()),
                max_requests_per_turn: http
                    .max_requests_per_turn
                    .unwrap_or(DEFAULT_MAX_REQUESTS_PER_TURN),
                read_timeout: Duration::from_millis(
                    http.read_timeout_ms.unwrap_or(DEFAULT_READ_TIMEOUT_MS),
                ),
                stream_write_timeout: Duration::from_millis(
                    http.stream_write_timeout_ms
                        .unwrap_or(DEFAULT_STREAM_WRITE_TIMEOUT_MS),
                ),
                stream_frame_interval: Duration::from_millis(
                    http.stream_frame_interval_ms.unwrap_or(0),
                ),
            },
            camera: CameraConfig {
                url: camera
                    .url
                    .unwrap_or_else(|| DEFAULT_CAMERA_URL.to_string()),
                resolution: Resolution::new(
                    camera.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
                    camera.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
                ),
                jpeg_quality: camera.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
            },
            engine: EngineSettings {
                name: engine.name.unwrap_or_else(|| DEFAULT_ENGINE.to_string()),
                mode,
                input: Resolution::new(
                    engine.input_width.unwrap_or(DEFAULT_INPUT_SIDE),
                    engine.input_height.unwrap_or(DEFAULT_INPUT_SIDE),
                ),
                labels: engine.labels.unwrap_or(stub_defaults.labels),
                background_labels: engine
                    .background_labels
                    .unwrap_or(stub_defaults.background_labels),
                min_confidence: engine.min_confidence.unwrap_or(0.0),
                model_path: engine.model_path,
            },
            scheduler: SchedulerConfig {
                yield_interval: Duration::from_millis(
                    scheduler.yield_ms.unwrap_or(DEFAULT_YIELD_MS),
                ),
                ..SchedulerConfig::default()
            },
            network: NetworkSettings {
                join_attempts: network.join_attempts.unwrap_or(DEFAULT_JOIN_ATTEMPTS),
                join_interval: Duration::from_millis(
                    network.join_interval_ms.unwrap_or(DEFAULT_JOIN_INTERVAL_MS),
                ),
                offline: network.offline.unwrap_or(false),
                probe_addr: network
                    .probe_addr
                    .unwrap_or_else(|| DEFAULT_PROBE_ADDR.to_string()),
            },
            display: DisplayMode::from_flag(display.mode.as_deref()),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(addr) = std::env::var("VISION_HTTP_ADDR") {
            if !addr.trim().is_empty() {
                self.http.addr = addr;
            }
        }
        if let Ok(url) = std::env::var("VISION_CAMERA_URL") {
            if !url.trim().is_empty() {
                self.camera.url = url;
            }
        }
        if let Ok(engine) = std::env::var("VISION_ENGINE") {
            if !engine.trim().is_empty() {
                self.engine.name = engine.trim().to_string();
            }
        }
        if let Ok(path) = std::env::var("VISION_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.engine.model_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(labels) = std::env::var("VISION_LABELS") {
            let parsed = split_csv(&labels);
            if !parsed.is_empty() {
                self.engine.labels = parsed;
            }
        }
        if let Ok(offline) = std::env::var("VISION_OFFLINE") {
            self.network.offline = parse_flag(&offline)
                .ok_or_else(|| anyhow!("VISION_OFFLINE must be 1/0 or true/false"))?;
        }
        if let Ok(attempts) = std::env::var("VISION_JOIN_ATTEMPTS") {
            self.network.join_attempts = attempts
                .trim()
                .parse()
                .map_err(|_| anyhow!("VISION_JOIN_ATTEMPTS must be a positive integer"))?;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        let camera = self.camera.resolution;
        if camera.width == 0 || camera.height == 0 {
            return Err(anyhow!("camera resolution must be non-zero, got {}", camera));
        }
        let input = self.engine.input;
        if input.width == 0 || input.height == 0 {
            return Err(anyhow!("engine input resolution must be non-zero, got {}", input));
        }
        if self.engine.labels.is_empty() {
            return Err(anyhow!("engine label set must not be empty"));
        }
        if !(0.0..=1.0).contains(&self.engine.min_confidence) {
            return Err(anyhow!(
                "min_confidence must be within 0.0..=1.0, got {}",
                self.engine.min_confidence
            ));
        }
        if self.network.join_attempts == 0 {
            return Err(anyhow!("join_attempts must be greater than zero"));
        }
        if self.http.max_requests_per_turn == 0 {
            return Err(anyhow!("max_requests_per_turn must be greater than zero"));
        }
        if !(1..=100).contains(&self.camera.jpeg_quality) {
            return Err(anyhow!("jpeg_quality must be within 1..=100"));
        }
        self.engine.name = self.engine.name.to_lowercase();
        Ok(())
    }

    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            addr: self.http.addr.clone(),
            max_requests_per_turn: self.http.max_requests_per_turn,
            read_timeout: self.http.read_timeout,
        }
    }

    pub fn join_policy(&self) -> JoinPolicy {
        JoinPolicy {
            attempts: self.network.join_attempts,
            interval: self.network.join_interval,
        }
    }

    pub fn aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig {
            background_labels: self.engine.background_labels.clone(),
            min_confidence: self.engine.min_confidence,
        }
    }

    pub fn stub_engine_config(&self) -> StubEngineConfig {
        StubEngineConfig {
            mode: self.engine.mode,
            input: self.engine.input,
            labels: self.engine.labels.clone(),
            background_labels: self.engine.background_labels.clone(),
        }
    }
}

fn read_config_file(path: &Path) -> Result<VisionConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn parse_engine_mode(value: &str) -> Result<EngineMode> {
    match value.trim().to_lowercase().as_str() {
        "classification" => Ok(EngineMode::Classification),
        "object_detection" | "detection" => Ok(EngineMode::ObjectDetection),
        other => Err(anyhow!("unknown engine mode '{}'", other)),
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" | "" => Some(false),
        _ => None,
    }
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
