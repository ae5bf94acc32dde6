use sha2::{Digest, Sha256};
use std::time::Instant;

use crate::detect::engine::{EngineMode, InferenceEngine, ERR_INPUT_SIZE, ERR_SIGNAL_READ};
use crate::detect::result::{Detection, EngineOutput, InferenceReport, LabelScore, Timing};
use crate::error::EngineError;
use crate::frame::{unpack_rgb, PixelSource, Resolution};

/// Samples pulled from the source per read.
const READ_CHUNK: usize = 1024;
/// Per-channel sum above which a pixel counts as "object".
const BRIGHT_THRESHOLD: u32 = 600;

#[derive(Clone, Debug)]
pub struct StubEngineConfig {
    pub mode: EngineMode,
    pub input: Resolution,
    pub labels: Vec<String>,
    pub background_labels: Vec<String>,
}

impl Default for StubEngineConfig {
    fn default() -> Self {
        Self {
            mode: EngineMode::Classification,
            input: Resolution::new(96, 96),
            labels: vec![
                "background".to_string(),
                "plug".to_string(),
                "switch".to_string(),
            ],
            background_labels: vec!["background".to_string()],
        }
    }
}

/// Stub engine for bench runs and tests.
///
/// Output is a pure function of the pixel data: classification scores are
/// derived from a SHA-256 of the samples, detection boxes from the bright
/// region of the frame.
pub struct StubEngine {
    config: StubEngineConfig,
}

impl StubEngine {
    pub fn new(config: StubEngineConfig) -> Self {
        Self { config }
    }

    fn object_labels(&self) -> Vec<&String> {
        self.config
            .labels
            .iter()
            .filter(|l| {
                !self
                    .config
                    .background_labels
                    .iter()
                    .any(|bg| bg.eq_ignore_ascii_case(l))
            })
            .collect()
    }

    fn classify(&self, digest: &[u8; 32]) -> Vec<LabelScore> {
        let raw: Vec<f32> = (0..self.config.labels.len())
            .map(|i| digest[i % digest.len()] as f32 + 1.0)
            .collect();
        let total: f32 = raw.iter().sum();
        self.config
            .labels
            .iter()
            .zip(raw)
            .map(|(label, r)| LabelScore {
                label: label.clone(),
                score: r / total,
            })
            .collect()
    }

    fn detect(&self, digest: &[u8; 32], bright: Option<(u32, u32, u32, u32)>) -> Vec<Detection> {
        let objects = self.object_labels();
        let Some((min_x, min_y, max_x, max_y)) = bright else {
            return Vec::new();
        };
        if objects.is_empty() {
            return Vec::new();
        }
        let label = objects[digest[0] as usize % objects.len()];
        vec![Detection {
            label: label.clone(),
            confidence: 0.5 + (digest[1] as f32 / 255.0) * 0.5,
            x: min_x,
            y: min_y,
            width: max_x - min_x + 1,
            height: max_y - min_y + 1,
        }]
    }
}

impl Default for StubEngine {
    fn default() -> Self {
        Self::new(StubEngineConfig::default())
    }
}

impl InferenceEngine for StubEngine {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn mode(&self) -> EngineMode {
        self.config.mode
    }

    fn input_resolution(&self) -> Resolution {
        self.config.input
    }

    fn labels(&self) -> &[String] {
        &self.config.labels
    }

    fn run(&mut self, source: &dyn PixelSource) -> Result<InferenceReport, EngineError> {
        let input = self.config.input;
        if source.resolution() != input || source.total_samples() != input.pixel_count() {
            return Err(EngineError::new(
                ERR_INPUT_SIZE,
                format!(
                    "input is {} ({} samples), expected {}",
                    source.resolution(),
                    source.total_samples(),
                    input
                ),
            ));
        }

        let dsp_start = Instant::now();
        let mut hasher = Sha256::new();
        let mut bright: Option<(u32, u32, u32, u32)> = None;
        let mut chunk = vec![0f32; READ_CHUNK];
        let total = source.total_samples();
        let mut offset = 0;
        while offset < total {
            let len = READ_CHUNK.min(total - offset);
            source
                .read_samples(offset, &mut chunk[..len])
                .map_err(|err| EngineError::new(ERR_SIGNAL_READ, format!("{:#}", err)))?;
            for (i, sample) in chunk[..len].iter().enumerate() {
                hasher.update((*sample as u32).to_le_bytes());
                let [r, g, b] = unpack_rgb(*sample);
                if r as u32 + g as u32 + b as u32 > BRIGHT_THRESHOLD {
                    let idx = (offset + i) as u32;
                    let (x, y) = (idx % input.width, idx / input.width);
                    bright = Some(match bright {
                        None => (x, y, x, y),
                        Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
                    });
                }
            }
            offset += len;
        }
        let digest: [u8; 32] = hasher.finalize().into();
        let dsp_ms = dsp_start.elapsed().as_millis() as u64;

        let classify_start = Instant::now();
        let output = match self.config.mode {
            EngineMode::ObjectDetection => EngineOutput::Detections(self.detect(&digest, bright)),
            _ => EngineOutput::Scores(self.classify(&digest)),
        };

        Ok(InferenceReport {
            output,
            timing: Timing {
                dsp_ms,
                classification_ms: classify_start.elapsed().as_millis() as u64,
                anomaly_ms: 0,
            },
        })
    }
}
