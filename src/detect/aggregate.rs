//! Reduce raw engine output to one `DetectionResult` per cycle.
//!
//! Selection rules:
//! - Detection mode drops background labels, then keeps the highest confidence.
//! - Classification mode keeps the highest score across the full label set.
//! - Equal maxima keep the first candidate in engine order.
//! - Nothing carries over between cycles.

use crate::detect::engine::InferenceEngine;
use crate::detect::result::{BoundingBox, Detection, DetectionResult, EngineOutput, LabelScore};
use crate::frame::Resolution;

#[derive(Clone, Debug)]
pub struct AggregatorConfig {
    /// Labels that denote "no object" in detection mode (case-insensitive).
    pub background_labels: Vec<String>,
    /// Minimum confidence a candidate needs to qualify.
    pub min_confidence: f32,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            background_labels: vec!["background".to_string()],
            min_confidence: 0.0,
        }
    }
}

pub struct ResultAggregator {
    config: AggregatorConfig,
    input: Resolution,
}

impl ResultAggregator {
    /// `input` is the engine input resolution boxes are clamped to.
    pub fn new(config: AggregatorConfig, input: Resolution) -> Self {
        Self { config, input }
    }

    /// Aggregator for `engine`: boxes clamp to its input resolution, and
    /// background labels outside its label set are reported.
    pub fn for_engine(config: AggregatorConfig, engine: &dyn InferenceEngine) -> Self {
        let aggregator = Self::new(config, engine.input_resolution());
        for label in aggregator.unknown_background_labels(engine.labels()) {
            log::warn!(
                "background label '{}' is not in the label set of engine {}",
                label,
                engine.name()
            );
        }
        aggregator
    }

    /// Configured background labels that match none of `labels`.
    pub fn unknown_background_labels(&self, labels: &[String]) -> Vec<&str> {
        self.config
            .background_labels
            .iter()
            .filter(|bg| !labels.iter().any(|l| l.eq_ignore_ascii_case(bg)))
            .map(String::as_str)
            .collect()
    }

    fn is_background(&self, label: &str) -> bool {
        self.config
            .background_labels
            .iter()
            .any(|bg| bg.eq_ignore_ascii_case(label))
    }

    fn qualifies(&self, confidence: f32) -> bool {
        // NaN fails both comparisons.
        confidence >= self.config.min_confidence && confidence >= 0.0
    }

    pub fn aggregate(&self, output: &EngineOutput, timestamp_ms: u64) -> DetectionResult {
        match output {
            EngineOutput::Detections(detections) => {
                let mut best: Option<&Detection> = None;
                for d in detections
                    .iter()
                    .filter(|d| !self.is_background(&d.label) && self.qualifies(d.confidence))
                {
                    // Strictly greater: ties keep the earlier candidate.
                    if best.map_or(true, |b| d.confidence > b.confidence) {
                        best = Some(d);
                    }
                }
                match best {
                    Some(d) => DetectionResult::detected(
                        &d.label,
                        d.confidence,
                        self.clamp_box(d.x, d.y, d.width, d.height),
                        timestamp_ms,
                    ),
                    None => DetectionResult::empty(timestamp_ms),
                }
            }
            EngineOutput::Scores(scores) => {
                let mut best: Option<&LabelScore> = None;
                for s in scores.iter().filter(|s| self.qualifies(s.score)) {
                    if best.map_or(true, |b| s.score > b.score) {
                        best = Some(s);
                    }
                }
                match best {
                    Some(s) => DetectionResult::detected(
                        &s.label,
                        s.score,
                        BoundingBox::default(),
                        timestamp_ms,
                    ),
                    None => DetectionResult::empty(timestamp_ms),
                }
            }
        }
    }

    fn clamp_box(&self, x: u32, y: u32, width: u32, height: u32) -> BoundingBox {
        let x = x.min(self.input.width);
        let y = y.min(self.input.height);
        BoundingBox {
            x,
            y,
            width: width.min(self.input.width - x),
            height: height.min(self.input.height - y),
        }
    }
}
