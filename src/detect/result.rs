use serde::Serialize;

/// Axis-aligned box in engine-input pixel units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Canonical output of one cycle.
///
/// Invariant: when `valid` is false, `confidence` is 0 and `bbox` is all zeros.
/// `confidence` is always within 0.0..=1.0.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionResult {
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
    /// Milliseconds since boot at capture time.
    pub timestamp_ms: u64,
    pub valid: bool,
}

impl DetectionResult {
    /// Result for a cycle with no qualifying candidate.
    pub fn empty(timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms,
            ..Self::default()
        }
    }

    pub fn detected(label: &str, confidence: f32, bbox: BoundingBox, timestamp_ms: u64) -> Self {
        Self {
            label: label.to_string(),
            confidence: confidence.clamp(0.0, 1.0),
            bbox,
            timestamp_ms,
            valid: true,
        }
    }
}

/// One raw detection as reported by an engine in object-detection mode.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Per-label score reported by an engine in classification mode.
#[derive(Clone, Debug, PartialEq)]
pub struct LabelScore {
    pub label: String,
    pub score: f32,
}

/// Raw engine output, before aggregation.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineOutput {
    Detections(Vec<Detection>),
    Scores(Vec<LabelScore>),
}

/// Engine stage durations in milliseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Timing {
    pub dsp_ms: u64,
    pub classification_ms: u64,
    pub anomaly_ms: u64,
}

/// Engine output plus timing metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct InferenceReport {
    pub output: EngineOutput,
    pub timing: Timing,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_result_is_zero_filled() {
        let result = DetectionResult::empty(42);
        assert!(!result.valid);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.bbox, BoundingBox::default());
        assert_eq!(result.timestamp_ms, 42);
    }

    #[test]
    fn detected_clamps_confidence() {
        let result = DetectionResult::detected("plug", 1.5, BoundingBox::default(), 1);
        assert_eq!(result.confidence, 1.0);
        assert!(result.valid);
    }
}
