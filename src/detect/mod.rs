mod aggregate;
mod backends;
mod engine;
mod registry;
mod result;

pub use aggregate::{AggregatorConfig, ResultAggregator};
pub use backends::{StubEngine, StubEngineConfig};
#[cfg(feature = "backend-tract")]
pub use backends::TractEngine;
pub use engine::{EngineMode, InferenceEngine, ERR_CLASSIFIER, ERR_INPUT_SIZE, ERR_SIGNAL_READ};
pub use registry::EngineRegistry;
pub use result::{
    BoundingBox, Detection, DetectionResult, EngineOutput, InferenceReport, LabelScore, Timing,
};
