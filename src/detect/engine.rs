use crate::detect::result::InferenceReport;
use crate::error::EngineError;
use crate::frame::{PixelSource, Resolution};

/// Engine operating modes.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineMode {
    /// Fixed-length per-label score vector.
    Classification,
    /// List of labelled boxes.
    ObjectDetection,
}

/// Inference engine contract.
///
/// # Audit Boundary
///
/// The engine is opaque. The pipeline relies only on this contract:
/// - Pixels are pulled through the `PixelSource`, never handed over by value
/// - Output is deterministic for identical pixel data and resolution
/// - Any non-success return is an `EngineError`; the cycle is abandoned and
///   nothing is retried until the next scheduled cycle
/// - There is no cancellation of an in-flight `run`
pub trait InferenceEngine: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    fn mode(&self) -> EngineMode;

    /// Resolution the engine requires its input at.
    fn input_resolution(&self) -> Resolution;

    /// Full label set, in engine order.
    fn labels(&self) -> &[String];

    /// Run inference over `source`.
    fn run(&mut self, source: &dyn PixelSource) -> Result<InferenceReport, EngineError>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Return code for a pixel source that could not be read.
pub const ERR_SIGNAL_READ: i32 = -1;
/// Return code for a pixel source with the wrong size.
pub const ERR_INPUT_SIZE: i32 = -2;
/// Return code for a failed classifier run.
pub const ERR_CLASSIFIER: i32 = -5;
