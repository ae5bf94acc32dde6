#![cfg(feature = "backend-tract")]

use std::path::Path;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::engine::{
    EngineMode, InferenceEngine, ERR_CLASSIFIER, ERR_INPUT_SIZE, ERR_SIGNAL_READ,
};
use crate::detect::result::{EngineOutput, InferenceReport, LabelScore, Timing};
use crate::error::EngineError;
use crate::frame::{unpack_rgb, PixelSource, Resolution};

/// Tract-based engine for ONNX image classifiers.
///
/// Loads a local model file whose single input is `1x3xHxW` f32 in 0..1 and
/// whose first output holds one score per label.
pub struct TractEngine {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>,
    input: Resolution,
    labels: Vec<String>,
}

impl TractEngine {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input: Resolution, labels: Vec<String>) -> Result<Self> {
        if labels.is_empty() {
            return Err(anyhow!("tract engine needs at least one label"));
        }
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, input.height as usize, input.width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            input,
            labels,
        })
    }

    fn build_input(&self, source: &dyn PixelSource) -> Result<Tensor, EngineError> {
        if source.resolution() != self.input {
            return Err(EngineError::new(
                ERR_INPUT_SIZE,
                format!(
                    "frame size {} does not match model input {}",
                    source.resolution(),
                    self.input
                ),
            ));
        }

        let mut samples = vec![0f32; source.total_samples()];
        source
            .read_samples(0, &mut samples)
            .map_err(|err| EngineError::new(ERR_SIGNAL_READ, format!("{:#}", err)))?;

        let width = self.input.width as usize;
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.input.height as usize, width),
            |(_, channel, y, x)| unpack_rgb(samples[y * width + x])[channel] as f32 / 255.0,
        );
        Ok(input.into_tensor())
    }

    fn extract_scores(&self, outputs: TVec<TValue>) -> Result<Vec<LabelScore>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let scores = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        if scores.len() != self.labels.len() {
            return Err(anyhow!(
                "model produced {} scores for {} labels",
                scores.len(),
                self.labels.len()
            ));
        }
        Ok(self
            .labels
            .iter()
            .zip(scores.iter())
            .map(|(label, score)| LabelScore {
                label: label.clone(),
                score: if score.is_finite() { *score } else { 0.0 },
            })
            .collect())
    }
}

impl InferenceEngine for TractEngine {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn mode(&self) -> EngineMode {
        EngineMode::Classification
    }

    fn input_resolution(&self) -> Resolution {
        self.input
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn run(&mut self, source: &dyn PixelSource) -> Result<InferenceReport, EngineError> {
        let dsp_start = Instant::now();
        let input = self.build_input(source)?;
        let dsp_ms = dsp_start.elapsed().as_millis() as u64;

        let classify_start = Instant::now();
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .map_err(|err| EngineError::new(ERR_CLASSIFIER, format!("ONNX inference failed: {}", err)))?;
        let scores = self
            .extract_scores(outputs)
            .map_err(|err| EngineError::new(ERR_CLASSIFIER, format!("{:#}", err)))?;

        Ok(InferenceReport {
            output: EngineOutput::Scores(scores),
            timing: Timing {
                dsp_ms,
                classification_ms: classify_start.elapsed().as_millis() as u64,
                anomaly_ms: 0,
            },
        })
    }
}
