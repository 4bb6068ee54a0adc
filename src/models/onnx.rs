//! ONNX Runtime backends for the network and the hybrid classifier.
//!
//! Compiled only with the `onnx` feature.

use crate::error::PipelineError;
use crate::models::{check_width, Classification, NetworkModel, StackedClassifier};
use anyhow::{Context, Result};
use ort::memory::Allocator;
use ort::session::{builder::GraphOptimizationLevel, Session, SessionOutputs};
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType, DynValue, Tensor};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

/// Loaded ONNX session with its resolved input/output names
struct OnnxSession {
    name: String,
    // Session::run needs exclusive access
    session: Mutex<Session>,
    input_name: String,
    output_names: Vec<String>,
    input_width: usize,
}

impl OnnxSession {
    fn load(path: &Path, name: &str, input_width: usize, threads: usize) -> Result<Self> {
        info!(model = %name, path = %path.display(), threads = threads, "Loading ONNX model");

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(threads)?
            .commit_from_file(path)
            .context(format!("Failed to load model from {:?}", path))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "float_input".to_string());
        let output_names: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();

        info!(
            model = %name,
            input = %input_name,
            outputs = ?output_names,
            input_width = input_width,
            "Model loaded successfully"
        );

        Ok(Self {
            name: name.to_string(),
            session: Mutex::new(session),
            input_name,
            output_names,
            input_width,
        })
    }

    /// Run on one row and hand the outputs to `extract`.
    fn run<T>(
        &self,
        features: &[f32],
        extract: impl FnOnce(&SessionOutputs) -> Result<T>,
    ) -> Result<T, PipelineError> {
        check_width(&self.name, self.input_width, features)?;

        let shape = vec![1_i64, features.len() as i64];
        let input_tensor = Tensor::from_array((shape, features.to_vec()))
            .map_err(|e| PipelineError::inference(&self.name, e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| PipelineError::inference(&self.name, format!("Lock error: {}", e)))?;
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input_tensor])
            .map_err(|e| PipelineError::inference(&self.name, e.to_string()))?;

        extract(&outputs).map_err(|e| PipelineError::inference(&self.name, e.to_string()))
    }
}

/// Network exported to ONNX with a `[1, n] -> [1, 1]` signature.
pub struct OnnxNetwork {
    inner: OnnxSession,
}

impl OnnxNetwork {
    pub fn load<P: AsRef<Path>>(path: P, name: &str, input_width: usize, threads: usize) -> Result<Self> {
        Ok(Self {
            inner: OnnxSession::load(path.as_ref(), name, input_width, threads)?,
        })
    }
}

impl NetworkModel for OnnxNetwork {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn input_width(&self) -> usize {
        self.inner.input_width
    }

    fn score(&self, features: &[f32]) -> Result<f32, PipelineError> {
        let output_name = self.inner.output_names.first().cloned().unwrap_or_default();
        self.inner.run(features, |outputs| {
            let output = outputs
                .get(output_name.as_str())
                .ok_or_else(|| anyhow::anyhow!("network output '{}' not found", output_name))?;
            let (_, data) = output.try_extract_tensor::<f32>()?;
            data.first()
                .copied()
                .ok_or_else(|| anyhow::anyhow!("network output '{}' is empty", output_name))
        })
        .and_then(|score| finite_score(&self.inner.name, score))
    }
}

/// Reject NaN and infinities before the score is stacked.
fn finite_score(model: &str, score: f32) -> Result<f32, PipelineError> {
    if score.is_finite() {
        Ok(score)
    } else {
        Err(PipelineError::inference(model, format!("produced a non-finite score {}", score)))
    }
}

/// Tree ensemble exported to ONNX (label + probabilities outputs).
pub struct OnnxClassifier {
    inner: OnnxSession,
}

impl OnnxClassifier {
    pub fn load<P: AsRef<Path>>(path: P, name: &str, input_width: usize, threads: usize) -> Result<Self> {
        Ok(Self {
            inner: OnnxSession::load(path.as_ref(), name, input_width, threads)?,
        })
    }
}

impl StackedClassifier for OnnxClassifier {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn input_width(&self) -> usize {
        self.inner.input_width
    }

    fn classify(&self, augmented: &[f32]) -> Result<Classification, PipelineError> {
        let model_name = self.inner.name.clone();
        self.inner.run(augmented, |outputs| {
            let probability = extract_probability(outputs, &model_name);
            let label = extract_label(outputs);

            let label = match (label, probability) {
                (Some(label), _) => label,
                (None, Some(p)) => u8::from(p >= 0.5),
                (None, None) => anyhow::bail!("model produced neither a label nor probabilities"),
            };
            Ok(Classification { label, probability })
        })
    }
}

fn extract_label(outputs: &SessionOutputs) -> Option<u8> {
    for (name, output) in outputs.iter() {
        if !name.contains("label") {
            continue;
        }
        if let Ok((_, data)) = output.try_extract_tensor::<i64>() {
            return data.first().map(|&v| u8::from(v == 1));
        }
    }
    None
}

/// Probability of class 1, handling both `[1, 2]` tensors and the
/// `seq(map(int64, float))` layout some converters emit.
fn extract_probability(outputs: &SessionOutputs, model_name: &str) -> Option<f64> {
    for (name, output) in outputs.iter() {
        if name.contains("label") {
            continue;
        }

        if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
            let dims: Vec<i64> = shape.iter().copied().collect();
            let num_classes = dims.last().copied().unwrap_or(0);
            let prob = match num_classes {
                n if n >= 2 => data.get(1).copied(),
                1 => data.first().copied(),
                _ => data.last().copied(),
            };
            if let Some(p) = prob {
                debug!(model = %model_name, output = %name, prob = p, "Extracted from tensor");
                return Some(p as f64);
            }
        }

        if DynSequenceValueType::can_downcast(&output.dtype()) {
            if let Ok(prob) = extract_from_sequence_map(&output, model_name) {
                return Some(prob);
            }
        }
    }
    None
}

fn extract_from_sequence_map(output: &DynValue, model_name: &str) -> Result<f64> {
    let allocator = Allocator::default();

    let sequence = output
        .downcast_ref::<DynSequenceValueType>()
        .map_err(|e| anyhow::anyhow!("Failed to downcast to sequence: {}", e))?;
    let maps = sequence.try_extract_sequence::<DynMapValueType>(&allocator)?;
    let first = maps
        .first()
        .ok_or_else(|| anyhow::anyhow!("Empty sequence"))?;
    let kv_pairs = first.try_extract_key_values::<i64, f32>()?;

    if let Some((_, prob)) = kv_pairs.iter().find(|(class_id, _)| *class_id == 1) {
        debug!(model = %model_name, prob = *prob, "Extracted from seq(map)");
        return Ok(*prob as f64);
    }
    if let Some((_, prob)) = kv_pairs.iter().find(|(class_id, _)| *class_id == 0) {
        return Ok(1.0 - *prob as f64);
    }
    Err(anyhow::anyhow!("No probability found in map"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_finite_score_is_inference_error() {
        assert_eq!(finite_score("network", 0.42).unwrap(), 0.42);
        for bad in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            let err = finite_score("network", bad).unwrap_err();
            assert_eq!(err.kind(), "inference");
            assert!(err.is_system_anomaly());
        }
    }
}
