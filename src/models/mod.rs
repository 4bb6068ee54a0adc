//! ML model inference components
//!
//! The pipeline only talks to the two models through [`NetworkModel`] and
//! [`StackedClassifier`]; the concrete backends are chosen by the loader.

pub mod ensemble;
pub mod loader;
pub mod network;
#[cfg(feature = "onnx")]
pub mod onnx;

pub use ensemble::TreeEnsemble;
pub use loader::{LoadedModels, ModelLoader};
pub use network::DenseNetwork;

use crate::error::PipelineError;

/// Output of the hybrid classifier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    /// 0 = stays, 1 = leaves
    pub label: u8,
    /// Probability of the "leaves" class, when the backend reports one
    pub probability: Option<f64>,
}

/// Feed-forward network producing one scalar per feature vector.
pub trait NetworkModel: Send + Sync {
    fn name(&self) -> &str;

    /// Width of the feature vector the network was trained on.
    fn input_width(&self) -> usize;

    fn score(&self, features: &[f32]) -> Result<f32, PipelineError>;
}

/// Tree-ensemble classifier stacked on the network output.
pub trait StackedClassifier: Send + Sync {
    fn name(&self) -> &str;

    /// Width of the augmented vector (features + network score).
    fn input_width(&self) -> usize;

    fn classify(&self, augmented: &[f32]) -> Result<Classification, PipelineError>;
}

/// Shared shape guard for backends.
pub(crate) fn check_width(model: &str, expected: usize, input: &[f32]) -> Result<(), PipelineError> {
    if input.len() != expected {
        return Err(PipelineError::shape(model, expected, input.len()));
    }
    Ok(())
}
