//! Error taxonomy for a single prediction request.
//!
//! Startup and artifact loading use `anyhow`; everything that can go wrong
//! while turning one record into a verdict is a [`PipelineError`].

use thiserror::Error;

/// Failure of one `predict` invocation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    /// A required field has neither a supplied value nor a configured default.
    #[error("missing required field '{field}' and no default is configured")]
    MissingField { field: String },

    /// A supplied value could not be coerced to the type the transform expects.
    #[error("cannot use value '{raw}' for field '{field}': {reason}")]
    Coercion {
        field: String,
        raw: String,
        reason: String,
    },

    /// The fitted transform rejected the coerced record.
    #[error("preprocessing failed: {reason}")]
    Preprocessing { reason: String },

    /// A vector fed to a model does not match the width it was trained on.
    #[error("{model} expects {expected} input columns but received {actual}")]
    ModelInputShape {
        model: String,
        expected: usize,
        actual: usize,
    },

    /// A model backend failed while running.
    #[error("{model} inference failed: {reason}")]
    Inference { model: String, reason: String },

    /// An operator-configured default or bound does not fit the fitted transform.
    #[error("configured value for field '{field}' is unusable: {reason}")]
    Configuration { field: String, reason: String },
}

impl PipelineError {
    pub fn coercion(field: &str, raw: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Coercion {
            field: field.to_string(),
            raw: raw.into(),
            reason: reason.into(),
        }
    }

    pub fn preprocessing(reason: impl Into<String>) -> Self {
        Self::Preprocessing {
            reason: reason.into(),
        }
    }

    pub fn shape(model: &str, expected: usize, actual: usize) -> Self {
        Self::ModelInputShape {
            model: model.to_string(),
            expected,
            actual,
        }
    }

    pub fn inference(model: &str, reason: impl Into<String>) -> Self {
        Self::Inference {
            model: model.to_string(),
            reason: reason.into(),
        }
    }

    pub fn configuration(field: &str, reason: impl Into<String>) -> Self {
        Self::Configuration {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// Stable label used for metrics and wire events.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::MissingField { .. } => "missing_field",
            PipelineError::Coercion { .. } => "coercion",
            PipelineError::Preprocessing { .. } => "preprocessing",
            PipelineError::ModelInputShape { .. } => "model_input_shape",
            PipelineError::Inference { .. } => "inference",
            PipelineError::Configuration { .. } => "configuration",
        }
    }

    /// True for configuration defects rather than bad user input.
    pub fn is_system_anomaly(&self) -> bool {
        matches!(
            self,
            PipelineError::ModelInputShape { .. }
                | PipelineError::Inference { .. }
                | PipelineError::Configuration { .. }
        )
    }

    /// Single human-readable message for whoever submitted the record.
    pub fn user_message(&self) -> String {
        if self.is_system_anomaly() {
            // Input was fine; the deployment disagrees with itself.
            format!("Prediction is unavailable because of a configuration problem ({self}).")
        } else {
            format!("Please check the employee details: {self}.")
        }
    }
}
