//! Verdicts and the response events published for each request

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Binary attrition outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Attrition {
    Stay,
    Leave,
}

impl Attrition {
    /// Map a classifier label (0 = stays, 1 = leaves).
    pub fn from_label(label: u8) -> Option<Self> {
        match label {
            0 => Some(Attrition::Stay),
            1 => Some(Attrition::Leave),
            _ => None,
        }
    }

    pub fn label(self) -> u8 {
        match self {
            Attrition::Stay => 0,
            Attrition::Leave => 1,
        }
    }
}

/// Final leave/stay decision with the optional "leaves" probability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub outcome: Attrition,
    pub probability: Option<f64>,
}

impl Verdict {
    pub fn new(outcome: Attrition, probability: Option<f64>) -> Self {
        Self {
            outcome,
            probability,
        }
    }

    pub fn label(&self) -> u8 {
        self.outcome.label()
    }

    pub fn is_leave(&self) -> bool {
        self.outcome == Attrition::Leave
    }

    /// Human-readable verdict shown to the user.
    pub fn message(&self) -> String {
        let base = match self.outcome {
            Attrition::Leave => "This employee is likely to leave the company.",
            Attrition::Stay => "This employee is likely to stay.",
        };
        match self.probability {
            Some(p) => format!("{} (probability of leaving: {:.1}%)", base, p * 100.0),
            None => base.to_string(),
        }
    }
}

/// Event published for a successful prediction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerdictEvent {
    pub verdict_id: String,
    pub request_id: String,
    pub outcome: Attrition,
    pub label: u8,
    pub probability: Option<f64>,
    /// Neural network output that was stacked into the hybrid model input
    pub network_score: f32,
    /// Fields filled from the default table
    pub defaulted_fields: Vec<String>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl VerdictEvent {
    pub fn new(
        request_id: String,
        verdict: &Verdict,
        network_score: f32,
        defaulted_fields: Vec<String>,
    ) -> Self {
        Self {
            verdict_id: uuid::Uuid::new_v4().to_string(),
            request_id,
            outcome: verdict.outcome,
            label: verdict.label(),
            probability: verdict.probability,
            network_score,
            defaulted_fields,
            message: verdict.message(),
            timestamp: Utc::now(),
        }
    }
}

/// Failure kind for payloads that could not be decoded into a request.
pub const MALFORMED_REQUEST: &str = "malformed_request";

/// Event published when a request could not be turned into a verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureEvent {
    pub request_id: Option<String>,
    pub error_kind: String,
    pub message: String,
    pub system_anomaly: bool,
    pub timestamp: DateTime<Utc>,
}

impl FailureEvent {
    pub fn from_error(request_id: Option<String>, error: &PipelineError) -> Self {
        Self {
            request_id,
            error_kind: error.kind().to_string(),
            message: error.user_message(),
            system_anomaly: error.is_system_anomaly(),
            timestamp: Utc::now(),
        }
    }

    /// Payload that never reached the pipeline.
    pub fn malformed(message: String) -> Self {
        Self {
            request_id: None,
            error_kind: MALFORMED_REQUEST.to_string(),
            message,
            system_anomaly: false,
            timestamp: Utc::now(),
        }
    }

    pub fn is_malformed(&self) -> bool {
        self.error_kind == MALFORMED_REQUEST
    }
}

/// Wire response for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PredictionResponse {
    Ok(VerdictEvent),
    Error(FailureEvent),
}
