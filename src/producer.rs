//! NATS message producer for prediction responses

use crate::types::verdict::PredictionResponse;
use anyhow::Result;
use async_nats::{Client, Subject};
use tracing::debug;

/// Producer for publishing prediction responses to NATS
#[derive(Clone)]
pub struct VerdictProducer {
    client: Client,
    subject: String,
}

impl VerdictProducer {
    /// Create a new verdict producer
    pub fn new(client: Client, subject: &str) -> Self {
        Self {
            client,
            subject: subject.to_string(),
        }
    }

    /// Publish a response to every subject [`response_subjects`] routes it to
    pub async fn publish(&self, response: &PredictionResponse, reply: Option<Subject>) -> Result<()> {
        let payload = serde_json::to_vec(response)?;

        for subject in response_subjects(&self.subject, response, reply) {
            self.client.publish(subject, payload.clone().into()).await?;
        }

        match response {
            PredictionResponse::Ok(event) => debug!(
                verdict_id = %event.verdict_id,
                request_id = %event.request_id,
                label = event.label,
                "Published verdict"
            ),
            PredictionResponse::Error(event) => debug!(
                request_id = ?event.request_id,
                error_kind = %event.error_kind,
                "Published failure"
            ),
        }

        Ok(())
    }

    /// Get the subject name
    pub fn subject(&self) -> &str {
        &self.subject
    }
}

/// Verdicts and pipeline failures go to the verdict subject and the reply
/// inbox. Undecodable payloads are answered on the reply inbox only.
pub fn response_subjects(
    verdict_subject: &str,
    response: &PredictionResponse,
    reply: Option<Subject>,
) -> Vec<Subject> {
    let mut subjects = Vec::with_capacity(2);
    let malformed = matches!(response, PredictionResponse::Error(event) if event.is_malformed());
    if !malformed {
        subjects.push(Subject::from(verdict_subject));
    }
    subjects.extend(reply);
    subjects
}
