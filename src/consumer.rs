//! NATS message consumer for incoming prediction requests

use crate::types::record::PredictionRequest;
use anyhow::Result;
use async_nats::{Client, Message, Subscriber};
use tracing::info;

/// Consumer for receiving prediction requests from NATS
pub struct RequestConsumer {
    client: Client,
    subject: String,
}

impl RequestConsumer {
    /// Create a new request consumer
    pub fn new(client: Client, subject: &str) -> Self {
        Self {
            client,
            subject: subject.to_string(),
        }
    }

    /// Subscribe to the request subject
    pub async fn subscribe(&self) -> Result<Subscriber> {
        let subscriber = self.client.subscribe(self.subject.clone()).await?;
        info!(subject = %self.subject, "Subscribed to request subject");
        Ok(subscriber)
    }

    /// Get the subject name
    pub fn subject(&self) -> &str {
        &self.subject
    }
}

/// Decode a request payload.
pub fn decode_request(message: &Message) -> Result<PredictionRequest, serde_json::Error> {
    parse_request(&message.payload)
}

pub fn parse_request(payload: &[u8]) -> Result<PredictionRequest, serde_json::Error> {
    serde_json::from_slice(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::record::FieldValue;

    // Subscription itself needs a running NATS server

    #[test]
    fn test_parse_request() {
        let request = parse_request(
            br#"{"request_id": "req-9", "record": {"Age": 29, "OverTime": "Yes", "MonthlyIncome": null}}"#,
        )
        .unwrap();

        assert_eq!(request.request_id, "req-9");
        assert_eq!(request.record.get("Age"), Some(&FieldValue::Integer(29)));
        assert!(!request.record.contains("MonthlyIncome"));
    }

    #[test]
    fn test_parse_request_rejects_garbage() {
        assert!(parse_request(b"not json").is_err());
        assert!(parse_request(br#"{"request_id": "x"}"#).is_err());
    }
}
