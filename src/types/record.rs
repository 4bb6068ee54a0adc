//! Raw employee records as they arrive from a form or a message bus.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single untyped field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Integer(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Integer(v as i64)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

/// Named employee attributes for one prediction.
///
/// `null` values in JSON are treated as absent so that default substitution
/// can fill them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, Option<FieldValue>>",
    into = "BTreeMap<String, FieldValue>"
)]
pub struct RawRecord {
    fields: BTreeMap<String, FieldValue>,
}

impl From<RawRecord> for BTreeMap<String, FieldValue> {
    fn from(record: RawRecord) -> Self {
        record.fields
    }
}

impl From<BTreeMap<String, Option<FieldValue>>> for RawRecord {
    fn from(map: BTreeMap<String, Option<FieldValue>>) -> Self {
        Self {
            fields: map
                .into_iter()
                .filter_map(|(name, value)| value.map(|v| (name, v)))
                .collect(),
        }
    }
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<FieldValue>) {
        self.fields.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.fields.remove(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}

/// Envelope for a record submitted over NATS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRequest {
    #[serde(default = "new_request_id")]
    pub request_id: String,
    pub record: RawRecord,
}

fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl PredictionRequest {
    pub fn new(record: RawRecord) -> Self {
        Self {
            request_id: new_request_id(),
            record,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untagged_values() {
        let record: RawRecord = serde_json::from_str(
            r#"{"Age": 30, "MonthlyIncome": "5,000", "DistanceFromHome": 2.5, "JobRole": "Sales"}"#,
        )
        .unwrap();

        assert_eq!(record.get("Age"), Some(&FieldValue::Integer(30)));
        assert_eq!(record.get("DistanceFromHome"), Some(&FieldValue::Float(2.5)));
        assert_eq!(
            record.get("MonthlyIncome"),
            Some(&FieldValue::Text("5,000".to_string()))
        );
        assert_eq!(record.len(), 4);
    }

    #[test]
    fn test_null_is_absent() {
        let record: RawRecord =
            serde_json::from_str(r#"{"Age": null, "JobRole": "HR"}"#).unwrap();

        assert!(!record.contains("Age"));
        assert!(record.contains("JobRole"));
    }

    #[test]
    fn test_request_id_generated_when_missing() {
        let request: PredictionRequest =
            serde_json::from_str(r#"{"record": {"Age": 41}}"#).unwrap();

        assert!(uuid::Uuid::parse_str(&request.request_id).is_ok());
        assert_eq!(request.record.get("Age"), Some(&FieldValue::Integer(41)));
    }
}
