//! Coercion of raw field values into the types the fitted transform expects.

use crate::config::FieldBounds;
use crate::error::PipelineError;
use crate::types::record::{FieldValue, RawRecord};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// What a transformer column consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Numeric,
    Categorical,
}

/// A field value after coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum CoercedValue {
    Number(f64),
    Category(String),
}

/// Typed view of a record, keyed by field name.
pub type CoercedRecord = BTreeMap<String, CoercedValue>;

/// Coerces records against a fixed field schema and optional bounds.
#[derive(Debug, Clone, Default)]
pub struct Coercer {
    bounds: HashMap<String, FieldBounds>,
}

impl Coercer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bounds(bounds: &[FieldBounds]) -> Self {
        Self {
            bounds: bounds
                .iter()
                .map(|b| (b.field.clone(), b.clone()))
                .collect(),
        }
    }

    /// Coerce every schema field of `record`. Unknown fields are ignored.
    pub fn coerce(
        &self,
        record: &RawRecord,
        schema: &[(String, FieldKind)],
    ) -> Result<CoercedRecord, PipelineError> {
        let mut coerced = CoercedRecord::new();

        for (field, kind) in schema {
            let raw = record.get(field).ok_or_else(|| PipelineError::MissingField {
                field: field.clone(),
            })?;
            let value = match kind {
                FieldKind::Numeric => {
                    let number = parse_number(field, raw)?;
                    self.check_bounds(field, raw, number)?;
                    CoercedValue::Number(number)
                }
                FieldKind::Categorical => CoercedValue::Category(parse_category(field, raw)?),
            };
            coerced.insert(field.clone(), value);
        }

        let ignored: Vec<&str> = record
            .field_names()
            .filter(|name| !coerced.contains_key(*name))
            .collect();
        if !ignored.is_empty() {
            debug!(fields = ?ignored, "Ignoring fields unknown to the preprocessor");
        }

        Ok(coerced)
    }

    fn check_bounds(&self, field: &str, raw: &FieldValue, value: f64) -> Result<(), PipelineError> {
        match self.bounds.get(field) {
            Some(bounds) if !bounds.contains(value) => Err(PipelineError::coercion(
                field,
                raw.to_string(),
                format!(
                    "outside the accepted range {}..={}",
                    bounds.min.map_or("-inf".to_string(), |v| v.to_string()),
                    bounds.max.map_or("inf".to_string(), |v| v.to_string())
                ),
            )),
            _ => Ok(()),
        }
    }
}

/// Parse a numeric field, accepting thousands separators and stray whitespace.
pub fn parse_number(field: &str, raw: &FieldValue) -> Result<f64, PipelineError> {
    let value = match raw {
        FieldValue::Integer(v) => *v as f64,
        FieldValue::Float(v) => *v,
        FieldValue::Text(text) => {
            let cleaned: String = text
                .chars()
                .filter(|c| *c != ',' && !c.is_whitespace())
                .collect();
            if cleaned.is_empty() {
                return Err(PipelineError::coercion(field, text.clone(), "value is empty"));
            }
            cleaned
                .parse::<f64>()
                .map_err(|_| PipelineError::coercion(field, text.clone(), "not a number"))?
        }
    };

    // f64::from_str accepts "NaN" and "inf"; neither can be scaled
    if !value.is_finite() {
        return Err(PipelineError::coercion(field, raw.to_string(), "not a finite number"));
    }
    Ok(value)
}

/// Categories are matched exactly later on, so only the type is checked here.
pub fn parse_category(field: &str, raw: &FieldValue) -> Result<String, PipelineError> {
    match raw {
        FieldValue::Text(text) => Ok(text.clone()),
        other => Err(PipelineError::coercion(
            field,
            other.to_string(),
            "expected a category name, not a number",
        )),
    }
}
