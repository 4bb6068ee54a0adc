//! Declarative default table for fields the caller left out.

use crate::config::DefaultEntry;
use crate::error::PipelineError;
use crate::types::record::{FieldValue, RawRecord};
use std::collections::BTreeMap;
use tracing::debug;

/// Field name -> value used when a record omits that field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DefaultTable {
    entries: BTreeMap<String, FieldValue>,
}

/// A record after default substitution.
#[derive(Debug, Clone, PartialEq)]
pub struct FilledRecord {
    pub record: RawRecord,
    /// Fields whose value came from the table, in expected-field order
    pub defaulted: Vec<String>,
}

impl DefaultTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from config entries. Later entries win over earlier ones.
    pub fn from_entries(entries: &[DefaultEntry]) -> Self {
        Self {
            entries: entries
                .iter()
                .map(|e| (e.field.clone(), e.value.clone()))
                .collect(),
        }
    }

    pub fn with(mut self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.entries.insert(field.to_string(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.entries.get(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(field, value)| (field.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ensure every expected field is present, backfilling from the table.
    pub fn fill<'a, I>(&self, record: &RawRecord, expected: I) -> Result<FilledRecord, PipelineError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut filled = record.clone();
        let mut defaulted = Vec::new();

        for field in expected {
            if filled.contains(field) {
                continue;
            }
            match self.entries.get(field) {
                Some(value) => {
                    filled.insert(field, value.clone());
                    defaulted.push(field.to_string());
                }
                None => {
                    return Err(PipelineError::MissingField {
                        field: field.to_string(),
                    })
                }
            }
        }

        if !defaulted.is_empty() {
            debug!(fields = ?defaulted, "Filled missing fields from default table");
        }

        Ok(FilledRecord {
            record: filled,
            defaulted,
        })
    }
}
