//! Fitted column transform that turns a coerced record into model input.
//!
//! The artifact mirrors a column transformer fitted at training time: a list
//! of transformers, each owning a set of columns. Output columns are emitted
//! transformer by transformer, and within a transformer in column order, so
//! the vector layout matches the one the models were trained on.

use crate::coercion::{CoercedRecord, CoercedValue, FieldKind};
use crate::error::PipelineError;
use crate::types::vector::FeatureVector;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

/// Serialized form of the fitted transform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessorArtifact {
    pub transformers: Vec<TransformerSpec>,
}

/// One fitted transformer and the columns it owns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformerSpec {
    /// `(x - mean) / scale` per column
    StandardScaler {
        name: String,
        columns: Vec<String>,
        mean: Vec<f64>,
        scale: Vec<f64>,
    },
    /// One indicator column per known category
    OneHot {
        name: String,
        columns: Vec<String>,
        categories: Vec<Vec<String>>,
    },
    /// Category index as a single column
    Ordinal {
        name: String,
        columns: Vec<String>,
        categories: Vec<Vec<String>>,
    },
    /// Numeric value copied through unchanged
    Passthrough { name: String, columns: Vec<String> },
}

impl TransformerSpec {
    fn name(&self) -> &str {
        match self {
            TransformerSpec::StandardScaler { name, .. }
            | TransformerSpec::OneHot { name, .. }
            | TransformerSpec::Ordinal { name, .. }
            | TransformerSpec::Passthrough { name, .. } => name,
        }
    }

    fn columns(&self) -> &[String] {
        match self {
            TransformerSpec::StandardScaler { columns, .. }
            | TransformerSpec::OneHot { columns, .. }
            | TransformerSpec::Ordinal { columns, .. }
            | TransformerSpec::Passthrough { columns, .. } => columns,
        }
    }

    fn field_kind(&self) -> FieldKind {
        match self {
            TransformerSpec::StandardScaler { .. } | TransformerSpec::Passthrough { .. } => {
                FieldKind::Numeric
            }
            TransformerSpec::OneHot { .. } | TransformerSpec::Ordinal { .. } => {
                FieldKind::Categorical
            }
        }
    }

    fn output_width(&self) -> usize {
        match self {
            TransformerSpec::OneHot { categories, .. } => categories.iter().map(Vec::len).sum(),
            other => other.columns().len(),
        }
    }

    fn validate(&self) -> Result<()> {
        let name = self.name();
        let columns = self.columns().len();
        match self {
            TransformerSpec::StandardScaler { mean, scale, .. } => {
                if mean.len() != columns || scale.len() != columns {
                    bail!(
                        "transformer '{}' has {} columns but {} means and {} scales",
                        name,
                        columns,
                        mean.len(),
                        scale.len()
                    );
                }
                if mean.iter().chain(scale.iter()).any(|v| !v.is_finite()) {
                    bail!("transformer '{}' has non-finite scaling parameters", name);
                }
            }
            TransformerSpec::OneHot { categories, .. } | TransformerSpec::Ordinal { categories, .. } => {
                if categories.len() != columns {
                    bail!(
                        "transformer '{}' has {} columns but {} category lists",
                        name,
                        columns,
                        categories.len()
                    );
                }
                for (column, known) in self.columns().iter().zip(categories) {
                    if known.is_empty() {
                        bail!("column '{}' in transformer '{}' has no categories", column, name);
                    }
                    let unique: HashSet<&String> = known.iter().collect();
                    if unique.len() != known.len() {
                        bail!(
                            "column '{}' in transformer '{}' lists a category twice",
                            column,
                            name
                        );
                    }
                }
            }
            TransformerSpec::Passthrough { .. } => {}
        }
        Ok(())
    }
}

/// Validated, ready-to-apply preprocessing transform.
#[derive(Debug, Clone)]
pub struct FittedPreprocessor {
    transformers: Vec<TransformerSpec>,
    schema: Vec<(String, FieldKind)>,
    width: usize,
}

impl FittedPreprocessor {
    /// Validate an artifact and build the transform.
    pub fn new(artifact: PreprocessorArtifact) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut schema = Vec::new();

        for transformer in &artifact.transformers {
            transformer.validate()?;
            for column in transformer.columns() {
                if !seen.insert(column.clone()) {
                    bail!(
                        "column '{}' is claimed by more than one transformer",
                        column
                    );
                }
                schema.push((column.clone(), transformer.field_kind()));
            }
        }

        let width = artifact
            .transformers
            .iter()
            .map(TransformerSpec::output_width)
            .sum();
        if width == 0 {
            bail!("preprocessor produces no output columns");
        }

        Ok(Self {
            transformers: artifact.transformers,
            schema,
            width,
        })
    }

    /// Load and validate a JSON artifact.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read preprocessor from {:?}", path))?;
        let artifact: PreprocessorArtifact = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse preprocessor {:?}", path))?;
        let preprocessor = Self::new(artifact)
            .with_context(|| format!("Invalid preprocessor artifact {:?}", path))?;

        info!(
            path = %path.display(),
            fields = preprocessor.schema.len(),
            width = preprocessor.width,
            "Preprocessor loaded"
        );
        Ok(preprocessor)
    }

    /// Input fields with the kind each one must be coerced to, in column order.
    pub fn schema(&self) -> &[(String, FieldKind)] {
        &self.schema
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.schema.iter().map(|(name, _)| name.as_str())
    }

    pub fn kind_of(&self, field: &str) -> Option<FieldKind> {
        self.schema
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, kind)| *kind)
    }

    /// Fitted categories of a categorical field.
    pub fn categories(&self, field: &str) -> Option<&[String]> {
        self.transformers.iter().find_map(|transformer| match transformer {
            TransformerSpec::OneHot {
                columns,
                categories,
                ..
            }
            | TransformerSpec::Ordinal {
                columns,
                categories,
                ..
            } => columns
                .iter()
                .position(|c| c == field)
                .map(|i| categories[i].as_slice()),
            _ => None,
        })
    }

    /// Number of output columns.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Output column names, `<transformer>__<column>[_<category>]`.
    pub fn feature_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.width);
        for transformer in &self.transformers {
            let prefix = transformer.name();
            match transformer {
                TransformerSpec::OneHot {
                    columns,
                    categories,
                    ..
                } => {
                    for (column, known) in columns.iter().zip(categories) {
                        for category in known {
                            names.push(format!("{}__{}_{}", prefix, column, category));
                        }
                    }
                }
                other => {
                    for column in other.columns() {
                        names.push(format!("{}__{}", prefix, column));
                    }
                }
            }
        }
        names
    }

    /// Apply the fitted transform.
    pub fn transform(&self, record: &CoercedRecord) -> Result<FeatureVector, PipelineError> {
        let mut features = Vec::with_capacity(self.width);

        for transformer in &self.transformers {
            match transformer {
                TransformerSpec::StandardScaler {
                    columns,
                    mean,
                    scale,
                    ..
                } => {
                    for ((column, mu), sigma) in columns.iter().zip(mean).zip(scale) {
                        let x = number(record, column)?;
                        // zero variance at fit time means the column is only centred
                        let sigma = if *sigma == 0.0 { 1.0 } else { *sigma };
                        features.push(((x - mu) / sigma) as f32);
                    }
                }
                TransformerSpec::OneHot {
                    columns,
                    categories,
                    ..
                } => {
                    for (column, known) in columns.iter().zip(categories) {
                        let index = category_index(record, column, known)?;
                        features.extend((0..known.len()).map(|i| if i == index { 1.0 } else { 0.0 }));
                    }
                }
                TransformerSpec::Ordinal {
                    columns,
                    categories,
                    ..
                } => {
                    for (column, known) in columns.iter().zip(categories) {
                        features.push(category_index(record, column, known)? as f32);
                    }
                }
                TransformerSpec::Passthrough { columns, .. } => {
                    for column in columns {
                        features.push(number(record, column)? as f32);
                    }
                }
            }
        }

        if features.len() != self.width {
            return Err(PipelineError::preprocessing(format!(
                "produced {} columns, fitted width is {}",
                features.len(),
                self.width
            )));
        }
        Ok(FeatureVector::new(features))
    }
}

fn lookup<'a>(record: &'a CoercedRecord, column: &str) -> Result<&'a CoercedValue, PipelineError> {
    record
        .get(column)
        .ok_or_else(|| PipelineError::preprocessing(format!("column '{}' is missing", column)))
}

fn number(record: &CoercedRecord, column: &str) -> Result<f64, PipelineError> {
    match lookup(record, column)? {
        CoercedValue::Number(x) => Ok(*x),
        CoercedValue::Category(c) => Err(PipelineError::preprocessing(format!(
            "column '{}' is numeric but received category '{}'",
            column, c
        ))),
    }
}

fn category_index(
    record: &CoercedRecord,
    column: &str,
    known: &[String],
) -> Result<usize, PipelineError> {
    match lookup(record, column)? {
        CoercedValue::Category(value) => known.iter().position(|k| k == value).ok_or_else(|| {
            PipelineError::preprocessing(format!(
                "unknown category '{}' for column '{}' (known: {})",
                value,
                column,
                known.join(", ")
            ))
        }),
        CoercedValue::Number(x) => Err(PipelineError::preprocessing(format!(
            "column '{}' is categorical but received number {}",
            column, x
        ))),
    }
}
