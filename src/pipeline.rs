//! Stacked attrition inference: preprocess, network, stack, hybrid classifier.

use crate::coercion::{CoercedValue, Coercer, FieldKind};
use crate::config::{AppConfig, FieldBounds};
use crate::defaults::DefaultTable;
use crate::error::PipelineError;
use crate::models::{Classification, LoadedModels, ModelLoader, NetworkModel, StackedClassifier};
use crate::preprocessor::FittedPreprocessor;
use crate::types::record::RawRecord;
use crate::types::vector::{AugmentedVector, FeatureVector};
use crate::types::verdict::{Attrition, Verdict};
use anyhow::{Context, Result};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Every intermediate value of one invocation.
#[derive(Debug, Clone)]
pub struct PredictionTrace {
    pub defaulted_fields: Vec<String>,
    pub features: FeatureVector,
    pub network_score: f32,
    pub augmented: AugmentedVector,
    pub classification: Classification,
    pub verdict: Verdict,
    pub timings: StageTimings,
}

/// Wall-clock time spent in each stage
#[derive(Debug, Clone, Copy, Default)]
pub struct StageTimings {
    pub preprocess: Duration,
    pub network: Duration,
    pub classifier: Duration,
}

/// The inference pipeline and its read-only resources.
pub struct InferencePipeline {
    defaults: DefaultTable,
    coercer: Coercer,
    preprocessor: FittedPreprocessor,
    network: Box<dyn NetworkModel>,
    classifier: Box<dyn StackedClassifier>,
    report_probability: bool,
}

impl InferencePipeline {
    /// Assemble a pipeline, checking that the three resources agree on widths
    /// and that every default fits the fitted transform.
    pub fn new(
        defaults: DefaultTable,
        preprocessor: FittedPreprocessor,
        network: Box<dyn NetworkModel>,
        classifier: Box<dyn StackedClassifier>,
    ) -> Result<Self, PipelineError> {
        let width = preprocessor.width();
        if network.input_width() != width {
            return Err(PipelineError::shape(network.name(), network.input_width(), width));
        }
        if classifier.input_width() != width + 1 {
            return Err(PipelineError::shape(
                classifier.name(),
                classifier.input_width(),
                width + 1,
            ));
        }

        let coercer = Coercer::new();
        check_defaults(&defaults, &preprocessor, &coercer)?;

        Ok(Self {
            defaults,
            coercer,
            preprocessor,
            network,
            classifier,
            report_probability: true,
        })
    }

    /// Build from config: load artifacts, defaults and bounds.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let loader =
            ModelLoader::with_format(config.artifacts.format.clone(), config.artifacts.onnx_threads)?;
        let LoadedModels {
            preprocessor,
            network,
            classifier,
        } = loader.load_all(&config.artifacts)?;

        let pipeline = Self::new(
            DefaultTable::from_entries(&config.defaults),
            preprocessor,
            network,
            classifier,
        )
        .context("Model artifacts and defaults do not fit together")?
        .with_bounds(&config.bounds)
        .context("Configured bounds do not fit the preprocessor")?
        .with_probability(config.pipeline.report_probability);

        info!(
            fields = pipeline.preprocessor.schema().len(),
            defaults = pipeline.defaults.len(),
            feature_width = pipeline.preprocessor.width(),
            report_probability = pipeline.report_probability,
            "Inference pipeline ready"
        );
        Ok(pipeline)
    }

    /// Enforce numeric ranges. Bounds must target numeric fields of the
    /// transform, and every default must fall inside them.
    pub fn with_bounds(mut self, bounds: &[FieldBounds]) -> Result<Self, PipelineError> {
        for entry in bounds {
            let field = entry.field.as_str();
            match self.preprocessor.kind_of(field) {
                None => {
                    return Err(PipelineError::configuration(
                        field,
                        "bounds given for a field the preprocessor does not use",
                    ))
                }
                Some(FieldKind::Categorical) => {
                    return Err(PipelineError::configuration(
                        field,
                        "bounds given for a categorical field",
                    ))
                }
                Some(FieldKind::Numeric) => {}
            }
            if entry.min.is_some_and(f64::is_nan) || entry.max.is_some_and(f64::is_nan) {
                return Err(PipelineError::configuration(field, "bound is not a number"));
            }
            if let (Some(min), Some(max)) = (entry.min, entry.max) {
                if min > max {
                    return Err(PipelineError::configuration(
                        field,
                        format!("min {} is above max {}", min, max),
                    ));
                }
            }
        }

        self.coercer = Coercer::with_bounds(bounds);
        check_defaults(&self.defaults, &self.preprocessor, &self.coercer)?;
        Ok(self)
    }

    pub fn with_probability(mut self, report_probability: bool) -> Self {
        self.report_probability = report_probability;
        self
    }

    /// Fields every record must cover (directly or through defaults).
    pub fn expected_fields(&self) -> impl Iterator<Item = &str> {
        self.preprocessor.field_names()
    }

    pub fn preprocessor(&self) -> &FittedPreprocessor {
        &self.preprocessor
    }

    /// Turn one record into a verdict.
    pub fn predict(&self, record: &RawRecord) -> Result<Verdict, PipelineError> {
        self.trace(record).map(|trace| trace.verdict)
    }

    /// Same as [`predict`](Self::predict), keeping every intermediate value.
    pub fn trace(&self, record: &RawRecord) -> Result<PredictionTrace, PipelineError> {
        let started = Instant::now();
        let filled = self.defaults.fill(record, self.preprocessor.field_names())?;
        let coerced = self.coercer.coerce(&filled.record, self.preprocessor.schema())?;
        let features = self.preprocessor.transform(&coerced)?;
        let preprocess = started.elapsed();

        let started = Instant::now();
        let network_score = self.network.score(&features)?;
        let network = started.elapsed();

        let augmented = AugmentedVector::stack(&features, network_score);

        let started = Instant::now();
        let classification = self.classifier.classify(&augmented)?;
        let classifier = started.elapsed();

        let outcome = Attrition::from_label(classification.label).ok_or_else(|| {
            PipelineError::inference(
                self.classifier.name(),
                format!("unexpected class label {}", classification.label),
            )
        })?;
        let probability = if self.report_probability {
            classification.probability
        } else {
            None
        };
        let verdict = Verdict::new(outcome, probability);

        debug!(
            network_score = network_score,
            label = classification.label,
            probability = ?classification.probability,
            defaulted = ?filled.defaulted,
            "Prediction complete"
        );

        Ok(PredictionTrace {
            defaulted_fields: filled.defaulted,
            features,
            network_score,
            augmented,
            classification,
            verdict,
            timings: StageTimings {
                preprocess,
                network,
                classifier,
            },
        })
    }
}

/// Run every default through the same coercion as request values and
/// require categorical defaults to be fitted categories.
fn check_defaults(
    defaults: &DefaultTable,
    preprocessor: &FittedPreprocessor,
    coercer: &Coercer,
) -> Result<(), PipelineError> {
    for (field, value) in defaults.iter() {
        let kind = preprocessor.kind_of(field).ok_or_else(|| {
            PipelineError::configuration(field, "default given for a field the preprocessor does not use")
        })?;

        let record = RawRecord::new().with(field, value.clone());
        let coerced = coercer
            .coerce(&record, &[(field.to_string(), kind)])
            .map_err(|e| PipelineError::configuration(field, format!("default rejected, {}", e)))?;

        if let Some(CoercedValue::Category(category)) = coerced.get(field) {
            let known = preprocessor.categories(field).unwrap_or_default();
            if !known.contains(category) {
                return Err(PipelineError::configuration(
                    field,
                    format!(
                        "default '{}' is not a fitted category (known: {})",
                        category,
                        known.join(", ")
                    ),
                ));
            }
        }
    }
    Ok(())
}
