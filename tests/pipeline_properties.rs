//! End-to-end behaviour of the inference pipeline through the public API.

use attrition_pipeline::models::{ensemble::EnsembleArtifact, TreeEnsemble};
use attrition_pipeline::preprocessor::PreprocessorArtifact;
use attrition_pipeline::{
    AppConfig, Attrition, Classification, DefaultTable, FittedPreprocessor, InferencePipeline,
    NetworkModel, PipelineError, RawRecord, StackedClassifier,
};

/// Network stub returning the same score for every input.
struct ConstantNetwork {
    width: usize,
    score: f32,
}

impl NetworkModel for ConstantNetwork {
    fn name(&self) -> &str {
        "constant"
    }

    fn input_width(&self) -> usize {
        self.width
    }

    fn score(&self, features: &[f32]) -> Result<f32, PipelineError> {
        if features.len() != self.width {
            return Err(PipelineError::shape("constant", self.width, features.len()));
        }
        Ok(self.score)
    }
}

/// Network stub whose score depends on its input.
struct MeanNetwork {
    width: usize,
}

impl NetworkModel for MeanNetwork {
    fn name(&self) -> &str {
        "mean"
    }

    fn input_width(&self) -> usize {
        self.width
    }

    fn score(&self, features: &[f32]) -> Result<f32, PipelineError> {
        Ok(features.iter().sum::<f32>() / features.len() as f32)
    }
}

/// Labels 1 when the last augmented column reaches the threshold.
struct LastColumnClassifier {
    width: usize,
    threshold: f32,
}

impl StackedClassifier for LastColumnClassifier {
    fn name(&self) -> &str {
        "last-column"
    }

    fn input_width(&self) -> usize {
        self.width
    }

    fn classify(&self, augmented: &[f32]) -> Result<Classification, PipelineError> {
        let last = augmented[augmented.len() - 1];
        Ok(Classification {
            label: u8::from(last >= self.threshold),
            probability: Some(f64::from(last)),
        })
    }
}

/// Eight-field layout: two scaled numbers, OverTime one-hot, five passthrough.
fn survey_preprocessor() -> FittedPreprocessor {
    let artifact: PreprocessorArtifact = serde_json::from_str(
        r#"{"transformers": [
            {"kind": "standard_scaler", "name": "num",
             "columns": ["Age", "MonthlyIncome"],
             "mean": [36.9, 6502.9], "scale": [9.1, 4706.4]},
            {"kind": "one_hot", "name": "cat",
             "columns": ["OverTime"], "categories": [["No", "Yes"]]},
            {"kind": "passthrough", "name": "raw",
             "columns": ["EnvironmentSatisfaction", "RelationshipSatisfaction",
                         "PercentSalaryHike", "YearsWithCurrManager", "JobInvolvement"]}
        ]}"#,
    )
    .unwrap();
    FittedPreprocessor::new(artifact).unwrap()
}

fn survey_record() -> RawRecord {
    RawRecord::new()
        .with("Age", 30)
        .with("MonthlyIncome", 5000)
        .with("OverTime", "Yes")
        .with("EnvironmentSatisfaction", 3)
        .with("RelationshipSatisfaction", 3)
        .with("PercentSalaryHike", 10)
        .with("YearsWithCurrManager", 5)
        .with("JobInvolvement", 3)
}

fn stub_pipeline(defaults: DefaultTable, score: f32) -> InferencePipeline {
    let preprocessor = survey_preprocessor();
    let width = preprocessor.width();
    InferencePipeline::new(
        defaults,
        preprocessor,
        Box::new(ConstantNetwork { width, score }),
        Box::new(LastColumnClassifier {
            width: width + 1,
            threshold: 0.5,
        }),
    )
    .unwrap()
}

#[test]
fn test_high_network_score_predicts_leave() {
    let pipeline = stub_pipeline(DefaultTable::new(), 0.7);

    let verdict = pipeline.predict(&survey_record()).unwrap();
    assert_eq!(verdict.label(), 1);
    assert_eq!(verdict.outcome, Attrition::Leave);
    assert!(verdict.message().starts_with("This employee is likely to leave the company."));
}

#[test]
fn test_low_network_score_predicts_stay() {
    let pipeline = stub_pipeline(DefaultTable::new(), 0.2);

    let verdict = pipeline.predict(&survey_record()).unwrap();
    assert_eq!(verdict.outcome, Attrition::Stay);
    assert!(verdict.message().starts_with("This employee is likely to stay."));
}

#[test]
fn test_stump_ensemble_on_network_column() {
    let preprocessor = survey_preprocessor();
    let width = preprocessor.width();
    let artifact: EnsembleArtifact = serde_json::from_str(&format!(
        r#"{{"num_features": {}, "trees": [{{"nodes": [
            {{"split": {}, "split_condition": 0.5, "yes": 1, "no": 2}},
            {{"leaf": -2.0}}, {{"leaf": 2.0}}
        ]}}]}}"#,
        width + 1,
        width
    ))
    .unwrap();

    let pipeline = InferencePipeline::new(
        DefaultTable::new(),
        preprocessor,
        Box::new(ConstantNetwork { width, score: 0.7 }),
        Box::new(TreeEnsemble::new("hybrid", artifact).unwrap()),
    )
    .unwrap();

    let verdict = pipeline.predict(&survey_record()).unwrap();
    assert_eq!(verdict.label(), 1);
    let probability = verdict.probability.unwrap();
    assert!(probability > 0.5 && probability < 1.0);
}

#[test]
fn test_labels_are_binary() {
    for score in [0.0, 0.25, 0.49, 0.5, 0.75, 1.0] {
        let pipeline = stub_pipeline(DefaultTable::new(), score);
        let verdict = pipeline.predict(&survey_record()).unwrap();
        assert!(verdict.label() <= 1);
    }
}

#[test]
fn test_default_matches_explicit_value() {
    let pipeline = stub_pipeline(DefaultTable::new().with("OverTime", "No"), 0.6);

    let mut omitted = survey_record();
    omitted.remove("OverTime");
    let explicit = survey_record().with("OverTime", "No");

    let from_default = pipeline.trace(&omitted).unwrap();
    let from_explicit = pipeline.trace(&explicit).unwrap();

    assert_eq!(from_default.verdict, from_explicit.verdict);
    assert_eq!(from_default.features, from_explicit.features);
    assert_eq!(from_default.defaulted_fields, vec!["OverTime".to_string()]);
    assert!(from_explicit.defaulted_fields.is_empty());
}

#[test]
fn test_null_is_treated_as_absent() {
    let pipeline = stub_pipeline(DefaultTable::new().with("OverTime", "No"), 0.6);

    let record: RawRecord = serde_json::from_str(
        r#"{"Age": 30, "MonthlyIncome": 5000, "OverTime": null,
            "EnvironmentSatisfaction": 3, "RelationshipSatisfaction": 3,
            "PercentSalaryHike": 10, "YearsWithCurrManager": 5, "JobInvolvement": 3}"#,
    )
    .unwrap();

    let trace = pipeline.trace(&record).unwrap();
    assert_eq!(trace.defaulted_fields, vec!["OverTime".to_string()]);
}

#[test]
fn test_non_numeric_text_fails_coercion() {
    let pipeline = stub_pipeline(DefaultTable::new(), 0.7);
    let record = survey_record().with("MonthlyIncome", "abc");

    let err = pipeline.predict(&record).unwrap_err();
    assert!(matches!(err, PipelineError::Coercion { ref field, .. } if field == "MonthlyIncome"));
    assert!(!err.is_system_anomaly());
}

#[test]
fn test_empty_text_fails_coercion() {
    let pipeline = stub_pipeline(DefaultTable::new(), 0.7);
    let record = survey_record().with("Age", "   ");

    assert_eq!(pipeline.predict(&record).unwrap_err().kind(), "coercion");
}

#[test]
fn test_thousands_separator_is_accepted() {
    let pipeline = stub_pipeline(DefaultTable::new(), 0.7);

    let formatted = pipeline
        .trace(&survey_record().with("MonthlyIncome", " 5,000 "))
        .unwrap();
    let plain = pipeline.trace(&survey_record()).unwrap();

    assert_eq!(formatted.features, plain.features);
}

#[test]
fn test_unknown_category_fails_preprocessing() {
    let pipeline = stub_pipeline(DefaultTable::new(), 0.7);
    let record = survey_record().with("OverTime", "Sometimes");

    let err = pipeline.predict(&record).unwrap_err();
    assert_eq!(err.kind(), "preprocessing");
    assert!(!err.is_system_anomaly());
}

#[test]
fn test_missing_field_without_default() {
    let pipeline = stub_pipeline(DefaultTable::new(), 0.7);
    let mut record = survey_record();
    record.remove("JobInvolvement");

    let err = pipeline.predict(&record).unwrap_err();
    assert_eq!(
        err,
        PipelineError::MissingField {
            field: "JobInvolvement".to_string()
        }
    );
}

#[test]
fn test_augmented_vector_appends_network_score() {
    let preprocessor = survey_preprocessor();
    let width = preprocessor.width();
    let pipeline = InferencePipeline::new(
        DefaultTable::new(),
        preprocessor,
        Box::new(MeanNetwork { width }),
        Box::new(LastColumnClassifier {
            width: width + 1,
            threshold: 0.5,
        }),
    )
    .unwrap();

    let trace = pipeline.trace(&survey_record()).unwrap();
    assert_eq!(trace.augmented.len(), trace.features.len() + 1);
    assert_eq!(trace.augmented.features(), trace.features.as_slice());
    assert_eq!(trace.augmented.network_score(), trace.network_score);

    let expected = trace.features.iter().sum::<f32>() / trace.features.len() as f32;
    assert_eq!(trace.network_score, expected);
}

#[test]
fn test_repeated_calls_agree() {
    let pipeline = stub_pipeline(DefaultTable::new(), 0.55);
    let record = survey_record();

    let first = pipeline.predict(&record).unwrap();
    let second = pipeline.predict(&record).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_startup_rejects_width_mismatch() {
    let result = InferencePipeline::new(
        DefaultTable::new(),
        survey_preprocessor(),
        Box::new(ConstantNetwork { width: 8, score: 0.7 }),
        Box::new(LastColumnClassifier {
            width: 9,
            threshold: 0.5,
        }),
    );

    assert!(matches!(
        result.err(),
        Some(PipelineError::ModelInputShape { expected: 8, actual: 9, .. })
    ));
}

#[test]
fn test_shipped_configuration_loads_and_predicts() {
    let config = AppConfig::load_from_path("config/config.toml").unwrap();
    let pipeline = InferencePipeline::from_config(&config).unwrap();

    let fields: Vec<&str> = pipeline.expected_fields().collect();
    assert_eq!(
        fields,
        vec!["Age", "DistanceFromHome", "MonthlyIncome", "JobRole", "BusinessTravel"]
    );

    // Everything but Age comes from the default table
    let trace = pipeline.trace(&RawRecord::new().with("Age", 24)).unwrap();
    assert_eq!(trace.defaulted_fields.len(), 4);
    assert_eq!(trace.features.len(), 9);
    assert!(trace.verdict.label() <= 1);
    assert!(trace.verdict.probability.is_some());

    let out_of_range = RawRecord::new().with("Age", 12);
    assert_eq!(pipeline.predict(&out_of_range).unwrap_err().kind(), "coercion");
}

fn config_with(extra: &str) -> (tempfile::TempDir, AppConfig) {
    let dir = tempfile::tempdir().unwrap();
    let models = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("models");
    let body = format!(
        "[artifacts]\ndir = {:?}\n\n[[defaults]]\nfield = \"Age\"\nvalue = 30\n\n{}",
        models.to_string_lossy(),
        extra
    );
    let path = dir.path().join("config.toml");
    std::fs::write(&path, body).unwrap();
    let config = AppConfig::load_from_path(&path).unwrap();
    (dir, config)
}

#[test]
fn test_misconfigured_default_fails_at_startup() {
    let (_dir, config) =
        config_with("[[defaults]]\nfield = \"JobRole\"\nvalue = \"Salez\"\n");
    let err = InferencePipeline::from_config(&config).err().unwrap();
    let message = format!("{:#}", err);
    assert!(message.contains("JobRole"), "{}", message);
    assert!(message.contains("Salez"), "{}", message);

    let (_dir, config) = config_with("[[defaults]]\nfield = \"NotAField\"\nvalue = 1\n");
    assert!(InferencePipeline::from_config(&config).is_err());
}

#[test]
fn test_misconfigured_bounds_fail_at_startup() {
    for bounds in [
        "[[bounds]]\nfield = \"Tenure\"\nmin = 0\n",
        "[[bounds]]\nfield = \"JobRole\"\nmin = 0\nmax = 2\n",
        "[[bounds]]\nfield = \"Age\"\nmin = 70\nmax = 18\n",
        "[[bounds]]\nfield = \"Age\"\nmin = 40\nmax = 70\n",
    ] {
        let (_dir, config) = config_with(bounds);
        let err = InferencePipeline::from_config(&config).err().unwrap();
        assert!(format!("{:#}", err).contains("configured value for field"), "{:#}", err);
    }
}

#[test]
fn test_well_formed_overrides_start() {
    let (_dir, config) = config_with(
        "[[defaults]]\nfield = \"JobRole\"\nvalue = \"HR\"\n\n[[bounds]]\nfield = \"Age\"\nmin = 18\nmax = 70\n",
    );
    let pipeline = InferencePipeline::from_config(&config).unwrap();
    assert_eq!(pipeline.expected_fields().count(), 5);
}
