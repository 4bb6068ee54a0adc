//! Employee Attrition Pipeline Library
//!
//! Stacked inference for employee attrition: a fitted preprocessing
//! transform feeds a neural network, whose score is appended to the
//! features and passed to a gradient-boosted tree "hybrid" classifier.

pub mod coercion;
pub mod config;
pub mod consumer;
pub mod defaults;
pub mod error;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod preprocessor;
pub mod producer;
pub mod telemetry;
pub mod types;

pub use config::AppConfig;
pub use consumer::RequestConsumer;
pub use defaults::DefaultTable;
pub use error::PipelineError;
pub use models::{Classification, NetworkModel, StackedClassifier};
pub use pipeline::{InferencePipeline, PredictionTrace};
pub use preprocessor::FittedPreprocessor;
pub use producer::VerdictProducer;
pub use types::{
    record::{FieldValue, PredictionRequest, RawRecord},
    verdict::{Attrition, Verdict},
};
