//! Configuration management for the attrition pipeline

use crate::types::record::FieldValue;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable that overrides the config file location
pub const CONFIG_PATH_ENV: &str = "ATTRITION_CONFIG";

/// Serialized format of the network and hybrid classifier artifacts
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactFormat {
    /// Native JSON dumps evaluated in-process
    #[default]
    Json,
    /// ONNX graphs run through ONNX Runtime (requires the `onnx` feature)
    Onnx,
}

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub nats: NatsConfig,
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
    /// Operator-configured values for fields the caller omitted
    #[serde(default)]
    pub defaults: Vec<DefaultEntry>,
    /// Accepted numeric ranges per field
    #[serde(default)]
    pub bounds: Vec<FieldBounds>,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// NATS connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NatsConfig {
    /// NATS server URL
    pub url: String,
    /// Subject for incoming prediction requests
    pub request_subject: String,
    /// Subject for outgoing verdict events
    pub verdict_subject: String,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            request_subject: "attrition.requests".to_string(),
            verdict_subject: "attrition.verdicts".to_string(),
        }
    }
}

/// Model artifact configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactsConfig {
    /// Directory containing the artifact files
    pub dir: String,
    /// Fitted column transform (always JSON)
    #[serde(default = "default_preprocessor")]
    pub preprocessor: String,
    /// Neural network artifact
    #[serde(default = "default_network")]
    pub network: String,
    /// Hybrid tree-ensemble artifact
    #[serde(default = "default_ensemble")]
    pub ensemble: String,
    /// Format of the network and ensemble files
    #[serde(default)]
    pub format: ArtifactFormat,
    /// Number of threads for ONNX inference per session (default: 1)
    #[serde(default = "default_onnx_threads")]
    pub onnx_threads: usize,
}

fn default_preprocessor() -> String {
    "preprocessor.json".to_string()
}

fn default_network() -> String {
    "network.json".to_string()
}

fn default_ensemble() -> String {
    "ensemble.json".to_string()
}

fn default_onnx_threads() -> usize {
    1
}

impl ArtifactsConfig {
    pub fn preprocessor_path(&self) -> PathBuf {
        Path::new(&self.dir).join(&self.preprocessor)
    }

    pub fn network_path(&self) -> PathBuf {
        Path::new(&self.dir).join(&self.network)
    }

    pub fn ensemble_path(&self) -> PathBuf {
        Path::new(&self.dir).join(&self.ensemble)
    }
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            dir: "models".to_string(),
            preprocessor: default_preprocessor(),
            network: default_network(),
            ensemble: default_ensemble(),
            format: ArtifactFormat::Json,
            onnx_threads: default_onnx_threads(),
        }
    }
}

/// One row of the default table.
///
/// Stored as a list of entries rather than a map because config keys are
/// case-folded and field names are not.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DefaultEntry {
    pub field: String,
    pub value: FieldValue,
}

/// Inclusive numeric range for a field
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct FieldBounds {
    pub field: String,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

impl FieldBounds {
    pub fn contains(&self, value: f64) -> bool {
        self.min.map_or(true, |min| value >= min) && self.max.map_or(true, |max| value <= max)
    }
}

/// Pipeline behaviour configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Surface the hybrid model's probability alongside the label
    #[serde(default = "default_true")]
    pub report_probability: bool,
}

fn default_true() -> bool {
    true
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            report_probability: true,
        }
    }
}

/// Metrics reporting configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Seconds between summary log lines (0 disables the reporter)
    pub report_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: 30,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `$ATTRITION_CONFIG` or `config/config.toml`
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "config/config.toml".to_string());
        Self::load_from_path(path)
    }

    /// Load configuration from a specific path, with `ATTRITION__*` env overrides
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Environment::with_prefix("ATTRITION").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            nats: NatsConfig::default(),
            artifacts: ArtifactsConfig::default(),
            defaults: vec![
                DefaultEntry {
                    field: "Age".to_string(),
                    value: FieldValue::Integer(30),
                },
                DefaultEntry {
                    field: "DistanceFromHome".to_string(),
                    value: FieldValue::Integer(10),
                },
                DefaultEntry {
                    field: "MonthlyIncome".to_string(),
                    value: FieldValue::Integer(5000),
                },
                DefaultEntry {
                    field: "JobRole".to_string(),
                    value: FieldValue::Text("Sales".to_string()),
                },
                DefaultEntry {
                    field: "BusinessTravel".to_string(),
                    value: FieldValue::Text("Rarely".to_string()),
                },
            ],
            bounds: vec![
                FieldBounds {
                    field: "Age".to_string(),
                    min: Some(18.0),
                    max: Some(70.0),
                },
                FieldBounds {
                    field: "DistanceFromHome".to_string(),
                    min: Some(1.0),
                    max: Some(30.0),
                },
                FieldBounds {
                    field: "MonthlyIncome".to_string(),
                    min: Some(1000.0),
                    max: Some(50000.0),
                },
            ],
            pipeline: PipelineConfig::default(),
            metrics: MetricsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
