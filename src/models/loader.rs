//! Artifact loader for the preprocessing transform and both models

use crate::config::{ArtifactFormat, ArtifactsConfig};
use crate::models::{DenseNetwork, NetworkModel, StackedClassifier, TreeEnsemble};
use crate::preprocessor::FittedPreprocessor;
use anyhow::Result;
use std::path::Path;
use tracing::info;

/// Name used for the network in logs, metrics and errors
pub const NETWORK_MODEL: &str = "network";
/// Name used for the hybrid classifier in logs, metrics and errors
pub const HYBRID_MODEL: &str = "hybrid";

/// The three read-only resources the pipeline runs on.
pub struct LoadedModels {
    pub preprocessor: FittedPreprocessor,
    pub network: Box<dyn NetworkModel>,
    pub classifier: Box<dyn StackedClassifier>,
}

/// Loads artifacts in the configured format
pub struct ModelLoader {
    format: ArtifactFormat,
    /// Number of threads for ONNX inference
    onnx_threads: usize,
}

impl ModelLoader {
    /// Loader for native JSON artifacts
    pub fn new() -> Self {
        Self {
            format: ArtifactFormat::Json,
            onnx_threads: 1,
        }
    }

    pub fn with_format(format: ArtifactFormat, onnx_threads: usize) -> Result<Self> {
        if format == ArtifactFormat::Onnx {
            init_onnx_runtime(onnx_threads)?;
        }
        Ok(Self {
            format,
            onnx_threads,
        })
    }

    /// Load everything described by the artifacts section of the config.
    pub fn load_all(&self, config: &ArtifactsConfig) -> Result<LoadedModels> {
        let preprocessor = FittedPreprocessor::load(config.preprocessor_path())?;
        let width = preprocessor.width();

        let network = self.load_network(config.network_path(), width)?;
        let classifier = self.load_classifier(config.ensemble_path(), width + 1)?;

        info!(
            dir = %config.dir,
            format = ?self.format,
            feature_width = width,
            "Loaded preprocessor, {} and {}",
            network.name(),
            classifier.name()
        );

        Ok(LoadedModels {
            preprocessor,
            network,
            classifier,
        })
    }

    /// `input_width` is only consulted by backends that cannot report their own.
    pub fn load_network<P: AsRef<Path>>(
        &self,
        path: P,
        input_width: usize,
    ) -> Result<Box<dyn NetworkModel>> {
        match self.format {
            ArtifactFormat::Json => Ok(Box::new(DenseNetwork::load(path, NETWORK_MODEL)?)),
            ArtifactFormat::Onnx => self.load_onnx_network(path.as_ref(), input_width),
        }
    }

    pub fn load_classifier<P: AsRef<Path>>(
        &self,
        path: P,
        input_width: usize,
    ) -> Result<Box<dyn StackedClassifier>> {
        match self.format {
            ArtifactFormat::Json => Ok(Box::new(TreeEnsemble::load(path, HYBRID_MODEL)?)),
            ArtifactFormat::Onnx => self.load_onnx_classifier(path.as_ref(), input_width),
        }
    }

    #[cfg(feature = "onnx")]
    fn load_onnx_network(&self, path: &Path, input_width: usize) -> Result<Box<dyn NetworkModel>> {
        Ok(Box::new(crate::models::onnx::OnnxNetwork::load(
            path,
            NETWORK_MODEL,
            input_width,
            self.onnx_threads,
        )?))
    }

    #[cfg(feature = "onnx")]
    fn load_onnx_classifier(
        &self,
        path: &Path,
        input_width: usize,
    ) -> Result<Box<dyn StackedClassifier>> {
        Ok(Box::new(crate::models::onnx::OnnxClassifier::load(
            path,
            HYBRID_MODEL,
            input_width,
            self.onnx_threads,
        )?))
    }

    #[cfg(not(feature = "onnx"))]
    fn load_onnx_network(&self, path: &Path, _input_width: usize) -> Result<Box<dyn NetworkModel>> {
        anyhow::bail!(
            "cannot load {:?} ({} threads requested): built without the `onnx` feature",
            path,
            self.onnx_threads
        )
    }

    #[cfg(not(feature = "onnx"))]
    fn load_onnx_classifier(
        &self,
        path: &Path,
        _input_width: usize,
    ) -> Result<Box<dyn StackedClassifier>> {
        anyhow::bail!(
            "cannot load {:?} ({} threads requested): built without the `onnx` feature",
            path,
            self.onnx_threads
        )
    }
}

#[cfg(feature = "onnx")]
fn init_onnx_runtime(onnx_threads: usize) -> Result<()> {
    ort::init().commit()?;
    info!(onnx_threads = onnx_threads, "ONNX Runtime initialized");
    Ok(())
}

// Loading reports the missing feature with the offending path
#[cfg(not(feature = "onnx"))]
fn init_onnx_runtime(_onnx_threads: usize) -> Result<()> {
    Ok(())
}

impl Default for ModelLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const PREPROCESSOR: &str = r#"{"transformers": [
        {"kind": "standard_scaler", "name": "num", "columns": ["Age"], "mean": [36.0], "scale": [9.0]},
        {"kind": "one_hot", "name": "cat", "columns": ["OverTime"], "categories": [["No", "Yes"]]}
    ]}"#;

    const NETWORK: &str = r#"{"input_width": 3, "layers": [
        {"weights": [[0.5], [-0.5], [1.0]], "bias": [0.0], "activation": "sigmoid"}
    ]}"#;

    const ENSEMBLE: &str = r#"{"num_features": 4, "trees": [{"nodes": [
        {"split": 3, "split_condition": 0.5, "yes": 1, "no": 2},
        {"leaf": -1.0},
        {"leaf": 1.0}
    ]}]}"#;

    fn write_artifacts(dir: &Path) -> ArtifactsConfig {
        fs::write(dir.join("preprocessor.json"), PREPROCESSOR).unwrap();
        fs::write(dir.join("network.json"), NETWORK).unwrap();
        fs::write(dir.join("ensemble.json"), ENSEMBLE).unwrap();
        ArtifactsConfig {
            dir: dir.to_string_lossy().into_owned(),
            ..ArtifactsConfig::default()
        }
    }

    #[test]
    fn test_load_all_json() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_artifacts(dir.path());

        let models = ModelLoader::new().load_all(&config).unwrap();
        assert_eq!(models.preprocessor.width(), 3);
        assert_eq!(models.network.input_width(), 3);
        assert_eq!(models.classifier.input_width(), 4);
        assert_eq!(models.network.name(), NETWORK_MODEL);
        assert_eq!(models.classifier.name(), HYBRID_MODEL);
    }

    #[test]
    fn test_missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let config = ArtifactsConfig {
            dir: dir.path().to_string_lossy().into_owned(),
            ..ArtifactsConfig::default()
        };

        let err = ModelLoader::new().load_all(&config).err().unwrap();
        assert!(format!("{:#}", err).contains("preprocessor.json"));
    }

    #[test]
    fn test_invalid_artifact_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_artifacts(dir.path());
        fs::write(
            dir.path().join("ensemble.json"),
            r#"{"num_features": 4, "trees": [{"nodes": [
                {"split": 9, "split_condition": 0.5, "yes": 1, "no": 2},
                {"leaf": -1.0}, {"leaf": 1.0}
            ]}]}"#,
        )
        .unwrap();

        assert!(ModelLoader::new().load_all(&config).is_err());
    }

    #[cfg(not(feature = "onnx"))]
    #[test]
    fn test_onnx_requires_feature() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = write_artifacts(dir.path());
        config.format = ArtifactFormat::Onnx;

        let loader = ModelLoader::with_format(ArtifactFormat::Onnx, 2).unwrap();
        let err = loader.load_all(&config).err().unwrap();
        assert!(err.to_string().contains("onnx"));
    }
}
