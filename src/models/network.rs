//! Dense feed-forward network evaluated in-process from a JSON weight dump.

use crate::error::PipelineError;
use crate::models::{check_width, NetworkModel};
use anyhow::{bail, Context, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Layer activation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Relu,
    Sigmoid,
    Tanh,
    Linear,
}

impl Activation {
    fn apply(self, x: f32) -> f32 {
        match self {
            Activation::Relu => x.max(0.0),
            Activation::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            Activation::Tanh => x.tanh(),
            Activation::Linear => x,
        }
    }
}

/// Serialized dense layer. `weights` is `[inputs][outputs]`, like a Keras kernel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerSpec {
    pub weights: Vec<Vec<f32>>,
    pub bias: Vec<f32>,
    pub activation: Activation,
}

/// Serialized network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkArtifact {
    pub input_width: usize,
    pub layers: Vec<LayerSpec>,
}

#[derive(Debug, Clone)]
struct DenseLayer {
    weights: Array2<f32>,
    bias: Array1<f32>,
    activation: Activation,
}

/// Validated dense network.
#[derive(Debug, Clone)]
pub struct DenseNetwork {
    name: String,
    input_width: usize,
    layers: Vec<DenseLayer>,
}

impl DenseNetwork {
    pub fn new(name: &str, artifact: NetworkArtifact) -> Result<Self> {
        if artifact.layers.is_empty() {
            bail!("network '{}' has no layers", name);
        }

        let mut width = artifact.input_width;
        let mut layers = Vec::with_capacity(artifact.layers.len());

        for (index, layer) in artifact.layers.into_iter().enumerate() {
            let rows = layer.weights.len();
            if rows != width {
                bail!(
                    "layer {} of '{}' takes {} inputs but the previous layer produces {}",
                    index,
                    name,
                    rows,
                    width
                );
            }
            let cols = layer.bias.len();
            if layer.weights.iter().any(|row| row.len() != cols) {
                bail!(
                    "layer {} of '{}' has a weight row that does not match its {} biases",
                    index,
                    name,
                    cols
                );
            }

            let flat: Vec<f32> = layer.weights.into_iter().flatten().collect();
            let weights = Array2::from_shape_vec((rows, cols), flat)
                .with_context(|| format!("layer {} of '{}' has malformed weights", index, name))?;

            layers.push(DenseLayer {
                weights,
                bias: Array1::from(layer.bias),
                activation: layer.activation,
            });
            width = cols;
        }

        if width != 1 {
            bail!("network '{}' must end in a single output, found {}", name, width);
        }

        Ok(Self {
            name: name.to_string(),
            input_width: artifact.input_width,
            layers,
        })
    }

    pub fn load<P: AsRef<Path>>(path: P, name: &str) -> Result<Self> {
        let path = path.as_ref();
        info!(model = %name, path = %path.display(), "Loading network");

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read network from {:?}", path))?;
        let artifact: NetworkArtifact = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse network {:?}", path))?;
        let network = Self::new(name, artifact)?;

        info!(
            model = %name,
            input_width = network.input_width,
            layers = network.layers.len(),
            "Network loaded successfully"
        );
        Ok(network)
    }
}

impl NetworkModel for DenseNetwork {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_width(&self) -> usize {
        self.input_width
    }

    fn score(&self, features: &[f32]) -> Result<f32, PipelineError> {
        check_width(&self.name, self.input_width, features)?;

        let mut activations = Array1::from(features.to_vec());
        for layer in &self.layers {
            let act = layer.activation;
            activations = (activations.dot(&layer.weights) + &layer.bias).mapv(|x| act.apply(x));
        }

        let score = activations[0];
        if !score.is_finite() {
            return Err(PipelineError::inference(&self.name, "network produced a non-finite score"));
        }
        Ok(score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact() -> NetworkArtifact {
        serde_json::from_str(
            r#"{
                "input_width": 2,
                "layers": [
                    {"weights": [[1.0, -1.0], [1.0, 1.0]], "bias": [0.0, 0.5], "activation": "relu"},
                    {"weights": [[1.0], [2.0]], "bias": [-1.0], "activation": "linear"}
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_forward_pass() {
        let network = DenseNetwork::new("nn", artifact()).unwrap();
        // hidden = relu([1+2, -1+2+0.5]) = [3, 1.5]; out = 3 + 3 - 1
        let score = network.score(&[1.0, 2.0]).unwrap();
        assert!((score - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_sigmoid_output_is_probability() {
        let mut artifact = artifact();
        artifact.layers[1].activation = Activation::Sigmoid;
        let network = DenseNetwork::new("nn", artifact).unwrap();

        let score = network.score(&[-4.0, 1.0]).unwrap();
        assert!(score > 0.0 && score < 1.0);
    }

    #[test]
    fn test_wrong_width_is_shape_error() {
        let network = DenseNetwork::new("nn", artifact()).unwrap();
        let err = network.score(&[1.0, 2.0, 3.0]).unwrap_err();

        assert_eq!(err, PipelineError::shape("nn", 2, 3));
    }

    #[test]
    fn test_rejects_broken_layer_chain() {
        let mut artifact = artifact();
        artifact.layers[1].weights = vec![vec![1.0], vec![2.0], vec![3.0]];
        assert!(DenseNetwork::new("nn", artifact).is_err());
    }

    #[test]
    fn test_rejects_multi_output() {
        let mut artifact = artifact();
        artifact.layers.pop();
        assert!(DenseNetwork::new("nn", artifact).is_err());
    }
}
