//! Gradient-boosted tree ensemble evaluated from a JSON tree dump.
//!
//! Splits follow the boosted-tree convention: go to `yes` when
//! `x < split_condition`, to `no` otherwise, and to `missing` for NaN.
//! The margin is `logit(base_score) + sum(leaves)` and the probability of
//! the "leaves" class is its sigmoid.

use crate::error::PipelineError;
use crate::models::{check_width, Classification, StackedClassifier};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// A node in a serialized tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeSpec {
    Split {
        split: usize,
        split_condition: f32,
        yes: usize,
        no: usize,
        #[serde(default)]
        missing: Option<usize>,
    },
    Leaf {
        leaf: f32,
    },
}

/// One tree; node 0 is the root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeSpec {
    pub nodes: Vec<NodeSpec>,
}

/// Serialized binary:logistic ensemble.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleArtifact {
    pub num_features: usize,
    #[serde(default = "default_base_score")]
    pub base_score: f64,
    /// Probability at or above which the label is 1
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    pub trees: Vec<TreeSpec>,
}

fn default_base_score() -> f64 {
    0.5
}

fn default_threshold() -> f64 {
    0.5
}

/// Validated tree ensemble.
#[derive(Debug, Clone)]
pub struct TreeEnsemble {
    name: String,
    num_features: usize,
    base_margin: f64,
    threshold: f64,
    trees: Vec<TreeSpec>,
}

impl TreeEnsemble {
    pub fn new(name: &str, artifact: EnsembleArtifact) -> Result<Self> {
        if !(artifact.base_score > 0.0 && artifact.base_score < 1.0) {
            bail!(
                "ensemble '{}' base_score {} must lie strictly between 0 and 1",
                name,
                artifact.base_score
            );
        }
        if !(0.0..=1.0).contains(&artifact.threshold) {
            bail!("ensemble '{}' threshold {} is not a probability", name, artifact.threshold);
        }
        for (index, tree) in artifact.trees.iter().enumerate() {
            validate_tree(tree, artifact.num_features)
                .with_context(|| format!("tree {} of ensemble '{}' is invalid", index, name))?;
        }

        let p = artifact.base_score;
        Ok(Self {
            name: name.to_string(),
            num_features: artifact.num_features,
            base_margin: (p / (1.0 - p)).ln(),
            threshold: artifact.threshold,
            trees: artifact.trees,
        })
    }

    pub fn load<P: AsRef<Path>>(path: P, name: &str) -> Result<Self> {
        let path = path.as_ref();
        info!(model = %name, path = %path.display(), "Loading tree ensemble");

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read ensemble from {:?}", path))?;
        let artifact: EnsembleArtifact = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse ensemble {:?}", path))?;
        let ensemble = Self::new(name, artifact)?;

        info!(
            model = %name,
            trees = ensemble.trees.len(),
            num_features = ensemble.num_features,
            "Tree ensemble loaded successfully"
        );
        Ok(ensemble)
    }

    /// Raw margin before the logistic link.
    pub fn margin(&self, augmented: &[f32]) -> Result<f64, PipelineError> {
        check_width(&self.name, self.num_features, augmented)?;
        let leaves: f64 = self
            .trees
            .iter()
            .map(|tree| leaf_value(tree, augmented) as f64)
            .sum();
        Ok(self.base_margin + leaves)
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }
}

impl StackedClassifier for TreeEnsemble {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_width(&self) -> usize {
        self.num_features
    }

    fn classify(&self, augmented: &[f32]) -> Result<Classification, PipelineError> {
        let margin = self.margin(augmented)?;
        let probability = 1.0 / (1.0 + (-margin).exp());
        Ok(Classification {
            label: u8::from(probability >= self.threshold),
            probability: Some(probability),
        })
    }
}

/// Children must point strictly forward, which rules out cycles and makes
/// traversal always terminate.
fn validate_tree(tree: &TreeSpec, num_features: usize) -> Result<()> {
    if tree.nodes.is_empty() {
        bail!("tree has no nodes");
    }
    let count = tree.nodes.len();
    for (index, node) in tree.nodes.iter().enumerate() {
        if let NodeSpec::Split {
            split,
            yes,
            no,
            missing,
            ..
        } = node
        {
            if *split >= num_features {
                bail!(
                    "node {} splits on feature {} but the ensemble has {} features",
                    index,
                    split,
                    num_features
                );
            }
            for child in [Some(*yes), Some(*no), *missing].into_iter().flatten() {
                if child <= index || child >= count {
                    bail!("node {} has invalid child reference {}", index, child);
                }
            }
        }
    }
    Ok(())
}

fn leaf_value(tree: &TreeSpec, x: &[f32]) -> f32 {
    let mut index = 0;
    loop {
        match &tree.nodes[index] {
            NodeSpec::Leaf { leaf } => return *leaf,
            NodeSpec::Split {
                split,
                split_condition,
                yes,
                no,
                missing,
            } => {
                let value = x[*split];
                index = if value.is_nan() {
                    missing.unwrap_or(*yes)
                } else if value < *split_condition {
                    *yes
                } else {
                    *no
                };
            }
        }
    }
}
