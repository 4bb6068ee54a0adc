//! Numeric vectors flowing between the preprocessing transform and the models.

use serde::Serialize;
use std::ops::Deref;

/// Output of the fitted preprocessing transform, in fitted column order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureVector(Vec<f32>);

impl FeatureVector {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }
}

impl Deref for FeatureVector {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        &self.0
    }
}

/// Feature columns followed by exactly one trailing network score.
///
/// The only constructor is [`AugmentedVector::stack`], so the hybrid
/// classifier always sees the layout it was trained on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AugmentedVector(Vec<f32>);

impl AugmentedVector {
    /// Append the network output after the feature columns.
    pub fn stack(features: &FeatureVector, network_score: f32) -> Self {
        let mut values = Vec::with_capacity(features.len() + 1);
        values.extend_from_slice(features.as_slice());
        values.push(network_score);
        Self(values)
    }

    /// The appended network score.
    pub fn network_score(&self) -> f32 {
        // stack() always pushes one value
        self.0[self.0.len() - 1]
    }

    /// The original feature columns without the stacked score.
    pub fn features(&self) -> &[f32] {
        &self.0[..self.0.len() - 1]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

impl Deref for AugmentedVector {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        &self.0
    }
}
