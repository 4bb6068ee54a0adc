//! Type definitions for the attrition pipeline

pub mod record;
pub mod vector;
pub mod verdict;

pub use record::{FieldValue, PredictionRequest, RawRecord};
pub use vector::{AugmentedVector, FeatureVector};
pub use verdict::{Attrition, FailureEvent, PredictionResponse, Verdict, VerdictEvent};
