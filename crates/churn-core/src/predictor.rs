//! The inference step: record → feature row → model → prediction.

use crate::model::{InferenceError, SharedModel};
use crate::schema::{model_columns, ChurnFeatureRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Probabilities this far outside `[0, 1]` are treated as a model fault.
const PROBABILITY_TOLERANCE: f64 = 1e-9;

/// Response body for a successful prediction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// 1 if the model predicts churn, 0 otherwise
    pub churn_prediction: u8,
    /// Positive-class probability, rounded to 4 decimal places
    pub churn_probability: f64,
}

/// The model failed the startup checks.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StartupError {
    #[error("model must have exactly two distinct classes, found {0:?}")]
    NotBinary(Vec<i64>),

    #[error("positive class {positive} is not one of the model classes {classes:?}")]
    UnknownPositiveClass { positive: i64, classes: Vec<i64> },

    #[error("model columns do not match the feature schema (missing: {missing:?}, unexpected: {unexpected:?})")]
    ColumnMismatch {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },
}

/// Round to 4 decimal places using the exact binary value of `p`, so
/// `0.50005` (stored just below the tie) becomes `0.5`.
pub fn round_probability(p: f64) -> f64 {
    format!("{:.4}", p).parse().unwrap_or(p)
}

/// A model that passed the startup checks, plus the resolved class layout.
pub struct Predictor {
    model: SharedModel,
    positive_class: i64,
    positive_index: usize,
}

impl std::fmt::Debug for Predictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Predictor")
            .field("classes", &self.model.classes())
            .field("positive_class", &self.positive_class)
            .field("positive_index", &self.positive_index)
            .finish()
    }
}

impl Predictor {
    /// Check the model's class layout and columns against the schema.
    pub fn new(model: SharedModel, positive_class: i64) -> Result<Self, StartupError> {
        let classes = model.classes().to_vec();
        if classes.len() != 2 || classes[0] == classes[1] {
            return Err(StartupError::NotBinary(classes));
        }
        let positive_index = classes
            .iter()
            .position(|c| *c == positive_class)
            .ok_or_else(|| StartupError::UnknownPositiveClass {
                positive: positive_class,
                classes: classes.clone(),
            })?;

        let expected: BTreeSet<&str> = model_columns().collect();
        let actual: BTreeSet<&str> = model.columns().iter().map(String::as_str).collect();
        if expected != actual {
            return Err(StartupError::ColumnMismatch {
                missing: expected.difference(&actual).map(|s| s.to_string()).collect(),
                unexpected: actual.difference(&expected).map(|s| s.to_string()).collect(),
            });
        }

        Ok(Self {
            model,
            positive_class,
            positive_index,
        })
    }

    pub fn classes(&self) -> &[i64] {
        self.model.classes()
    }

    pub fn positive_class(&self) -> i64 {
        self.positive_class
    }

    pub fn positive_index(&self) -> usize {
        self.positive_index
    }

    /// Run one record through the model.
    pub fn handle(&self, record: &ChurnFeatureRecord) -> Result<PredictionResult, InferenceError> {
        let row = record.to_feature_row();

        let proba = self.model.predict_probability(&row)?;
        let expected = self.model.classes().len();
        if proba.len() != expected {
            return Err(InferenceError::ProbabilityShape {
                expected,
                actual: proba.len(),
            });
        }
        for p in &proba {
            if !p.is_finite()
                || *p < -PROBABILITY_TOLERANCE
                || *p > 1.0 + PROBABILITY_TOLERANCE
            {
                return Err(InferenceError::InvalidProbability(*p));
            }
        }

        let label = self.model.predict(&row)?;
        if !self.model.classes().contains(&label) {
            return Err(InferenceError::UnknownLabel(label));
        }

        let positive = proba[self.positive_index].clamp(0.0, 1.0);
        Ok(PredictionResult {
            churn_prediction: u8::from(label == self.positive_class),
            churn_probability: round_probability(positive),
        })
    }
}
