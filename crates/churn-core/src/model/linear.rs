//! Standard-scaler + logistic-regression pipeline stored as JSON.

use super::{read_artifact, ChurnModel, InferenceError, ModelError};
use crate::schema::FeatureRow;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

const ESTIMATOR: &str = "logistic_regression";

/// Per-column standardisation: `(x - mean) / scale`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

/// A fitted binary logistic regression with optional scaling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinearPipeline {
    pub estimator: String,
    pub classes: Vec<i64>,
    pub columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scaler: Option<StandardScaler>,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl LinearPipeline {
    /// Load and check an artifact file.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let content = read_artifact(path)?;
        let pipeline: Self = serde_json::from_str(&content).map_err(|e| ModelError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        pipeline.check()?;
        Ok(pipeline)
    }

    /// Parse and check an artifact from a JSON string.
    pub fn from_json(content: &str) -> Result<Self, ModelError> {
        let pipeline: Self =
            serde_json::from_str(content).map_err(|e| ModelError::Invalid(e.to_string()))?;
        pipeline.check()?;
        Ok(pipeline)
    }

    /// Structural checks that make inference infallible apart from row shape.
    pub fn check(&self) -> Result<(), ModelError> {
        if self.estimator != ESTIMATOR {
            return Err(ModelError::Invalid(format!(
                "unsupported estimator '{}', expected '{}'",
                self.estimator, ESTIMATOR
            )));
        }
        if self.classes.len() != 2 || self.classes[0] == self.classes[1] {
            return Err(ModelError::Invalid(format!(
                "expected two distinct classes, got {:?}",
                self.classes
            )));
        }

        let n = self.columns.len();
        if n == 0 {
            return Err(ModelError::Invalid("no columns".into()));
        }
        let unique: HashSet<&str> = self.columns.iter().map(String::as_str).collect();
        if unique.len() != n {
            return Err(ModelError::Invalid("duplicate column names".into()));
        }
        if self.coefficients.len() != n {
            return Err(ModelError::Invalid(format!(
                "{} coefficients for {} columns",
                self.coefficients.len(),
                n
            )));
        }
        if !self.intercept.is_finite() || self.coefficients.iter().any(|c| !c.is_finite()) {
            return Err(ModelError::Invalid("non-finite coefficient".into()));
        }

        if let Some(scaler) = &self.scaler {
            if scaler.mean.len() != n || scaler.scale.len() != n {
                return Err(ModelError::Invalid(format!(
                    "scaler has {} means and {} scales for {} columns",
                    scaler.mean.len(),
                    scaler.scale.len(),
                    n
                )));
            }
            if scaler.mean.iter().any(|m| !m.is_finite()) {
                return Err(ModelError::Invalid("non-finite scaler mean".into()));
            }
            if scaler.scale.iter().any(|s| !s.is_finite() || *s == 0.0) {
                return Err(ModelError::Invalid(
                    "scaler scale must be finite and non-zero".into(),
                ));
            }
        }
        Ok(())
    }

    /// Align the row to the trained column order.
    fn align(&self, row: &FeatureRow) -> Result<Vec<f64>, InferenceError> {
        if let Some(extra) = row
            .columns()
            .find(|c| !self.columns.iter().any(|m| m.as_str() == *c))
        {
            return Err(InferenceError::UnexpectedColumn(extra.to_string()));
        }
        self.columns
            .iter()
            .map(|c| {
                row.get(c)
                    .map(|v| v.as_f64())
                    .ok_or_else(|| InferenceError::MissingColumn(c.clone()))
            })
            .collect()
    }

    /// Linear decision value for a row.
    pub fn decision_function(&self, row: &FeatureRow) -> Result<f64, InferenceError> {
        let x = self.align(row)?;
        let mut z = self.intercept;
        for (i, (value, coef)) in x.iter().zip(&self.coefficients).enumerate() {
            let scaled = match &self.scaler {
                Some(s) => (value - s.mean[i]) / s.scale[i],
                None => *value,
            };
            z += coef * scaled;
        }
        if !z.is_finite() {
            return Err(InferenceError::Backend(format!(
                "non-finite decision value {}",
                z
            )));
        }
        Ok(z)
    }
}

/// Logistic function without overflow for large |z|.
fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

impl ChurnModel for LinearPipeline {
    fn classes(&self) -> &[i64] {
        &self.classes
    }

    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn predict(&self, row: &FeatureRow) -> Result<i64, InferenceError> {
        let z = self.decision_function(row)?;
        Ok(if z > 0.0 {
            self.classes[1]
        } else {
            self.classes[0]
        })
    }

    fn predict_probability(&self, row: &FeatureRow) -> Result<Vec<f64>, InferenceError> {
        let p = sigmoid(self.decision_function(row)?);
        Ok(vec![1.0 - p, p])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FeatureValue;

    fn two_column_model() -> LinearPipeline {
        LinearPipeline {
            estimator: ESTIMATOR.into(),
            classes: vec![0, 1],
            columns: vec!["a".into(), "b c".into()],
            scaler: Some(StandardScaler {
                mean: vec![1.0, 0.0],
                scale: vec![2.0, 1.0],
            }),
            coefficients: vec![1.0, -1.0],
            intercept: 0.5,
        }
    }

    fn row(a: f64, b: bool) -> FeatureRow {
        let mut row = FeatureRow::default();
        row.insert("a", FeatureValue::Float(a));
        row.insert("b c", FeatureValue::Boolean(b));
        row
    }

    #[test]
    fn test_sigmoid_bounds() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(1000.0) <= 1.0);
        assert!(sigmoid(-1000.0) >= 0.0);
        assert!(sigmoid(-1000.0).is_finite());
    }

    #[test]
    fn test_decision_function() {
        let model = two_column_model();
        // (3 - 1) / 2 * 1.0 + (1 - 0) / 1 * -1.0 + 0.5 = 0.5
        let z = model.decision_function(&row(3.0, true)).unwrap();
        assert!((z - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_predict_matches_probability() {
        let model = two_column_model();
        for (a, b) in [(3.0, true), (-5.0, true), (10.0, false), (1.0, false)] {
            let r = row(a, b);
            let proba = model.predict_probability(&r).unwrap();
            let label = model.predict(&r).unwrap();
            assert!((proba[0] + proba[1] - 1.0).abs() < 1e-12);
            assert_eq!(label == 1, proba[1] > 0.5);
        }
    }

    #[test]
    fn test_missing_column() {
        let model = two_column_model();
        let mut r = FeatureRow::default();
        r.insert("a", FeatureValue::Float(1.0));
        assert_eq!(
            model.predict(&r),
            Err(InferenceError::MissingColumn("b c".into()))
        );
    }

    #[test]
    fn test_unexpected_column() {
        let model = two_column_model();
        let mut r = row(1.0, true);
        r.insert("b_c", FeatureValue::Boolean(true));
        assert_eq!(
            model.predict_probability(&r),
            Err(InferenceError::UnexpectedColumn("b_c".into()))
        );
    }

    #[test]
    fn test_check_rejects_bad_shapes() {
        let mut m = two_column_model();
        m.coefficients.pop();
        assert!(m.check().is_err());

        let mut m = two_column_model();
        m.classes = vec![1, 1];
        assert!(m.check().is_err());

        let mut m = two_column_model();
        if let Some(s) = m.scaler.as_mut() {
            s.scale[0] = 0.0;
        }
        assert!(m.check().is_err());

        let mut m = two_column_model();
        m.columns[1] = "a".into();
        assert!(m.check().is_err());

        let mut m = two_column_model();
        m.estimator = "random_forest".into();
        assert!(m.check().is_err());
    }

    #[test]
    fn test_from_json_rejects_unknown_keys() {
        let json = r#"{
            "estimator": "logistic_regression",
            "classes": [0, 1],
            "columns": ["a"],
            "coefficients": [1.0],
            "intercept": 0.0,
            "threshold": 0.3
        }"#;
        assert!(matches!(
            LinearPipeline::from_json(json),
            Err(ModelError::Invalid(_))
        ));
    }

    #[test]
    fn test_from_json_without_scaler() {
        let json = r#"{
            "estimator": "logistic_regression",
            "classes": [0, 1],
            "columns": ["a"],
            "coefficients": [2.0],
            "intercept": -1.0
        }"#;
        let model = LinearPipeline::from_json(json).unwrap();
        let mut r = FeatureRow::default();
        r.insert("a", FeatureValue::Integer(1));
        assert_eq!(model.predict(&r).unwrap(), 1);
    }
}
