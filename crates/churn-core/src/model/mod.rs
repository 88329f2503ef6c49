//! Model capability interface and artifact loading.
//!
//! The rest of the crate only sees [`ChurnModel`]; concrete backends live in
//! submodules and are selected by [`ModelFormat`] at startup.

mod linear;
mod onnx;

pub use linear::{LinearPipeline, StandardScaler};
pub use onnx::OnnxClassifier;

use crate::schema::FeatureRow;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A loaded, read-only binary classifier.
///
/// Implementations must be safe for concurrent reads; no call may mutate
/// observable state.
pub trait ChurnModel: Send + Sync {
    /// Class labels in probability-vector order.
    fn classes(&self) -> &[i64];

    /// Column names the model was trained on.
    fn columns(&self) -> &[String];

    /// Predicted class label for one row.
    fn predict(&self, row: &FeatureRow) -> Result<i64, InferenceError>;

    /// Per-class probabilities for one row, ordered like [`classes`](Self::classes).
    fn predict_probability(&self, row: &FeatureRow) -> Result<Vec<f64>, InferenceError>;
}

/// Shared handle to a loaded model.
pub type SharedModel = Arc<dyn ChurnModel>;

// =============================================================================
// Errors
// =============================================================================

/// Failure while running the model on a row.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InferenceError {
    #[error("feature row is missing model column '{0}'")]
    MissingColumn(String),

    #[error("feature row has column '{0}' unknown to the model")]
    UnexpectedColumn(String),

    #[error("model returned {actual} probabilities, expected {expected}")]
    ProbabilityShape { expected: usize, actual: usize },

    #[error("model returned invalid probability {0}")]
    InvalidProbability(f64),

    #[error("model predicted unknown class label {0}")]
    UnknownLabel(i64),

    #[error("model backend error: {0}")]
    Backend(String),
}

/// Failure while loading a model artifact.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Failed to read model artifact {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse model artifact {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("Invalid model artifact: {0}")]
    Invalid(String),

    #[error("{0}")]
    Unsupported(String),
}

// =============================================================================
// Loading
// =============================================================================

/// On-disk artifact format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFormat {
    /// JSON scaler + logistic regression pipeline
    #[default]
    Linear,
    /// ONNX export (requires the `onnx` feature)
    Onnx,
}

impl std::fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelFormat::Linear => write!(f, "linear"),
            ModelFormat::Onnx => write!(f, "onnx"),
        }
    }
}

/// Where and how to load the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSource {
    pub path: PathBuf,
    pub format: ModelFormat,
    /// Class labels for formats that do not record them (ONNX)
    pub classes: Vec<i64>,
}

impl ModelSource {
    pub fn linear(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            format: ModelFormat::Linear,
            classes: vec![0, 1],
        }
    }
}

/// Load a model artifact. Any failure here must stop the process.
pub fn load_model(source: &ModelSource) -> Result<SharedModel, ModelError> {
    let model: SharedModel = match source.format {
        ModelFormat::Linear => Arc::new(LinearPipeline::load(&source.path)?),
        ModelFormat::Onnx => Arc::new(OnnxClassifier::load(&source.path, source.classes.clone())?),
    };
    tracing::info!(
        path = %source.path.display(),
        format = %source.format,
        classes = ?model.classes(),
        columns = model.columns().len(),
        "Loaded model artifact"
    );
    Ok(model)
}

/// Read an artifact file into memory.
pub(crate) fn read_artifact(path: &Path) -> Result<String, ModelError> {
    std::fs::read_to_string(path).map_err(|source| ModelError::Io {
        path: path.to_path_buf(),
        source,
    })
}
