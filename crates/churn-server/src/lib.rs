//! Churn server library - testable functions and modules
//!
//! The binary is a thin `clap` front end over these modules.

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod rate_limit;

use anyhow::{Context, Result};
use churn_core::{load_model, validate_payload, PredictionResult, Predictor};
use std::path::Path;
use std::sync::Arc;

use crate::config::{Config, ModelConfig};

/// Load the artifact and run the startup checks. Any error is fatal.
pub fn load_predictor(model: &ModelConfig) -> Result<Arc<Predictor>> {
    let loaded = load_model(&model.source())
        .with_context(|| format!("failed to load model from {}", model.path.display()))?;
    let predictor = Predictor::new(loaded, model.positive_class)
        .context("model failed startup checks")?;
    tracing::info!(
        path = %model.path.display(),
        format = %model.format,
        classes = ?predictor.classes(),
        positive_class = predictor.positive_class(),
        "Model ready"
    );
    Ok(Arc::new(predictor))
}

/// Validate a JSON record file and predict it without starting the server.
pub fn predict_file(config: &Config, predictor: &Predictor, input: &Path) -> Result<PredictionResult> {
    let content = std::fs::read_to_string(input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    let payload: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("{} is not valid JSON", input.display()))?;
    let record = validate_payload(&payload, config.validation.extra_fields)?;
    Ok(predictor.handle(&record)?)
}
