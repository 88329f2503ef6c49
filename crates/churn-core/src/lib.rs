//! # Churn Core
//!
//! Request contract and inference for the customer churn model.
//!
//! - [`schema`]: the 29-field feature record and its wire → model column mapping
//! - [`validate`]: structural validation of JSON payloads with per-field violations
//! - [`model`]: the [`ChurnModel`] capability trait and artifact loaders
//! - [`predictor`]: startup checks and the record → prediction step
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use churn_core::{load_model, validate_payload, ExtraFieldPolicy, ModelSource, Predictor};
//!
//! let model = load_model(&ModelSource::linear("models/churn_model.json"))?;
//! let predictor = Predictor::new(model, 1)?;
//! let record = validate_payload(&payload, ExtraFieldPolicy::Ignore)?;
//! let result = predictor.handle(&record)?;
//! println!("{}", result.churn_probability);
//! ```

pub mod model;
pub mod predictor;
pub mod schema;
pub mod validate;

pub use model::{
    load_model, ChurnModel, InferenceError, LinearPipeline, ModelError, ModelFormat, ModelSource,
    SharedModel,
};
pub use predictor::{round_probability, PredictionResult, Predictor, StartupError};
pub use schema::{
    ChurnFeatureRecord, FeatureField, FeatureRow, FeatureValue, FieldKind, FEATURE_COUNT,
    FEATURE_FIELDS,
};
pub use validate::{
    validate_bytes, validate_payload, ExtraFieldPolicy, FieldViolation, ValidationError,
    ViolationKind,
};
