//! Structural validation of inbound prediction payloads.
//!
//! Validation runs against the parsed JSON value rather than through serde
//! so that every violation is reported at once, each with the offending
//! field's location.

use crate::schema::{ChurnFeatureRecord, FieldKind, FEATURE_FIELDS};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// What to do with keys that are not part of the schema.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtraFieldPolicy {
    /// Drop unknown keys silently
    #[default]
    Ignore,
    /// Report each unknown key as a violation
    Reject,
}

/// Machine-readable violation category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    JsonInvalid,
    ModelAttributesType,
    Missing,
    FloatType,
    IntType,
    IntFromFloat,
    BoolType,
    ExtraForbidden,
}

impl ViolationKind {
    pub fn message(&self) -> &'static str {
        match self {
            ViolationKind::JsonInvalid => "JSON decode error",
            ViolationKind::ModelAttributesType => {
                "Input should be a valid dictionary or object to extract fields from"
            }
            ViolationKind::Missing => "Field required",
            ViolationKind::FloatType => "Input should be a valid number",
            ViolationKind::IntType => "Input should be a valid integer",
            ViolationKind::IntFromFloat => {
                "Input should be a valid integer, got a number with a fractional part"
            }
            ViolationKind::BoolType => "Input should be a valid boolean",
            ViolationKind::ExtraForbidden => "Extra inputs are not permitted",
        }
    }
}

/// A single schema violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldViolation {
    /// Location, starting with `"body"`
    pub loc: Vec<String>,
    pub msg: String,
    #[serde(rename = "type")]
    pub kind: ViolationKind,
}

impl FieldViolation {
    pub fn body(kind: ViolationKind) -> Self {
        Self {
            loc: vec!["body".to_string()],
            msg: kind.message().to_string(),
            kind,
        }
    }

    pub fn field(field: &str, kind: ViolationKind) -> Self {
        Self {
            loc: vec!["body".to_string(), field.to_string()],
            msg: kind.message().to_string(),
            kind,
        }
    }

    /// Field name the violation refers to, if any.
    pub fn field_name(&self) -> Option<&str> {
        self.loc.get(1).map(String::as_str)
    }
}

/// The payload did not satisfy the feature schema.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Invalid prediction payload: {}", summarize(.violations))]
pub struct ValidationError {
    pub violations: Vec<FieldViolation>,
}

impl ValidationError {
    pub fn new(violations: Vec<FieldViolation>) -> Self {
        Self { violations }
    }

    /// True if any violation points at `field`.
    pub fn mentions(&self, field: &str) -> bool {
        self.violations
            .iter()
            .any(|v| v.field_name() == Some(field))
    }
}

fn summarize(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| format!("{} ({})", v.loc.join("."), v.msg))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse raw bytes and validate them.
pub fn validate_bytes(
    body: &[u8],
    policy: ExtraFieldPolicy,
) -> Result<ChurnFeatureRecord, ValidationError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|_| ValidationError::new(vec![FieldViolation::body(ViolationKind::JsonInvalid)]))?;
    validate_payload(&value, policy)
}

/// Validate a parsed JSON payload and build the typed record.
pub fn validate_payload(
    payload: &Value,
    policy: ExtraFieldPolicy,
) -> Result<ChurnFeatureRecord, ValidationError> {
    let object = payload.as_object().ok_or_else(|| {
        ValidationError::new(vec![FieldViolation::body(
            ViolationKind::ModelAttributesType,
        )])
    })?;

    let mut violations = Vec::new();
    let mut normalized = Map::with_capacity(FEATURE_FIELDS.len());

    for field in FEATURE_FIELDS {
        match object.get(field.wire) {
            None => violations.push(FieldViolation::field(field.wire, ViolationKind::Missing)),
            Some(value) => match check_value(field.kind, value) {
                Ok(v) => {
                    normalized.insert(field.wire.to_string(), v);
                }
                Err(kind) => violations.push(FieldViolation::field(field.wire, kind)),
            },
        }
    }

    if policy == ExtraFieldPolicy::Reject {
        let mut extras: Vec<&String> = object
            .keys()
            .filter(|k| crate::schema::field_by_wire(k).is_none())
            .collect();
        extras.sort();
        for key in extras {
            violations.push(FieldViolation::field(key, ViolationKind::ExtraForbidden));
        }
    }

    if !violations.is_empty() {
        return Err(ValidationError::new(violations));
    }

    serde_json::from_value(Value::Object(normalized)).map_err(|e| {
        tracing::error!("Validated payload failed to deserialize: {}", e);
        ValidationError::new(vec![FieldViolation::body(
            ViolationKind::ModelAttributesType,
        )])
    })
}

/// Check one value against its kind, returning the normalized value.
fn check_value(kind: FieldKind, value: &Value) -> Result<Value, ViolationKind> {
    match kind {
        FieldKind::Float => match value {
            Value::Number(n) => n
                .as_f64()
                .filter(|v| v.is_finite())
                .map(Value::from)
                .ok_or(ViolationKind::FloatType),
            _ => Err(ViolationKind::FloatType),
        },
        FieldKind::Integer => match value {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    return Ok(Value::from(i));
                }
                if n.is_u64() {
                    // Larger than i64::MAX
                    return Err(ViolationKind::IntType);
                }
                let f = n.as_f64().ok_or(ViolationKind::IntType)?;
                if f.fract() != 0.0 {
                    return Err(ViolationKind::IntFromFloat);
                }
                if f < i64::MIN as f64 || f >= i64::MAX as f64 {
                    return Err(ViolationKind::IntType);
                }
                Ok(Value::from(f as i64))
            }
            _ => Err(ViolationKind::IntType),
        },
        FieldKind::Boolean => match value {
            Value::Bool(b) => Ok(Value::Bool(*b)),
            _ => Err(ViolationKind::BoolType),
        },
    }
}
