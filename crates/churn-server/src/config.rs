//! Configuration file support for the churn server
//!
//! Supports both YAML and TOML configuration files.
//!
//! # Example YAML configuration:
//! ```yaml
//! server:
//!   bind: "0.0.0.0"
//!   port: 8000
//!
//! model:
//!   path: /app/models/churn_model.json
//!   format: linear
//!   positive_class: 1
//!
//! rate_limit:
//!   requests: 10
//!   window_secs: 60
//!
//! cors:
//!   allowed_origins:
//!     - "http://localhost:5173"
//!
//! logging:
//!   level: info
//!   format: json
//! ```

use churn_core::{ExtraFieldPolicy, ModelFormat, ModelSource};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Origins the browser frontend is served from.
pub const DEFAULT_ALLOWED_ORIGINS: [&str; 2] = [
    "http://localhost:5173",
    "https://customer-churn-prediction-frontend-two.vercel.app",
];

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,

    /// Model artifact configuration
    pub model: ModelConfig,

    /// Per-client rate limiting
    pub rate_limit: RateLimitSettings,

    /// CORS policy
    pub cors: CorsConfig,

    /// Payload validation
    pub validation: ValidationConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub bind: String,

    /// Server port
    pub port: u16,

    /// Largest accepted request body in bytes
    pub max_body_bytes: u64,

    /// Expose `/metrics`
    pub metrics_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8000,
            max_body_bytes: 16 * 1024,
            metrics_enabled: true,
        }
    }
}

/// Model artifact configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Path to the model artifact
    pub path: PathBuf,

    /// Artifact format (linear, onnx)
    pub format: ModelFormat,

    /// Class label that means "churned"
    pub positive_class: i64,

    /// Class labels in probability order, for formats that do not store them
    pub classes: Vec<i64>,

    /// Upper bound on a single inference call, in milliseconds
    pub inference_timeout_ms: Option<u64>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("models/churn_model.json"),
            format: ModelFormat::Linear,
            positive_class: 1,
            classes: vec![0, 1],
            inference_timeout_ms: None,
        }
    }
}

impl ModelConfig {
    pub fn source(&self) -> ModelSource {
        ModelSource {
            path: self.path.clone(),
            format: self.format,
            classes: self.classes.clone(),
        }
    }

    pub fn inference_timeout(&self) -> Option<Duration> {
        self.inference_timeout_ms.map(Duration::from_millis)
    }
}

/// Rate limit configuration as written in the config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Whether rate limiting is enabled
    pub enabled: bool,

    /// Requests allowed per client per window
    pub requests: u32,

    /// Window length in seconds
    pub window_secs: u64,

    /// Maximum number of tracked client addresses
    pub max_tracked_ips: usize,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            requests: 10,
            window_secs: 60,
            max_tracked_ips: 10_000,
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    /// Preflight cache lifetime in seconds
    pub max_age_secs: Option<u64>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: DEFAULT_ALLOWED_ORIGINS.iter().map(|s| s.to_string()).collect(),
            allow_credentials: true,
            allowed_methods: ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            allowed_headers: [
                "accept",
                "accept-language",
                "authorization",
                "cache-control",
                "content-language",
                "content-type",
                "origin",
                "x-requested-with",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            max_age_secs: Some(600),
        }
    }
}

/// Payload validation configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Unknown keys in the request body (ignore, reject)
    pub extra_fields: ExtraFieldPolicy,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,

    /// Include timestamps
    pub timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
            timestamps: true,
        }
    }
}

impl Config {
    /// Load configuration from a file (YAML or TOML, auto-detected by extension)
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e.to_string()))?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        let config = match extension.as_str() {
            "yaml" | "yml" => Self::from_yaml(&content)?,
            "toml" => Self::from_toml(&content)?,
            _ => {
                // Try YAML first, then TOML
                Self::from_yaml(&content).or_else(|_| Self::from_toml(&content))?
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Parse configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Reject values the server cannot start with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port must be non-zero".into()));
        }
        if self.server.bind.parse::<std::net::IpAddr>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "server.bind '{}' is not an IP address",
                self.server.bind
            )));
        }
        if self.server.max_body_bytes == 0 {
            return Err(ConfigError::Invalid(
                "server.max_body_bytes must be non-zero".into(),
            ));
        }
        if self.rate_limit.enabled {
            if self.rate_limit.requests == 0 {
                return Err(ConfigError::Invalid(
                    "rate_limit.requests must be non-zero when enabled".into(),
                ));
            }
            if self.rate_limit.window_secs == 0 {
                return Err(ConfigError::Invalid(
                    "rate_limit.window_secs must be non-zero when enabled".into(),
                ));
            }
        }
        if self.model.inference_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "model.inference_timeout_ms must be non-zero".into(),
            ));
        }
        for origin in &self.cors.allowed_origins {
            if !is_valid_origin(origin) {
                return Err(ConfigError::Invalid(format!(
                    "cors.allowed_origins entry '{}' is not a scheme://host[:port] origin",
                    origin
                )));
            }
        }
        for method in &self.cors.allowed_methods {
            if warp::http::Method::from_bytes(method.as_bytes()).is_err() {
                return Err(ConfigError::Invalid(format!(
                    "cors.allowed_methods entry '{}' is not an HTTP method",
                    method
                )));
            }
        }
        for header in &self.cors.allowed_headers {
            if warp::http::header::HeaderName::from_bytes(header.as_bytes()).is_err() {
                return Err(ConfigError::Invalid(format!(
                    "cors.allowed_headers entry '{}' is not a header name",
                    header
                )));
            }
        }
        match self.logging.format.as_str() {
            "text" | "json" => {}
            other => {
                return Err(ConfigError::Invalid(format!(
                    "logging.format must be 'text' or 'json', got '{}'",
                    other
                )))
            }
        }
        Ok(())
    }

    /// Create an example configuration
    pub fn example() -> Self {
        Self {
            server: ServerConfig {
                bind: "0.0.0.0".to_string(),
                port: 8000,
                ..Default::default()
            },
            model: ModelConfig {
                path: PathBuf::from("/app/models/churn_model.json"),
                inference_timeout_ms: Some(2_000),
                ..Default::default()
            },
            rate_limit: RateLimitSettings::default(),
            cors: CorsConfig::default(),
            validation: ValidationConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "json".to_string(),
                timestamps: true,
            },
        }
    }

    /// Generate example YAML configuration
    pub fn example_yaml() -> Result<String, ConfigError> {
        serde_yaml::to_string(&Self::example())
            .map_err(|e| ConfigError::SerializeError(e.to_string()))
    }

    /// Generate example TOML configuration
    pub fn example_toml() -> Result<String, ConfigError> {
        toml::to_string_pretty(&Self::example())
            .map_err(|e| ConfigError::SerializeError(e.to_string()))
    }
}

/// `scheme://host[:port]` with no path, query or fragment.
fn is_valid_origin(origin: &str) -> bool {
    let Ok(uri) = origin.parse::<warp::http::Uri>() else {
        return false;
    };
    let scheme_ok = matches!(uri.scheme_str(), Some("http") | Some("https"));
    let has_host = uri.host().is_some_and(|h| !h.is_empty());
    let bare = uri.query().is_none() && matches!(uri.path(), "" | "/") && !origin.ends_with('/');
    scheme_ok && has_host && bare
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    IoError(PathBuf, String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Failed to serialize config: {0}")]
    SerializeError(String),
}
