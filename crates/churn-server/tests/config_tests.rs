//! Coverage-focused tests for churn-server: config.rs and rate_limit.rs modules.
//!
//! Exercises config parsing (YAML, TOML), defaults, validation, file loading,
//! example generation and the sliding-window limiter.

use churn_core::{ExtraFieldPolicy, ModelFormat};
use churn_server::config::*;
use churn_server::rate_limit::*;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::{Duration, Instant};

// =============================================================================
// Config defaults
// =============================================================================

#[test]
fn config_default_server() {
    let cfg = Config::default();
    assert_eq!(cfg.server.port, 8000);
    assert_eq!(cfg.server.bind, "127.0.0.1");
    assert_eq!(cfg.server.max_body_bytes, 16 * 1024);
    assert!(cfg.server.metrics_enabled);
}

#[test]
fn config_default_model() {
    let cfg = Config::default();
    assert_eq!(cfg.model.path, PathBuf::from("models/churn_model.json"));
    assert_eq!(cfg.model.format, ModelFormat::Linear);
    assert_eq!(cfg.model.positive_class, 1);
    assert_eq!(cfg.model.classes, vec![0, 1]);
    assert!(cfg.model.inference_timeout().is_none());
}

#[test]
fn config_default_rate_limit_is_ten_per_minute() {
    let cfg = Config::default();
    assert!(cfg.rate_limit.enabled);
    assert_eq!(cfg.rate_limit.requests, 10);
    assert_eq!(cfg.rate_limit.window_secs, 60);
}

#[test]
fn config_default_cors_origins() {
    let cfg = Config::default();
    assert_eq!(
        cfg.cors.allowed_origins,
        vec![
            "http://localhost:5173".to_string(),
            "https://customer-churn-prediction-frontend-two.vercel.app".to_string(),
        ]
    );
    assert!(cfg.cors.allow_credentials);
    assert!(cfg.cors.allowed_methods.iter().any(|m| m == "POST"));
    assert!(cfg.cors.allowed_headers.iter().any(|h| h == "content-type"));
}

#[test]
fn config_default_validation_ignores_extras() {
    assert_eq!(
        Config::default().validation.extra_fields,
        ExtraFieldPolicy::Ignore
    );
}

#[test]
fn config_default_logging() {
    let cfg = Config::default();
    assert_eq!(cfg.logging.level, "info");
    assert_eq!(cfg.logging.format, "text");
    assert!(cfg.logging.timestamps);
}

// =============================================================================
// Parsing
// =============================================================================

#[test]
fn config_yaml_minimal() {
    let cfg = Config::from_yaml("server:\n  port: 9001\n").unwrap();
    assert_eq!(cfg.server.port, 9001);
    assert_eq!(cfg.rate_limit.requests, 10);
}

#[test]
fn config_yaml_invalid() {
    let result = Config::from_yaml("server: [unclosed");
    assert!(matches!(result, Err(ConfigError::ParseError(_))));
}

#[test]
fn config_toml_invalid() {
    let result = Config::from_toml("[server\nport = ");
    assert!(matches!(result, Err(ConfigError::ParseError(_))));
}

#[test]
fn config_yaml_unknown_format_rejected() {
    let result = Config::from_yaml("model:\n  format: pickle\n");
    assert!(result.is_err());
}

// =============================================================================
// Validation
// =============================================================================

fn invalid(cfg: &Config) -> String {
    match cfg.validate() {
        Err(ConfigError::Invalid(msg)) => msg,
        other => panic!("expected invalid config, got {:?}", other),
    }
}

#[test]
fn validate_rejects_zero_port() {
    let mut cfg = Config::default();
    cfg.server.port = 0;
    assert!(invalid(&cfg).contains("server.port"));
}

#[test]
fn validate_rejects_bad_bind() {
    let mut cfg = Config::default();
    cfg.server.bind = "localhost".to_string();
    assert!(invalid(&cfg).contains("server.bind"));
}

#[test]
fn validate_rejects_zero_window_when_enabled() {
    let mut cfg = Config::default();
    cfg.rate_limit.window_secs = 0;
    assert!(invalid(&cfg).contains("window_secs"));

    cfg.rate_limit.enabled = false;
    assert!(cfg.validate().is_ok());
}

#[test]
fn validate_rejects_zero_requests_when_enabled() {
    let mut cfg = Config::default();
    cfg.rate_limit.requests = 0;
    assert!(invalid(&cfg).contains("rate_limit.requests"));
}

#[test]
fn validate_rejects_zero_timeout() {
    let mut cfg = Config::default();
    cfg.model.inference_timeout_ms = Some(0);
    assert!(invalid(&cfg).contains("inference_timeout_ms"));
}

#[test]
fn validate_rejects_malformed_origin() {
    let mut cfg = Config::default();
    cfg.cors.allowed_origins.push("localhost:3000".to_string());
    assert!(invalid(&cfg).contains("localhost:3000"));
}

#[test]
fn validate_rejects_bad_method_and_header() {
    let mut cfg = Config::default();
    cfg.cors.allowed_methods.push("GET POST".to_string());
    assert!(invalid(&cfg).contains("allowed_methods"));

    let mut cfg = Config::default();
    cfg.cors.allowed_headers.push("bad header".to_string());
    assert!(invalid(&cfg).contains("allowed_headers"));
}

#[test]
fn validate_rejects_unknown_log_format() {
    let mut cfg = Config::default();
    cfg.logging.format = "xml".to_string();
    assert!(invalid(&cfg).contains("logging.format"));
}

// =============================================================================
// File loading
// =============================================================================

#[test]
fn config_load_yaml_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("churn.yaml");
    std::fs::write(&path, "rate_limit:\n  requests: 3\n").unwrap();

    let cfg = Config::load(&path).unwrap();
    assert_eq!(cfg.rate_limit.requests, 3);
}

#[test]
fn config_load_toml_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("churn.toml");
    std::fs::write(&path, "[logging]\nformat = \"json\"\n").unwrap();

    let cfg = Config::load(&path).unwrap();
    assert_eq!(cfg.logging.format, "json");
}

#[test]
fn config_load_unknown_extension_tries_yaml_then_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("churn.conf");
    std::fs::write(&path, "[server]\nport = 8123\n").unwrap();

    let cfg = Config::load(&path).unwrap();
    assert_eq!(cfg.server.port, 8123);
}

#[test]
fn config_load_validates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("churn.yaml");
    std::fs::write(&path, "server:\n  port: 0\n").unwrap();

    assert!(matches!(Config::load(&path), Err(ConfigError::Invalid(_))));
}

#[test]
fn config_load_nonexistent_file() {
    let result = Config::load("/nonexistent/churn.yaml");
    match result {
        Err(ConfigError::IoError(path, _)) => {
            assert_eq!(path, PathBuf::from("/nonexistent/churn.yaml"));
        }
        other => panic!("expected IoError, got {:?}", other),
    }
}

// =============================================================================
// Examples
// =============================================================================

#[test]
fn config_example_yaml_is_parseable() {
    let cfg = Config::from_yaml(&Config::example_yaml().unwrap()).unwrap();
    assert_eq!(cfg, Config::example());
    assert!(cfg.validate().is_ok());
}

#[test]
fn config_example_toml_is_parseable() {
    let cfg = Config::from_toml(&Config::example_toml().unwrap()).unwrap();
    assert_eq!(cfg, Config::example());
}

#[test]
fn config_error_display() {
    let err = ConfigError::IoError(PathBuf::from("/tmp/x.yaml"), "denied".into());
    assert_eq!(
        err.to_string(),
        "Failed to read config file /tmp/x.yaml: denied"
    );
    let err = ConfigError::Invalid("server.port must be non-zero".into());
    assert!(err.to_string().starts_with("Invalid config"));
}

// =============================================================================
// Rate limiter
// =============================================================================

#[test]
fn rate_limit_config_from_disabled_settings() {
    let settings = RateLimitSettings {
        enabled: false,
        ..Default::default()
    };
    assert!(!RateLimitConfig::from(&settings).enabled);
}

#[tokio::test]
async fn rate_limiter_window_slides() {
    let limiter = RateLimiter::new(RateLimitConfig::new(2, Duration::from_secs(10)));
    let ip: IpAddr = "192.168.1.10".parse().unwrap();
    let start = Instant::now();

    assert!(limiter.check_at(ip, start).await.is_allowed());
    assert!(limiter
        .check_at(ip, start + Duration::from_secs(5))
        .await
        .is_allowed());
    assert!(!limiter
        .check_at(ip, start + Duration::from_secs(9))
        .await
        .is_allowed());
    // First hit expired, second still counted
    assert!(limiter
        .check_at(ip, start + Duration::from_secs(10))
        .await
        .is_allowed());
    assert!(!limiter
        .check_at(ip, start + Duration::from_secs(14))
        .await
        .is_allowed());
}

#[tokio::test]
async fn rate_limiter_ipv6() {
    let limiter = RateLimiter::new(RateLimitConfig::new(1, Duration::from_secs(60)));
    let ip: IpAddr = "::1".parse().unwrap();

    assert!(limiter.check(ip).await.is_allowed());
    assert!(!limiter.check(ip).await.is_allowed());
    assert_eq!(limiter.client_count().await, 1);
}

#[tokio::test]
async fn rate_limiter_cleanup_keeps_recent() {
    let limiter = RateLimiter::new(RateLimitConfig::new(5, Duration::from_secs(60)));
    let ip: IpAddr = "10.1.1.1".parse().unwrap();
    limiter.check(ip).await;

    limiter.cleanup(Duration::from_secs(3600)).await;
    assert_eq!(limiter.client_count().await, 1);
}

#[test]
fn handle_rate_limit_rejection_with_non_matching() {
    let rejection = warp::reject::not_found();
    assert!(handle_rate_limit_rejection(&rejection).is_none());
}
