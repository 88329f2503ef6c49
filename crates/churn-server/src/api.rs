//! HTTP surface of the churn server
//!
//! `POST /predict` plus the `/health`, `/ready` and `/metrics` probes. Every
//! error response carries a `{"detail": ...}` body.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};

use churn_core::{
    validate_bytes, ChurnFeatureRecord, ExtraFieldPolicy, InferenceError, ModelFormat,
    PredictionResult, Predictor, FEATURE_COUNT,
};
use serde::Serialize;
use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::{Filter, Rejection, Reply};

use crate::config::{Config, CorsConfig};
use crate::metrics::{Outcome, ServerMetrics};
use crate::rate_limit::{self, RateLimitConfig, RateLimitHeaders, RateLimiter};

/// Process-wide state shared by every request
pub struct AppState {
    pub predictor: Arc<Predictor>,
    pub limiter: Arc<RateLimiter>,
    pub metrics: ServerMetrics,
    pub extra_fields: ExtraFieldPolicy,
    pub inference_timeout: Option<Duration>,
    pub model_format: ModelFormat,
    pub metrics_enabled: bool,
    pub max_body_bytes: u64,
    pub started: Instant,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// Wire a checked predictor into the server settings from `config`
    pub fn from_config(predictor: Arc<Predictor>, config: &Config) -> Self {
        let metrics = ServerMetrics::new();
        let limiter = RateLimiter::new(RateLimitConfig::from(&config.rate_limit))
            .with_limited_counter(metrics.rate_limited_total.clone());
        Self {
            predictor,
            limiter: Arc::new(limiter),
            metrics,
            extra_fields: config.validation.extra_fields,
            inference_timeout: config.model.inference_timeout(),
            model_format: config.model.format,
            metrics_enabled: config.server.metrics_enabled,
            max_body_bytes: config.server.max_body_bytes,
            started: Instant::now(),
        }
    }
}

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
}

#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub status: &'static str,
    pub model_format: String,
    pub classes: Vec<i64>,
    pub positive_class: i64,
    pub feature_count: usize,
}

#[derive(Debug, Serialize)]
struct DetailBody<T: Serialize> {
    detail: T,
}

fn detail_response<T: Serialize>(status: StatusCode, detail: T) -> warp::reply::Response {
    warp::reply::with_status(warp::reply::json(&DetailBody { detail }), status).into_response()
}

// =============================================================================
// API Routes
// =============================================================================

/// Build the complete route tree, including CORS, rejection recovery and
/// request tracing
pub fn api_routes(
    state: SharedState,
    cors: &CorsConfig,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let predict = warp::path("predict")
        .and(warp::path::end())
        .and(warp::post())
        .and(rate_limit::with_rate_limit(state.limiter.clone()))
        .and(warp::body::content_length_limit(state.max_body_bytes))
        .and(warp::body::bytes())
        .and(with_state(state.clone()))
        .and_then(handle_predict);

    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handle_health);

    let ready = warp::path("ready")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handle_ready);

    let metrics = warp::path("metrics")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state))
        .and_then(handle_metrics);

    predict
        .or(health)
        .or(ready)
        .or(metrics)
        .recover(handle_rejection)
        .with(cors_filter(cors))
        .recover(handle_rejection)
        .with(warp::trace::request())
}

/// CORS policy from configuration. Entries must already be validated.
pub fn cors_filter(config: &CorsConfig) -> warp::cors::Builder {
    let cors = warp::cors()
        .allow_origins(config.allowed_origins.iter().map(String::as_str))
        .allow_methods(config.allowed_methods.iter().map(String::as_str))
        .allow_headers(config.allowed_headers.iter().map(String::as_str))
        .allow_credentials(config.allow_credentials);
    match config.max_age_secs {
        Some(secs) => cors.max_age(Duration::from_secs(secs)),
        None => cors,
    }
}

// =============================================================================
// Filters
// =============================================================================

fn with_state(state: SharedState) -> impl Filter<Extract = (SharedState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

// =============================================================================
// Handlers
// =============================================================================

/// Why a validated record produced no prediction
#[derive(Debug)]
enum PredictFailure {
    Inference(InferenceError),
    Aborted(String),
    TimedOut(Duration),
}

async fn handle_predict(
    limits: RateLimitHeaders,
    body: Bytes,
    state: SharedState,
) -> Result<warp::reply::Response, Infallible> {
    let request_id = uuid::Uuid::new_v4();
    let started = Instant::now();

    let record = match validate_bytes(&body, state.extra_fields) {
        Ok(record) => record,
        Err(err) => {
            state.metrics.record_outcome(Outcome::ValidationError);
            tracing::warn!(
                request_id = %request_id,
                violations = err.violations.len(),
                "Rejected prediction payload: {}",
                err
            );
            return Ok(detail_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                &err.violations,
            ));
        }
    };

    let response = match run_inference(&state, record).await {
        Ok((result, elapsed)) => {
            state.metrics.record_outcome(Outcome::Ok);
            state
                .metrics
                .record_inference(result.churn_prediction, elapsed.as_secs_f64());
            tracing::debug!(
                request_id = %request_id,
                churn_prediction = result.churn_prediction,
                churn_probability = result.churn_probability,
                latency_ms = started.elapsed().as_secs_f64() * 1000.0,
                "Prediction served"
            );
            let reply = warp::reply::json(&result);
            let reply = warp::reply::with_header(
                reply,
                "x-ratelimit-remaining",
                limits.remaining.to_string(),
            );
            warp::reply::with_header(
                reply,
                "x-ratelimit-reset",
                limits.reset_after_secs.to_string(),
            )
            .into_response()
        }
        Err(PredictFailure::TimedOut(limit)) => {
            state.metrics.record_outcome(Outcome::Timeout);
            tracing::error!(
                request_id = %request_id,
                timeout_ms = limit.as_millis() as u64,
                "Inference timed out"
            );
            detail_response(StatusCode::GATEWAY_TIMEOUT, "Inference timed out")
        }
        Err(PredictFailure::Inference(e)) => {
            state.metrics.record_outcome(Outcome::InferenceError);
            tracing::error!(request_id = %request_id, error = %e, "Inference failed");
            detail_response(StatusCode::INTERNAL_SERVER_ERROR, "Inference failed")
        }
        Err(PredictFailure::Aborted(reason)) => {
            state.metrics.record_outcome(Outcome::InferenceError);
            tracing::error!(request_id = %request_id, %reason, "Inference task aborted");
            detail_response(StatusCode::INTERNAL_SERVER_ERROR, "Inference failed")
        }
    };

    Ok(warp::reply::with_header(response, "x-request-id", request_id.to_string()).into_response())
}

/// Run the model off the async workers, bounded by the configured timeout
async fn run_inference(
    state: &AppState,
    record: ChurnFeatureRecord,
) -> Result<(PredictionResult, Duration), PredictFailure> {
    let predictor = state.predictor.clone();
    let task = tokio::task::spawn_blocking(move || {
        let start = Instant::now();
        let result = predictor.handle(&record);
        (result, start.elapsed())
    });

    let joined = match state.inference_timeout {
        Some(limit) => match tokio::time::timeout(limit, task).await {
            Ok(joined) => joined,
            Err(_) => return Err(PredictFailure::TimedOut(limit)),
        },
        None => task.await,
    };

    match joined {
        Ok((Ok(result), elapsed)) => Ok((result, elapsed)),
        Ok((Err(e), _)) => Err(PredictFailure::Inference(e)),
        Err(e) => Err(PredictFailure::Aborted(e.to_string())),
    }
}

async fn handle_health(state: SharedState) -> Result<impl Reply, Infallible> {
    Ok(warp::reply::json(&HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.started.elapsed().as_secs(),
    }))
}

async fn handle_ready(state: SharedState) -> Result<impl Reply, Infallible> {
    Ok(warp::reply::json(&ReadyResponse {
        status: "ready",
        model_format: state.model_format.to_string(),
        classes: state.predictor.classes().to_vec(),
        positive_class: state.predictor.positive_class(),
        feature_count: FEATURE_COUNT,
    }))
}

async fn handle_metrics(state: SharedState) -> Result<warp::reply::Response, Rejection> {
    if !state.metrics_enabled {
        return Err(warp::reject::not_found());
    }
    Ok(warp::reply::with_header(
        state.metrics.gather(),
        "content-type",
        "text/plain; version=0.0.4",
    )
    .into_response())
}

// =============================================================================
// Rejections
// =============================================================================

/// Render any rejection as a `{"detail": ...}` response
pub async fn handle_rejection(err: Rejection) -> Result<warp::reply::Response, Infallible> {
    // Check for rate limit rejection first
    if let Some(reply) = rate_limit::handle_rate_limit_rejection(&err) {
        return Ok(reply);
    }

    let (code, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not Found")
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Request payload too large")
    } else if err.find::<warp::reject::LengthRequired>().is_some() {
        (StatusCode::LENGTH_REQUIRED, "Content-Length required")
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
    } else if err.find::<warp::cors::CorsForbidden>().is_some() {
        (StatusCode::FORBIDDEN, "Origin not allowed")
    } else {
        tracing::error!("Unhandled rejection: {:?}", err);
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
    };

    Ok(detail_response(code, message))
}

// =============================================================================
// Tests
// =============================================================================
