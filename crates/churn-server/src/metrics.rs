//! Prometheus metrics for the prediction endpoint.

use prometheus::{Counter, CounterVec, Histogram, HistogramOpts, Opts, Registry};
use std::sync::Arc;

/// How a `/predict` request ended, used as the `outcome` label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    ValidationError,
    InferenceError,
    Timeout,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Ok => "ok",
            Outcome::ValidationError => "validation_error",
            Outcome::InferenceError => "inference_error",
            Outcome::Timeout => "timeout",
        }
    }
}

/// Server-owned Prometheus metrics.
#[derive(Clone)]
pub struct ServerMetrics {
    registry: Arc<Registry>,
    /// Prediction requests by outcome.
    pub predictions_total: CounterVec,
    /// Requests refused by the rate limiter.
    pub rate_limited_total: Counter,
    /// Model call latency in seconds.
    pub inference_duration_seconds: Histogram,
    /// Returned `churn_prediction` values.
    pub predicted_class_total: CounterVec,
}

impl ServerMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let predictions_total = CounterVec::new(
            Opts::new("churn_predictions_total", "Prediction requests by outcome"),
            &["outcome"],
        )
        .expect("failed to create predictions_total counter");

        let rate_limited_total = Counter::new(
            "churn_rate_limited_total",
            "Requests rejected by the rate limiter",
        )
        .expect("failed to create rate_limited_total counter");

        let inference_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "churn_inference_duration_seconds",
                "Model inference duration in seconds",
            )
            .buckets(vec![
                0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0,
            ]),
        )
        .expect("failed to create inference_duration_seconds histogram");

        let predicted_class_total = CounterVec::new(
            Opts::new(
                "churn_predicted_class_total",
                "Predictions returned by churn_prediction value",
            ),
            &["class"],
        )
        .expect("failed to create predicted_class_total counter");

        registry
            .register(Box::new(predictions_total.clone()))
            .expect("failed to register predictions_total");
        registry
            .register(Box::new(rate_limited_total.clone()))
            .expect("failed to register rate_limited_total");
        registry
            .register(Box::new(inference_duration_seconds.clone()))
            .expect("failed to register inference_duration_seconds");
        registry
            .register(Box::new(predicted_class_total.clone()))
            .expect("failed to register predicted_class_total");

        Self {
            registry: Arc::new(registry),
            predictions_total,
            rate_limited_total,
            inference_duration_seconds,
            predicted_class_total,
        }
    }

    /// Count a finished prediction request.
    pub fn record_outcome(&self, outcome: Outcome) {
        self.predictions_total
            .with_label_values(&[outcome.as_str()])
            .inc();
    }

    /// Record a successful model call.
    pub fn record_inference(&self, churn_prediction: u8, duration_secs: f64) {
        self.inference_duration_seconds.observe(duration_secs);
        self.predicted_class_total
            .with_label_values(&[&churn_prediction.to_string()])
            .inc();
    }

    /// Get Prometheus text output.
    pub fn gather(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if encoder.encode(&metric_families, &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ServerMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerMetrics").finish_non_exhaustive()
    }
}
