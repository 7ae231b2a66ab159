//! Observability infrastructure for the prediction service
//!
//! Provides:
//! - Prometheus metrics (prediction and explanation latency, request counts, model info)
//! - Structured JSON logging with tracing

use crate::error::ArtifactLoadWarning;
use crate::models::ModelStatus;
use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge, GaugeVec, Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for prediction latency (in seconds)
const PREDICTION_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
];

/// Permutation importance is allowed to be slow
const EXPLANATION_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ServiceMetricsInner> = OnceLock::new();

struct ServiceMetricsInner {
    prediction_latency_seconds: Histogram,
    explanation_latency_seconds: Histogram,
    predictions_total: IntCounter,
    low_confidence_predictions_total: IntCounter,
    request_errors: IntCounterVec,
    model_loaded: IntGauge,
    model_version_info: GaugeVec,
    schema_features: IntGauge,
}

impl ServiceMetricsInner {
    fn new() -> Self {
        Self {
            prediction_latency_seconds: register_histogram!(
                "price_service_prediction_latency_seconds",
                "Time spent running pipeline inference and confidence estimation",
                PREDICTION_BUCKETS.to_vec()
            )
            .expect("Failed to register prediction_latency_seconds"),

            explanation_latency_seconds: register_histogram!(
                "price_service_explanation_latency_seconds",
                "Time spent computing permutation importance",
                EXPLANATION_BUCKETS.to_vec()
            )
            .expect("Failed to register explanation_latency_seconds"),

            predictions_total: register_int_counter!(
                "price_service_predictions_total",
                "Total number of instance predictions served"
            )
            .expect("Failed to register predictions_total"),

            low_confidence_predictions_total: register_int_counter!(
                "price_service_low_confidence_predictions_total",
                "Predictions whose neighbor confidence fell below the low-confidence threshold"
            )
            .expect("Failed to register low_confidence_predictions_total"),

            request_errors: register_int_counter_vec!(
                "price_service_request_errors_total",
                "Failed prediction and explanation requests by error kind",
                &["operation", "kind"]
            )
            .expect("Failed to register request_errors_total"),

            model_loaded: register_int_gauge!(
                "price_service_model_loaded",
                "Whether a trained pipeline is loaded (1) or not (0)"
            )
            .expect("Failed to register model_loaded"),

            model_version_info: register_gauge_vec!(
                "price_service_model_version_info",
                "Information about the currently loaded pipeline",
                &["version"]
            )
            .expect("Failed to register model_version_info"),

            schema_features: register_int_gauge!(
                "price_service_schema_features",
                "Number of features in the loaded schema, 0 when absent"
            )
            .expect("Failed to register schema_features"),
        }
    }
}

/// Service metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct ServiceMetrics {
    _private: (),
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ServiceMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ServiceMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    /// Record a served prediction batch
    pub fn observe_prediction(&self, latency_secs: f64, n_predictions: usize, n_low_confidence: usize) {
        let inner = self.inner();
        inner.prediction_latency_seconds.observe(latency_secs);
        inner.predictions_total.inc_by(n_predictions as u64);
        inner
            .low_confidence_predictions_total
            .inc_by(n_low_confidence as u64);
    }

    pub fn observe_explanation(&self, latency_secs: f64) {
        self.inner().explanation_latency_seconds.observe(latency_secs);
    }

    /// Count a failed request by operation ("predict", "explain") and error kind
    pub fn inc_request_error(&self, operation: &str, kind: &str) {
        self.inner()
            .request_errors
            .with_label_values(&[operation, kind])
            .inc();
    }

    /// Publish artifact status after a load
    pub fn set_model_status(&self, status: &ModelStatus) {
        let inner = self.inner();
        inner.model_loaded.set(i64::from(status.model_loaded));
        inner.model_version_info.reset();
        if status.model_loaded {
            inner
                .model_version_info
                .with_label_values(&[status.model_version.as_str()])
                .set(1.0);
        }
        inner.schema_features.set(status.n_features.unwrap_or(0) as i64);
    }
}

/// Structured logger for service events
///
/// Consistent JSON-formatted events for startup, artifact loading and
/// served requests.
#[derive(Clone)]
pub struct StructuredLogger {
    service_name: String,
}

impl StructuredLogger {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    pub fn log_startup(&self, version: &str, port: u16) {
        info!(
            event = "service_started",
            service = %self.service_name,
            service_version = %version,
            port = port,
            "Price prediction service started"
        );
    }

    /// Log the outcome of an artifact load
    pub fn log_artifacts_loaded(&self, status: &ModelStatus, warnings: &[ArtifactLoadWarning]) {
        for warning in warnings {
            warn!(
                event = "artifact_load_failed",
                service = %self.service_name,
                artifact = warning.artifact.as_str(),
                error = %warning.message,
                "Artifact failed to load"
            );
        }
        info!(
            event = "artifacts_loaded",
            service = %self.service_name,
            model_loaded = status.model_loaded,
            model_version = %status.model_version,
            n_features = ?status.n_features,
            failures = warnings.len(),
            "Artifacts loaded"
        );
    }

    pub fn log_prediction(&self, request_id: &str, n_predictions: usize, latency_secs: f64, model_version: &str) {
        info!(
            event = "prediction_served",
            service = %self.service_name,
            request_id = %request_id,
            n_predictions = n_predictions,
            latency_seconds = latency_secs,
            model_version = %model_version,
            "Served price predictions"
        );
    }

    pub fn log_explanation(&self, n_instances: usize, n_repeats: usize, elapsed_secs: f64) {
        info!(
            event = "explanation_served",
            service = %self.service_name,
            n_instances = n_instances,
            n_repeats = n_repeats,
            elapsed_seconds = elapsed_secs,
            "Computed permutation importance"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            service = %self.service_name,
            reason = %reason,
            "Price prediction service shutting down"
        );
    }
}
