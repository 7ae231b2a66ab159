//! HTTP API for predictions, explanations, health checks and Prometheus metrics

use crate::config::ServiceConfig;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use price_lib::{
    artifacts::ArtifactStore,
    explain::Explainer,
    features::FeaturePreparer,
    health::{ComponentStatus, HealthRegistry},
    observability::{ServiceMetrics, StructuredLogger},
    predictor::PricePredictor,
    status::StatusReporter,
    InstanceRecord, PredictError,
};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub predictor: Arc<PricePredictor>,
    pub explainer: Arc<Explainer>,
    pub status: StatusReporter,
    pub health_registry: HealthRegistry,
    pub metrics: ServiceMetrics,
    pub logger: StructuredLogger,
    pub default_n_repeats: usize,
}

impl AppState {
    pub fn new(
        store: Arc<ArtifactStore>,
        config: &ServiceConfig,
        health_registry: HealthRegistry,
        metrics: ServiceMetrics,
        logger: StructuredLogger,
    ) -> Self {
        let preparer = FeaturePreparer::new(config.impute_strategy());
        Self {
            predictor: Arc::new(PricePredictor::new(store.clone(), preparer.clone())),
            explainer: Arc::new(Explainer::new(
                store.clone(),
                preparer,
                config.explain_config(),
            )),
            status: StatusReporter::new(store),
            health_registry,
            metrics,
            logger,
            default_n_repeats: config.default_n_repeats,
        }
    }
}

/// Batch of houses to score
#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub instances: Vec<InstanceRecord>,
}

#[derive(Debug, Deserialize)]
pub struct ExplainParams {
    pub n_repeats: Option<usize>,
}

/// Error body in the `{"detail": ...}` shape
struct ApiError {
    status: StatusCode,
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

impl ApiError {
    /// Map a core error; internal failures are logged and hidden behind `internal_detail`
    fn from_predict(operation: &str, err: PredictError, internal_detail: &str, state: &AppState) -> Self {
        state.metrics.inc_request_error(operation, err.kind());
        match err {
            PredictError::ModelUnavailable => {
                warn!(operation, error = %err, "Request rejected");
                Self {
                    status: StatusCode::SERVICE_UNAVAILABLE,
                    detail: err.to_string(),
                }
            }
            e if e.is_client_error() => {
                warn!(operation, error = %e, "Request rejected");
                Self {
                    status: StatusCode::BAD_REQUEST,
                    detail: e.to_string(),
                }
            }
            e => {
                error!(operation, error = ?e, "Request failed");
                Self::internal(internal_detail)
            }
        }
    }

    fn internal(detail: &str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: detail.to_string(),
        }
    }
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.status.health())
}

async fn metadata(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.status.status())
}

async fn predict(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PredictRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let predictor = state.predictor.clone();
    let result = tokio::task::spawn_blocking(move || predictor.predict(&request.instances))
        .await
        .map_err(|e| {
            error!(error = %e, "Prediction task failed");
            ApiError::internal("Internal server error")
        })?;

    match result {
        Ok(response) => {
            let low_confidence = state.predictor.count_low_confidence(&response.predictions);
            state.metrics.observe_prediction(
                response.latency_seconds,
                response.n_predictions,
                low_confidence,
            );
            state.logger.log_prediction(
                &response.request_id,
                response.n_predictions,
                response.latency_seconds,
                &response.model_version,
            );
            Ok(Json(response))
        }
        Err(e) => Err(ApiError::from_predict("predict", e, "Internal server error", &state)),
    }
}

async fn explain_permutation(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ExplainParams>,
    Json(request): Json<PredictRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let n_repeats = params.n_repeats.unwrap_or(state.default_n_repeats);
    let n_instances = request.instances.len();
    let explainer = state.explainer.clone();
    let start = Instant::now();

    let result = tokio::task::spawn_blocking(move || explainer.explain(&request.instances, n_repeats))
        .await
        .map_err(|e| {
            error!(error = %e, "Explanation task failed");
            ApiError::internal("Could not compute importances")
        })?;

    match result {
        Ok(report) => {
            let elapsed = start.elapsed().as_secs_f64();
            state.metrics.observe_explanation(elapsed);
            state.logger.log_explanation(n_instances, n_repeats, elapsed);
            Ok(Json(report))
        }
        Err(e) => Err(ApiError::from_predict(
            "explain",
            e,
            "Could not compute importances",
            &state,
        )),
    }
}

/// Health check response - returns 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still serving
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metadata", get(metadata))
        .route("/predict", post(predict))
        .route("/explain/permutation", post(explain_permutation))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
