//! Integration tests for the prediction API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use price_lib::{
    artifacts::{ArtifactPaths, ArtifactStore},
    health::{components, HealthRegistry},
    observability::{ServiceMetrics, StructuredLogger},
};
use price_server::{
    api::{create_router, AppState},
    config::ServiceConfig,
};
use serde_json::{json, Value};
use std::fs;
use std::sync::Arc;
use tower::ServiceExt;

const MODEL_JSON: &str = r#"{
    "version": "test-knn",
    "steps": [
        {"name": "scaler", "kind": "robust_scaler", "center": [0.0, 0.0, 0.0], "scale": [1.0, 1.0, 1.0]},
        {"name": "knn", "kind": "k_neighbors_regressor", "n_neighbors": 2, "weights": "uniform",
         "fit_x": [[3.0, 2000.0, 70000.0], [2.0, 1000.0, 50000.0], [4.0, 3000.0, 90000.0]],
         "fit_y": [650000.0, 350000.0, 900000.0]}
    ]
}"#;

const FEATURES_JSON: &str = r#"["bedrooms", "sqft_living", "median_income"]"#;

const DEMOGRAPHICS_CSV: &str = "zipcode,median_income\n98125,70000\n98136,80000\n";

struct TestApp {
    router: Router,
    _dir: tempfile::TempDir,
}

async fn setup_test_app(with_model: bool) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let paths = ArtifactPaths {
        model: dir.path().join("model.json"),
        features: dir.path().join("model_features.json"),
        demographics: dir.path().join("zipcode_demographics.csv"),
    };
    if with_model {
        fs::write(&paths.model, MODEL_JSON).unwrap();
    }
    fs::write(&paths.features, FEATURES_JSON).unwrap();
    fs::write(&paths.demographics, DEMOGRAPHICS_CSV).unwrap();

    let store = Arc::new(ArtifactStore::new());
    let snapshot = store.load(&paths);

    let health_registry = HealthRegistry::new();
    health_registry.register(components::MODEL).await;
    health_registry.apply_snapshot(&snapshot).await;
    health_registry.set_ready(true).await;

    let state = Arc::new(AppState::new(
        store,
        &ServiceConfig::default(),
        health_registry,
        ServiceMetrics::new(),
        StructuredLogger::new("test"),
    ));

    TestApp {
        router: create_router(state),
        _dir: dir,
    }
}

fn house(zipcode: &str) -> Value {
    json!({
        "bedrooms": 3,
        "bathrooms": 2.5,
        "sqft_living": 2000,
        "sqft_lot": 5000,
        "floors": 2,
        "sqft_above": 1500,
        "sqft_basement": 500,
        "zipcode": zipcode
    })
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, value)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_predict_single_instance() {
    let app = setup_test_app(true).await;

    let (status, body) = send(
        app.router,
        post_json("/predict", json!({ "instances": [house("98125")] })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["n_predictions"], 1);
    assert_eq!(body["model_version"], "test-knn");
    assert_eq!(body["predictions"][0]["input_index"], 0);
    assert_eq!(body["predictions"][0]["prediction"], "$500000.0");
    assert!(body["predictions"][0]["confidence"].is_f64());
    assert!(body["request_id"].is_string());
    assert!(body["timestamp"].is_i64());
}

#[tokio::test]
async fn test_predict_batch_indices() {
    let app = setup_test_app(true).await;

    let (status, body) = send(
        app.router,
        post_json(
            "/predict",
            json!({ "instances": [house("98125"), house("98136"), house("99999")] }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let predictions = body["predictions"].as_array().unwrap();
    assert_eq!(predictions.len(), 3);
    for (i, p) in predictions.iter().enumerate() {
        assert_eq!(p["input_index"], i);
    }
}

#[tokio::test]
async fn test_predict_empty_instances_is_bad_request() {
    let app = setup_test_app(true).await;

    let (status, body) = send(app.router, post_json("/predict", json!({ "instances": [] }))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Empty input");
}

#[tokio::test]
async fn test_predict_without_model_is_unavailable() {
    let app = setup_test_app(false).await;

    let (status, body) = send(
        app.router,
        post_json("/predict", json!({ "instances": [house("98125")] })),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["detail"], "Model unavailable");
}

#[tokio::test]
async fn test_explain_permutation() {
    let app = setup_test_app(true).await;

    let mut small = house("98136");
    small["bedrooms"] = json!(2);
    small["sqft_living"] = json!(1000);

    let (status, body) = send(
        app.router,
        post_json(
            "/explain/permutation?n_repeats=3",
            json!({ "instances": [house("98125"), small, house("00000")] }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let importances = body["importances"].as_array().unwrap();
    assert_eq!(importances.len(), 3);
    assert!(importances[0][0].is_string());
    assert!(importances[0][1].is_number());
}

#[tokio::test]
async fn test_explain_zero_repeats_is_bad_request() {
    let app = setup_test_app(true).await;

    let (status, _) = send(
        app.router,
        post_json(
            "/explain/permutation?n_repeats=0",
            json!({ "instances": [house("98125")] }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health_and_metadata() {
    let app = setup_test_app(true).await;

    let (status, health) = send(app.router.clone(), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "ok");
    assert_eq!(health["model_loaded"], true);

    let (status, metadata) = send(app.router, get("/metadata")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(metadata["model_version"], "test-knn");
    assert_eq!(metadata["n_features"], 3);
}

#[tokio::test]
async fn test_metadata_without_model() {
    let app = setup_test_app(false).await;

    let (_, metadata) = send(app.router, get("/metadata")).await;
    assert_eq!(metadata["model_loaded"], false);
    assert_eq!(metadata["model_version"], "unavailable");
}

#[tokio::test]
async fn test_probes_follow_artifact_health() {
    let loaded = setup_test_app(true).await;
    let (status, health) = send(loaded.router.clone(), get("/healthz")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
    let (status, _) = send(loaded.router, get("/readyz")).await;
    assert_eq!(status, StatusCode::OK);

    let missing = setup_test_app(false).await;
    let (status, health) = send(missing.router.clone(), get("/healthz")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(health["components"]["model"]["status"], "unhealthy");
    let (status, readiness) = send(missing.router, get("/readyz")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(readiness["ready"], false);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup_test_app(true).await;

    let response = app.router.oneshot(get("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/plain"));
}

#[tokio::test]
async fn test_metrics_expose_prediction_counters() {
    let app = setup_test_app(true).await;

    let (status, _) = send(
        app.router.clone(),
        post_json("/predict", json!({ "instances": [house("98125")] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let response = app.router.oneshot(get("/metrics")).await.unwrap();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();

    assert!(text.contains("price_service_predictions_total"));
    assert!(text.contains("price_service_low_confidence_predictions_total"));
}
