//! Core data models for the price prediction service

use serde::{Deserialize, Serialize};

/// One house as supplied by the caller: feature name to JSON value
pub type InstanceRecord = serde_json::Map<String, serde_json::Value>;

/// Prediction for a single instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub prediction: String,
    pub input_index: usize,
    pub confidence: Option<f64>,
}

/// Envelope returned by a prediction call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub predictions: Vec<PredictionResult>,
    pub model_version: String,
    pub n_predictions: usize,
    pub latency_seconds: f64,
    pub request_id: String,
    pub timestamp: i64,
}

/// Ranked permutation importances, serialized as `[name, value]` pairs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportanceReport {
    pub importances: Vec<(String, f64)>,
}

/// Artifact status for health and metadata collaborators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelStatus {
    pub model_loaded: bool,
    pub model_version: String,
    pub n_features: Option<usize>,
}
