//! Error taxonomy for the serving core
//!
//! Validation-shaped failures (empty input, bad feature values, missing
//! model) are reported to the caller with detail. Everything else is an
//! [`InferenceError`] wrapped in [`PredictError::Unexpected`], which the
//! transport logs in full and collapses to a generic internal error.

use serde::Serialize;
use thiserror::Error;

/// Errors returned by the prediction and explanation services
#[derive(Debug, Error)]
pub enum PredictError {
    /// The pipeline artifact failed to load or is absent
    #[error("Model unavailable")]
    ModelUnavailable,

    /// The input batch has zero instances
    #[error("Empty input")]
    EmptyInput,

    /// A feature value could not be coerced to a number
    #[error("Invalid value for feature '{feature}': {reason}")]
    InvalidFeature { feature: String, reason: String },

    /// A request parameter is out of range
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Any failure while running the pipeline or computing importances
    #[error("Unexpected inference error: {0}")]
    Unexpected(#[from] InferenceError),
}

impl PredictError {
    /// True for errors the caller can fix by changing the request
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PredictError::EmptyInput
                | PredictError::InvalidFeature { .. }
                | PredictError::InvalidRequest(_)
        )
    }

    /// Short label used for metrics and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            PredictError::ModelUnavailable => "model_unavailable",
            PredictError::EmptyInput => "empty_input",
            PredictError::InvalidFeature { .. } => "invalid_feature",
            PredictError::InvalidRequest(_) => "invalid_request",
            PredictError::Unexpected(_) => "unexpected",
        }
    }
}

/// Failures raised while evaluating a pipeline
#[derive(Debug, Error, PartialEq)]
pub enum InferenceError {
    #[error("{stage} expects {expected} features, got {got}")]
    ShapeMismatch {
        stage: String,
        expected: usize,
        got: usize,
    },

    #[error("Expected n_neighbors <= n_samples_fit, but n_neighbors = {requested}, n_samples_fit = {available}")]
    NotEnoughSamples { requested: usize, available: usize },

    #[error("Malformed pipeline: {0}")]
    MalformedPipeline(String),

    #[error("Non-finite prediction at row {0}")]
    NonFinite(usize),
}

/// Failures loading a single artifact from disk
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("Invalid artifact {path}: {reason}")]
    Invalid { path: String, reason: String },
}

/// Which artifact a load diagnostic refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Model,
    Schema,
    Demographics,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Model => "model",
            ArtifactKind::Schema => "schema",
            ArtifactKind::Demographics => "demographics",
        }
    }
}

/// Non-fatal diagnostic recorded when an artifact fails to load
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactLoadWarning {
    pub artifact: ArtifactKind,
    pub message: String,
}

impl ArtifactLoadWarning {
    pub fn new(artifact: ArtifactKind, error: &ArtifactError) -> Self {
        Self {
            artifact,
            message: error.to_string(),
        }
    }
}
