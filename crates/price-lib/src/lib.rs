//! Serving core for house price prediction
//!
//! This crate provides:
//! - Artifact loading (trained pipeline, feature schema, demographics)
//! - Feature preparation with demographic enrichment and imputation
//! - Price inference with neighbor-based confidence
//! - Permutation feature importance
//! - Health checks and observability

pub mod artifacts;
pub mod error;
pub mod explain;
pub mod features;
pub mod health;
pub mod models;
pub mod observability;
pub mod predictor;
pub mod status;

pub use error::{ArtifactLoadWarning, InferenceError, PredictError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ServiceMetrics, StructuredLogger};
