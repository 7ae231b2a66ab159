//! Artifact status for health and metadata collaborators

use crate::artifacts::ArtifactStore;
use crate::models::ModelStatus;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Liveness summary: the service answers even without a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSummary {
    pub status: String,
    pub model_loaded: bool,
    pub model_version: String,
}

/// Read-only view over the artifact store
#[derive(Debug, Clone)]
pub struct StatusReporter {
    store: Arc<ArtifactStore>,
}

impl StatusReporter {
    pub fn new(store: Arc<ArtifactStore>) -> Self {
        Self { store }
    }

    pub fn status(&self) -> ModelStatus {
        self.store.status()
    }

    pub fn health(&self) -> HealthSummary {
        let status = self.status();
        HealthSummary {
            status: "ok".to_string(),
            model_loaded: status.model_loaded,
            model_version: status.model_version,
        }
    }
}
