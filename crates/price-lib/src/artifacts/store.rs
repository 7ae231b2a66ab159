//! Artifact store: one immutable snapshot, swapped atomically on reload
//!
//! Each artifact loads independently. A failure leaves that artifact absent
//! and records an [`ArtifactLoadWarning`]; `load` itself never fails.

use super::{DemographicTable, FeatureSchema, Pipeline};
use crate::error::{ArtifactError, ArtifactKind, ArtifactLoadWarning};
use crate::models::ModelStatus;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tracing::{error, info, warn};

/// Version string reported when no pipeline is loaded
pub const UNAVAILABLE_VERSION: &str = "unavailable";

/// Locations of the three artifacts
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub model: PathBuf,
    pub features: PathBuf,
    pub demographics: PathBuf,
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self {
            model: PathBuf::from("model/model.json"),
            features: PathBuf::from("model/model_features.json"),
            demographics: PathBuf::from("data/zipcode_demographics.csv"),
        }
    }
}

/// Internally consistent set of loaded artifacts
#[derive(Debug, Clone, Default)]
pub struct ArtifactSnapshot {
    pipeline: Option<Pipeline>,
    schema: Option<FeatureSchema>,
    demographics: Option<DemographicTable>,
    model_checksum: Option<String>,
    warnings: Vec<ArtifactLoadWarning>,
}

impl ArtifactSnapshot {
    pub fn new(
        pipeline: Option<Pipeline>,
        schema: Option<FeatureSchema>,
        demographics: Option<DemographicTable>,
    ) -> Self {
        Self {
            pipeline,
            schema,
            demographics,
            model_checksum: None,
            warnings: Vec::new(),
        }
    }

    /// Load every artifact, isolating failures
    pub fn load(paths: &ArtifactPaths) -> Self {
        let mut warnings = Vec::new();

        let (pipeline, model_checksum) = match Pipeline::load(&paths.model) {
            Ok((pipeline, checksum)) => {
                info!(
                    path = %paths.model.display(),
                    version = %pipeline.version(),
                    checksum = %checksum,
                    "Loaded model"
                );
                (Some(pipeline), Some(checksum))
            }
            Err(e) => {
                error!(path = %paths.model.display(), error = %e, "Failed to load model");
                warnings.push(ArtifactLoadWarning::new(ArtifactKind::Model, &e));
                (None, None)
            }
        };

        let schema = record_optional(
            FeatureSchema::load(&paths.features),
            ArtifactKind::Schema,
            &mut warnings,
        );
        if let Some(schema) = &schema {
            info!(n_features = schema.len(), "Loaded model features");
        }

        let demographics = record_optional(
            DemographicTable::load(&paths.demographics),
            ArtifactKind::Demographics,
            &mut warnings,
        );
        if let Some(table) = &demographics {
            info!(rows = table.len(), "Loaded demographics");
        }

        Self {
            pipeline,
            schema,
            demographics,
            model_checksum,
            warnings,
        }
    }

    pub fn pipeline(&self) -> Option<&Pipeline> {
        self.pipeline.as_ref()
    }

    pub fn schema(&self) -> Option<&FeatureSchema> {
        self.schema.as_ref()
    }

    pub fn demographics(&self) -> Option<&DemographicTable> {
        self.demographics.as_ref()
    }

    pub fn model_checksum(&self) -> Option<&str> {
        self.model_checksum.as_deref()
    }

    pub fn warnings(&self) -> &[ArtifactLoadWarning] {
        &self.warnings
    }

    pub fn model_version(&self) -> String {
        self.pipeline
            .as_ref()
            .map(Pipeline::version)
            .unwrap_or_else(|| UNAVAILABLE_VERSION.to_string())
    }

    pub fn status(&self) -> ModelStatus {
        ModelStatus {
            model_loaded: self.pipeline.is_some(),
            model_version: self.model_version(),
            n_features: self.schema.as_ref().map(FeatureSchema::len),
        }
    }
}

fn record_optional<T>(
    result: Result<T, ArtifactError>,
    kind: ArtifactKind,
    warnings: &mut Vec<ArtifactLoadWarning>,
) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(artifact = kind.as_str(), error = %e, "Could not load artifact");
            warnings.push(ArtifactLoadWarning::new(kind, &e));
            None
        }
    }
}

/// Process-wide holder of the current snapshot
#[derive(Debug, Default)]
pub struct ArtifactStore {
    current: RwLock<Arc<ArtifactSnapshot>>,
}

impl ArtifactStore {
    /// Empty store: no pipeline, schema or demographics
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: ArtifactSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// Load all artifacts and replace the current snapshot
    ///
    /// Readers holding the previous snapshot keep using it until they drop it.
    pub fn load(&self, paths: &ArtifactPaths) -> Arc<ArtifactSnapshot> {
        let snapshot = Arc::new(ArtifactSnapshot::load(paths));
        self.replace(snapshot.clone());
        snapshot
    }

    pub fn replace(&self, snapshot: Arc<ArtifactSnapshot>) {
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        *current = snapshot;
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Arc<ArtifactSnapshot> {
        self.current.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn status(&self) -> ModelStatus {
        self.snapshot().status()
    }
}
