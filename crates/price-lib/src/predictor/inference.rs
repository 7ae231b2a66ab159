//! Price inference over the loaded pipeline
//!
//! Reads the current artifact snapshot, prepares features, runs the
//! pipeline and attaches neighbor-based confidence when available.

use super::confidence::estimate_confidence;
use super::output::OutputFormatter;
use crate::artifacts::ArtifactStore;
use crate::error::PredictError;
use crate::features::FeaturePreparer;
use crate::models::{InstanceRecord, PredictionResponse, PredictionResult};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

/// Inference latency above which a warning is logged
const SLOW_INFERENCE_MS: u128 = 250;

/// Serves price predictions from the artifact store
pub struct PricePredictor {
    store: Arc<ArtifactStore>,
    preparer: FeaturePreparer,
    output_formatter: OutputFormatter,
}

impl PricePredictor {
    pub fn new(store: Arc<ArtifactStore>, preparer: FeaturePreparer) -> Self {
        Self::with_formatter(store, preparer, OutputFormatter::new())
    }

    pub fn with_formatter(
        store: Arc<ArtifactStore>,
        preparer: FeaturePreparer,
        output_formatter: OutputFormatter,
    ) -> Self {
        Self {
            store,
            preparer,
            output_formatter,
        }
    }

    /// Predict a price for every instance in the batch
    pub fn predict(&self, instances: &[InstanceRecord]) -> Result<PredictionResponse, PredictError> {
        let snapshot = self.store.snapshot();
        let pipeline = snapshot.pipeline().ok_or(PredictError::ModelUnavailable)?;
        if instances.is_empty() {
            return Err(PredictError::EmptyInput);
        }

        let features = self
            .preparer
            .prepare(instances, snapshot.schema(), snapshot.demographics())?;

        let start = Instant::now();
        let values = pipeline.predict(features.values())?;
        let confidences = estimate_confidence(pipeline, features.values())?;
        let elapsed = start.elapsed();

        if elapsed.as_millis() > SLOW_INFERENCE_MS {
            warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                rows = features.n_rows(),
                "Inference exceeded {}ms",
                SLOW_INFERENCE_MS
            );
        } else {
            debug!(elapsed_us = elapsed.as_micros() as u64, rows = features.n_rows(), "Inference completed");
        }

        let predictions = self
            .output_formatter
            .format(&values.to_vec(), confidences.as_deref());

        Ok(PredictionResponse {
            n_predictions: predictions.len(),
            predictions,
            model_version: pipeline.version(),
            latency_seconds: elapsed.as_secs_f64(),
            request_id: Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().timestamp(),
        })
    }

    /// Results below the formatter's low-confidence threshold
    pub fn count_low_confidence(&self, results: &[PredictionResult]) -> usize {
        self.output_formatter.count_low_confidence(results)
    }
}
