//! Neighbor-based confidence scoring
//!
//! Confidence is derived from the spread of a prediction's nearest training
//! targets: `1 - weighted_std / (weighted_mean + eps)`, clamped to [0, 1],
//! with weights `1 / (distance + eps)`.
//!
//! The ratio is only meaningful for positive targets. A near-zero mean blows
//! the ratio up (confidence 0) and a negative mean makes it negative
//! (confidence 1). Non-finite results are reported as 0.

use crate::artifacts::{EstimatorCapability, Pipeline};
use crate::error::InferenceError;
use ndarray::{ArrayView1, ArrayView2};

/// Guards against division by zero for exact matches and zero means
pub const EPSILON: f64 = 1e-6;

/// Confidence for one instance from its neighbor distances and targets
pub fn neighbor_confidence(distances: ArrayView1<f64>, targets: &[f64]) -> f64 {
    let weights: Vec<f64> = distances.iter().map(|d| 1.0 / (d + EPSILON)).collect();
    let total: f64 = weights.iter().sum();
    if targets.is_empty() || total <= 0.0 {
        return 0.0;
    }

    let mean = weights.iter().zip(targets).map(|(w, t)| w * t).sum::<f64>() / total;
    let variance = weights
        .iter()
        .zip(targets)
        .map(|(w, t)| w * (t - mean).powi(2))
        .sum::<f64>()
        / total;
    let std = variance.sqrt();

    let confidence = 1.0 - std / (mean + EPSILON);
    if confidence.is_finite() {
        confidence.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Per-row confidence when the terminal estimator supports neighbor lookup
///
/// Returns `None` for plain estimators; confidence is then absent rather
/// than defaulted.
pub fn estimate_confidence(
    pipeline: &Pipeline,
    features: ArrayView2<f64>,
) -> Result<Option<Vec<f64>>, InferenceError> {
    let lookup = match pipeline.terminal_capability() {
        EstimatorCapability::NeighborCapable(lookup) => lookup,
        EstimatorCapability::Plain => return Ok(None),
    };

    // Neighbors live in the space the estimator was fit in.
    let transformed = pipeline.transform(features)?;
    let (distances, indices) = lookup.kneighbors(transformed.view())?;
    let fit_y = lookup.training_targets();

    let scores = distances
        .outer_iter()
        .zip(indices.outer_iter())
        .map(|(dists, idx)| {
            let targets: Vec<f64> = idx.iter().map(|&i| fit_y[i]).collect();
            neighbor_confidence(dists, &targets)
        })
        .collect();

    Ok(Some(scores))
}
