//! Permutation feature importance
//!
//! For every feature column, the column is shuffled across the batch
//! `n_repeats` times and the pipeline re-scored against its own baseline
//! predictions. The importance is the mean drop in R² score. Cost is
//! `n_repeats * n_features` pipeline evaluations, so callers should expect
//! this to be much slower than a prediction.

use crate::artifacts::{ArtifactStore, Pipeline};
use crate::error::{InferenceError, PredictError};
use crate::features::FeaturePreparer;
use crate::models::{ImportanceReport, InstanceRecord};
use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Default number of shuffles per feature
pub const DEFAULT_N_REPEATS: usize = 10;

/// Number of ranked features returned
pub const DEFAULT_TOP_K: usize = 10;

/// Configuration for the explainer
#[derive(Debug, Clone)]
pub struct ExplainConfig {
    /// Seed for the shuffling random source
    pub seed: u64,
    /// Maximum number of ranked features in a report
    pub top_k: usize,
}

impl Default for ExplainConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            top_k: DEFAULT_TOP_K,
        }
    }
}

/// Computes feature importances for a batch of instances
pub struct Explainer {
    store: Arc<ArtifactStore>,
    preparer: FeaturePreparer,
    config: ExplainConfig,
}

impl Explainer {
    pub fn new(store: Arc<ArtifactStore>, preparer: FeaturePreparer, config: ExplainConfig) -> Self {
        Self {
            store,
            preparer,
            config,
        }
    }

    pub fn explain(
        &self,
        instances: &[InstanceRecord],
        n_repeats: usize,
    ) -> Result<ImportanceReport, PredictError> {
        let snapshot = self.store.snapshot();
        let pipeline = snapshot.pipeline().ok_or(PredictError::ModelUnavailable)?;
        if instances.is_empty() {
            return Err(PredictError::EmptyInput);
        }
        if n_repeats == 0 {
            return Err(PredictError::InvalidRequest(
                "n_repeats must be at least 1".to_string(),
            ));
        }

        let features = self
            .preparer
            .prepare(instances, snapshot.schema(), snapshot.demographics())?;

        let start = Instant::now();
        let baseline = pipeline.predict(features.values())?;
        let baseline_score = r2_score(baseline.view(), baseline.view());
        let means = permutation_importance(
            pipeline,
            features.values(),
            baseline.view(),
            baseline_score,
            n_repeats,
            self.config.seed,
        )?;
        debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            n_features = features.n_cols(),
            n_repeats,
            "Permutation importance computed"
        );

        Ok(ImportanceReport {
            importances: rank_importances(features.columns(), &means, self.config.top_k),
        })
    }
}

/// Mean score drop per column when that column is shuffled
///
/// `baseline_score` is the R² of the unpermuted predictions against `y`.
pub fn permutation_importance(
    pipeline: &Pipeline,
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    baseline_score: f64,
    n_repeats: usize,
    seed: u64,
) -> Result<Vec<f64>, InferenceError> {
    let mut rng = StdRng::seed_from_u64(seed);

    let mut permuted = x.to_owned();
    let mut means = Vec::with_capacity(x.ncols());

    for col in 0..x.ncols() {
        let original = x.column(col);
        let mut shuffled: Vec<f64> = original.to_vec();
        let mut total = 0.0;

        for _ in 0..n_repeats {
            shuffled.shuffle(&mut rng);
            permuted.column_mut(col).assign(&Array1::from(shuffled.clone()));
            let score = r2_score(y, pipeline.predict(permuted.view())?.view());
            total += baseline_score - score;
        }

        permuted.column_mut(col).assign(&original);
        means.push(total / n_repeats as f64);
    }

    Ok(means)
}

/// Coefficient of determination; a constant target scores 1 on a perfect fit, else 0
pub fn r2_score(y_true: ArrayView1<f64>, y_pred: ArrayView1<f64>) -> f64 {
    let n = y_true.len();
    if n == 0 {
        return 0.0;
    }
    let mean = y_true.sum() / n as f64;
    let ss_tot: f64 = y_true.iter().map(|y| (y - mean).powi(2)).sum();
    let ss_res: f64 = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(y, p)| (y - p).powi(2))
        .sum();

    if ss_tot == 0.0 {
        if ss_res == 0.0 {
            1.0
        } else {
            0.0
        }
    } else {
        1.0 - ss_res / ss_tot
    }
}

/// Sort by absolute importance, descending, keeping at most `top_k`
pub fn rank_importances(columns: &[String], means: &[f64], top_k: usize) -> Vec<(String, f64)> {
    let mut ranked: Vec<(String, f64)> = columns.iter().cloned().zip(means.iter().copied()).collect();
    ranked.sort_by(|a, b| b.1.abs().partial_cmp(&a.1.abs()).unwrap_or(Ordering::Equal));
    ranked.truncate(top_k);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{ArtifactSnapshot, Estimator, FeatureSchema, LinearRegression};
    use ndarray::array;
    use serde_json::json;

    fn linear(coef: Vec<f64>) -> Pipeline {
        Pipeline::new(None, vec![], Estimator::Linear(LinearRegression::new(coef, 0.0)))
    }

    fn batch(n: usize) -> Vec<InstanceRecord> {
        (0..n)
            .map(|i| {
                let v = json!({"a": i as f64, "b": (i * 7 % 5) as f64, "c": 1.0});
                v.as_object().cloned().unwrap()
            })
            .collect()
    }

    fn explainer(pipeline: Option<Pipeline>, schema: Option<FeatureSchema>) -> Explainer {
        let snapshot = ArtifactSnapshot::new(pipeline, schema, None);
        Explainer::new(
            Arc::new(ArtifactStore::from_snapshot(snapshot)),
            FeaturePreparer::default(),
            ExplainConfig::default(),
        )
    }

    #[test]
    fn test_r2_score() {
        assert_eq!(r2_score(array![1.0, 2.0, 3.0].view(), array![1.0, 2.0, 3.0].view()), 1.0);
        assert_eq!(r2_score(array![1.0, 2.0, 3.0].view(), array![2.0, 2.0, 2.0].view()), 0.0);
        assert_eq!(r2_score(array![5.0, 5.0].view(), array![5.0, 5.0].view()), 1.0);
        assert_eq!(r2_score(array![5.0, 5.0].view(), array![4.0, 5.0].view()), 0.0);
    }

    #[test]
    fn test_unused_feature_has_zero_importance() {
        let report = explainer(Some(linear(vec![10.0, 0.0, 0.0])), None)
            .explain(&batch(8), 5)
            .unwrap();

        assert_eq!(report.importances[0].0, "a");
        assert!(report.importances[0].1 > 0.0);
        for (name, value) in &report.importances[1..] {
            assert_eq!(*value, 0.0, "feature {} should not matter", name);
        }
    }

    #[test]
    fn test_deterministic_for_fixed_seed() {
        let explainer = explainer(Some(linear(vec![3.0, 1.0, 0.0])), None);
        let first = explainer.explain(&batch(10), 4).unwrap();
        let second = explainer.explain(&batch(10), 4).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_importance_against_external_targets() {
        let pipeline = linear(vec![2.0, 0.0]);
        let x = array![[1.0, 5.0], [2.0, 4.0], [3.0, 3.0], [4.0, 2.0]];
        let y = array![2.0, 4.0, 6.0, 9.0];
        let baseline_score = r2_score(y.view(), pipeline.predict(x.view()).unwrap().view());

        let means = permutation_importance(&pipeline, x.view(), y.view(), baseline_score, 3, 7).unwrap();

        assert_eq!(means.len(), 2);
        assert_eq!(means[1], 0.0);
        assert!(means[0] >= 0.0);
    }

    #[test]
    fn test_top_k_truncation() {
        let columns: Vec<String> = (0..15).map(|i| format!("f{}", i)).collect();
        let means: Vec<f64> = (0..15).map(|i| if i % 2 == 0 { i as f64 } else { -(i as f64) }).collect();
        let ranked = rank_importances(&columns, &means, DEFAULT_TOP_K);

        assert_eq!(ranked.len(), 10);
        assert_eq!(ranked[0], ("f14".to_string(), 14.0));
        assert_eq!(ranked[1], ("f13".to_string(), -13.0));
    }

    #[test]
    fn test_report_follows_schema_columns() {
        let schema = FeatureSchema::new(vec!["c".into(), "a".into(), "missing".into()]).unwrap();
        let report = explainer(Some(linear(vec![0.0, 1.0, 0.0])), Some(schema))
            .explain(&batch(6), 3)
            .unwrap();

        let mut names: Vec<&str> = report.importances.iter().map(|(n, _)| n.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["a", "c", "missing"]);
        assert_eq!(report.importances[0].0, "a");
    }

    #[test]
    fn test_preconditions() {
        let err = explainer(None, None).explain(&batch(2), 3).unwrap_err();
        assert!(matches!(err, PredictError::ModelUnavailable));

        let with_model = explainer(Some(linear(vec![1.0, 1.0, 1.0])), None);
        assert!(matches!(with_model.explain(&[], 3).unwrap_err(), PredictError::EmptyInput));
        assert!(matches!(
            with_model.explain(&batch(2), 0).unwrap_err(),
            PredictError::InvalidRequest(_)
        ));
    }
}
