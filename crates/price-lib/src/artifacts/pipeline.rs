//! Trained regression pipeline
//!
//! The pipeline is exported by offline tooling as JSON: an ordered list of
//! transform stages ending in exactly one regression estimator. Loading
//! validates the stage shapes once so that inference only has to check the
//! width of incoming feature matrices.

use crate::error::{ArtifactError, InferenceError};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::path::Path;

/// Serialized form of a pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineArtifact {
    /// Optional diagnostic version string
    #[serde(default)]
    pub version: Option<String>,
    pub steps: Vec<StepArtifact>,
}

/// One named stage of a serialized pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepArtifact {
    pub name: String,
    #[serde(flatten)]
    pub stage: StageArtifact,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageArtifact {
    StandardScaler {
        mean: Vec<f64>,
        scale: Vec<f64>,
    },
    RobustScaler {
        center: Vec<f64>,
        scale: Vec<f64>,
    },
    KNeighborsRegressor {
        n_neighbors: usize,
        #[serde(default)]
        weights: NeighborWeights,
        fit_x: Vec<Vec<f64>>,
        fit_y: Vec<f64>,
    },
    LinearRegression {
        coef: Vec<f64>,
        intercept: f64,
    },
}

/// Weighting of neighbor targets in k-NN regression
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NeighborWeights {
    #[default]
    Uniform,
    Distance,
}

/// Column-wise `(x - offset) / scale` transform
#[derive(Debug, Clone)]
pub struct Scaler {
    name: String,
    type_name: &'static str,
    offset: Array1<f64>,
    scale: Array1<f64>,
}

impl Scaler {
    fn new(
        name: String,
        type_name: &'static str,
        offset: Vec<f64>,
        scale: Vec<f64>,
    ) -> Result<Self, String> {
        if offset.len() != scale.len() {
            return Err(format!(
                "step '{}' has {} offsets but {} scales",
                name,
                offset.len(),
                scale.len()
            ));
        }
        // Constant features were fit with zero spread; pass them through centered.
        let scale = scale
            .into_iter()
            .map(|s| if s == 0.0 { 1.0 } else { s })
            .collect();
        Ok(Self {
            name,
            type_name,
            offset: Array1::from_vec(offset),
            scale: Array1::from_vec(scale),
        })
    }

    pub fn standard(name: impl Into<String>, mean: Vec<f64>, scale: Vec<f64>) -> Result<Self, String> {
        Self::new(name.into(), "StandardScaler", mean, scale)
    }

    pub fn robust(name: impl Into<String>, center: Vec<f64>, scale: Vec<f64>) -> Result<Self, String> {
        Self::new(name.into(), "RobustScaler", center, scale)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn n_features(&self) -> usize {
        self.offset.len()
    }

    fn transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, InferenceError> {
        check_width(self.type_name, self.n_features(), x.ncols())?;
        Ok((&x - &self.offset) / &self.scale)
    }
}

/// Neighbor lookup over the estimator's training data
pub trait NeighborLookup {
    /// Distances and training-row indices of the k nearest neighbors of each row,
    /// sorted by ascending distance
    fn kneighbors(&self, x: ArrayView2<f64>) -> Result<(Array2<f64>, Array2<usize>), InferenceError>;

    /// Target values the estimator was fit on, indexed like `kneighbors` indices
    fn training_targets(&self) -> ArrayView1<'_, f64>;
}

/// What the terminal estimator can do beyond plain prediction
pub enum EstimatorCapability<'a> {
    NeighborCapable(&'a dyn NeighborLookup),
    Plain,
}

/// Brute-force Euclidean k-nearest-neighbors regressor
#[derive(Debug, Clone)]
pub struct KNeighborsRegressor {
    n_neighbors: usize,
    weights: NeighborWeights,
    fit_x: Array2<f64>,
    fit_y: Array1<f64>,
}

impl KNeighborsRegressor {
    pub fn new(
        n_neighbors: usize,
        weights: NeighborWeights,
        fit_x: Vec<Vec<f64>>,
        fit_y: Vec<f64>,
    ) -> Result<Self, String> {
        if n_neighbors == 0 {
            return Err("n_neighbors must be at least 1".to_string());
        }
        if fit_x.is_empty() {
            return Err("k-neighbors regressor has no training samples".to_string());
        }
        if fit_x.len() != fit_y.len() {
            return Err(format!(
                "fit_x has {} rows but fit_y has {} targets",
                fit_x.len(),
                fit_y.len()
            ));
        }
        let width = fit_x[0].len();
        if let Some(row) = fit_x.iter().position(|r| r.len() != width) {
            return Err(format!("fit_x row {} does not have {} columns", row, width));
        }
        let n_rows = fit_x.len();
        let flat: Vec<f64> = fit_x.into_iter().flatten().collect();
        let fit_x = Array2::from_shape_vec((n_rows, width), flat).map_err(|e| e.to_string())?;
        Ok(Self {
            n_neighbors,
            weights,
            fit_x,
            fit_y: Array1::from_vec(fit_y),
        })
    }

    pub fn n_neighbors(&self) -> usize {
        self.n_neighbors
    }

    pub fn n_features(&self) -> usize {
        self.fit_x.ncols()
    }

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>, InferenceError> {
        let (distances, indices) = self.kneighbors(x)?;
        let mut out = Array1::zeros(x.nrows());

        for (row, value) in out.iter_mut().enumerate() {
            let dists = distances.row(row);
            let targets: Vec<f64> = indices.row(row).iter().map(|&i| self.fit_y[i]).collect();

            *value = match self.weights {
                NeighborWeights::Uniform => targets.iter().sum::<f64>() / targets.len() as f64,
                NeighborWeights::Distance => {
                    // Exact matches take all the weight.
                    let exact: Vec<f64> = dists
                        .iter()
                        .zip(&targets)
                        .filter(|(d, _)| **d == 0.0)
                        .map(|(_, t)| *t)
                        .collect();
                    if !exact.is_empty() {
                        exact.iter().sum::<f64>() / exact.len() as f64
                    } else {
                        let weights: Vec<f64> = dists.iter().map(|d| 1.0 / d).collect();
                        let total: f64 = weights.iter().sum();
                        weights.iter().zip(&targets).map(|(w, t)| w * t).sum::<f64>() / total
                    }
                }
            };
        }

        Ok(out)
    }
}

impl NeighborLookup for KNeighborsRegressor {
    fn kneighbors(&self, x: ArrayView2<f64>) -> Result<(Array2<f64>, Array2<usize>), InferenceError> {
        check_width("KNeighborsRegressor", self.n_features(), x.ncols())?;
        let available = self.fit_x.nrows();
        if self.n_neighbors > available {
            return Err(InferenceError::NotEnoughSamples {
                requested: self.n_neighbors,
                available,
            });
        }

        let k = self.n_neighbors;
        let mut distances = Array2::zeros((x.nrows(), k));
        let mut indices = Array2::zeros((x.nrows(), k));

        for (row, query) in x.axis_iter(Axis(0)).enumerate() {
            let mut candidates: Vec<(f64, usize)> = self
                .fit_x
                .axis_iter(Axis(0))
                .enumerate()
                .map(|(i, sample)| {
                    let d2: f64 = sample.iter().zip(query.iter()).map(|(a, b)| (a - b).powi(2)).sum();
                    (d2.sqrt(), i)
                })
                .collect();
            candidates.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal).then(a.1.cmp(&b.1)));

            for (slot, (dist, idx)) in candidates.into_iter().take(k).enumerate() {
                distances[[row, slot]] = dist;
                indices[[row, slot]] = idx;
            }
        }

        Ok((distances, indices))
    }

    fn training_targets(&self) -> ArrayView1<'_, f64> {
        self.fit_y.view()
    }
}

/// Ordinary least squares regressor
#[derive(Debug, Clone)]
pub struct LinearRegression {
    coef: Array1<f64>,
    intercept: f64,
}

impl LinearRegression {
    pub fn new(coef: Vec<f64>, intercept: f64) -> Self {
        Self {
            coef: Array1::from_vec(coef),
            intercept,
        }
    }

    pub fn n_features(&self) -> usize {
        self.coef.len()
    }

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>, InferenceError> {
        check_width("LinearRegression", self.n_features(), x.ncols())?;
        Ok(x.dot(&self.coef) + self.intercept)
    }
}

/// Terminal stage of a pipeline
#[derive(Debug, Clone)]
pub enum Estimator {
    KNeighbors(KNeighborsRegressor),
    Linear(LinearRegression),
}

impl Estimator {
    pub fn type_name(&self) -> &'static str {
        match self {
            Estimator::KNeighbors(_) => "KNeighborsRegressor",
            Estimator::Linear(_) => "LinearRegression",
        }
    }

    pub fn n_features(&self) -> usize {
        match self {
            Estimator::KNeighbors(knn) => knn.n_features(),
            Estimator::Linear(lr) => lr.n_features(),
        }
    }

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>, InferenceError> {
        match self {
            Estimator::KNeighbors(knn) => knn.predict(x),
            Estimator::Linear(lr) => lr.predict(x),
        }
    }
}

/// Validated, immutable pipeline ready for inference
#[derive(Debug, Clone)]
pub struct Pipeline {
    version: Option<String>,
    transforms: Vec<Scaler>,
    estimator: Estimator,
}

impl Pipeline {
    pub fn new(version: Option<String>, transforms: Vec<Scaler>, estimator: Estimator) -> Self {
        Self {
            version,
            transforms,
            estimator,
        }
    }

    /// Validate a serialized pipeline
    pub fn from_artifact(artifact: PipelineArtifact) -> Result<Self, String> {
        let PipelineArtifact { version, mut steps } = artifact;
        let last = steps.pop().ok_or_else(|| "pipeline has no steps".to_string())?;

        let mut transforms = Vec::with_capacity(steps.len());
        for step in steps {
            let scaler = match step.stage {
                StageArtifact::StandardScaler { mean, scale } => Scaler::standard(step.name, mean, scale)?,
                StageArtifact::RobustScaler { center, scale } => Scaler::robust(step.name, center, scale)?,
                _ => {
                    return Err(format!(
                        "step '{}' is an estimator but is not the last step",
                        step.name
                    ))
                }
            };
            transforms.push(scaler);
        }

        let estimator = match last.stage {
            StageArtifact::KNeighborsRegressor {
                n_neighbors,
                weights,
                fit_x,
                fit_y,
            } => Estimator::KNeighbors(KNeighborsRegressor::new(n_neighbors, weights, fit_x, fit_y)?),
            StageArtifact::LinearRegression { coef, intercept } => {
                Estimator::Linear(LinearRegression::new(coef, intercept))
            }
            _ => return Err(format!("last step '{}' is not an estimator", last.name)),
        };

        let expected = estimator.n_features();
        if let Some(bad) = transforms.iter().find(|t| t.n_features() != expected) {
            return Err(format!(
                "step '{}' has {} features but the estimator expects {}",
                bad.name(),
                bad.n_features(),
                expected
            ));
        }

        Ok(Self::new(version, transforms, estimator))
    }

    /// Read and validate a pipeline file, returning it with the file's SHA-256
    pub fn load(path: &Path) -> Result<(Self, String), ArtifactError> {
        let display = path.display().to_string();
        let bytes = std::fs::read(path).map_err(|source| ArtifactError::Io {
            path: display.clone(),
            source,
        })?;
        let checksum = compute_checksum(&bytes);
        let artifact: PipelineArtifact =
            serde_json::from_slice(&bytes).map_err(|source| ArtifactError::Json {
                path: display.clone(),
                source,
            })?;
        let pipeline = Self::from_artifact(artifact).map_err(|reason| ArtifactError::Invalid {
            path: display,
            reason,
        })?;
        Ok((pipeline, checksum))
    }

    /// Diagnostic version: the exported version attribute, else the estimator type name
    pub fn version(&self) -> String {
        self.version
            .clone()
            .unwrap_or_else(|| self.estimator.type_name().to_string())
    }

    pub fn n_features_in(&self) -> usize {
        self.estimator.n_features()
    }

    pub fn estimator(&self) -> &Estimator {
        &self.estimator
    }

    /// Run every transform stage, producing the estimator's input space
    pub fn transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, InferenceError> {
        let mut current = x.to_owned();
        for scaler in &self.transforms {
            current = scaler.transform(current.view())?;
        }
        Ok(current)
    }

    /// Transform then predict one value per row
    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>, InferenceError> {
        let transformed = self.transform(x)?;
        let predictions = self.estimator.predict(transformed.view())?;
        if let Some(row) = predictions.iter().position(|p| !p.is_finite()) {
            return Err(InferenceError::NonFinite(row));
        }
        Ok(predictions)
    }

    /// Capability of the terminal stage
    pub fn terminal_capability(&self) -> EstimatorCapability<'_> {
        match &self.estimator {
            Estimator::KNeighbors(knn) => EstimatorCapability::NeighborCapable(knn),
            Estimator::Linear(_) => EstimatorCapability::Plain,
        }
    }
}

fn check_width(stage: &str, expected: usize, got: usize) -> Result<(), InferenceError> {
    if expected != got {
        return Err(InferenceError::ShapeMismatch {
            stage: stage.to_string(),
            expected,
            got,
        });
    }
    Ok(())
}

/// Compute SHA256 checksum of data
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
