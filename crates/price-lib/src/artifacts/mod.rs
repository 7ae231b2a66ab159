//! Artifact lifecycle: trained pipeline, feature schema, demographics

mod demographics;
mod pipeline;
mod schema;
mod store;

pub use demographics::{DemographicTable, ZIPCODE_COLUMN};
pub use pipeline::{
    compute_checksum, Estimator, EstimatorCapability, KNeighborsRegressor, LinearRegression,
    NeighborLookup, NeighborWeights, Pipeline, PipelineArtifact, Scaler, StageArtifact,
    StepArtifact,
};
pub use schema::FeatureSchema;
pub use store::{ArtifactPaths, ArtifactSnapshot, ArtifactStore, UNAVAILABLE_VERSION};
