//! Service configuration

use anyhow::{Context, Result};
use price_lib::artifacts::ArtifactPaths;
use price_lib::explain::{ExplainConfig, DEFAULT_N_REPEATS, DEFAULT_TOP_K};
use price_lib::features::ImputeStrategy;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

/// Default location of the optional config file (extension resolved by `config`)
pub const DEFAULT_CONFIG_FILE: &str = "config/service";

/// Service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// HTTP port for prediction, health and metrics endpoints
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Serialized trained pipeline
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,

    /// JSON list of expected feature names
    #[serde(default = "default_features_path")]
    pub features_path: PathBuf,

    /// Demographics CSV keyed by zipcode
    #[serde(default = "default_demographics_path")]
    pub demographics_path: PathBuf,

    /// Seed for permutation shuffles
    #[serde(default)]
    pub explain_seed: u64,

    /// Number of ranked features in an explanation
    #[serde(default = "default_top_k")]
    pub explain_top_k: usize,

    /// n_repeats used when the request does not specify one
    #[serde(default = "default_n_repeats")]
    pub default_n_repeats: usize,

    /// Defaults for schema columns missing from the input
    #[serde(default)]
    pub impute_strategy: HashMap<String, f64>,
}

fn default_api_port() -> u16 {
    8000
}

fn default_model_path() -> PathBuf {
    ArtifactPaths::default().model
}

fn default_features_path() -> PathBuf {
    ArtifactPaths::default().features
}

fn default_demographics_path() -> PathBuf {
    ArtifactPaths::default().demographics
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

fn default_n_repeats() -> usize {
    DEFAULT_N_REPEATS
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            model_path: default_model_path(),
            features_path: default_features_path(),
            demographics_path: default_demographics_path(),
            explain_seed: 0,
            explain_top_k: default_top_k(),
            default_n_repeats: default_n_repeats(),
            impute_strategy: HashMap::new(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from the default file and environment
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load from an optional config file, overridden by `PRICE_*` environment variables
    pub fn load_from(file: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(file).required(false))
            .add_source(
                config::Environment::with_prefix("PRICE")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    pub fn artifact_paths(&self) -> ArtifactPaths {
        ArtifactPaths {
            model: self.model_path.clone(),
            features: self.features_path.clone(),
            demographics: self.demographics_path.clone(),
        }
    }

    pub fn explain_config(&self) -> ExplainConfig {
        ExplainConfig {
            seed: self.explain_seed,
            top_k: self.explain_top_k,
        }
    }

    pub fn impute_strategy(&self) -> ImputeStrategy {
        ImputeStrategy::new(self.impute_strategy.clone())
    }
}
