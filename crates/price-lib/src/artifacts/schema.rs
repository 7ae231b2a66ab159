//! Ordered feature schema expected by the pipeline

use crate::error::ArtifactError;
use std::collections::HashSet;
use std::path::Path;

/// Canonical, ordered list of feature names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSchema {
    names: Vec<String>,
}

impl FeatureSchema {
    pub fn new(names: Vec<String>) -> Result<Self, String> {
        if names.is_empty() {
            return Err("feature schema is empty".to_string());
        }
        let mut seen = HashSet::with_capacity(names.len());
        if let Some(dup) = names.iter().find(|n| !seen.insert(n.as_str())) {
            return Err(format!("duplicate feature name '{}'", dup));
        }
        Ok(Self { names })
    }

    /// Load a JSON array of feature names
    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        let display = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|source| ArtifactError::Io {
            path: display.clone(),
            source,
        })?;
        let names: Vec<String> =
            serde_json::from_str(&content).map_err(|source| ArtifactError::Json {
                path: display.clone(),
                source,
            })?;
        Self::new(names).map_err(|reason| ArtifactError::Invalid {
            path: display,
            reason,
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_preserves_order() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"["sqft_living", "bedrooms", "median_income"]"#).unwrap();

        let schema = FeatureSchema::load(file.path()).unwrap();
        assert_eq!(schema.names(), ["sqft_living", "bedrooms", "median_income"]);
        assert_eq!(schema.len(), 3);
    }

    #[test]
    fn test_rejects_duplicates_and_empty() {
        assert!(FeatureSchema::new(vec![]).is_err());
        assert!(FeatureSchema::new(vec!["a".into(), "a".into()]).is_err());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = FeatureSchema::load(Path::new("/nonexistent/model_features.json")).unwrap_err();
        assert!(matches!(err, ArtifactError::Io { .. }));
    }
}
