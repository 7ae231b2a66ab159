//! Demographic reference table keyed by postal code
//!
//! Postal codes stay strings end to end so that leading zeros survive.

use crate::error::ArtifactError;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use tracing::warn;

/// Name of the key column in the demographics file and in instance records
pub const ZIPCODE_COLUMN: &str = "zipcode";

/// Area-level attributes for each postal code
#[derive(Debug, Clone, Default)]
pub struct DemographicTable {
    columns: Vec<String>,
    rows: HashMap<String, Vec<Option<f64>>>,
}

impl DemographicTable {
    /// Build a table from attribute column names and keyed rows
    pub fn new(columns: Vec<String>, rows: HashMap<String, Vec<Option<f64>>>) -> Result<Self, String> {
        if let Some((key, _)) = rows.iter().find(|(_, values)| values.len() != columns.len()) {
            return Err(format!(
                "row for zipcode '{}' does not have {} attributes",
                key,
                columns.len()
            ));
        }
        Ok(Self { columns, rows })
    }

    /// Load a CSV file with a `zipcode` header column
    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        let path_str = path.display().to_string();
        let file = File::open(path).map_err(|source| ArtifactError::Io {
            path: path_str.clone(),
            source,
        })?;
        let csv_err = |source| ArtifactError::Csv {
            path: path_str.clone(),
            source,
        };

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(file);

        let headers = reader.headers().map_err(csv_err)?.clone();
        let key_idx = headers
            .iter()
            .position(|h| h == ZIPCODE_COLUMN)
            .ok_or_else(|| ArtifactError::Invalid {
                path: path_str.clone(),
                reason: format!("missing '{}' column", ZIPCODE_COLUMN),
            })?;

        let columns: Vec<String> = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != key_idx)
            .map(|(_, h)| h.to_string())
            .collect();

        let mut rows = HashMap::new();
        for result in reader.records() {
            let record = result.map_err(csv_err)?;
            let key = record.get(key_idx).unwrap_or_default().to_string();
            if key.is_empty() {
                continue;
            }

            let values: Vec<Option<f64>> = record
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != key_idx)
                .map(|(_, cell)| cell.parse::<f64>().ok().filter(|v| v.is_finite()))
                .collect();

            if rows.contains_key(&key) {
                warn!(zipcode = %key, path = %path_str, "Duplicate zipcode in demographics, keeping first row");
                continue;
            }
            rows.insert(key, values);
        }

        Self::new(columns, rows).map_err(|reason| ArtifactError::Invalid {
            path: path_str,
            reason,
        })
    }

    /// Attribute column names, in file order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Attribute values for a postal code, aligned with [`columns`](Self::columns)
    pub fn lookup(&self, zipcode: &str) -> Option<&[Option<f64>]> {
        self.rows.get(zipcode).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
