//! Feature preparation for inference
//!
//! Turns a batch of raw instance records into the numeric matrix the
//! pipeline expects: demographic enrichment by postal code, reconciliation
//! against the feature schema, and imputation of absent values.

use crate::artifacts::{DemographicTable, FeatureSchema, ZIPCODE_COLUMN};
use crate::error::PredictError;
use crate::models::InstanceRecord;
use ndarray::{Array2, ArrayView1, ArrayView2};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

/// Value used for absent cells and for schema columns without an override
pub const DEFAULT_FILL: f64 = 0.0;

/// Per-column defaults for schema columns missing from the input
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImputeStrategy {
    defaults: HashMap<String, f64>,
}

impl ImputeStrategy {
    pub fn new(defaults: HashMap<String, f64>) -> Self {
        Self { defaults }
    }

    pub fn with_default(mut self, column: impl Into<String>, value: f64) -> Self {
        self.defaults.insert(column.into(), value);
        self
    }

    /// Default for a missing column, falling back to [`DEFAULT_FILL`]
    pub fn default_for(&self, column: &str) -> f64 {
        self.defaults.get(column).copied().unwrap_or(DEFAULT_FILL)
    }
}

/// Schema-ordered, fully imputed numeric features
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    columns: Vec<String>,
    values: Array2<f64>,
}

impl FeatureMatrix {
    pub fn new(columns: Vec<String>, values: Array2<f64>) -> Self {
        debug_assert_eq!(columns.len(), values.ncols());
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_cols(&self) -> usize {
        self.values.ncols()
    }

    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.values.column(idx))
    }
}

/// Column-major frame with absent values, built from the raw records
struct Frame {
    n_rows: usize,
    columns: Vec<String>,
    data: Vec<Vec<Option<f64>>>,
    index: HashMap<String, usize>,
}

impl Frame {
    fn new(n_rows: usize) -> Self {
        Self {
            n_rows,
            columns: Vec::new(),
            data: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn column_mut(&mut self, name: &str) -> &mut Vec<Option<f64>> {
        let idx = match self.index.get(name) {
            Some(&idx) => idx,
            None => {
                self.columns.push(name.to_string());
                self.data.push(vec![None; self.n_rows]);
                self.index.insert(name.to_string(), self.data.len() - 1);
                self.data.len() - 1
            }
        };
        &mut self.data[idx]
    }

    fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.index.get(name).map(|&idx| self.data[idx].as_slice())
    }
}

/// Prepares raw records for the pipeline
#[derive(Debug, Clone, Default)]
pub struct FeaturePreparer {
    impute: ImputeStrategy,
}

impl FeaturePreparer {
    pub fn new(impute: ImputeStrategy) -> Self {
        Self { impute }
    }

    pub fn impute_strategy(&self) -> &ImputeStrategy {
        &self.impute
    }

    /// Build the prepared feature matrix for a batch of records
    ///
    /// With a schema, the output columns are exactly the schema's, in order.
    /// Without one, columns keep first-appearance order followed by any
    /// demographic attributes.
    pub fn prepare(
        &self,
        records: &[InstanceRecord],
        schema: Option<&FeatureSchema>,
        demographics: Option<&DemographicTable>,
    ) -> Result<FeatureMatrix, PredictError> {
        if records.is_empty() {
            return Err(PredictError::EmptyInput);
        }

        let (mut frame, zipcodes) = build_frame(records)?;

        if let (Some(zipcodes), Some(table)) = (zipcodes.as_deref(), demographics) {
            merge_demographics(&mut frame, zipcodes, table);
        }

        let columns: Vec<String> = match schema {
            Some(schema) => schema.names().to_vec(),
            None => frame.columns.clone(),
        };

        let n_rows = frame.n_rows;
        let mut values = Array2::from_elem((n_rows, columns.len()), DEFAULT_FILL);
        for (col_idx, name) in columns.iter().enumerate() {
            match frame.column(name) {
                Some(cells) => {
                    for (row, cell) in cells.iter().enumerate() {
                        values[[row, col_idx]] = cell.unwrap_or(DEFAULT_FILL);
                    }
                }
                None => {
                    let fill = self.impute.default_for(name);
                    debug!(column = %name, fill, "Schema column missing from input, imputing");
                    values.column_mut(col_idx).fill(fill);
                }
            }
        }

        if let Some(schema) = schema {
            let dropped = frame
                .columns
                .iter()
                .filter(|c| !schema.names().contains(c))
                .count();
            if dropped > 0 {
                debug!(dropped, "Dropped columns not in feature schema");
            }
        }

        Ok(FeatureMatrix::new(columns, values))
    }
}

/// Collect the union of record keys into a frame; postal codes are split out
fn build_frame(records: &[InstanceRecord]) -> Result<(Frame, Option<Vec<Option<String>>>), PredictError> {
    let mut frame = Frame::new(records.len());
    let mut zipcodes: Option<Vec<Option<String>>> = None;

    for (row, record) in records.iter().enumerate() {
        for (key, value) in record {
            if key == ZIPCODE_COLUMN {
                let column = zipcodes.get_or_insert_with(|| vec![None; records.len()]);
                column[row] = zipcode_to_string(value);
                continue;
            }
            let cell = coerce_value(key, value)?;
            frame.column_mut(key)[row] = cell;
        }
    }

    Ok((frame, zipcodes))
}

/// Left join: rows without a match keep absent demographic values
fn merge_demographics(frame: &mut Frame, zipcodes: &[Option<String>], table: &DemographicTable) {
    let matches: Vec<Option<&[Option<f64>]>> = zipcodes
        .iter()
        .map(|z| z.as_deref().and_then(|z| table.lookup(z)))
        .collect();

    let unmatched = matches.iter().filter(|m| m.is_none()).count();
    if unmatched > 0 {
        debug!(unmatched, "Rows without demographic match");
    }

    for (attr_idx, name) in table.columns().iter().enumerate() {
        let column = frame.column_mut(name);
        for (row, found) in matches.iter().enumerate() {
            // Caller-supplied values take precedence over the table.
            if column[row].is_none() {
                column[row] = found.and_then(|attrs| attrs[attr_idx]);
            }
        }
    }
}

fn coerce_value(feature: &str, value: &Value) -> Result<Option<f64>, PredictError> {
    let invalid = |reason: String| PredictError::InvalidFeature {
        feature: feature.to_string(),
        reason,
    };

    match value {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(if *b { 1.0 } else { 0.0 })),
        Value::Number(n) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| invalid(format!("number {} is not representable", n))),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Some)
            .ok_or_else(|| invalid(format!("'{}' is not a finite number", s))),
        Value::Array(_) | Value::Object(_) => Err(invalid("expected a scalar value".to_string())),
    }
}

/// Render a postal code as a string key, keeping leading zeros of string input
fn zipcode_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => Some(i.to_string()),
            (None, Some(f)) if f.fract() == 0.0 && f.is_finite() => Some(format!("{}", f as i64)),
            _ => Some(n.to_string()),
        },
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn record(value: Value) -> InstanceRecord {
        match value {
            Value::Object(map) => map,
            _ => panic!("test records must be objects"),
        }
    }

    fn house(zipcode: &str) -> InstanceRecord {
        record(json!({
            "bedrooms": 3,
            "bathrooms": 2.5,
            "sqft_living": 2000,
            "sqft_lot": 5000,
            "floors": 2,
            "sqft_above": 1500,
            "sqft_basement": 500,
            "zipcode": zipcode
        }))
    }

    fn schema() -> FeatureSchema {
        FeatureSchema::new(
            ["sqft_living", "bedrooms", "median_income", "bathrooms", "waterfront"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
        .unwrap()
    }

    fn demographics() -> DemographicTable {
        let mut rows = HashMap::new();
        rows.insert("98125".to_string(), vec![Some(72000.0), Some(1.5)]);
        rows.insert("01234".to_string(), vec![None, Some(2.0)]);
        DemographicTable::new(vec!["median_income".into(), "density".into()], rows).unwrap()
    }

    #[test]
    fn test_columns_follow_schema_order() {
        let preparer = FeaturePreparer::default();
        let schema = schema();
        let matrix = preparer
            .prepare(&[house("98125"), house("98001")], Some(&schema), Some(&demographics()))
            .unwrap();

        assert_eq!(matrix.columns(), schema.names());
        assert_eq!(matrix.n_rows(), 2);
        assert_eq!(matrix.values().row(0).to_vec(), vec![2000.0, 3.0, 72000.0, 2.5, 0.0]);
    }

    #[test]
    fn test_unmatched_zipcode_keeps_row_and_imputes_zero() {
        let preparer = FeaturePreparer::default();
        let matrix = preparer
            .prepare(&[house("00000")], Some(&schema()), Some(&demographics()))
            .unwrap();

        assert_eq!(matrix.n_rows(), 1);
        assert_eq!(matrix.column("median_income").unwrap()[0], 0.0);
    }

    #[test]
    fn test_unknown_zipcodes_produce_identical_rows() {
        let preparer = FeaturePreparer::default();
        let matrix = preparer
            .prepare(&[house("11111"), house("22222")], Some(&schema()), Some(&demographics()))
            .unwrap();

        assert_eq!(matrix.values().row(0), matrix.values().row(1));
    }

    #[test]
    fn test_leading_zero_zipcode_matches() {
        let preparer = FeaturePreparer::default();
        let matrix = preparer.prepare(&[house("01234")], None, Some(&demographics())).unwrap();

        // Absent attribute in the table imputes to zero, present one joins
        assert_eq!(matrix.column("median_income").unwrap()[0], 0.0);
        assert_eq!(matrix.column("density").unwrap()[0], 2.0);
    }

    #[test]
    fn test_zipcode_dropped_without_schema() {
        let preparer = FeaturePreparer::default();
        let matrix = preparer.prepare(&[house("98125")], None, None).unwrap();

        assert!(matrix.column(ZIPCODE_COLUMN).is_none());
        assert_eq!(matrix.columns()[0], "bedrooms");
        assert_eq!(matrix.n_cols(), 7);
    }

    #[test]
    fn test_numeric_zipcode_is_stringified() {
        let preparer = FeaturePreparer::default();
        let rec = record(json!({"sqft_living": 1000, "zipcode": 98125}));
        let matrix = preparer.prepare(&[rec], None, Some(&demographics())).unwrap();
        assert_eq!(matrix.column("median_income").unwrap()[0], 72000.0);
    }

    #[test]
    fn test_union_of_keys_with_absent_values() {
        let preparer = FeaturePreparer::default();
        let records = vec![
            record(json!({"a": 1, "b": 2})),
            record(json!({"c": 3, "a": null})),
        ];
        let matrix = preparer.prepare(&records, None, None).unwrap();

        assert_eq!(matrix.columns(), ["a", "b", "c"]);
        assert_eq!(matrix.values().row(1).to_vec(), vec![0.0, 0.0, 3.0]);
    }

    #[test]
    fn test_impute_strategy_overrides_missing_columns_only() {
        let preparer = FeaturePreparer::new(ImputeStrategy::default().with_default("waterfront", 0.5));
        let matrix = preparer.prepare(&[house("98125")], Some(&schema()), None).unwrap();

        assert_eq!(matrix.column("waterfront").unwrap()[0], 0.5);
        // Columns without an override fall back to zero
        assert_eq!(matrix.column("median_income").unwrap()[0], 0.0);
    }

    #[test]
    fn test_extra_columns_discarded() {
        let preparer = FeaturePreparer::default();
        let mut rec = house("98125");
        rec.insert("garage_spaces".into(), json!(2));
        let matrix = preparer.prepare(&[rec], Some(&schema()), None).unwrap();
        assert!(matrix.column("garage_spaces").is_none());
        assert_eq!(matrix.n_cols(), 5);
    }

    #[test]
    fn test_caller_value_wins_over_demographics() {
        let preparer = FeaturePreparer::default();
        let mut rec = house("98125");
        rec.insert("median_income".into(), json!(1.0));
        let matrix = preparer.prepare(&[rec], Some(&schema()), Some(&demographics())).unwrap();
        assert_eq!(matrix.column("median_income").unwrap()[0], 1.0);
    }

    #[test]
    fn test_empty_batch_rejected() {
        let err = FeaturePreparer::default().prepare(&[], None, None).unwrap_err();
        assert!(matches!(err, PredictError::EmptyInput));
    }

    #[test]
    fn test_non_numeric_string_rejected() {
        let rec = record(json!({"bedrooms": "three"}));
        let err = FeaturePreparer::default().prepare(&[rec], None, None).unwrap_err();
        assert!(matches!(err, PredictError::InvalidFeature { ref feature, .. } if feature == "bedrooms"));
    }

    #[test]
    fn test_value_coercion() {
        assert_eq!(coerce_value("x", &json!(true)).unwrap(), Some(1.0));
        assert_eq!(coerce_value("x", &json!(" 2.5 ")).unwrap(), Some(2.5));
        assert_eq!(coerce_value("x", &Value::Null).unwrap(), None);
        assert!(coerce_value("x", &json!([1])).is_err());
    }

    #[test]
    fn test_non_finite_strings_rejected() {
        for text in ["NaN", "inf", "-infinity"] {
            let rec = record(json!({"bedrooms": 3, "sqft_living": text}));
            let err = FeaturePreparer::default().prepare(&[rec], None, None).unwrap_err();
            assert!(
                matches!(err, PredictError::InvalidFeature { ref feature, .. } if feature == "sqft_living"),
                "{text} should be rejected"
            );
            assert!(err.is_client_error());
        }
    }
}
