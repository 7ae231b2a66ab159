//! Prediction output formatting
//!
//! Converts raw pipeline outputs into per-instance results with a
//! currency-prefixed price string and optional confidence.

use crate::models::PredictionResult;

/// Currency prefix for price strings
pub const CURRENCY_PREFIX: &str = "$";

/// Magnitudes at or above this are rendered in exponent form, e.g. `1e+16`
const EXPONENT_THRESHOLD: f64 = 1e16;

/// Nonzero magnitudes below this are rendered in exponent form, e.g. `1e-05`
const SMALL_EXPONENT_THRESHOLD: f64 = 1e-4;

/// Configuration for output formatting
#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// Prefix placed before every price string
    pub currency_prefix: String,
    /// Confidence below which a prediction counts as low confidence
    pub low_confidence_threshold: f64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            currency_prefix: CURRENCY_PREFIX.to_string(),
            low_confidence_threshold: 0.5,
        }
    }
}

/// Formats raw model outputs into prediction results
#[derive(Debug, Clone, Default)]
pub struct OutputFormatter {
    config: OutputConfig,
}

impl OutputFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: OutputConfig) -> Self {
        Self { config }
    }

    /// One result per prediction, indexed by input position
    ///
    /// # Arguments
    /// * `predictions` - Raw price estimates, one per instance
    /// * `confidences` - Per-instance confidence, or `None` when the estimator cannot provide it
    pub fn format(&self, predictions: &[f64], confidences: Option<&[f64]>) -> Vec<PredictionResult> {
        predictions
            .iter()
            .enumerate()
            .map(|(i, &value)| PredictionResult {
                prediction: format!("{}{}", self.config.currency_prefix, format_float(value)),
                input_index: i,
                confidence: confidences.and_then(|c| c.get(i).copied()),
            })
            .collect()
    }

    /// Count of results whose confidence is below the configured threshold
    pub fn count_low_confidence(&self, results: &[PredictionResult]) -> usize {
        results
            .iter()
            .filter(|r| matches!(r.confidence, Some(c) if c < self.config.low_confidence_threshold))
            .count()
    }
}

/// Render like a decimal float literal: integral values keep a `.0`,
/// very large or very small magnitudes use a signed two-digit exponent
pub fn format_float(value: f64) -> String {
    if !value.is_finite() {
        return format!("{}", value);
    }
    let magnitude = value.abs();
    if magnitude >= EXPONENT_THRESHOLD || (magnitude != 0.0 && magnitude < SMALL_EXPONENT_THRESHOLD) {
        let scientific = format!("{:e}", value);
        return match scientific.split_once('e') {
            Some((mantissa, exponent)) => match exponent.parse::<i32>() {
                Ok(exp) => format!(
                    "{}e{}{:02}",
                    mantissa,
                    if exp < 0 { '-' } else { '+' },
                    exp.abs()
                ),
                Err(_) => scientific,
            },
            None => scientific,
        };
    }
    if value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}
