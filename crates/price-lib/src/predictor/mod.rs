//! Price prediction engine

mod confidence;
mod inference;
mod output;

pub use confidence::{estimate_confidence, neighbor_confidence, EPSILON};
pub use inference::PricePredictor;
pub use output::{format_float, OutputConfig, OutputFormatter, CURRENCY_PREFIX};
