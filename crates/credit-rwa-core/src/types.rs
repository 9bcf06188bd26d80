use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// All monetary values. Wraps Decimal to prevent accidental f64 usage.
pub type Money = Decimal;

/// Rates expressed as decimals (0.08 = 8%). Never as percentages.
pub type Rate = Decimal;

/// Year fractions or counts
pub type Years = Decimal;

/// Credit quality step, 1 (best) to 6 (worst).
pub type Cqs = u8;

/// Currency code
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Currency {
    #[default]
    GBP,
    USD,
    EUR,
    CHF,
    JPY,
    CAD,
    AUD,
    HKD,
    SGD,
    Other(String),
}

/// Exposure class as assigned by the upstream classification step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExposureClass {
    Sovereign,
    Institution,
    Corporate,
    Retail,
    Mortgage,
    Equity,
    Other,
}

impl std::fmt::Display for ExposureClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExposureClass::Sovereign => write!(f, "Sovereign"),
            ExposureClass::Institution => write!(f, "Institution"),
            ExposureClass::Corporate => write!(f, "Corporate"),
            ExposureClass::Retail => write!(f, "Retail"),
            ExposureClass::Mortgage => write!(f, "Mortgage"),
            ExposureClass::Equity => write!(f, "Equity"),
            ExposureClass::Other => write!(f, "Other"),
        }
    }
}

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "rust_decimal_128bit".to_string(),
        },
    }
}

/// Act/365 year fraction between two dates. Negative when `to` precedes `from`.
pub fn year_fraction(from: NaiveDate, to: NaiveDate) -> Years {
    let days = (to - from).num_days();
    Decimal::from(days) / Decimal::from(365)
}
