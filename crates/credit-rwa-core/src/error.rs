use thiserror::Error;

/// Failures that prevent a run from starting at all.
///
/// Data problems found while resolving or allocating are never raised through
/// this type; they accumulate as [`crate::issues::CalculationIssue`]s on the
/// result instead.
#[derive(Debug, Error)]
pub enum RwaError {
    #[error("Invalid input: {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for RwaError {
    fn from(e: serde_json::Error) -> Self {
        RwaError::SerializationError(e.to_string())
    }
}
