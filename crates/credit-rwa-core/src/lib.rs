pub mod config;
pub mod error;
pub mod issues;
pub mod types;

#[cfg(feature = "hierarchy")]
pub mod hierarchy;

#[cfg(feature = "crm")]
pub mod crm;

#[cfg(feature = "crm")]
pub mod pipeline;

pub use config::{CrmConfig, EngineConfig, HierarchyConfig, InheritancePolicy};
pub use error::RwaError;
pub use issues::{CalculationIssue, IssueCategory, IssueCode, IssueSeverity};
pub use types::*;

/// Standard result type for all credit-rwa operations
pub type RwaResult<T> = Result<T, RwaError>;
