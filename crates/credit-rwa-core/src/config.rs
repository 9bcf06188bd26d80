//! Run configuration.
//!
//! Every threshold here is owned by the host pipeline. Each section
//! deserialises with defaults for missing fields, so a partial JSON document
//! is a valid configuration.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::RwaError;
use crate::types::{Rate, Years};
use crate::RwaResult;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Iteration ceiling for fixed-point hierarchy resolution
pub const DEFAULT_MAX_HIERARCHY_DEPTH: u32 = 10;
/// Supervisory add-on haircut when protection and exposure currencies differ
pub const DEFAULT_CURRENCY_MISMATCH_HAIRCUT: Rate = dec!(0.08);
/// Protection with less residual maturity than this is not recognised
pub const DEFAULT_MIN_RESIDUAL_TENOR_YEARS: Years = dec!(0.25);
/// Exposure residual maturity cap in the maturity-mismatch formula
pub const DEFAULT_MATURITY_CAP_YEARS: Years = dec!(5);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Where a counterparty without its own rating/turnover takes one from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InheritancePolicy {
    /// Own value, else the ultimate parent's own value, else none.
    #[default]
    UltimateParent,
    /// Own value, else the closest ancestor carrying one.
    NearestAncestor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchyConfig {
    /// Maximum number of fixed-point iterations per hierarchy.
    pub max_hierarchy_depth: u32,
    /// Applies to rating/CQS and, independently, to turnover.
    pub rating_inheritance: InheritancePolicy,
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            max_hierarchy_depth: DEFAULT_MAX_HIERARCHY_DEPTH,
            rating_inheritance: InheritancePolicy::UltimateParent,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrmConfig {
    /// Residual maturities are measured from this date. When absent, every
    /// maturity-based adjustment is disabled.
    pub reporting_date: Option<NaiveDate>,
    pub currency_mismatch_haircut: Rate,
    pub min_residual_tenor_years: Years,
    pub maturity_cap_years: Years,
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            reporting_date: None,
            currency_mismatch_haircut: DEFAULT_CURRENCY_MISMATCH_HAIRCUT,
            min_residual_tenor_years: DEFAULT_MIN_RESIDUAL_TENOR_YEARS,
            maturity_cap_years: DEFAULT_MATURITY_CAP_YEARS,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub hierarchy: HierarchyConfig,
    pub crm: CrmConfig,
}

// ---------------------------------------------------------------------------
// Validation / loading
// ---------------------------------------------------------------------------

impl HierarchyConfig {
    pub fn validate(&self) -> RwaResult<()> {
        // A zero ceiling resolves no parent edge at all.
        if self.max_hierarchy_depth == 0 {
            return Err(RwaError::InvalidConfig {
                field: "hierarchy.max_hierarchy_depth".into(),
                reason: "Depth ceiling must be at least 1.".into(),
            });
        }
        Ok(())
    }
}

impl CrmConfig {
    pub fn validate(&self) -> RwaResult<()> {
        if self.currency_mismatch_haircut < Decimal::ZERO
            || self.currency_mismatch_haircut > Decimal::ONE
        {
            return Err(RwaError::InvalidConfig {
                field: "crm.currency_mismatch_haircut".into(),
                reason: "Haircut must be between 0 and 1.".into(),
            });
        }
        if self.min_residual_tenor_years < Decimal::ZERO {
            return Err(RwaError::InvalidConfig {
                field: "crm.min_residual_tenor_years".into(),
                reason: "Minimum residual tenor cannot be negative.".into(),
            });
        }
        if self.maturity_cap_years <= self.min_residual_tenor_years {
            return Err(RwaError::InvalidConfig {
                field: "crm.maturity_cap_years".into(),
                reason: "Maturity cap must exceed the minimum residual tenor.".into(),
            });
        }
        Ok(())
    }
}

impl EngineConfig {
    pub fn validate(&self) -> RwaResult<()> {
        self.hierarchy.validate()?;
        self.crm.validate()
    }

    /// Parse and validate a JSON configuration document.
    pub fn from_json_str(json: &str) -> RwaResult<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.hierarchy.max_hierarchy_depth, 10);
        assert_eq!(
            config.hierarchy.rating_inheritance,
            InheritancePolicy::UltimateParent
        );
        assert_eq!(config.crm.currency_mismatch_haircut, dec!(0.08));
        assert_eq!(config.crm.min_residual_tenor_years, dec!(0.25));
        assert!(config.crm.reporting_date.is_none());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config = EngineConfig::from_json_str(
            r#"{ "hierarchy": { "max_hierarchy_depth": 25 },
                 "crm": { "reporting_date": "2025-12-31" } }"#,
        )
        .unwrap();
        assert_eq!(config.hierarchy.max_hierarchy_depth, 25);
        assert_eq!(config.crm.maturity_cap_years, dec!(5));
        assert_eq!(
            config.crm.reporting_date,
            NaiveDate::from_ymd_opt(2025, 12, 31)
        );
    }

    #[test]
    fn test_haircut_out_of_range_rejected() {
        let mut config = EngineConfig::default();
        config.crm.currency_mismatch_haircut = dec!(1.2);
        let err = config.validate().unwrap_err();
        assert!(matches!(err, RwaError::InvalidConfig { .. }));
    }

    #[test]
    fn test_zero_depth_ceiling_rejected() {
        let err = EngineConfig::from_json_str(r#"{ "hierarchy": { "max_hierarchy_depth": 0 } }"#)
            .unwrap_err();
        match err {
            RwaError::InvalidConfig { field, .. } => {
                assert_eq!(field, "hierarchy.max_hierarchy_depth")
            }
            other => panic!("unexpected error: {other}"),
        }
        let one = HierarchyConfig {
            max_hierarchy_depth: 1,
            ..HierarchyConfig::default()
        };
        assert!(one.validate().is_ok());
    }

    #[test]
    fn test_malformed_json_is_serialization_error() {
        let err = EngineConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, RwaError::SerializationError(_)));
    }
}
