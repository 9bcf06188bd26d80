//! Preliminary (pre-CRM) risk weights.
//!
//! These weights only rank exposures competing for the same protection. The
//! final risk weight is a downstream concern and is never computed here.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::hierarchy::ReportingExposure;
use crate::types::{ExposureClass, Rate};

/// Collaborator supplying a preliminary risk weight per reporting row.
pub trait PreliminaryRiskWeight {
    fn preliminary_risk_weight(&self, exposure: &ReportingExposure) -> Rate;
}

impl<F> PreliminaryRiskWeight for F
where
    F: Fn(&ReportingExposure) -> Rate,
{
    fn preliminary_risk_weight(&self, exposure: &ReportingExposure) -> Rate {
        self(exposure)
    }
}

/// Standardised-approach weights by exposure class and effective CQS.
///
/// Rows without a class are weighted 100%.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardisedRiskWeights;

impl StandardisedRiskWeights {
    pub fn weight(class: Option<ExposureClass>, cqs: Option<u8>) -> Rate {
        match class {
            Some(ExposureClass::Sovereign) => match cqs {
                Some(1) => dec!(0),
                Some(2) => dec!(0.20),
                Some(3) => dec!(0.50),
                Some(4) | Some(5) => dec!(1.00),
                Some(_) => dec!(1.50),
                None => dec!(1.00),
            },
            Some(ExposureClass::Institution) => match cqs {
                Some(1) => dec!(0.20),
                Some(2) | Some(3) => dec!(0.50),
                Some(4) | Some(5) => dec!(1.00),
                Some(_) => dec!(1.50),
                None => dec!(0.50),
            },
            Some(ExposureClass::Corporate) => match cqs {
                Some(1) => dec!(0.20),
                Some(2) => dec!(0.50),
                Some(3) | Some(4) => dec!(1.00),
                Some(_) => dec!(1.50),
                None => dec!(1.00),
            },
            Some(ExposureClass::Retail) => dec!(0.75),
            Some(ExposureClass::Mortgage) => dec!(0.35),
            Some(ExposureClass::Equity) | Some(ExposureClass::Other) | None => dec!(1.00),
        }
    }
}

impl PreliminaryRiskWeight for StandardisedRiskWeights {
    fn preliminary_risk_weight(&self, exposure: &ReportingExposure) -> Rate {
        Self::weight(exposure.exposure_class, exposure.effective_cqs)
    }
}

/// Weights supplied per exposure reference by an upstream calculator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrecomputedRiskWeights {
    pub weights: BTreeMap<String, Rate>,
    /// Used for references missing from `weights`.
    pub default: Rate,
}

impl Default for PrecomputedRiskWeights {
    fn default() -> Self {
        Self {
            weights: BTreeMap::new(),
            default: Decimal::ONE,
        }
    }
}

impl PreliminaryRiskWeight for PrecomputedRiskWeights {
    fn preliminary_risk_weight(&self, exposure: &ReportingExposure) -> Rate {
        self.weights
            .get(&exposure.exposure_reference)
            .copied()
            .unwrap_or(self.default)
    }
}
