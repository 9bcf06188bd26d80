//! Protection valuation.
//!
//! A record's raw value is turned into usable capacity against one exposure
//! by a multiplicative pair factor:
//!
//! ```text
//! f = (1 - H_type) x (1 - H_fx) x maturity_factor
//! ```
//!
//! `H_type` is looked up per collateral record from a [`HaircutLookup`]. The
//! currency and maturity terms depend on the exposure and are computed per
//! (protection, exposure) pair.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::protection::CollateralType;
use crate::config::CrmConfig;
use crate::types::{year_fraction, Cqs, Currency, Rate, Years};

// ---------------------------------------------------------------------------
// Haircut lookup
// ---------------------------------------------------------------------------

/// Supplies the type/issuer/maturity haircut for a collateral item.
///
/// `None` means the collateral is not eligible and contributes nothing.
pub trait HaircutLookup {
    fn haircut(
        &self,
        collateral_type: CollateralType,
        issuer_cqs: Option<Cqs>,
        residual_maturity: Option<Years>,
    ) -> Option<Rate>;
}

impl<F> HaircutLookup for F
where
    F: Fn(CollateralType, Option<Cqs>, Option<Years>) -> Option<Rate>,
{
    fn haircut(
        &self,
        collateral_type: CollateralType,
        issuer_cqs: Option<Cqs>,
        residual_maturity: Option<Years>,
    ) -> Option<Rate> {
        self(collateral_type, issuer_cqs, residual_maturity)
    }
}

/// Supervisory volatility adjustments for financial collateral under the
/// comprehensive method (10-day liquidation period).
///
/// Debt securities are banded by issuer CQS and residual maturity
/// (<= 1y, <= 5y, > 5y). Unknown residual maturity falls into the longest
/// band. Real estate and receivables are not financial collateral and are
/// ineligible here.
#[derive(Debug, Clone, Copy, Default)]
pub struct SupervisoryHaircuts;

impl SupervisoryHaircuts {
    fn band(residual_maturity: Option<Years>) -> usize {
        match residual_maturity {
            Some(m) if m <= dec!(1) => 0,
            Some(m) if m <= dec!(5) => 1,
            _ => 2,
        }
    }
}

impl HaircutLookup for SupervisoryHaircuts {
    fn haircut(
        &self,
        collateral_type: CollateralType,
        issuer_cqs: Option<Cqs>,
        residual_maturity: Option<Years>,
    ) -> Option<Rate> {
        let band = Self::band(residual_maturity);
        match collateral_type {
            CollateralType::Cash => Some(dec!(0)),
            CollateralType::Gold => Some(dec!(0.15)),
            CollateralType::GovernmentBond => {
                let table = match issuer_cqs? {
                    1 => [dec!(0.005), dec!(0.02), dec!(0.04)],
                    2 | 3 => [dec!(0.01), dec!(0.03), dec!(0.06)],
                    4 => [dec!(0.15), dec!(0.15), dec!(0.15)],
                    _ => return None,
                };
                Some(table[band])
            }
            CollateralType::CorporateBond => {
                let table = match issuer_cqs? {
                    1 => [dec!(0.01), dec!(0.04), dec!(0.08)],
                    2 | 3 => [dec!(0.02), dec!(0.06), dec!(0.12)],
                    _ => return None,
                };
                Some(table[band])
            }
            CollateralType::MainIndexEquity => Some(dec!(0.15)),
            CollateralType::Equity => Some(dec!(0.25)),
            CollateralType::RealEstate | CollateralType::Receivables => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Pair factors
// ---------------------------------------------------------------------------

/// Residual maturity in years from the reporting date, when both are known.
pub fn residual_maturity(
    maturity_date: Option<NaiveDate>,
    reporting_date: Option<NaiveDate>,
) -> Option<Years> {
    Some(year_fraction(reporting_date?, maturity_date?))
}

/// Maturity-mismatch factor `(t - floor) / (T - floor)` with
/// `T = min(exposure residual, cap)`.
///
/// Returns `None` when either residual maturity is unknown; the adjustment is
/// then not applied.
pub fn maturity_mismatch_factor(
    protection_residual: Option<Years>,
    exposure_residual: Option<Years>,
    config: &CrmConfig,
) -> Option<Rate> {
    let t = protection_residual?;
    let exposure = exposure_residual?;
    let floor = config.min_residual_tenor_years;
    let big_t = exposure.min(config.maturity_cap_years);

    if t >= big_t {
        return Some(Decimal::ONE);
    }
    if t < floor {
        return Some(Decimal::ZERO);
    }
    // floor <= t < T, so T - floor > 0
    Some((t - floor) / (big_t - floor))
}

/// `1 - H_fx` when both currencies are known and differ, else `None`.
pub fn currency_mismatch_factor(
    protection: Option<&Currency>,
    exposure: Option<&Currency>,
    config: &CrmConfig,
) -> Option<Rate> {
    match (protection, exposure) {
        (Some(p), Some(e)) if p != e => Some(Decimal::ONE - config.currency_mismatch_haircut),
        _ => None,
    }
}

/// Breakdown of the factor applied to one (protection, exposure) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairValuation {
    /// `1 - H_type`; one for guarantees and provisions.
    pub type_factor: Rate,
    /// `None` when the currency adjustment did not apply.
    pub currency_factor: Option<Rate>,
    /// `None` when the maturity adjustment did not apply.
    pub maturity_factor: Option<Rate>,
}

impl PairValuation {
    pub fn unadjusted() -> Self {
        Self {
            type_factor: Decimal::ONE,
            currency_factor: None,
            maturity_factor: None,
        }
    }

    pub fn factor(&self) -> Rate {
        self.type_factor
            * self.currency_factor.unwrap_or(Decimal::ONE)
            * self.maturity_factor.unwrap_or(Decimal::ONE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CrmConfig {
        CrmConfig::default()
    }

    #[test]
    fn test_supervisory_cash_and_equity() {
        let h = SupervisoryHaircuts;
        assert_eq!(h.haircut(CollateralType::Cash, None, None), Some(dec!(0)));
        assert_eq!(h.haircut(CollateralType::Equity, None, None), Some(dec!(0.25)));
        assert_eq!(
            h.haircut(CollateralType::MainIndexEquity, None, None),
            Some(dec!(0.15))
        );
    }

    #[test]
    fn test_supervisory_bond_bands() {
        let h = SupervisoryHaircuts;
        assert_eq!(
            h.haircut(CollateralType::GovernmentBond, Some(1), Some(dec!(0.5))),
            Some(dec!(0.005))
        );
        assert_eq!(
            h.haircut(CollateralType::GovernmentBond, Some(2), Some(dec!(3))),
            Some(dec!(0.03))
        );
        // unknown maturity -> longest band
        assert_eq!(
            h.haircut(CollateralType::CorporateBond, Some(1), None),
            Some(dec!(0.08))
        );
    }

    #[test]
    fn test_supervisory_ineligible() {
        let h = SupervisoryHaircuts;
        assert_eq!(h.haircut(CollateralType::CorporateBond, Some(4), None), None);
        assert_eq!(h.haircut(CollateralType::GovernmentBond, None, None), None);
        assert_eq!(h.haircut(CollateralType::RealEstate, None, None), None);
    }

    #[test]
    fn test_closure_lookup() {
        let flat = |_: CollateralType, _: Option<Cqs>, _: Option<Years>| Some(dec!(0.1));
        assert_eq!(flat.haircut(CollateralType::RealEstate, None, None), Some(dec!(0.1)));
    }

    #[test]
    fn test_maturity_factor_cases() {
        let c = config();
        // protection outlives exposure
        assert_eq!(
            maturity_mismatch_factor(Some(dec!(3)), Some(dec!(2)), &c),
            Some(dec!(1))
        );
        // below floor
        assert_eq!(
            maturity_mismatch_factor(Some(dec!(0.2)), Some(dec!(2)), &c),
            Some(dec!(0))
        );
        // (1.25 - 0.25) / (4.25 - 0.25) = 0.25
        assert_eq!(
            maturity_mismatch_factor(Some(dec!(1.25)), Some(dec!(4.25)), &c),
            Some(dec!(0.25))
        );
        // exposure capped at 5y: (2.75 - 0.25) / (5 - 0.25)
        let f = maturity_mismatch_factor(Some(dec!(2.75)), Some(dec!(10)), &c).unwrap();
        assert_eq!(f, dec!(2.5) / dec!(4.75));
        // five-year protection covers anything longer
        assert_eq!(
            maturity_mismatch_factor(Some(dec!(5)), Some(dec!(30)), &c),
            Some(dec!(1))
        );
    }

    #[test]
    fn test_maturity_factor_disabled_when_unknown() {
        let c = config();
        assert_eq!(maturity_mismatch_factor(None, Some(dec!(2)), &c), None);
        assert_eq!(maturity_mismatch_factor(Some(dec!(2)), None, &c), None);
    }

    #[test]
    fn test_currency_factor() {
        let c = config();
        assert_eq!(
            currency_mismatch_factor(Some(&Currency::USD), Some(&Currency::GBP), &c),
            Some(dec!(0.92))
        );
        assert_eq!(
            currency_mismatch_factor(Some(&Currency::GBP), Some(&Currency::GBP), &c),
            None
        );
        assert_eq!(currency_mismatch_factor(None, Some(&Currency::GBP), &c), None);
    }

    #[test]
    fn test_residual_maturity_requires_both_dates() {
        let d = NaiveDate::from_ymd_opt(2026, 1, 1);
        let r = NaiveDate::from_ymd_opt(2025, 1, 1);
        assert_eq!(residual_maturity(d, r), Some(dec!(1)));
        assert_eq!(residual_maturity(d, None), None);
        assert_eq!(residual_maturity(None, r), None);
    }

    #[test]
    fn test_pair_factor_composes() {
        let v = PairValuation {
            type_factor: dec!(0.75),
            currency_factor: Some(dec!(0.92)),
            maturity_factor: Some(dec!(0.5)),
        };
        assert_eq!(v.factor(), dec!(0.345));
        assert_eq!(PairValuation::unadjusted().factor(), dec!(1));
    }
}
