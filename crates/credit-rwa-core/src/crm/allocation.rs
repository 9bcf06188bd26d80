//! Allocation of one protection record across the exposures it covers.
//!
//! Both strategies are pure: they take the record's remaining raw value and
//! the competing claims, and return grants. The caller owns the ledger of
//! what each exposure still has outstanding.

use std::cmp::Ordering;

use rust_decimal::{Decimal, RoundingStrategy};

use crate::types::{Money, Rate};

/// Decimal places kept on allocated amounts. Allocations round toward zero
/// and raw consumption away from zero, so a record never gives out more
/// than its value supports.
pub const ALLOCATION_DP: u32 = 10;

fn round_down(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(ALLOCATION_DP, RoundingStrategy::ToZero)
}

fn round_up(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(ALLOCATION_DP, RoundingStrategy::AwayFromZero)
}

/// One exposure competing for a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim<'a> {
    /// Position of the row in the reporting view.
    pub exposure: usize,
    pub reference: &'a str,
    pub risk_weight: Rate,
    pub gross_value: Money,
    /// Value not yet covered by earlier records.
    pub outstanding: Money,
    /// Pair valuation factor; capacity is `remaining_raw x factor`.
    pub factor: Rate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grant {
    pub exposure: usize,
    /// Adjusted value assigned to the exposure.
    pub allocated: Money,
    /// Raw value of the record used up by this grant.
    pub raw_consumed: Money,
}

/// Priority order: preliminary risk weight desc, gross value desc,
/// reference asc.
pub fn priority(a: &Claim<'_>, b: &Claim<'_>) -> Ordering {
    b.risk_weight
        .cmp(&a.risk_weight)
        .then_with(|| b.gross_value.cmp(&a.gross_value))
        .then_with(|| a.reference.cmp(b.reference))
}

/// Sort claims into allocation priority order.
pub fn rank(claims: &mut [Claim<'_>]) {
    claims.sort_by(priority);
}

/// Walk claims in priority order, giving each `min(capacity, outstanding)`
/// until the raw value is exhausted.
pub fn allocate_by_priority(raw_value: Money, claims: &[Claim<'_>]) -> Vec<Grant> {
    let mut ranked = claims.to_vec();
    rank(&mut ranked);

    let mut remaining = raw_value.max(Decimal::ZERO);
    let mut grants = Vec::new();
    for claim in &ranked {
        if remaining <= Decimal::ZERO {
            break;
        }
        if claim.factor <= Decimal::ZERO || claim.outstanding <= Decimal::ZERO {
            continue;
        }
        let capacity = round_down(remaining * claim.factor);
        let allocated = capacity.min(claim.outstanding);
        if allocated <= Decimal::ZERO {
            continue;
        }
        let raw_consumed = if allocated == capacity {
            remaining
        } else {
            round_up(allocated / claim.factor).min(remaining)
        };
        remaining -= raw_consumed;
        grants.push(Grant {
            exposure: claim.exposure,
            allocated,
            raw_consumed,
        });
    }
    grants
}

/// Spread `amount` across claims in proportion to their outstanding value,
/// capped at it. Any excess stays unused.
///
/// Claims are processed in the order given; the last positive claim takes the
/// rounding remainder so the total is exact.
pub fn allocate_pro_rata(amount: Money, claims: &[Claim<'_>]) -> Vec<Grant> {
    let eligible: Vec<&Claim<'_>> = claims
        .iter()
        .filter(|c| c.outstanding > Decimal::ZERO)
        .collect();
    let total: Money = eligible.iter().map(|c| c.outstanding).sum();
    if amount <= Decimal::ZERO || total <= Decimal::ZERO {
        return Vec::new();
    }
    if amount >= total {
        return eligible
            .iter()
            .map(|c| Grant {
                exposure: c.exposure,
                allocated: c.outstanding,
                raw_consumed: c.outstanding,
            })
            .collect();
    }

    let ratio = amount / total;
    let mut left = amount;
    let mut grants = Vec::with_capacity(eligible.len());
    for (n, claim) in eligible.iter().enumerate() {
        let share = if n + 1 == eligible.len() {
            left
        } else {
            round_down(claim.outstanding * ratio)
        };
        let allocated = share.min(claim.outstanding).min(left).max(Decimal::ZERO);
        left -= allocated;
        grants.push(Grant {
            exposure: claim.exposure,
            allocated,
            raw_consumed: allocated,
        });
    }
    grants
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn claim(exposure: usize, reference: &str, rw: Rate, outstanding: Money) -> Claim<'_> {
        Claim {
            exposure,
            reference,
            risk_weight: rw,
            gross_value: outstanding,
            outstanding,
            factor: Decimal::ONE,
        }
    }

    #[test]
    fn test_highest_weight_served_first() {
        let claims = vec![
            claim(0, "A", dec!(1.5), dec!(2_000_000)),
            claim(1, "B", dec!(1.0), dec!(1_000_000)),
            claim(2, "C", dec!(0.5), dec!(3_000_000)),
        ];
        let grants = allocate_by_priority(dec!(2_000_000), &claims);
        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].exposure, 0);
        assert_eq!(grants[0].allocated, dec!(2_000_000));
    }

    #[test]
    fn test_ties_broken_by_gross_then_reference() {
        let mut claims = vec![
            claim(0, "B", dec!(1), dec!(100)),
            claim(1, "A", dec!(1), dec!(100)),
            claim(2, "C", dec!(1), dec!(200)),
        ];
        rank(&mut claims);
        let order: Vec<&str> = claims.iter().map(|c| c.reference).collect();
        assert_eq!(order, vec!["C", "A", "B"]);
    }

    #[test]
    fn test_spillover_to_next_claim() {
        let claims = vec![
            claim(0, "A", dec!(1.5), dec!(300)),
            claim(1, "B", dec!(1.0), dec!(1000)),
        ];
        let grants = allocate_by_priority(dec!(500), &claims);
        assert_eq!(grants[0].allocated, dec!(300));
        assert_eq!(grants[1].allocated, dec!(200));
        let raw: Money = grants.iter().map(|g| g.raw_consumed).sum();
        assert_eq!(raw, dec!(500));
    }

    #[test]
    fn test_factor_scales_capacity_and_raw_use() {
        let mut a = claim(0, "A", dec!(1.5), dec!(40));
        a.factor = dec!(0.5);
        let b = claim(1, "B", dec!(1.0), dec!(1000));
        let grants = allocate_by_priority(dec!(100), &[a, b]);
        // A: capacity 50, takes 40, consumes 80 raw; B gets the 20 raw left
        assert_eq!(grants[0].allocated, dec!(40));
        assert_eq!(grants[0].raw_consumed, dec!(80));
        assert_eq!(grants[1].allocated, dec!(20));
    }

    #[test]
    fn test_zero_factor_skipped() {
        let mut a = claim(0, "A", dec!(1.5), dec!(40));
        a.factor = Decimal::ZERO;
        let grants = allocate_by_priority(dec!(100), &[a]);
        assert!(grants.is_empty());
    }

    #[test]
    fn test_zero_value_and_zero_covered() {
        assert!(allocate_by_priority(Decimal::ZERO, &[claim(0, "A", dec!(1), dec!(10))]).is_empty());
        assert!(allocate_by_priority(dec!(10), &[]).is_empty());
        assert!(allocate_pro_rata(Decimal::ZERO, &[claim(0, "A", dec!(1), dec!(10))]).is_empty());
        assert!(allocate_pro_rata(dec!(10), &[]).is_empty());
    }

    #[test]
    fn test_pro_rata_split() {
        let claims = vec![
            claim(0, "A", dec!(1), dec!(300)),
            claim(1, "B", dec!(1), dec!(100)),
        ];
        let grants = allocate_pro_rata(dec!(200), &claims);
        assert_eq!(grants[0].allocated, dec!(150));
        assert_eq!(grants[1].allocated, dec!(50));
    }

    #[test]
    fn test_pro_rata_excess_unused() {
        let claims = vec![claim(0, "A", dec!(1), dec!(30)), claim(1, "B", dec!(1), dec!(70))];
        let grants = allocate_pro_rata(dec!(500), &claims);
        let total: Money = grants.iter().map(|g| g.allocated).sum();
        assert_eq!(total, dec!(100));
    }

    #[test]
    fn test_pro_rata_exact_with_thirds() {
        let claims = vec![
            claim(0, "A", dec!(1), dec!(1)),
            claim(1, "B", dec!(1), dec!(1)),
            claim(2, "C", dec!(1), dec!(1)),
        ];
        let grants = allocate_pro_rata(dec!(1), &claims);
        let total: Money = grants.iter().map(|g| g.allocated).sum();
        assert_eq!(total, dec!(1));
        assert!(grants.iter().all(|g| g.allocated <= dec!(1)));
    }
}
