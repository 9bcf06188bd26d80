use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span};

use super::allocation::{allocate_by_priority, allocate_pro_rata, Claim, Grant};
use super::expansion::ExpansionIndex;
use super::protection::{
    GuarantorType, ProtectionDetail, ProtectionInput, ProtectionKind, ProtectionLink,
    ProtectionRecord,
};
use super::risk_weight::PreliminaryRiskWeight;
use super::valuation::{
    currency_mismatch_factor, maturity_mismatch_factor, residual_maturity, HaircutLookup,
    PairValuation,
};
use crate::config::CrmConfig;
use crate::hierarchy::{ExposureKind, ReportingExposure, ResolvedHierarchy};
use crate::issues::{CalculationIssue, IssueCode, IssueLog};
use crate::types::{with_metadata, ComputationOutput, Cqs, Money, Rate};
use crate::RwaResult;

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// Portion of an exposure's net value substituted to a guarantor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuaranteedPortion {
    pub guarantee_reference: String,
    pub guarantor_reference: String,
    pub guarantor_type: GuarantorType,
    pub guarantor_cqs: Option<Cqs>,
    pub amount: Money,
}

/// One audit-trail entry: a record's contribution to an exposure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRecord {
    pub protection_reference: String,
    pub kind: ProtectionKind,
    pub allocated: Money,
    pub raw_consumed: Money,
    /// Exposure value still unprotected when the record ran.
    pub outstanding_before: Money,
    pub valuation: PairValuation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrmAdjustedExposure {
    pub exposure_reference: String,
    pub kind: ExposureKind,
    pub counterparty_reference: String,
    pub gross_value: Money,
    pub preliminary_risk_weight: Rate,
    pub provision_allocated: Money,
    pub collateral_allocated: Money,
    pub guarantee_allocated: Money,
    /// Gross less provisions and collateral. Guaranteed portions sit inside it.
    pub net_value: Money,
    pub guaranteed_portions: Vec<GuaranteedPortion>,
    /// Net value left with the original obligor.
    pub unguaranteed_value: Money,
    /// Allocations received, in processing order.
    pub allocations: Vec<AllocationRecord>,
}

impl CrmAdjustedExposure {
    pub fn total_protection(&self) -> Money {
        self.provision_allocated + self.collateral_allocated + self.guarantee_allocated
    }

    pub fn has_crm(&self) -> bool {
        !self.allocations.is_empty()
    }
}

/// How much of one record was used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectionUsage {
    pub reference: String,
    pub kind: ProtectionKind,
    pub link: ProtectionLink,
    pub raw_value: Money,
    /// Raw value after the type haircut; the record-level ceiling.
    pub adjusted_value: Money,
    pub covered_exposures: usize,
    pub allocated: Money,
    pub raw_consumed: Money,
    pub eligible: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrmSummary {
    pub exposures: usize,
    pub exposures_with_crm: usize,
    pub records_processed: usize,
    pub records_rejected: usize,
    pub total_gross: Money,
    pub total_provisions: Money,
    pub total_collateral: Money,
    pub total_guarantees: Money,
    pub total_net: Money,
    pub total_unguaranteed: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmOutput {
    pub exposures: Vec<CrmAdjustedExposure>,
    /// Usage per accepted record, in processing order.
    pub protection: Vec<ProtectionUsage>,
    pub issues: Vec<CalculationIssue>,
    pub summary: CrmSummary,
}

impl CrmOutput {
    pub fn exposure(&self, reference: &str) -> Option<&CrmAdjustedExposure> {
        self.exposures
            .iter()
            .find(|e| e.exposure_reference == reference)
    }

    pub fn usage(&self, reference: &str) -> Option<&ProtectionUsage> {
        self.protection.iter().find(|p| p.reference == reference)
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Expand, value and allocate protection over the resolved reporting view.
///
/// Records run provisions first, then collateral, then guarantees, and in
/// ascending reference order within a kind. Each record sees only the value
/// its covered exposures still have unprotected, so overlapping records can
/// never push an exposure past its gross value. Collateral and guarantees are
/// allocated to the highest preliminary risk weight first; provisions are
/// spread pro rata.
pub fn apply_crm(
    resolved: &ResolvedHierarchy,
    protection: &ProtectionInput,
    weights: &dyn PreliminaryRiskWeight,
    haircuts: &dyn HaircutLookup,
    config: &CrmConfig,
) -> RwaResult<ComputationOutput<CrmOutput>> {
    let start = Instant::now();
    config.validate()?;
    let _span = info_span!(
        "apply_crm",
        exposures = resolved.exposures.len(),
        collateral = protection.collateral.len(),
        guarantees = protection.guarantees.len(),
        provisions = protection.provisions.len()
    )
    .entered();

    let mut issues = IssueLog::new();
    let rows = &resolved.exposures;
    let index = ExpansionIndex::build(resolved);

    // -- Pass 1: preliminary risk weights -------------------------------------
    let risk_weights: Vec<Rate> = rows
        .iter()
        .map(|row| {
            let rw = weights.preliminary_risk_weight(row);
            if rw < Decimal::ZERO {
                issues.warning(
                    IssueCode::NegativeRiskWeight,
                    vec![row.exposure_reference.clone()],
                    format!(
                        "Preliminary risk weight {} for '{}' is negative; ranked at zero.",
                        rw, row.exposure_reference
                    ),
                );
                Decimal::ZERO
            } else {
                rw
            }
        })
        .collect();

    // -- Normalise records ----------------------------------------------------
    let (records, rejected) = normalise(protection, &mut issues);
    if config.reporting_date.is_none() {
        let dated: Vec<String> = records
            .iter()
            .filter(|r| r.maturity_date.is_some())
            .map(|r| r.reference.clone())
            .collect();
        if !dated.is_empty() {
            issues.warning(
                IssueCode::MaturityAdjustmentDisabled,
                dated,
                "No reporting_date configured; maturity-mismatch adjustments and \
                 maturity-banded haircuts use no residual maturity.",
            );
        }
    }

    let guarantor_cqs: HashMap<&str, Option<Cqs>> = resolved
        .counterparties
        .iter()
        .map(|c| (c.reference.as_str(), c.effective_cqs))
        .collect();

    // -- Pass 2: allocation ---------------------------------------------------
    let mut ledger: Vec<CrmAdjustedExposure> = rows
        .iter()
        .zip(&risk_weights)
        .map(|(row, &rw)| CrmAdjustedExposure {
            exposure_reference: row.exposure_reference.clone(),
            kind: row.kind,
            counterparty_reference: row.counterparty_reference.clone(),
            gross_value: row.gross_value,
            preliminary_risk_weight: rw,
            provision_allocated: Decimal::ZERO,
            collateral_allocated: Decimal::ZERO,
            guarantee_allocated: Decimal::ZERO,
            net_value: row.gross_value,
            guaranteed_portions: Vec::new(),
            unguaranteed_value: row.gross_value,
            allocations: Vec::new(),
        })
        .collect();
    let mut outstanding: Vec<Money> = rows.iter().map(|r| r.gross_value.max(Decimal::ZERO)).collect();
    let mut usage = Vec::with_capacity(records.len());

    for record in &records {
        let expansion = index.expand(&record.link);
        if !expansion.unknown.is_empty() {
            let mut refs = vec![record.reference.clone()];
            refs.extend(expansion.unknown.iter().cloned());
            issues.error(
                IssueCode::UnknownReference,
                refs,
                format!(
                    "Protection '{}' names unknown or excluded reference(s) {}.",
                    record.reference,
                    expansion.unknown.join(", ")
                ),
            );
        } else if expansion.covered.is_empty() {
            issues.warning(
                IssueCode::EmptyProtectionScope,
                vec![record.reference.clone()],
                format!(
                    "Protection '{}' covers no reporting rows; nothing allocated.",
                    record.reference
                ),
            );
        }

        if let ProtectionDetail::Guarantee {
            guarantor_reference,
            guarantor_cqs: None,
            ..
        } = &record.detail
        {
            if !guarantor_cqs.contains_key(guarantor_reference.as_str()) {
                issues.warning(
                    IssueCode::UnknownReference,
                    vec![record.reference.clone(), guarantor_reference.clone()],
                    format!(
                        "Guarantee '{}' states no guarantor CQS and guarantor '{}' is not a \
                         resolved counterparty; guarantor treated as unrated.",
                        record.reference, guarantor_reference
                    ),
                );
            }
        }

        // Record-level type haircut
        let type_factor = match &record.detail {
            ProtectionDetail::Collateral {
                collateral_type,
                issuer_cqs,
            } => {
                let residual = residual_maturity(record.maturity_date, config.reporting_date);
                match haircuts.haircut(*collateral_type, *issuer_cqs, residual) {
                    Some(h) => Some((Decimal::ONE - h).max(Decimal::ZERO)),
                    None => {
                        issues.warning(
                            IssueCode::IneligibleCollateral,
                            vec![record.reference.clone()],
                            format!(
                                "Collateral '{}' ({}) is not eligible; nothing allocated.",
                                record.reference, collateral_type
                            ),
                        );
                        None
                    }
                }
            }
            _ => Some(Decimal::ONE),
        };

        let mut record_usage = ProtectionUsage {
            reference: record.reference.clone(),
            kind: record.kind,
            link: record.link.clone(),
            raw_value: record.raw_value,
            adjusted_value: record.raw_value * type_factor.unwrap_or(Decimal::ZERO),
            covered_exposures: expansion.covered.len(),
            allocated: Decimal::ZERO,
            raw_consumed: Decimal::ZERO,
            eligible: type_factor.is_some(),
        };
        let Some(type_factor) = type_factor else {
            usage.push(record_usage);
            continue;
        };

        let valuations: Vec<PairValuation> = expansion
            .covered
            .iter()
            .map(|&i| pair_valuation(record, &rows[i], type_factor, config))
            .collect();
        let claims: Vec<Claim<'_>> = expansion
            .covered
            .iter()
            .zip(&valuations)
            .map(|(&i, v)| Claim {
                exposure: i,
                reference: rows[i].exposure_reference.as_str(),
                risk_weight: risk_weights[i],
                gross_value: rows[i].gross_value,
                outstanding: outstanding[i],
                factor: v.factor(),
            })
            .collect();
        let grants = match record.kind {
            ProtectionKind::Provision => allocate_pro_rata(record.raw_value, &claims),
            ProtectionKind::Collateral | ProtectionKind::Guarantee => {
                allocate_by_priority(record.raw_value, &claims)
            }
        };

        let valuation_of: HashMap<usize, PairValuation> = expansion
            .covered
            .iter()
            .copied()
            .zip(valuations.iter().copied())
            .collect();
        for grant in grants {
            if grant.allocated <= Decimal::ZERO {
                continue;
            }
            let valuation = valuation_of
                .get(&grant.exposure)
                .copied()
                .unwrap_or_else(PairValuation::unadjusted);
            post_grant(
                &mut ledger[grant.exposure],
                &mut outstanding[grant.exposure],
                record,
                &grant,
                valuation,
                &guarantor_cqs,
            );
            record_usage.allocated += grant.allocated;
            record_usage.raw_consumed += grant.raw_consumed;
        }
        debug!(
            record = %record.reference,
            kind = %record.kind,
            covered = expansion.covered.len(),
            allocated = %record_usage.allocated,
            "protection allocated"
        );
        usage.push(record_usage);
    }

    // -- Summary --------------------------------------------------------------
    let summary = CrmSummary {
        exposures: ledger.len(),
        exposures_with_crm: ledger.iter().filter(|e| e.has_crm()).count(),
        records_processed: records.len(),
        records_rejected: rejected,
        total_gross: ledger.iter().map(|e| e.gross_value).sum(),
        total_provisions: ledger.iter().map(|e| e.provision_allocated).sum(),
        total_collateral: ledger.iter().map(|e| e.collateral_allocated).sum(),
        total_guarantees: ledger.iter().map(|e| e.guarantee_allocated).sum(),
        total_net: ledger.iter().map(|e| e.net_value).sum(),
        total_unguaranteed: ledger.iter().map(|e| e.unguaranteed_value).sum(),
    };

    info!(
        exposures = summary.exposures,
        with_crm = summary.exposures_with_crm,
        total_net = %summary.total_net,
        issues = issues.len(),
        "credit risk mitigation applied"
    );

    let warnings = issues.warning_messages();
    let output = CrmOutput {
        exposures: ledger,
        protection: usage,
        issues: issues.into_issues(),
        summary,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    let assumptions = serde_json::json!({
        "processing_order": "provisions, collateral, guarantees; ascending reference within a kind",
        "collateral_and_guarantees": "highest preliminary risk weight first, then gross value desc, then reference",
        "provisions": "pro rata to remaining value",
        "currency_mismatch_haircut": config.currency_mismatch_haircut.to_string(),
        "min_residual_tenor_years": config.min_residual_tenor_years.to_string(),
        "maturity_cap_years": config.maturity_cap_years.to_string(),
        "reporting_date": config.reporting_date.map(|d| d.to_string()),
        "guarantees": "substitution; net value unchanged",
    });

    Ok(with_metadata(
        "Credit risk mitigation expansion and allocation",
        &assumptions,
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Resolve links, reject unusable records and sort into processing order.
/// Returns the accepted records and the number rejected.
fn normalise(protection: &ProtectionInput, issues: &mut IssueLog) -> (Vec<ProtectionRecord>, usize) {
    let mut seen: BTreeSet<(ProtectionKind, String)> = BTreeSet::new();
    let mut records = Vec::new();
    let mut rejected = 0;

    for raw in protection.raw_records() {
        if !seen.insert((raw.kind, raw.reference.to_string())) {
            issues.error(
                IssueCode::DuplicateReference,
                vec![raw.reference.to_string()],
                format!(
                    "Duplicate {} reference '{}'; later record ignored.",
                    raw.kind, raw.reference
                ),
            );
            rejected += 1;
            continue;
        }
        if raw.value < Decimal::ZERO {
            issues.error(
                IssueCode::NegativeAmount,
                vec![raw.reference.to_string()],
                format!(
                    "{} '{}' has negative value {}; record rejected.",
                    raw.kind, raw.reference, raw.value
                ),
            );
            rejected += 1;
            continue;
        }
        if raw.link.populated_count() > 1 {
            debug!(
                record = raw.reference,
                "several linking fields populated; most granular applies"
            );
        }
        match raw.link.resolve() {
            Some(link) => records.push(raw.into_record(link)),
            None => {
                issues.error(
                    IssueCode::UnlinkedProtection,
                    vec![raw.reference.to_string()],
                    format!(
                        "{} '{}' has no counterparty, facility or exposure link; rejected.",
                        raw.kind, raw.reference
                    ),
                );
                rejected += 1;
            }
        }
    }

    records.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
    (records, rejected)
}

fn pair_valuation(
    record: &ProtectionRecord,
    row: &ReportingExposure,
    type_factor: Rate,
    config: &CrmConfig,
) -> PairValuation {
    if record.kind == ProtectionKind::Provision {
        return PairValuation::unadjusted();
    }
    let protection_residual = residual_maturity(record.maturity_date, config.reporting_date);
    let exposure_residual = residual_maturity(row.maturity_date, config.reporting_date);
    PairValuation {
        type_factor,
        currency_factor: currency_mismatch_factor(
            record.currency.as_ref(),
            row.currency.as_ref(),
            config,
        ),
        maturity_factor: maturity_mismatch_factor(protection_residual, exposure_residual, config),
    }
}

fn post_grant(
    exposure: &mut CrmAdjustedExposure,
    outstanding: &mut Money,
    record: &ProtectionRecord,
    grant: &Grant,
    valuation: PairValuation,
    guarantor_cqs: &HashMap<&str, Option<Cqs>>,
) {
    let amount = grant.allocated.min(*outstanding);
    exposure.allocations.push(AllocationRecord {
        protection_reference: record.reference.clone(),
        kind: record.kind,
        allocated: amount,
        raw_consumed: grant.raw_consumed,
        outstanding_before: *outstanding,
        valuation,
    });
    *outstanding -= amount;

    match &record.detail {
        ProtectionDetail::Provision => {
            exposure.provision_allocated += amount;
            exposure.net_value -= amount;
            exposure.unguaranteed_value -= amount;
        }
        ProtectionDetail::Collateral { .. } => {
            exposure.collateral_allocated += amount;
            exposure.net_value -= amount;
            exposure.unguaranteed_value -= amount;
        }
        ProtectionDetail::Guarantee {
            guarantor_reference,
            guarantor_type,
            guarantor_cqs: stated_cqs,
        } => {
            exposure.guarantee_allocated += amount;
            exposure.unguaranteed_value -= amount;
            let cqs = (*stated_cqs).or_else(|| {
                guarantor_cqs
                    .get(guarantor_reference.as_str())
                    .copied()
                    .flatten()
            });
            exposure.guaranteed_portions.push(GuaranteedPortion {
                guarantee_reference: record.reference.clone(),
                guarantor_reference: guarantor_reference.clone(),
                guarantor_type: *guarantor_type,
                guarantor_cqs: cqs,
                amount,
            });
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HierarchyConfig;
    use crate::crm::protection::{Collateral, CollateralType, Guarantee, LinkFields, Provision};
    use crate::crm::risk_weight::PrecomputedRiskWeights;
    use crate::crm::valuation::SupervisoryHaircuts;
    use crate::hierarchy::{resolve_hierarchy, Counterparty, HierarchyInput, Loan};
    use crate::issues::IssueSeverity;
    use crate::types::Currency;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn counterparty(reference: &str, cqs: Option<Cqs>) -> Counterparty {
        Counterparty {
            reference: reference.into(),
            org_parent_reference: None,
            lending_group_lead_reference: None,
            rating: None,
            cqs,
            turnover: None,
        }
    }

    fn loan(reference: &str, drawn: Money) -> Loan {
        Loan {
            reference: reference.into(),
            parent_facility_reference: None,
            counterparty_reference: Some("CP".into()),
            drawn_amount: drawn,
            currency: Some(Currency::GBP),
            maturity_date: None,
            exposure_class: None,
        }
    }

    fn resolved(loans: Vec<Loan>) -> ResolvedHierarchy {
        let input = HierarchyInput {
            counterparties: vec![counterparty("CP", None), counterparty("BANK", Some(2))],
            facilities: vec![],
            loans,
        };
        resolve_hierarchy(&input, &HierarchyConfig::default())
            .unwrap()
            .result
    }

    fn cash(reference: &str, value: Money, link: LinkFields) -> Collateral {
        Collateral {
            reference: reference.into(),
            collateral_type: CollateralType::Cash,
            market_value: value,
            currency: Some(Currency::GBP),
            maturity_date: None,
            issuer_cqs: None,
            link,
        }
    }

    fn weights(pairs: &[(&str, Rate)]) -> PrecomputedRiskWeights {
        PrecomputedRiskWeights {
            weights: pairs.iter().map(|(r, w)| (r.to_string(), *w)).collect(),
            default: Decimal::ONE,
        }
    }

    fn run(
        h: &ResolvedHierarchy,
        protection: &ProtectionInput,
        w: &PrecomputedRiskWeights,
    ) -> CrmOutput {
        apply_crm(h, protection, w, &SupervisoryHaircuts, &CrmConfig::default())
            .unwrap()
            .result
    }

    #[test]
    fn test_counterparty_collateral_goes_to_highest_weight() {
        let h = resolved(vec![
            loan("A", dec!(2_000_000)),
            loan("B", dec!(1_000_000)),
            loan("C", dec!(1_500_000)),
        ]);
        let protection = ProtectionInput {
            collateral: vec![cash("COLL", dec!(2_000_000), LinkFields::counterparty("CP"))],
            ..Default::default()
        };
        let w = weights(&[("A", dec!(1.0)), ("B", dec!(0.5)), ("C", dec!(0.75))]);
        let out = run(&h, &protection, &w);
        assert_eq!(out.exposure("A").unwrap().collateral_allocated, dec!(2_000_000));
        assert_eq!(out.exposure("B").unwrap().collateral_allocated, dec!(0));
        assert_eq!(out.exposure("C").unwrap().collateral_allocated, dec!(0));
        assert_eq!(out.exposure("A").unwrap().net_value, dec!(0));
        assert!(out.issues.is_empty());
    }

    #[test]
    fn test_guarantee_splits_exposure() {
        let h = resolved(vec![loan("L1", dec!(1000))]);
        let protection = ProtectionInput {
            guarantees: vec![Guarantee {
                reference: "G1".into(),
                amount: dec!(600),
                currency: Some(Currency::GBP),
                maturity_date: None,
                guarantor_reference: "BANK".into(),
                guarantor_type: GuarantorType::Institution,
                guarantor_cqs: None,
                link: LinkFields::exposures(&["L1"]),
            }],
            ..Default::default()
        };
        let out = run(&h, &protection, &weights(&[]));
        let l1 = out.exposure("L1").unwrap();
        assert_eq!(l1.net_value, dec!(1000));
        assert_eq!(l1.guarantee_allocated, dec!(600));
        assert_eq!(l1.unguaranteed_value, dec!(400));
        assert_eq!(l1.guaranteed_portions.len(), 1);
        assert_eq!(l1.guaranteed_portions[0].guarantor_cqs, Some(2));
    }

    #[test]
    fn test_unresolved_guarantor_without_cqs_warns() {
        let h = resolved(vec![loan("L1", dec!(1000))]);
        let mut stated = Guarantee {
            reference: "G1".into(),
            amount: dec!(300),
            currency: Some(Currency::GBP),
            maturity_date: None,
            guarantor_reference: "NOWHERE".into(),
            guarantor_type: GuarantorType::Corporate,
            guarantor_cqs: None,
            link: LinkFields::exposures(&["L1"]),
        };
        let unstated = stated.clone();
        stated.reference = "G2".into();
        stated.guarantor_cqs = Some(3);
        let protection = ProtectionInput {
            guarantees: vec![unstated, stated],
            ..Default::default()
        };
        let out = run(&h, &protection, &weights(&[]));

        assert_eq!(out.issues.len(), 1);
        assert_eq!(out.issues[0].code, IssueCode::UnknownReference);
        assert_eq!(out.issues[0].severity, IssueSeverity::Warning);
        assert_eq!(out.issues[0].references, vec!["G1", "NOWHERE"]);
        let l1 = out.exposure("L1").unwrap();
        assert_eq!(l1.guarantee_allocated, dec!(600));
        assert_eq!(l1.guaranteed_portions[0].guarantor_cqs, None);
        assert_eq!(l1.guaranteed_portions[1].guarantor_cqs, Some(3));
    }

    #[test]
    fn test_provision_reduces_before_collateral() {
        let h = resolved(vec![loan("L1", dec!(1000))]);
        let protection = ProtectionInput {
            collateral: vec![cash("AAA-COLL", dec!(1000), LinkFields::exposures(&["L1"]))],
            provisions: vec![Provision {
                reference: "ZZZ-PROV".into(),
                amount: dec!(100),
                link: LinkFields::exposures(&["L1"]),
            }],
            ..Default::default()
        };
        let out = run(&h, &protection, &weights(&[]));
        let l1 = out.exposure("L1").unwrap();
        assert_eq!(l1.provision_allocated, dec!(100));
        assert_eq!(l1.collateral_allocated, dec!(900));
        assert_eq!(l1.allocations[0].kind, ProtectionKind::Provision);
        assert_eq!(out.usage("AAA-COLL").unwrap().allocated, dec!(900));
    }

    #[test]
    fn test_unlinked_record_rejected() {
        let h = resolved(vec![loan("L1", dec!(1000))]);
        let protection = ProtectionInput {
            collateral: vec![cash("C1", dec!(10), LinkFields::default())],
            ..Default::default()
        };
        let out = run(&h, &protection, &weights(&[]));
        assert_eq!(out.summary.records_rejected, 1);
        assert_eq!(out.issues[0].code, IssueCode::UnlinkedProtection);
        assert_eq!(out.issues[0].severity, IssueSeverity::Error);
        assert!(out.usage("C1").is_none());
    }

    #[test]
    fn test_ineligible_collateral_warned() {
        let h = resolved(vec![loan("L1", dec!(1000))]);
        let mut property = cash("RE1", dec!(500), LinkFields::exposures(&["L1"]));
        property.collateral_type = CollateralType::RealEstate;
        let protection = ProtectionInput {
            collateral: vec![property],
            ..Default::default()
        };
        let out = run(&h, &protection, &weights(&[]));
        assert_eq!(out.exposure("L1").unwrap().collateral_allocated, dec!(0));
        assert!(!out.usage("RE1").unwrap().eligible);
        assert_eq!(out.issues[0].code, IssueCode::IneligibleCollateral);
    }

    #[test]
    fn test_negative_risk_weight_clamped() {
        let h = resolved(vec![loan("L1", dec!(1000))]);
        let out = run(&h, &ProtectionInput::default(), &weights(&[("L1", dec!(-1))]));
        assert_eq!(out.exposure("L1").unwrap().preliminary_risk_weight, dec!(0));
        assert_eq!(out.issues[0].code, IssueCode::NegativeRiskWeight);
    }

    #[test]
    fn test_duplicate_record_reference_rejected() {
        let h = resolved(vec![loan("L1", dec!(1000))]);
        let protection = ProtectionInput {
            collateral: vec![
                cash("C1", dec!(10), LinkFields::exposures(&["L1"])),
                cash("C1", dec!(20), LinkFields::exposures(&["L1"])),
            ],
            ..Default::default()
        };
        let out = run(&h, &protection, &weights(&[]));
        assert_eq!(out.exposure("L1").unwrap().collateral_allocated, dec!(10));
        assert_eq!(out.issues[0].code, IssueCode::DuplicateReference);
    }
}
