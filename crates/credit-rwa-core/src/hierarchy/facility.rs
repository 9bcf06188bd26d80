//! Facility hierarchy flattening.
//!
//! Drawn balances only exist on loans. They are pushed up the facility tree
//! with the same frontier technique used for root resolution, run upward:
//! every (loan, facility) pair moves one hop per iteration, adding the loan's
//! drawn amount to each facility it passes. The pairs visited along the way
//! are the facility-to-descendant closure later used to expand
//! facility-level protection.
//!
//! The reporting view carries one row per root facility (its undrawn
//! headroom) and one per loan (its drawn balance). Intermediate facilities
//! emit nothing; their capacity is already inside the root's limit.

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::counterparty::{CounterpartyResolution, CounterpartyStatus};
use super::fixed_point::{classify_unresolved, resolve_ancestors};
use super::index::ReferenceIndex;
use super::report_non_convergence;
use crate::config::HierarchyConfig;
use crate::issues::{IssueCode, IssueLog};
use crate::types::{Cqs, Currency, ExposureClass, Money};

// ---------------------------------------------------------------------------
// Input types
// ---------------------------------------------------------------------------

/// A committed facility. Its drawn amount is never stated; it is the sum of
/// the loans below it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Facility {
    pub reference: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_facility_reference: Option<String>,
    pub counterparty_reference: String,
    pub committed_limit: Money,
    pub currency: Currency,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maturity_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exposure_class: Option<ExposureClass>,
}

/// A drawn loan; always a leaf.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Loan {
    pub reference: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_facility_reference: Option<String>,
    /// Defaults to the root facility's counterparty. Required for loans
    /// booked outside any facility.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterparty_reference: Option<String>,
    pub drawn_amount: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<Currency>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maturity_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exposure_class: Option<ExposureClass>,
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExposureKind {
    /// A loan's drawn balance.
    Loan,
    /// A root facility's undrawn headroom.
    FacilityUndrawn,
}

/// One economically distinct balance in the reporting view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportingExposure {
    /// Loan reference, or the root facility's reference for undrawn rows.
    pub exposure_reference: String,
    pub kind: ExposureKind,
    pub counterparty_reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_facility_reference: Option<String>,
    /// Facilities above a loan, root first. Empty for undrawn rows.
    pub facility_path: Vec<String>,
    pub drawn_amount: Money,
    pub undrawn_amount: Money,
    /// drawn + undrawn
    pub gross_value: Money,
    pub currency: Option<Currency>,
    pub maturity_date: Option<NaiveDate>,
    pub exposure_class: Option<ExposureClass>,
    pub ultimate_parent: Option<String>,
    pub effective_rating: Option<String>,
    pub effective_cqs: Option<Cqs>,
    pub effective_turnover: Option<Money>,
    pub lending_group_total_exposure: Option<Money>,
}

/// A facility with its aggregated balances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedFacility {
    pub reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_facility_reference: Option<String>,
    pub root_facility_reference: String,
    pub counterparty_reference: String,
    /// Parent hops to the root facility.
    pub hierarchy_depth: u32,
    pub committed_limit: Money,
    /// Drawn of all loans anywhere below this facility, including loans
    /// rejected for their own data that were booked under it.
    pub aggregated_drawn: Money,
    /// max(0, committed - aggregated drawn); roots only.
    pub undrawn_amount: Option<Money>,
    pub descendant_loans: usize,
}

pub(crate) struct FacilityFlattening {
    pub facilities: Vec<ResolvedFacility>,
    pub exposures: Vec<ReportingExposure>,
    pub facility_iterations: u32,
    pub aggregation_iterations: u32,
    pub excluded_facilities: usize,
    pub excluded_loans: usize,
}

/// A loan that passed validation.
struct AcceptedLoan<'a> {
    loan: &'a Loan,
    facility: Option<usize>,
    counterparty: String,
}

// ---------------------------------------------------------------------------
// Flattening
// ---------------------------------------------------------------------------

/// Keep a rejected loan's drawn amount against its facility so the root's
/// undrawn headroom is not overstated. Returns the note for the issue.
fn retain_drawn(
    loan: &Loan,
    facility: Option<usize>,
    slots: &[&Facility],
    retained: &mut Vec<(usize, Money)>,
) -> String {
    match facility {
        Some(slot) if loan.drawn_amount > Decimal::ZERO => {
            retained.push((slot, loan.drawn_amount));
            format!(
                " Its drawn amount {} still counts against facility '{}'.",
                loan.drawn_amount, slots[slot].reference
            )
        }
        _ => String::new(),
    }
}

pub(crate) fn flatten_facilities(
    facilities: &[Facility],
    loans: &[Loan],
    counterparties: &CounterpartyResolution,
    config: &HierarchyConfig,
    issues: &mut IssueLog,
) -> FacilityFlattening {
    let index = ReferenceIndex::build(
        facilities.iter().map(|f| f.reference.as_str()),
        "facility",
        issues,
    );
    let slots: Vec<&Facility> = index.records.iter().map(|&p| &facilities[p]).collect();
    let max_depth = config.max_hierarchy_depth;

    // -- Per-facility validation and edge table ------------------------------
    // An invalid facility is cut from its parent so that its descendants
    // resolve to it and can be excluded with it.
    let mut invalid = vec![false; slots.len()];
    let mut parents: Vec<Option<usize>> = vec![None; slots.len()];
    for (slot, facility) in slots.iter().enumerate() {
        if facility.committed_limit < Decimal::ZERO {
            issues.error(
                IssueCode::NegativeAmount,
                vec![facility.reference.clone()],
                format!(
                    "Facility '{}' has negative committed limit {}; excluded.",
                    facility.reference, facility.committed_limit
                ),
            );
            invalid[slot] = true;
        }
        match counterparties.status(&facility.counterparty_reference) {
            CounterpartyStatus::Resolved => {}
            CounterpartyStatus::Excluded => {
                issues.error(
                    IssueCode::ExcludedSubtree,
                    vec![facility.reference.clone(), facility.counterparty_reference.clone()],
                    format!(
                        "Facility '{}' belongs to counterparty '{}' whose organisational \
                         hierarchy could not be resolved; excluded.",
                        facility.reference, facility.counterparty_reference
                    ),
                );
                invalid[slot] = true;
            }
            CounterpartyStatus::Unknown => {
                issues.error(
                    IssueCode::UnknownReference,
                    vec![facility.reference.clone(), facility.counterparty_reference.clone()],
                    format!(
                        "Facility '{}' references unknown counterparty '{}'; excluded.",
                        facility.reference, facility.counterparty_reference
                    ),
                );
                invalid[slot] = true;
            }
        }
        if let Some(parent) = facility.parent_facility_reference.as_deref() {
            match index.get(parent) {
                Some(p) => parents[slot] = Some(p),
                None => {
                    issues.error(
                        IssueCode::UnknownReference,
                        vec![facility.reference.clone(), parent.to_string()],
                        format!(
                            "Facility '{}' references unknown parent facility '{}'; excluded.",
                            facility.reference, parent
                        ),
                    );
                    invalid[slot] = true;
                }
            }
        }
        if invalid[slot] {
            parents[slot] = None;
        }
    }

    // -- Roots ---------------------------------------------------------------
    let roots = resolve_ancestors(&parents, max_depth, |_| false);
    let classes = classify_unresolved(&parents, &roots);
    let mut excluded = report_non_convergence(
        &classes,
        "facility",
        max_depth,
        |s| slots[s].reference.clone(),
        issues,
    );
    // Excluded-root slot -> references dropped with it.
    let mut dropped_subtrees: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    for (slot, r) in roots.resolved.iter().enumerate() {
        if let Some(r) = r {
            if invalid[r.ancestor] {
                excluded.insert(slot);
                if r.ancestor != slot {
                    dropped_subtrees
                        .entry(r.ancestor)
                        .or_default()
                        .push(slots[slot].reference.clone());
                }
            }
        }
    }

    // -- Loans ---------------------------------------------------------------
    let mut seen_loans: HashSet<&str> = HashSet::new();
    let mut accepted: Vec<AcceptedLoan<'_>> = Vec::new();
    let mut excluded_loans = 0usize;
    let mut loans_in_cycles: Vec<String> = Vec::new();
    // (facility slot, drawn) of rejected loans booked under a usable facility.
    let mut retained: Vec<(usize, Money)> = Vec::new();

    for loan in loans {
        let usable_facility = loan
            .parent_facility_reference
            .as_deref()
            .and_then(|f| index.get(f))
            .filter(|slot| !excluded.contains(slot));

        if index.get(&loan.reference).is_some() || !seen_loans.insert(loan.reference.as_str()) {
            let note = retain_drawn(loan, usable_facility, &slots, &mut retained);
            issues.error(
                IssueCode::DuplicateReference,
                vec![loan.reference.clone()],
                format!(
                    "Loan reference '{}' is already used by another exposure; loan excluded.{}",
                    loan.reference, note
                ),
            );
            excluded_loans += 1;
            continue;
        }

        if loan.drawn_amount < Decimal::ZERO {
            issues.error(
                IssueCode::NegativeAmount,
                vec![loan.reference.clone()],
                format!(
                    "Loan '{}' has negative drawn amount {}; excluded and nothing counted \
                     against its facility.",
                    loan.reference, loan.drawn_amount
                ),
            );
            excluded_loans += 1;
            continue;
        }

        let facility = match loan.parent_facility_reference.as_deref() {
            None => None,
            Some(f) => match index.get(f) {
                None => {
                    issues.error(
                        IssueCode::UnknownReference,
                        vec![loan.reference.clone(), f.to_string()],
                        format!(
                            "Loan '{}' references unknown facility '{}'; excluded.",
                            loan.reference, f
                        ),
                    );
                    excluded_loans += 1;
                    continue;
                }
                Some(slot) if excluded.contains(&slot) => {
                    match roots.resolved[slot] {
                        Some(r) => dropped_subtrees
                            .entry(r.ancestor)
                            .or_default()
                            .push(loan.reference.clone()),
                        None => loans_in_cycles.push(loan.reference.clone()),
                    }
                    excluded_loans += 1;
                    continue;
                }
                Some(slot) => Some(slot),
            },
        };

        let root_slot = facility.and_then(|s| roots.resolved[s]).map(|r| r.ancestor);
        let counterparty = match (&loan.counterparty_reference, root_slot) {
            (Some(cp), _) => cp.clone(),
            (None, Some(root)) => slots[root].counterparty_reference.clone(),
            (None, None) => {
                issues.error(
                    IssueCode::MissingCounterparty,
                    vec![loan.reference.clone()],
                    format!(
                        "Loan '{}' has neither a facility nor a counterparty; excluded.",
                        loan.reference
                    ),
                );
                excluded_loans += 1;
                continue;
            }
        };
        match counterparties.status(&counterparty) {
            CounterpartyStatus::Resolved => {}
            CounterpartyStatus::Excluded => {
                let note = retain_drawn(loan, facility, &slots, &mut retained);
                issues.error(
                    IssueCode::ExcludedSubtree,
                    vec![loan.reference.clone(), counterparty.clone()],
                    format!(
                        "Loan '{}' belongs to counterparty '{}' whose organisational \
                         hierarchy could not be resolved; excluded.{}",
                        loan.reference, counterparty, note
                    ),
                );
                excluded_loans += 1;
                continue;
            }
            CounterpartyStatus::Unknown => {
                let note = retain_drawn(loan, facility, &slots, &mut retained);
                issues.error(
                    IssueCode::UnknownReference,
                    vec![loan.reference.clone(), counterparty.clone()],
                    format!(
                        "Loan '{}' references unknown counterparty '{}'; excluded.{}",
                        loan.reference, counterparty, note
                    ),
                );
                excluded_loans += 1;
                continue;
            }
        }

        accepted.push(AcceptedLoan {
            loan,
            facility,
            counterparty,
        });
    }

    for (root, members) in dropped_subtrees {
        issues.error(
            IssueCode::ExcludedSubtree,
            members.clone(),
            format!(
                "{} facility/loan record(s) below excluded facility '{}' dropped: {}.",
                members.len(),
                slots[root].reference,
                members.join(", ")
            ),
        );
    }
    if !loans_in_cycles.is_empty() {
        issues.error(
            IssueCode::ExcludedSubtree,
            loans_in_cycles.clone(),
            format!(
                "{} loan(s) booked under unresolved facilities dropped: {}.",
                loans_in_cycles.len(),
                loans_in_cycles.join(", ")
            ),
        );
    }

    // -- Upward aggregation --------------------------------------------------
    let mut aggregated = vec![Decimal::ZERO; slots.len()];
    let mut descendant_loans = vec![0usize; slots.len()];
    let mut paths: Vec<Vec<usize>> = vec![Vec::new(); accepted.len()];
    // Rejected loans carry no index: they add drawn but get no path or row.
    let mut frontier: Vec<(Option<usize>, Money, usize)> = accepted
        .iter()
        .enumerate()
        .filter_map(|(i, a)| a.facility.map(|f| (Some(i), a.loan.drawn_amount, f)))
        .chain(retained.iter().map(|&(f, drawn)| (None, drawn, f)))
        .collect();
    let mut aggregation_iterations = 0u32;
    while !frontier.is_empty() {
        aggregation_iterations += 1;
        let next: Vec<(Option<usize>, Money, usize)> = frontier
            .iter()
            .filter_map(|&(loan, drawn, facility)| {
                aggregated[facility] += drawn;
                if let Some(loan) = loan {
                    descendant_loans[facility] += 1;
                    paths[loan].push(facility);
                }
                parents[facility].map(|p| (loan, drawn, p))
            })
            .collect();
        debug!(
            iteration = aggregation_iterations,
            remaining = next.len(),
            "drawn aggregation iteration"
        );
        frontier = next;
    }

    // -- Resolved facilities and undrawn rows --------------------------------
    let mut resolved_facilities = Vec::new();
    let mut exposures = Vec::new();
    for (slot, facility) in slots.iter().enumerate() {
        let root = match roots.resolved[slot] {
            Some(r) if !excluded.contains(&slot) => r,
            _ => continue,
        };
        let is_root = root.ancestor == slot;
        let undrawn_amount = if is_root {
            let raw = facility.committed_limit - aggregated[slot];
            if raw < Decimal::ZERO {
                issues.warning(
                    IssueCode::NegativeUndrawn,
                    vec![facility.reference.clone()],
                    format!(
                        "Facility '{}' is overdrawn: committed {} < aggregated drawn {}; \
                         undrawn floored at zero.",
                        facility.reference, facility.committed_limit, aggregated[slot]
                    ),
                );
            }
            Some(raw.max(Decimal::ZERO))
        } else {
            if aggregated[slot] > facility.committed_limit {
                issues.warning(
                    IssueCode::SubLimitBreach,
                    vec![facility.reference.clone()],
                    format!(
                        "Sub-facility '{}' aggregated drawn {} exceeds its committed limit {}.",
                        facility.reference, aggregated[slot], facility.committed_limit
                    ),
                );
            }
            None
        };

        resolved_facilities.push(ResolvedFacility {
            reference: facility.reference.clone(),
            parent_facility_reference: facility.parent_facility_reference.clone(),
            root_facility_reference: slots[root.ancestor].reference.clone(),
            counterparty_reference: facility.counterparty_reference.clone(),
            hierarchy_depth: root.hops,
            committed_limit: facility.committed_limit,
            aggregated_drawn: aggregated[slot],
            undrawn_amount,
            descendant_loans: descendant_loans[slot],
        });

        if let Some(undrawn) = undrawn_amount {
            exposures.push(ReportingExposure {
                exposure_reference: facility.reference.clone(),
                kind: ExposureKind::FacilityUndrawn,
                counterparty_reference: facility.counterparty_reference.clone(),
                root_facility_reference: Some(facility.reference.clone()),
                facility_path: Vec::new(),
                drawn_amount: Decimal::ZERO,
                undrawn_amount: undrawn,
                gross_value: undrawn,
                currency: Some(facility.currency.clone()),
                maturity_date: facility.maturity_date,
                exposure_class: facility.exposure_class,
                ultimate_parent: None,
                effective_rating: None,
                effective_cqs: None,
                effective_turnover: None,
                lending_group_total_exposure: None,
            });
        }
    }

    // -- Loan rows -----------------------------------------------------------
    for (i, a) in accepted.iter().enumerate() {
        // paths were built leaf-first
        let path: Vec<&Facility> = paths[i].iter().rev().map(|&s| slots[s]).collect();
        let root = path.first().copied();
        exposures.push(ReportingExposure {
            exposure_reference: a.loan.reference.clone(),
            kind: ExposureKind::Loan,
            counterparty_reference: a.counterparty.clone(),
            root_facility_reference: root.map(|f| f.reference.clone()),
            facility_path: path.iter().map(|f| f.reference.clone()).collect(),
            drawn_amount: a.loan.drawn_amount,
            undrawn_amount: Decimal::ZERO,
            gross_value: a.loan.drawn_amount,
            currency: a
                .loan
                .currency
                .clone()
                .or_else(|| root.map(|f| f.currency.clone())),
            maturity_date: a.loan.maturity_date.or_else(|| root.and_then(|f| f.maturity_date)),
            exposure_class: a.loan.exposure_class.or_else(|| root.and_then(|f| f.exposure_class)),
            ultimate_parent: None,
            effective_rating: None,
            effective_cqs: None,
            effective_turnover: None,
            lending_group_total_exposure: None,
        });
    }

    let excluded_facilities = slots.len() - resolved_facilities.len();
    debug!(
        facilities = resolved_facilities.len(),
        excluded_facilities,
        rows = exposures.len(),
        excluded_loans,
        "facility hierarchy flattened"
    );

    FacilityFlattening {
        facilities: resolved_facilities,
        exposures,
        facility_iterations: roots.iterations,
        aggregation_iterations,
        excluded_facilities,
        excluded_loans,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::counterparty::{resolve_counterparties, Counterparty};
    use crate::issues::CalculationIssue;
    use rust_decimal_macros::dec;

    fn counterparties(refs: &[&str]) -> Vec<Counterparty> {
        refs.iter()
            .map(|r| Counterparty {
                reference: r.to_string(),
                org_parent_reference: None,
                lending_group_lead_reference: None,
                rating: None,
                cqs: None,
                turnover: None,
            })
            .collect()
    }

    fn facility(reference: &str, parent: Option<&str>, committed: Money) -> Facility {
        Facility {
            reference: reference.to_string(),
            parent_facility_reference: parent.map(str::to_string),
            counterparty_reference: "CP1".to_string(),
            committed_limit: committed,
            currency: Currency::GBP,
            maturity_date: None,
            exposure_class: Some(ExposureClass::Corporate),
        }
    }

    fn loan(reference: &str, parent: Option<&str>, drawn: Money) -> Loan {
        Loan {
            reference: reference.to_string(),
            parent_facility_reference: parent.map(str::to_string),
            counterparty_reference: None,
            drawn_amount: drawn,
            currency: None,
            maturity_date: None,
            exposure_class: None,
        }
    }

    fn run(facilities: &[Facility], loans: &[Loan]) -> (FacilityFlattening, Vec<CalculationIssue>) {
        let config = HierarchyConfig::default();
        let mut issues = IssueLog::new();
        let cps = resolve_counterparties(&counterparties(&["CP1"]), &config, &mut issues);
        let out = flatten_facilities(facilities, loans, &cps, &config, &mut issues);
        (out, issues.into_issues())
    }

    fn row<'a>(out: &'a FacilityFlattening, reference: &str) -> &'a ReportingExposure {
        out.exposures
            .iter()
            .find(|e| e.exposure_reference == reference)
            .unwrap()
    }

    #[test]
    fn test_master_facility_split() {
        let facilities = vec![
            facility("MASTER", None, dec!(10_000_000)),
            facility("A", Some("MASTER"), dec!(6_000_000)),
            facility("B", Some("MASTER"), dec!(4_000_000)),
        ];
        let loans = vec![
            loan("A1", Some("A"), dec!(2_000_000)),
            loan("A2", Some("A"), dec!(1_500_000)),
            loan("B1", Some("B"), dec!(3_000_000)),
        ];
        let (out, issues) = run(&facilities, &loans);
        assert!(issues.is_empty());
        assert_eq!(out.exposures.len(), 4);

        let master = row(&out, "MASTER");
        assert_eq!(master.kind, ExposureKind::FacilityUndrawn);
        assert_eq!(master.undrawn_amount, dec!(3_500_000));
        assert_eq!(master.drawn_amount, dec!(0));

        assert_eq!(row(&out, "A1").drawn_amount, dec!(2_000_000));
        assert_eq!(row(&out, "A2").drawn_amount, dec!(1_500_000));
        assert_eq!(row(&out, "B1").drawn_amount, dec!(3_000_000));
        assert!(out.exposures.iter().all(|e| e.exposure_reference != "A"));
        assert!(out.exposures.iter().all(|e| e.exposure_reference != "B"));

        let a1 = row(&out, "A1");
        assert_eq!(a1.facility_path, vec!["MASTER", "A"]);
        assert_eq!(a1.root_facility_reference.as_deref(), Some("MASTER"));
        assert_eq!(a1.counterparty_reference, "CP1");
        assert_eq!(a1.exposure_class, Some(ExposureClass::Corporate));
        assert_eq!(a1.currency, Some(Currency::GBP));

        let a = out.facilities.iter().find(|f| f.reference == "A").unwrap();
        assert_eq!(a.aggregated_drawn, dec!(3_500_000));
        assert_eq!(a.undrawn_amount, None);
        assert_eq!(a.hierarchy_depth, 1);
        assert_eq!(a.descendant_loans, 2);
    }

    #[test]
    fn test_overdrawn_root_clamped_with_warning() {
        let facilities = vec![facility("F", None, dec!(100))];
        let loans = vec![loan("L", Some("F"), dec!(150))];
        let (out, issues) = run(&facilities, &loans);
        assert_eq!(row(&out, "F").undrawn_amount, dec!(0));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, IssueCode::NegativeUndrawn);
    }

    #[test]
    fn test_sub_limit_breach_warned() {
        let facilities = vec![
            facility("ROOT", None, dec!(1_000)),
            facility("SUB", Some("ROOT"), dec!(100)),
        ];
        let loans = vec![loan("L", Some("SUB"), dec!(300))];
        let (out, issues) = run(&facilities, &loans);
        assert_eq!(row(&out, "ROOT").undrawn_amount, dec!(700));
        assert!(issues.iter().any(|i| i.code == IssueCode::SubLimitBreach));
    }

    #[test]
    fn test_standalone_loan_needs_counterparty() {
        let mut with_cp = loan("L1", None, dec!(50));
        with_cp.counterparty_reference = Some("CP1".into());
        let without_cp = loan("L2", None, dec!(75));
        let (out, issues) = run(&[], &[with_cp, without_cp]);
        assert_eq!(out.exposures.len(), 1);
        assert!(row(&out, "L1").facility_path.is_empty());
        assert_eq!(issues[0].code, IssueCode::MissingCounterparty);
        assert_eq!(out.excluded_loans, 1);
    }

    #[test]
    fn test_unknown_parent_drops_subtree_and_loans() {
        let facilities = vec![
            facility("BAD", Some("GHOST"), dec!(1_000)),
            facility("CHILD", Some("BAD"), dec!(500)),
            facility("GOOD", None, dec!(1_000)),
        ];
        let loans = vec![loan("L1", Some("CHILD"), dec!(100)), loan("L2", Some("GOOD"), dec!(100))];
        let (out, issues) = run(&facilities, &loans);
        assert_eq!(out.facilities.len(), 1);
        assert_eq!(out.excluded_facilities, 2);
        assert_eq!(out.excluded_loans, 1);
        let dropped = issues
            .iter()
            .find(|i| i.code == IssueCode::ExcludedSubtree)
            .unwrap();
        assert_eq!(dropped.references, vec!["CHILD", "L1"]);
    }

    #[test]
    fn test_facility_cycle_excluded_with_loans() {
        let facilities = vec![
            facility("X", Some("Y"), dec!(100)),
            facility("Y", Some("X"), dec!(100)),
            facility("Z", None, dec!(100)),
        ];
        let loans = vec![loan("LX", Some("X"), dec!(10))];
        let (out, issues) = run(&facilities, &loans);
        assert_eq!(out.exposures.len(), 1);
        assert!(issues.iter().any(|i| i.code == IssueCode::HierarchyCycle
            && i.references == vec!["X".to_string(), "Y".to_string()]));
        assert!(issues
            .iter()
            .any(|i| i.code == IssueCode::ExcludedSubtree && i.references == vec!["LX"]));
    }

    #[test]
    fn test_loan_reference_colliding_with_facility() {
        let facilities = vec![facility("F", None, dec!(100))];
        let loans = vec![loan("F", Some("F"), dec!(10))];
        let (out, issues) = run(&facilities, &loans);
        assert_eq!(out.exposures.len(), 1);
        assert_eq!(issues[0].code, IssueCode::DuplicateReference);
        // The rejected loan's drawn still uses up the limit
        assert_eq!(row(&out, "F").undrawn_amount, dec!(90));
        assert_eq!(out.facilities[0].descendant_loans, 0);
    }

    #[test]
    fn test_negative_drawn_loan_leaves_headroom_untouched() {
        let facilities = vec![facility("F", None, dec!(100))];
        let loans = vec![loan("L1", Some("F"), dec!(-30)), loan("L2", Some("F"), dec!(20))];
        let (out, issues) = run(&facilities, &loans);
        assert_eq!(issues[0].code, IssueCode::NegativeAmount);
        assert_eq!(row(&out, "F").undrawn_amount, dec!(80));
    }

    #[test]
    fn test_unknown_counterparty_on_facility() {
        let mut f = facility("F", None, dec!(100));
        f.counterparty_reference = "NOBODY".into();
        let (out, issues) = run(&[f], &[]);
        assert!(out.exposures.is_empty());
        assert_eq!(issues[0].code, IssueCode::UnknownReference);
    }
}
