//! Lending-group totals.
//!
//! Groups are declared flat (every member names its lead directly), so the
//! total is a single group-by-and-sum over the reporting view with no
//! iteration. The lead belongs to its own group whether or not it names
//! itself.

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use tracing::debug;

use super::counterparty::ResolvedCounterparty;
use super::facility::ReportingExposure;
use crate::issues::{IssueCode, IssueLog};
use crate::types::Money;

/// Fill `total_exposure`, `lending_group_lead` and
/// `lending_group_total_exposure` on every counterparty.
pub(crate) fn aggregate_lending_groups(
    counterparties: &mut [ResolvedCounterparty],
    exposures: &[ReportingExposure],
    issues: &mut IssueLog,
) {
    let mut own_totals: HashMap<&str, Money> = HashMap::new();
    for e in exposures {
        *own_totals.entry(e.counterparty_reference.as_str()).or_default() += e.gross_value;
    }
    let references: Vec<String> = counterparties.iter().map(|c| c.reference.clone()).collect();
    let position: HashMap<&str, usize> = references
        .iter()
        .enumerate()
        .map(|(i, r)| (r.as_str(), i))
        .collect();

    // -- Validate declared leads ---------------------------------------------
    let declared: Vec<Option<String>> = counterparties
        .iter()
        .map(|c| c.lending_group_lead.clone())
        .collect();
    let mut leads: Vec<Option<usize>> = vec![None; counterparties.len()];
    for (i, cp) in counterparties.iter().enumerate() {
        let Some(lead) = declared[i].as_deref() else {
            continue;
        };
        match position.get(lead) {
            None => {
                issues.error(
                    IssueCode::UnknownReference,
                    vec![cp.reference.clone(), lead.to_string()],
                    format!(
                        "Counterparty '{}' names unknown or excluded lending-group lead '{}'; \
                         treated as standalone.",
                        cp.reference, lead
                    ),
                );
            }
            Some(&l) => {
                if l != i {
                    if let Some(outer) = declared[l].as_deref().filter(|o| *o != lead) {
                        issues.warning(
                            IssueCode::NestedLendingGroup,
                            vec![lead.to_string(), outer.to_string()],
                            format!(
                                "Lending-group lead '{}' itself names lead '{}'; groups are \
                                 not chained.",
                                lead, outer
                            ),
                        );
                    }
                }
                leads[i] = Some(l);
            }
        }
    }

    // -- Group-by-and-sum ----------------------------------------------------
    let own = |i: usize| -> Money {
        own_totals
            .get(references[i].as_str())
            .copied()
            .unwrap_or(Decimal::ZERO)
    };
    let mut group_totals: BTreeMap<usize, Money> = BTreeMap::new();
    for (i, lead) in leads.iter().enumerate() {
        if let Some(l) = *lead {
            if l != i {
                *group_totals.entry(l).or_insert_with(|| own(l)) += own(i);
            } else {
                group_totals.entry(l).or_insert_with(|| own(l));
            }
        }
    }

    let totals: Vec<Money> = (0..counterparties.len()).map(own).collect();
    for (i, cp) in counterparties.iter_mut().enumerate() {
        cp.total_exposure = totals[i];
        let group_lead = leads[i].or_else(|| group_totals.contains_key(&i).then_some(i));
        match group_lead {
            Some(l) => {
                cp.lending_group_lead = Some(references[l].clone());
                cp.lending_group_total_exposure = group_totals[&l];
            }
            None => {
                cp.lending_group_lead = None;
                cp.lending_group_total_exposure = totals[i];
            }
        }
    }

    debug!(groups = group_totals.len(), "lending groups aggregated");
}
