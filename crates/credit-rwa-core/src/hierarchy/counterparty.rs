//! Organisational hierarchy: ultimate parent, depth and inherited
//! rating / CQS / turnover.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::fixed_point::{classify_unresolved, resolve_ancestors, AncestorResolution};
use super::index::ReferenceIndex;
use super::report_non_convergence;
use crate::config::{HierarchyConfig, InheritancePolicy};
use crate::issues::{IssueCode, IssueLog};
use crate::types::{Cqs, Money};

// ---------------------------------------------------------------------------
// Input / Output
// ---------------------------------------------------------------------------

/// A counterparty as loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Counterparty {
    pub reference: String,
    /// Direct parent in the organisational hierarchy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_parent_reference: Option<String>,
    /// Lead of the lending group this counterparty belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lending_group_lead_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cqs: Option<Cqs>,
    /// Annual turnover
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turnover: Option<Money>,
}

/// A counterparty with its derived hierarchy attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedCounterparty {
    pub reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_parent_reference: Option<String>,
    /// Root of the organisational tree; the counterparty itself for roots.
    pub ultimate_parent: String,
    /// Parent hops to the ultimate parent (0 for roots).
    pub hierarchy_depth: u32,
    pub effective_rating: Option<String>,
    pub effective_cqs: Option<Cqs>,
    /// Counterparty whose own rating/CQS was used.
    pub rating_source: Option<String>,
    pub effective_turnover: Option<Money>,
    /// Lead of the lending group; the counterparty itself for a lead.
    pub lending_group_lead: Option<String>,
    /// Gross reporting-view exposure booked to this counterparty.
    pub total_exposure: Money,
    /// Gross exposure summed over the lending group, or `total_exposure`
    /// outside any group.
    pub lending_group_total_exposure: Money,
}

/// Whether a counterparty reference can carry exposures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CounterpartyStatus {
    Resolved,
    Excluded,
    Unknown,
}

pub(crate) struct CounterpartyResolution {
    /// Resolved counterparties in input order.
    pub resolved: Vec<ResolvedCounterparty>,
    pub excluded: BTreeSet<String>,
    pub iterations: u32,
    positions: HashMap<String, usize>,
}

impl CounterpartyResolution {
    pub fn status(&self, reference: &str) -> CounterpartyStatus {
        if self.positions.contains_key(reference) {
            CounterpartyStatus::Resolved
        } else if self.excluded.contains(reference) {
            CounterpartyStatus::Excluded
        } else {
            CounterpartyStatus::Unknown
        }
    }

    pub fn get(&self, reference: &str) -> Option<&ResolvedCounterparty> {
        self.positions.get(reference).map(|&i| &self.resolved[i])
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

pub(crate) fn resolve_counterparties(
    counterparties: &[Counterparty],
    config: &HierarchyConfig,
    issues: &mut IssueLog,
) -> CounterpartyResolution {
    let index = ReferenceIndex::build(
        counterparties.iter().map(|c| c.reference.as_str()),
        "counterparty",
        issues,
    );
    let slots: Vec<&Counterparty> = index.records.iter().map(|&p| &counterparties[p]).collect();
    let max_depth = config.max_hierarchy_depth;

    // -- Edge table ----------------------------------------------------------
    let mut orphan = vec![false; slots.len()];
    let parents: Vec<Option<usize>> = slots
        .iter()
        .enumerate()
        .map(|(slot, cp)| match cp.org_parent_reference.as_deref() {
            None => None,
            Some(parent) => match index.get(parent) {
                Some(p) => Some(p),
                None => {
                    issues.error(
                        IssueCode::UnknownReference,
                        vec![cp.reference.clone(), parent.to_string()],
                        format!(
                            "Counterparty '{}' references unknown org parent '{}'; excluded.",
                            cp.reference, parent
                        ),
                    );
                    orphan[slot] = true;
                    None
                }
            },
        })
        .collect();

    // -- Roots ---------------------------------------------------------------
    let roots = resolve_ancestors(&parents, max_depth, |_| false);
    let classes = classify_unresolved(&parents, &roots);
    let mut excluded_slots = report_non_convergence(
        &classes,
        "organisational",
        max_depth,
        |s| slots[s].reference.clone(),
        issues,
    );

    // Descendants of an orphan inherit its exclusion.
    let mut orphan_subtrees: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    for (slot, r) in roots.resolved.iter().enumerate() {
        if let Some(r) = r {
            if orphan[r.ancestor] {
                excluded_slots.insert(slot);
                if r.ancestor != slot {
                    orphan_subtrees
                        .entry(r.ancestor)
                        .or_default()
                        .push(slots[slot].reference.clone());
                }
            }
        }
    }
    for (root, members) in orphan_subtrees {
        issues.error(
            IssueCode::ExcludedSubtree,
            members.clone(),
            format!(
                "{} counterparty(ies) below orphan '{}' excluded: {}.",
                members.len(),
                slots[root].reference,
                members.join(", ")
            ),
        );
    }

    // -- Inheritance ---------------------------------------------------------
    let has_rating = |s: usize| slots[s].rating.is_some() || slots[s].cqs.is_some();
    let has_turnover = |s: usize| slots[s].turnover.is_some();
    let nearest_rated = nearest_walk(config, &parents, &has_rating);
    let nearest_turnover = nearest_walk(config, &parents, &has_turnover);

    let mut resolved = Vec::with_capacity(slots.len());
    let mut positions = HashMap::with_capacity(slots.len());
    let mut excluded = BTreeSet::new();

    for (slot, cp) in slots.iter().enumerate() {
        let root = match roots.resolved[slot] {
            Some(r) if !excluded_slots.contains(&slot) => r,
            _ => {
                excluded.insert(cp.reference.clone());
                continue;
            }
        };

        let rating_source = inheritance_source(slot, root.ancestor, &has_rating, &nearest_rated);
        let turnover_source =
            inheritance_source(slot, root.ancestor, &has_turnover, &nearest_turnover);

        positions.insert(cp.reference.clone(), resolved.len());
        resolved.push(ResolvedCounterparty {
            reference: cp.reference.clone(),
            org_parent_reference: cp.org_parent_reference.clone(),
            ultimate_parent: slots[root.ancestor].reference.clone(),
            hierarchy_depth: root.hops,
            effective_rating: rating_source.and_then(|s| slots[s].rating.clone()),
            effective_cqs: rating_source.and_then(|s| slots[s].cqs),
            rating_source: rating_source.map(|s| slots[s].reference.clone()),
            effective_turnover: turnover_source.and_then(|s| slots[s].turnover),
            lending_group_lead: cp.lending_group_lead_reference.clone(),
            total_exposure: Decimal::ZERO,
            lending_group_total_exposure: Decimal::ZERO,
        });
    }

    debug!(
        resolved = resolved.len(),
        excluded = excluded.len(),
        iterations = roots.iterations,
        "organisational hierarchy resolved"
    );

    CounterpartyResolution {
        resolved,
        excluded,
        iterations: roots.iterations,
        positions,
    }
}

/// Under `NearestAncestor`, walk each node to the closest ancestor satisfying
/// `has`. The walk stops at roots, so it converges wherever root resolution did.
fn nearest_walk(
    config: &HierarchyConfig,
    parents: &[Option<usize>],
    has: &dyn Fn(usize) -> bool,
) -> Option<AncestorResolution> {
    match config.rating_inheritance {
        InheritancePolicy::UltimateParent => None,
        InheritancePolicy::NearestAncestor => {
            Some(resolve_ancestors(parents, config.max_hierarchy_depth, has))
        }
    }
}

/// Slot whose own attribute a node takes, if any.
fn inheritance_source(
    slot: usize,
    root: usize,
    has: &dyn Fn(usize) -> bool,
    nearest: &Option<AncestorResolution>,
) -> Option<usize> {
    if has(slot) {
        return Some(slot);
    }
    let candidate = match nearest {
        None => root,
        Some(walk) => walk.resolved[slot].map(|r| r.ancestor)?,
    };
    has(candidate).then_some(candidate)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
