//! Expansion of protection links to the reporting rows they cover.
//!
//! The index is built once from the reporting view. Every loan row already
//! carries its full `facility_path`, which is the transitive closure of the
//! facility hierarchy for that loan, so facility-level expansion is a lookup.

use std::collections::{BTreeSet, HashMap, HashSet};

use super::protection::ProtectionLink;
use crate::hierarchy::{ExposureKind, ResolvedHierarchy};

/// Outcome of expanding one link.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Expansion {
    /// Covered row positions, ascending and unique.
    pub covered: Vec<usize>,
    /// References named by the link that do not resolve.
    pub unknown: Vec<String>,
}

/// Lookup from reference, counterparty and facility to reporting rows.
#[derive(Debug, Default)]
pub struct ExpansionIndex<'a> {
    by_reference: HashMap<&'a str, usize>,
    by_counterparty: HashMap<&'a str, Vec<usize>>,
    by_facility: HashMap<&'a str, Vec<usize>>,
    known_counterparties: HashSet<&'a str>,
    known_facilities: HashSet<&'a str>,
}

impl<'a> ExpansionIndex<'a> {
    pub fn build(hierarchy: &'a ResolvedHierarchy) -> Self {
        let mut index = ExpansionIndex::default();
        for (i, row) in hierarchy.exposures.iter().enumerate() {
            index
                .by_reference
                .entry(row.exposure_reference.as_str())
                .or_insert(i);
            index
                .by_counterparty
                .entry(row.counterparty_reference.as_str())
                .or_default()
                .push(i);
            match row.kind {
                ExposureKind::Loan => {
                    for facility in &row.facility_path {
                        index.by_facility.entry(facility.as_str()).or_default().push(i);
                    }
                }
                ExposureKind::FacilityUndrawn => {
                    index
                        .by_facility
                        .entry(row.exposure_reference.as_str())
                        .or_default()
                        .push(i);
                }
            }
        }
        index.known_counterparties = hierarchy
            .counterparties
            .iter()
            .map(|c| c.reference.as_str())
            .collect();
        index.known_facilities = hierarchy
            .facilities
            .iter()
            .map(|f| f.reference.as_str())
            .collect();
        index
    }

    pub fn row(&self, reference: &str) -> Option<usize> {
        self.by_reference.get(reference).copied()
    }

    pub fn expand(&self, link: &ProtectionLink) -> Expansion {
        match link {
            ProtectionLink::Counterparty(reference) => {
                self.group(&self.by_counterparty, &self.known_counterparties, reference)
            }
            ProtectionLink::Facility(reference) => {
                self.group(&self.by_facility, &self.known_facilities, reference)
            }
            ProtectionLink::Exposures(references) => {
                let mut covered = BTreeSet::new();
                let mut unknown = Vec::new();
                for r in references {
                    match self.row(r) {
                        Some(i) => {
                            covered.insert(i);
                        }
                        None => unknown.push(r.clone()),
                    }
                }
                Expansion {
                    covered: covered.into_iter().collect(),
                    unknown,
                }
            }
        }
    }

    fn group(
        &self,
        rows: &HashMap<&'a str, Vec<usize>>,
        known: &HashSet<&'a str>,
        reference: &str,
    ) -> Expansion {
        if !known.contains(reference) {
            return Expansion {
                covered: Vec::new(),
                unknown: vec![reference.to_string()],
            };
        }
        let mut covered = rows.get(reference).cloned().unwrap_or_default();
        covered.sort_unstable();
        covered.dedup();
        Expansion {
            covered,
            unknown: Vec::new(),
        }
    }
}
