//! Hierarchy resolution.
//!
//! Rebuilds the organisational, lending-group and facility hierarchies from
//! flat parent references and propagates ratings, turnover, drawn balances
//! and group totals through them with bulk fixed-point passes.

pub mod counterparty;
pub mod facility;
pub mod fixed_point;
pub(crate) mod index;
pub mod lending_group;
pub mod resolver;

pub use counterparty::{Counterparty, ResolvedCounterparty};
pub use facility::{ExposureKind, Facility, Loan, ReportingExposure, ResolvedFacility};
pub use resolver::{resolve_hierarchy, HierarchyInput, HierarchySummary, ResolvedHierarchy};

use std::collections::BTreeSet;

use crate::issues::{IssueCode, IssueLog};
use fixed_point::NonConvergence;

/// Report every non-converged group and return the slots to exclude.
pub(crate) fn report_non_convergence(
    classes: &[NonConvergence],
    hierarchy: &str,
    max_depth: u32,
    reference_of: impl Fn(usize) -> String,
    issues: &mut IssueLog,
) -> BTreeSet<usize> {
    let mut excluded = BTreeSet::new();
    for class in classes {
        match class {
            NonConvergence::Cycle { members, affected } => {
                let names: Vec<String> = members.iter().map(|&m| reference_of(m)).collect();
                let mut message = format!(
                    "Cycle in {} hierarchy through {{{}}}; the cyclic subtree is excluded.",
                    hierarchy,
                    names.join(", ")
                );
                if !affected.is_empty() {
                    let hanging: Vec<String> =
                        affected.iter().map(|&a| reference_of(a)).collect();
                    message.push_str(&format!(
                        " Descendants also excluded: {}.",
                        hanging.join(", ")
                    ));
                }
                message.push_str(&format!(
                    " Resolution stopped at max_hierarchy_depth = {}; if the data is \
                     acyclic, raise max_hierarchy_depth.",
                    max_depth
                ));
                issues.error(IssueCode::HierarchyCycle, names, message);
                excluded.extend(members.iter().copied());
                excluded.extend(affected.iter().copied());
            }
            NonConvergence::DepthExceeded { nodes } => {
                let names: Vec<String> = nodes.iter().map(|&n| reference_of(n)).collect();
                issues.error(
                    IssueCode::DepthExceeded,
                    names,
                    format!(
                        "{} {} hierarchy node(s) did not reach a root within \
                         max_hierarchy_depth = {} iterations and are excluded; raise \
                         max_hierarchy_depth to resolve them.",
                        nodes.len(),
                        hierarchy,
                        max_depth
                    ),
                );
                excluded.extend(nodes.iter().copied());
            }
        }
    }
    excluded
}
