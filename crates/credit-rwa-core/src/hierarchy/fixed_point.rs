//! Semi-naive fixed-point ancestor resolution over an index arena.
//!
//! Nodes are dense indices `0..n` with a parent array. Rather than chasing
//! each node's parent pointers to the top one at a time, every unresolved node
//! advances one hop per iteration in a single bulk pass over the frontier.
//! Nodes whose walk terminates are moved to the accumulator and dropped from
//! the next frontier, so frontiers shrink monotonically. A node at depth `d`
//! converges in iteration `d`; anything still in the frontier after
//! `max_depth` iterations is reported back as unresolved.

use std::collections::BTreeSet;

use tracing::debug;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Where a node's walk stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedAncestor {
    /// Index of the node the walk stopped at (possibly the node itself).
    pub ancestor: usize,
    /// Number of parent hops taken.
    pub hops: u32,
}

/// Result of one fixed-point resolution.
#[derive(Debug, Clone)]
pub struct AncestorResolution {
    /// Per node; `None` for nodes that did not converge.
    pub resolved: Vec<Option<ResolvedAncestor>>,
    /// Non-converged nodes, ascending.
    pub unresolved: Vec<usize>,
    /// Iterations actually run.
    pub iterations: u32,
}

/// Why a group of nodes did not converge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NonConvergence {
    /// Nodes on a parent cycle, plus nodes whose ancestry runs into it.
    Cycle {
        members: Vec<usize>,
        affected: Vec<usize>,
    },
    /// Acyclic nodes deeper than the iteration ceiling.
    DepthExceeded { nodes: Vec<usize> },
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Walk every node towards the top of its tree.
///
/// A walk stops at the first node (the start node included) for which
/// `stop_at` holds, or at a node with no parent. With `stop_at = |_| false`
/// this yields each node's ultimate root and depth.
pub fn resolve_ancestors<F>(
    parents: &[Option<usize>],
    max_depth: u32,
    stop_at: F,
) -> AncestorResolution
where
    F: Fn(usize) -> bool,
{
    let n = parents.len();
    let mut resolved: Vec<Option<ResolvedAncestor>> = vec![None; n];

    // (node, current ancestor); the ancestor always has a parent here.
    let mut frontier: Vec<(usize, usize)> = Vec::new();
    for (node, parent) in parents.iter().enumerate() {
        if parent.is_none() || stop_at(node) {
            resolved[node] = Some(ResolvedAncestor {
                ancestor: node,
                hops: 0,
            });
        } else {
            frontier.push((node, node));
        }
    }

    let mut iterations = 0u32;
    while !frontier.is_empty() && iterations < max_depth {
        iterations += 1;
        let hops = iterations;
        let next: Vec<(usize, usize)> = frontier
            .iter()
            .filter_map(|&(node, ancestor)| {
                let step = parents[ancestor]?;
                if parents[step].is_none() || stop_at(step) {
                    resolved[node] = Some(ResolvedAncestor {
                        ancestor: step,
                        hops,
                    });
                    None
                } else {
                    Some((node, step))
                }
            })
            .collect();
        debug!(
            iteration = iterations,
            converged = frontier.len() - next.len(),
            remaining = next.len(),
            "fixed-point iteration"
        );
        frontier = next;
    }

    let mut unresolved: Vec<usize> = frontier.into_iter().map(|(node, _)| node).collect();
    unresolved.sort_unstable();

    AncestorResolution {
        resolved,
        unresolved,
        iterations,
    }
}

// ---------------------------------------------------------------------------
// Residual analysis
// ---------------------------------------------------------------------------

/// Split the non-converged residue of a resolution into cycles and
/// legitimately deep chains.
///
/// Only the residual set is walked, and each node is visited once, so this is
/// linear in the size of the residue plus the resolved nodes it touches.
pub fn classify_unresolved(
    parents: &[Option<usize>],
    resolution: &AncestorResolution,
) -> Vec<NonConvergence> {
    const UNVISITED: u8 = 0;
    const ON_PATH: u8 = 1;
    const DONE: u8 = 2;

    let n = parents.len();
    let mut state = vec![UNVISITED; n];
    // Per node: Some(Some(cycle)) if it reaches cycle `cycle`, Some(None) if
    // it reaches a root, None while unknown.
    let mut reaches: Vec<Option<Option<usize>>> = vec![None; n];
    for (node, r) in resolution.resolved.iter().enumerate() {
        if r.is_some() {
            state[node] = DONE;
            reaches[node] = Some(None);
        }
    }

    let mut cycles: Vec<Vec<usize>> = Vec::new();

    for &start in &resolution.unresolved {
        if state[start] == DONE {
            continue;
        }
        let mut path: Vec<usize> = Vec::new();
        let mut cursor = Some(start);
        let mut outcome: Option<usize> = None;
        while let Some(node) = cursor {
            match state[node] {
                DONE => {
                    outcome = reaches[node].flatten();
                    break;
                }
                ON_PATH => {
                    let pos = path.iter().position(|&p| p == node).unwrap_or(0);
                    let id = cycles.len();
                    let mut members: Vec<usize> = path[pos..].to_vec();
                    members.sort_unstable();
                    for &m in &members {
                        reaches[m] = Some(Some(id));
                        state[m] = DONE;
                    }
                    cycles.push(members);
                    outcome = Some(id);
                    break;
                }
                _ => {
                    state[node] = ON_PATH;
                    path.push(node);
                    cursor = parents[node];
                }
            }
        }
        for node in path {
            if state[node] != DONE {
                state[node] = DONE;
                reaches[node] = Some(outcome);
            }
        }
    }

    let mut affected: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); cycles.len()];
    let mut deep: Vec<usize> = Vec::new();
    for &node in &resolution.unresolved {
        match reaches[node].flatten() {
            Some(id) if !cycles[id].contains(&node) => {
                affected[id].insert(node);
            }
            Some(_) => {}
            None => deep.push(node),
        }
    }

    let mut out: Vec<NonConvergence> = cycles
        .into_iter()
        .zip(affected)
        .map(|(members, affected)| NonConvergence::Cycle {
            members,
            affected: affected.into_iter().collect(),
        })
        .collect();
    if !deep.is_empty() {
        out.push(NonConvergence::DepthExceeded { nodes: deep });
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn roots(parents: &[Option<usize>], max_depth: u32) -> AncestorResolution {
        resolve_ancestors(parents, max_depth, |_| false)
    }

    #[test]
    fn test_chain_resolves_to_root_with_depth() {
        // 0 <- 1 <- 2 <- 3
        let parents = vec![None, Some(0), Some(1), Some(2)];
        let res = roots(&parents, 10);
        assert!(res.unresolved.is_empty());
        assert_eq!(res.iterations, 3);
        for (node, expected_hops) in [(0, 0), (1, 1), (2, 2), (3, 3)] {
            let r = res.resolved[node].unwrap();
            assert_eq!(r.ancestor, 0);
            assert_eq!(r.hops, expected_hops);
        }
    }

    #[test]
    fn test_forest_resolves_each_tree() {
        // 0 <- 1, 2 <- 3 <- 4
        let parents = vec![None, Some(0), None, Some(2), Some(3)];
        let res = roots(&parents, 10);
        assert_eq!(res.resolved[1].unwrap().ancestor, 0);
        assert_eq!(res.resolved[4].unwrap().ancestor, 2);
        assert_eq!(res.resolved[4].unwrap().hops, 2);
    }

    #[test]
    fn test_depth_ceiling_leaves_deep_nodes_unresolved() {
        let parents = vec![None, Some(0), Some(1), Some(2)];
        let res = roots(&parents, 2);
        assert_eq!(res.unresolved, vec![3]);
        let classes = classify_unresolved(&parents, &res);
        assert_eq!(
            classes,
            vec![NonConvergence::DepthExceeded { nodes: vec![3] }]
        );
    }

    #[test]
    fn test_stop_predicate_finds_nearest_marked_ancestor() {
        // 0 <- 1 <- 2 <- 3, node 1 is marked
        let parents = vec![None, Some(0), Some(1), Some(2)];
        let res = resolve_ancestors(&parents, 10, |n| n == 1);
        assert_eq!(res.resolved[3].unwrap().ancestor, 1);
        assert_eq!(res.resolved[3].unwrap().hops, 2);
        assert_eq!(res.resolved[1].unwrap().ancestor, 1);
        assert_eq!(res.resolved[0].unwrap().ancestor, 0);
    }

    #[test]
    fn test_cycle_with_hanging_descendant() {
        // 0 -> 1 -> 2 -> 0 cycle, 3 -> 0 hangs off it, 4 is a root
        let parents = vec![Some(1), Some(2), Some(0), Some(0), None];
        for depth in [0, 1, 3, 10, 100] {
            let res = roots(&parents, depth);
            assert_eq!(res.unresolved, vec![0, 1, 2, 3]);
            let classes = classify_unresolved(&parents, &res);
            assert_eq!(
                classes,
                vec![NonConvergence::Cycle {
                    members: vec![0, 1, 2],
                    affected: vec![3],
                }]
            );
        }
    }

    #[test]
    fn test_self_loop_is_cycle() {
        let parents = vec![Some(0)];
        let res = roots(&parents, 10);
        let classes = classify_unresolved(&parents, &res);
        assert_eq!(
            classes,
            vec![NonConvergence::Cycle {
                members: vec![0],
                affected: vec![],
            }]
        );
    }

    #[test]
    fn test_two_disjoint_cycles_and_deep_chain() {
        // cycle {0,1}, cycle {2,3}, chain 4 <- 5 <- 6 <- 7
        let parents = vec![
            Some(1),
            Some(0),
            Some(3),
            Some(2),
            None,
            Some(4),
            Some(5),
            Some(6),
        ];
        let res = roots(&parents, 2);
        let classes = classify_unresolved(&parents, &res);
        assert_eq!(classes.len(), 3);
        assert!(classes.contains(&NonConvergence::Cycle {
            members: vec![0, 1],
            affected: vec![]
        }));
        assert!(classes.contains(&NonConvergence::Cycle {
            members: vec![2, 3],
            affected: vec![]
        }));
        assert!(classes.contains(&NonConvergence::DepthExceeded { nodes: vec![7] }));
    }

    #[test]
    fn test_empty_arena() {
        let res = roots(&[], 10);
        assert!(res.resolved.is_empty());
        assert_eq!(res.iterations, 0);
        assert!(classify_unresolved(&[], &res).is_empty());
    }
}
