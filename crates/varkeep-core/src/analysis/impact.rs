use super::graph::DependencyGraph;
use serde::Serialize;
use std::collections::{BTreeSet, VecDeque};
use tracing::debug;

/// Files a deletion would take with it, beyond the targets themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImpactSet {
    /// Dependencies left with no dependents outside the deletion set.
    pub safe_cascade: Vec<String>,
    /// Every transitive dependency, whoever else uses it. Unsafe to delete blindly.
    pub forced_cascade: Vec<String>,
}

impl ImpactSet {
    pub fn is_empty(&self) -> bool {
        self.forced_cascade.is_empty()
    }
}

/// Compute the safe and forced cascades for deleting `targets` (file paths).
///
/// Paths not present in the graph are ignored. Neither cascade contains a
/// target, and the safe cascade is always a subset of the forced one.
pub fn compute_impact<S: AsRef<str>>(graph: &DependencyGraph, targets: &[S]) -> ImpactSet {
    let target_set: BTreeSet<usize> = targets
        .iter()
        .filter_map(|t| graph.index_of(t.as_ref()))
        .collect();

    let forced = forced_cascade(graph, &target_set);
    let safe = safe_cascade(graph, &target_set);

    debug!(
        "Impact of {} targets: {} safe, {} forced",
        target_set.len(),
        safe.len(),
        forced.len()
    );

    ImpactSet {
        safe_cascade: safe.into_iter().map(|i| graph.path(i).to_string()).collect(),
        forced_cascade: forced.into_iter().map(|i| graph.path(i).to_string()).collect(),
    }
}

/// Breadth-first transitive closure of forward edges.
fn forced_cascade(graph: &DependencyGraph, targets: &BTreeSet<usize>) -> Vec<usize> {
    let mut visited: BTreeSet<usize> = targets.clone();
    let mut queue: VecDeque<usize> = targets.iter().copied().collect();
    let mut reached = Vec::new();

    while let Some(current) = queue.pop_front() {
        for &provider in graph.providers(current) {
            if visited.insert(provider) {
                reached.push(provider);
                queue.push_back(provider);
            }
        }
    }
    reached
}

/// Fixed point: keep adding providers whose every dependent is already slated
/// for removal, until a full pass adds nothing. Removing one orphan can orphan
/// its own dependencies, so a single pass is not enough.
fn safe_cascade(graph: &DependencyGraph, targets: &BTreeSet<usize>) -> Vec<usize> {
    let mut removed: BTreeSet<usize> = targets.clone();
    let mut cascade = Vec::new();

    loop {
        let frontier: BTreeSet<usize> = removed
            .iter()
            .flat_map(|&r| graph.providers(r).iter().copied())
            .filter(|p| !removed.contains(p))
            .collect();

        let mut added = false;
        for provider in frontier {
            let orphaned = graph
                .consumers(provider)
                .iter()
                .all(|consumer| removed.contains(consumer));
            if orphaned {
                removed.insert(provider);
                cascade.push(provider);
                added = true;
            }
        }

        if !added {
            break;
        }
    }
    cascade
}
