use crate::model::{normalize_path, DependencyRef, PackageRecord, SystemPatterns};
use crate::snapshot::Snapshot;
use ahash::AHashMap;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::debug;

/// Which matcher resolved a dependency id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MatchKind {
    ExactIdentity,
    FilePath,
    LatestAvailable,
}

/// Records a dependency id resolved to, as file paths in scan order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub kind: MatchKind,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DependencyStatus {
    /// Matches a system/core namespace; never missing.
    System,
    /// Exact identity present and enabled (or `.latest` with an enabled copy).
    Valid,
    /// Exact identity present, but only disabled copies.
    Disabled,
    /// Only other versions of the package are available.
    Mismatch,
    Missing,
}

/// Precomputed lookup tables the matchers run against.
#[derive(Debug, Default)]
struct SnapshotLookup {
    by_identity: AHashMap<String, Vec<usize>>,
    by_path: AHashMap<String, Vec<usize>>,
    by_base: AHashMap<String, Vec<usize>>,
}

impl SnapshotLookup {
    fn build(records: &[PackageRecord]) -> Self {
        let mut lookup = SnapshotLookup::default();
        for (i, record) in records.iter().enumerate() {
            lookup
                .by_path
                .entry(normalize_path(&record.file_path))
                .or_default()
                .push(i);
            lookup
                .by_path
                .entry(record.file_name.to_lowercase())
                .or_default()
                .push(i);
            if record.identity.is_known() {
                lookup
                    .by_identity
                    .entry(record.identity.lookup_id())
                    .or_default()
                    .push(i);
                lookup
                    .by_base
                    .entry(record.identity.lookup_base())
                    .or_default()
                    .push(i);
            }
        }
        lookup
    }
}

type Matcher = fn(&str, &DependencyRef, &[PackageRecord], &SnapshotLookup) -> Option<Vec<usize>>;

/// Matchers tried in order; the first hit wins.
const MATCHERS: [(MatchKind, Matcher); 3] = [
    (MatchKind::ExactIdentity, match_exact_identity),
    (MatchKind::FilePath, match_file_path),
    (MatchKind::LatestAvailable, match_latest_available),
];

fn match_exact_identity(
    _raw: &str,
    dep: &DependencyRef,
    _records: &[PackageRecord],
    lookup: &SnapshotLookup,
) -> Option<Vec<usize>> {
    lookup.by_identity.get(&dep.lookup_id).cloned()
}

fn match_file_path(
    raw: &str,
    _dep: &DependencyRef,
    _records: &[PackageRecord],
    lookup: &SnapshotLookup,
) -> Option<Vec<usize>> {
    let mut matches: Vec<usize> = lookup.by_path.get(&normalize_path(raw))?.clone();
    matches.dedup();
    Some(matches)
}

/// Highest parsed version of the referenced `creator.packageName`, all copies of it.
fn match_latest_available(
    _raw: &str,
    dep: &DependencyRef,
    records: &[PackageRecord],
    lookup: &SnapshotLookup,
) -> Option<Vec<usize>> {
    let members = lookup.by_base.get(dep.base.as_ref()?)?;
    let mut best: Option<usize> = None;
    for &i in members {
        match best {
            Some(b) if records[b].version_number() >= records[i].version_number() => {}
            _ => best = Some(i),
        }
    }
    let best_id = records[best?].identity.lookup_id();
    lookup.by_identity.get(&best_id).cloned()
}

/// Forward and reverse dependency adjacency over a snapshot.
///
/// Every record contributes edges, enabled or not: deleting something a
/// disabled package needs still breaks that package.
#[derive(Debug)]
pub struct DependencyGraph {
    snapshot: Snapshot,
    system: SystemPatterns,
    lookup: SnapshotLookup,
    path_index: AHashMap<String, usize>,
    /// Identity (lowercased) to the dependency ids its copies declare.
    declared: AHashMap<String, BTreeSet<String>>,
    forward: Vec<BTreeSet<usize>>,
    reverse: Vec<BTreeSet<usize>>,
    unresolved: BTreeSet<String>,
}

impl DependencyGraph {
    pub fn build(snapshot: &Snapshot, system: &SystemPatterns) -> Self {
        let records = snapshot.records();
        let lookup = SnapshotLookup::build(records);
        let mut path_index = AHashMap::with_capacity(records.len());
        let mut declared: AHashMap<String, BTreeSet<String>> = AHashMap::new();
        let mut forward = vec![BTreeSet::new(); records.len()];
        let mut reverse = vec![BTreeSet::new(); records.len()];
        let mut unresolved = BTreeSet::new();

        for (i, record) in records.iter().enumerate() {
            path_index.insert(record.file_path.clone(), i);
            if !record.declared_dependencies.is_empty() {
                declared
                    .entry(record.identity.lookup_id())
                    .or_default()
                    .extend(record.declared_dependencies.iter().cloned());
            }
        }

        for (i, record) in records.iter().enumerate() {
            for dep_id in &record.declared_dependencies {
                if system.matches(dep_id) {
                    continue;
                }
                match resolve_with(dep_id, records, &lookup) {
                    Some((_, providers)) => {
                        for p in providers.into_iter().filter(|&p| p != i) {
                            forward[i].insert(p);
                            reverse[p].insert(i);
                        }
                    }
                    None => {
                        unresolved.insert(dep_id.clone());
                    }
                }
            }
        }

        let edges: usize = forward.iter().map(|f| f.len()).sum();
        debug!(
            "Dependency graph: {} nodes, {} edges, {} unresolved ids",
            records.len(),
            edges,
            unresolved.len()
        );

        Self {
            snapshot: snapshot.clone(),
            system: system.clone(),
            lookup,
            path_index,
            declared,
            forward,
            reverse,
            unresolved,
        }
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Resolve a dependency id through the matcher chain. System ids and ids
    /// with no match yield `None`.
    pub fn resolve(&self, dep_id: &str) -> Option<Resolution> {
        if self.system.matches(dep_id) {
            return None;
        }
        let (kind, indices) = resolve_with(dep_id, self.snapshot.records(), &self.lookup)?;
        Some(Resolution {
            kind,
            files: indices
                .into_iter()
                .map(|i| self.snapshot[i].file_path.clone())
                .collect(),
        })
    }

    /// Best record to point a user at for `dep_id`: enabled copies first, then
    /// the highest version. May be a different version than requested.
    pub fn locate(&self, dep_id: &str) -> Option<&PackageRecord> {
        if self.system.matches(dep_id) {
            return None;
        }
        let (_, indices) = resolve_with(dep_id, self.snapshot.records(), &self.lookup)?;
        let records = self.snapshot.records();
        let mut best: Option<usize> = None;
        for i in indices {
            best = match best {
                None => Some(i),
                Some(b) => {
                    let (cur, cand) = (&records[b], &records[i]);
                    let better = (cand.is_enabled && !cur.is_enabled)
                        || (cand.is_enabled == cur.is_enabled
                            && cand.version_number() > cur.version_number());
                    if better {
                        Some(i)
                    } else {
                        Some(b)
                    }
                }
            };
        }
        best.map(|i| &records[i])
    }

    pub fn status(&self, dep_id: &str) -> DependencyStatus {
        if self.system.matches(dep_id) {
            return DependencyStatus::System;
        }
        let records = self.snapshot.records();
        let dep = DependencyRef::parse(dep_id);
        let any_enabled = |indices: &[usize]| indices.iter().any(|&i| records[i].is_enabled);

        if let Some(exact) = self.lookup.by_identity.get(&dep.lookup_id) {
            return if any_enabled(exact) {
                DependencyStatus::Valid
            } else {
                DependencyStatus::Disabled
            };
        }

        let group = dep.base.as_ref().and_then(|b| self.lookup.by_base.get(b));
        match group {
            Some(members) if dep.is_latest => {
                if any_enabled(members) {
                    DependencyStatus::Valid
                } else {
                    DependencyStatus::Disabled
                }
            }
            Some(_) => DependencyStatus::Mismatch,
            None => DependencyStatus::Missing,
        }
    }

    /// Dependency ids declared by any copy of `identity_id` (case-insensitive).
    pub fn declared_by(&self, identity_id: &str) -> Option<&BTreeSet<String>> {
        self.declared.get(&identity_id.to_lowercase())
    }

    /// Files `file_path` depends on.
    pub fn dependencies_of(&self, file_path: &str) -> Vec<&str> {
        self.index_of(file_path)
            .map(|i| self.paths(&self.forward[i]))
            .unwrap_or_default()
    }

    /// Files that depend on `file_path`.
    pub fn referenced_by(&self, file_path: &str) -> Vec<&str> {
        self.index_of(file_path)
            .map(|i| self.paths(&self.reverse[i]))
            .unwrap_or_default()
    }

    /// Files nothing else depends on, in scan order.
    pub fn orphans(&self) -> Vec<&str> {
        self.reverse
            .iter()
            .enumerate()
            .filter(|(_, consumers)| consumers.is_empty())
            .map(|(i, _)| self.snapshot[i].file_path.as_str())
            .collect()
    }

    /// Declared, non-system ids no matcher could resolve.
    pub fn unresolved(&self) -> &BTreeSet<String> {
        &self.unresolved
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    pub(crate) fn index_of(&self, file_path: &str) -> Option<usize> {
        self.path_index.get(file_path).copied()
    }

    pub(crate) fn providers(&self, i: usize) -> &BTreeSet<usize> {
        &self.forward[i]
    }

    pub(crate) fn consumers(&self, i: usize) -> &BTreeSet<usize> {
        &self.reverse[i]
    }

    pub(crate) fn path(&self, i: usize) -> &str {
        &self.snapshot[i].file_path
    }

    fn paths(&self, indices: &BTreeSet<usize>) -> Vec<&str> {
        indices.iter().map(|&i| self.path(i)).collect()
    }
}

fn resolve_with(
    dep_id: &str,
    records: &[PackageRecord],
    lookup: &SnapshotLookup,
) -> Option<(MatchKind, Vec<usize>)> {
    let dep = DependencyRef::parse(dep_id);
    MATCHERS.iter().find_map(|(kind, matcher)| {
        matcher(dep_id, &dep, records, lookup)
            .filter(|found| !found.is_empty())
            .map(|found| (*kind, found))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Identity;

    fn system() -> SystemPatterns {
        SystemPatterns::new(&["vam.core*".to_string()])
    }

    fn record(path: &str, creator: &str, name: &str, version: &str, enabled: bool) -> PackageRecord {
        PackageRecord::new(path, Identity::new(creator, name, version), 10, enabled)
    }

    #[test]
    fn test_matcher_order_prefers_exact_identity() {
        let snapshot = Snapshot::new(vec![
            record("/l/Y.Lib.1.var", "Y", "Lib", "1", true),
            record("/l/Y.Lib.2.var", "Y", "Lib", "2", true),
        ]);
        let graph = DependencyGraph::build(&snapshot, &system());

        let exact = graph.resolve("y.lib.1").unwrap();
        assert_eq!(exact.kind, MatchKind::ExactIdentity);
        assert_eq!(exact.files, vec!["/l/Y.Lib.1.var".to_string()]);

        let by_path = graph.resolve("/l/Y.Lib.2.var").unwrap();
        assert_eq!(by_path.kind, MatchKind::FilePath);

        let latest = graph.resolve("Y.Lib.latest").unwrap();
        assert_eq!(latest.kind, MatchKind::LatestAvailable);
        assert_eq!(latest.files, vec!["/l/Y.Lib.2.var".to_string()]);

        assert!(graph.resolve("VaM.Core.latest").is_none());
        assert!(graph.resolve("Z.Gone.1").is_none());
    }

    #[test]
    fn test_status_variants() {
        let snapshot = Snapshot::new(vec![
            record("/l/a", "Y", "Lib", "1", true),
            record("/l/b", "Y", "Off", "1", false),
        ]);
        let graph = DependencyGraph::build(&snapshot, &system());
        assert_eq!(graph.status("VaM.Core.latest"), DependencyStatus::System);
        assert_eq!(graph.status("Y.Lib.1"), DependencyStatus::Valid);
        assert_eq!(graph.status("Y.Off.1"), DependencyStatus::Disabled);
        assert_eq!(graph.status("Y.Off.latest"), DependencyStatus::Disabled);
        assert_eq!(graph.status("Y.Lib.latest"), DependencyStatus::Valid);
        assert_eq!(graph.status("Y.Lib.2"), DependencyStatus::Mismatch);
        assert_eq!(graph.status("Q.Nope.1"), DependencyStatus::Missing);
    }

    #[test]
    fn test_edges_include_disabled_consumers() {
        let snapshot = Snapshot::new(vec![
            record("/l/app", "A", "App", "1", false).with_dependencies(["Y.Lib.1", "Q.Gone.1"]),
            record("/l/lib", "Y", "Lib", "1", true),
        ]);
        let graph = DependencyGraph::build(&snapshot, &system());
        assert_eq!(graph.dependencies_of("/l/app"), vec!["/l/lib"]);
        assert_eq!(graph.referenced_by("/l/lib"), vec!["/l/app"]);
        assert_eq!(graph.orphans(), vec!["/l/app"]);
        assert!(graph.unresolved().contains("Q.Gone.1"));
        assert!(graph.declared_by("a.app.1").unwrap().contains("Y.Lib.1"));
    }

    #[test]
    fn test_locate_prefers_enabled_then_version() {
        let snapshot = Snapshot::new(vec![
            record("/l/v3", "Y", "Lib", "3", false),
            record("/l/v1", "Y", "Lib", "1", true),
        ]);
        let graph = DependencyGraph::build(&snapshot, &system());
        let located = graph.locate("Y.Lib.2").unwrap();
        assert_eq!(located.file_path, "/l/v3");
        let located = graph.locate("Y.Lib.1").unwrap();
        assert_eq!(located.file_path, "/l/v1");
    }
}
