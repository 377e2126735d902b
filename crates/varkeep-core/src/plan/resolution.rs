use crate::analysis::classify::members_by_version_desc;
use crate::analysis::index::IdentityIndex;
use crate::model::{PackageRecord, UNKNOWN_GROUP};
use ahash::{AHashMap, AHashSet};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// One exact-duplicate cluster: the copy to keep and the copies to delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergePlanEntry {
    pub keep: PackageRecord,
    pub delete: Vec<PackageRecord>,
}

impl MergePlanEntry {
    pub fn reclaimable_bytes(&self) -> u64 {
        self.delete.iter().map(|r| r.size_bytes).sum()
    }
}

/// Distinct versions of one group, highest version first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolveGroup {
    pub id: String,
    pub candidates: Vec<PackageRecord>,
}

/// What planning one group produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupPlan {
    pub group_key: String,
    pub merges: Vec<MergePlanEntry>,
    pub resolve: Option<ResolveGroup>,
}

impl GroupPlan {
    /// "Nothing to do" is a valid outcome, not a failure.
    pub fn is_empty(&self) -> bool {
        self.merges.is_empty() && self.resolve.is_none()
    }
}

/// A bulk plan over several groups.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub merges: Vec<MergePlanEntry>,
    pub resolve_groups: Vec<ResolveGroup>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.merges.is_empty() && self.resolve_groups.is_empty()
    }

    pub fn merge_deletion_count(&self) -> usize {
        self.merges.iter().map(|m| m.delete.len()).sum()
    }

    pub fn reclaimable_bytes(&self) -> u64 {
        self.merges.iter().map(MergePlanEntry::reclaimable_bytes).sum()
    }

    fn extend(&mut self, group: GroupPlan) {
        self.merges.extend(group.merges);
        self.resolve_groups.extend(group.resolve);
    }
}

/// How the coordinator acts on resolve groups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ResolutionStrategy {
    /// Keep the highest version enabled, disable the rest.
    #[default]
    KeepLatest,
    /// Caller-selected file path per group key; everything else is disabled.
    Manual(BTreeMap<String, String>),
    /// Keep the highest version, delete the rest.
    DeleteOlder,
    /// Plan only.
    None,
}

impl ResolutionStrategy {
    pub fn is_none(&self) -> bool {
        matches!(self, ResolutionStrategy::None)
    }

    pub fn deletes(&self) -> bool {
        matches!(self, ResolutionStrategy::DeleteOlder)
    }
}

/// Which records select groups for bulk planning. Records are expected to be
/// classified for the flag-based filters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ScopeFilter {
    #[default]
    All,
    Package(String),
    Group(String),
    Creator(String),
    ExactDuplicates,
    VersionConflicts,
    MissingDependencies,
    Enabled,
    Disabled,
}

impl ScopeFilter {
    pub fn matches(&self, record: &PackageRecord) -> bool {
        match self {
            ScopeFilter::All => true,
            ScopeFilter::Package(path) => &record.file_path == path,
            ScopeFilter::Group(key) => record.group_key().eq_ignore_ascii_case(key),
            ScopeFilter::Creator(name) => record.identity.creator.eq_ignore_ascii_case(name),
            ScopeFilter::ExactDuplicates => record.is_exact_duplicate,
            ScopeFilter::VersionConflicts => record.is_obsolete,
            ScopeFilter::MissingDependencies => !record.missing_dependencies.is_empty(),
            ScopeFilter::Enabled => record.is_enabled,
            ScopeFilter::Disabled => !record.is_enabled,
        }
    }
}

/// Plan one group against the full snapshot.
pub fn plan_group(records: &[PackageRecord], group_key: &str, library_root: &str) -> GroupPlan {
    let index = IdentityIndex::build(records);
    plan_members(records, group_key, index.group(group_key), library_root)
}

/// Plan every group touched by a record matching `scope`. Each group is
/// planned once, in first-seen order.
pub fn plan_all(records: &[PackageRecord], scope: &ScopeFilter, library_root: &str) -> Plan {
    let index = IdentityIndex::build(records);
    let targeted: AHashSet<String> = records
        .iter()
        .filter(|r| scope.matches(r))
        .map(PackageRecord::group_key)
        .collect();

    let mut plan = Plan::default();
    for (group_key, members) in index.groups() {
        if !targeted.contains(group_key) {
            continue;
        }
        plan.extend(plan_members(records, group_key, members, library_root));
    }
    debug!(
        "Planned {} groups: {} merges, {} resolve groups",
        targeted.len(),
        plan.merges.len(),
        plan.resolve_groups.len()
    );
    plan
}

fn plan_members(
    records: &[PackageRecord],
    group_key: &str,
    members: &[usize],
    library_root: &str,
) -> GroupPlan {
    // Exact clusters in first-seen order.
    let mut cluster_of: AHashMap<String, usize> = AHashMap::new();
    let mut clusters: Vec<Vec<usize>> = Vec::new();
    for &i in members {
        let key = records[i].exact_key();
        match cluster_of.get(&key) {
            Some(&c) => clusters[c].push(i),
            None => {
                cluster_of.insert(key, clusters.len());
                clusters.push(vec![i]);
            }
        }
    }

    let mut merges = Vec::new();
    let mut keepers = Vec::with_capacity(clusters.len());
    for cluster in &clusters {
        let keep = pick_keeper(records, cluster, library_root);
        keepers.push(keep);
        if cluster.len() > 1 {
            merges.push(MergePlanEntry {
                keep: records[keep].clone(),
                delete: cluster
                    .iter()
                    .filter(|&&i| i != keep)
                    .map(|&i| records[i].clone())
                    .collect(),
            });
        }
    }

    let resolve = if keepers.len() > 1 && group_key != UNKNOWN_GROUP {
        Some(ResolveGroup {
            id: group_key.to_string(),
            candidates: members_by_version_desc(records, &keepers)
                .into_iter()
                .map(|i| records[i].clone())
                .collect(),
        })
    } else {
        None
    };

    GroupPlan {
        group_key: group_key.to_string(),
        merges,
        resolve,
    }
}

/// Root over subfolder, then enabled over disabled, then first seen.
fn pick_keeper(records: &[PackageRecord], cluster: &[usize], library_root: &str) -> usize {
    let mut ranked = cluster.to_vec();
    ranked.sort_by_key(|&i| {
        let record = &records[i];
        (!record.is_in_root(library_root), !record.is_enabled)
    });
    ranked[0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Identity, SystemPatterns};

    const ROOT: &str = "/lib";

    fn record(path: &str, version: &str, size: u64, enabled: bool) -> PackageRecord {
        PackageRecord::new(path, Identity::new("CreatorX", "Pack", version), size, enabled)
    }

    #[test]
    fn test_keeper_prefers_root_then_enabled() {
        let records = vec![
            record("/lib/sub/CreatorX.Pack.1.var", "1", 100, true),
            record("/lib/CreatorX.Pack.1.var.disabled", "1", 100, false),
            record("/lib/other/CreatorX.Pack.1.var", "1", 100, true),
        ];
        let plan = plan_group(&records, "CreatorX.Pack", ROOT);
        assert_eq!(plan.merges.len(), 1);
        assert_eq!(plan.merges[0].keep.file_path, "/lib/CreatorX.Pack.1.var.disabled");
        assert_eq!(plan.merges[0].delete.len(), 2);
        assert!(plan.resolve.is_none());
    }

    #[test]
    fn test_keeper_falls_back_to_enabled_then_first_seen() {
        let records = vec![
            record("/lib/a/CreatorX.Pack.1.var.disabled", "1", 100, false),
            record("/lib/b/CreatorX.Pack.1.var", "1", 100, true),
            record("/lib/c/CreatorX.Pack.1.var", "1", 100, true),
        ];
        let plan = plan_group(&records, "CreatorX.Pack", ROOT);
        assert_eq!(plan.merges[0].keep.file_path, "/lib/b/CreatorX.Pack.1.var");
    }

    #[test]
    fn test_resolve_group_sorted_by_version() {
        let records = vec![
            record("/lib/CreatorX.Pack.2.var", "2", 10, true),
            record("/lib/CreatorX.Pack.10.var", "10", 10, false),
            record("/lib/CreatorX.Pack.1.var", "1", 10, true),
        ];
        let plan = plan_group(&records, "CreatorX.Pack", ROOT);
        let resolve = plan.resolve.expect("resolve group");
        let versions: Vec<&str> = resolve
            .candidates
            .iter()
            .map(|r| r.identity.version.as_str())
            .collect();
        assert_eq!(versions, vec!["10", "2", "1"]);
    }

    #[test]
    fn test_single_record_group_is_nothing_to_do() {
        let records = vec![record("/lib/CreatorX.Pack.1.var", "1", 10, true)];
        assert!(plan_group(&records, "CreatorX.Pack", ROOT).is_empty());
        assert!(plan_group(&records, "Missing.Group", ROOT).is_empty());
    }

    #[test]
    fn test_unknown_group_never_plans_changes() {
        let records = vec![
            PackageRecord::new("/lib/foo.var", Identity::default(), 3, true),
            PackageRecord::new("/lib/sub/bar.var", Identity::default(), 3, true),
            PackageRecord::new("/lib/b.var", Identity::new("", "", "2"), 7, true),
        ];
        let plan = plan_group(&records, UNKNOWN_GROUP, ROOT);
        assert!(plan.merges.is_empty());
        assert!(plan.resolve.is_none());

        let classified = crate::analysis::classify(&records, &SystemPatterns::default());
        assert!(classified.iter().all(|r| !r.is_exact_duplicate));
        assert!(plan_all(&classified, &ScopeFilter::All, ROOT).is_empty());
    }

    #[test]
    fn test_plan_all_scope_filters_groups() {
        let records = vec![
            record("/lib/CreatorX.Pack.1.var", "1", 10, true),
            record("/lib/CreatorX.Pack.2.var", "2", 10, true),
            PackageRecord::new("/lib/Other.Thing.1.var", Identity::new("Other", "Thing", "1"), 3, true),
            PackageRecord::new("/lib/s/Other.Thing.1.var", Identity::new("Other", "Thing", "1"), 3, true),
        ];
        let plan = plan_all(&records, &ScopeFilter::Creator("creatorx".to_string()), ROOT);
        assert!(plan.merges.is_empty());
        assert_eq!(plan.resolve_groups.len(), 1);

        let plan = plan_all(&records, &ScopeFilter::All, ROOT);
        assert_eq!(plan.merges.len(), 1);
        assert_eq!(plan.merge_deletion_count(), 1);
        assert_eq!(plan.reclaimable_bytes(), 3);
        assert_eq!(plan.resolve_groups.len(), 1);
    }

    #[test]
    fn test_planning_is_repeatable() {
        let records = vec![
            record("/lib/s/CreatorX.Pack.1.var", "1", 10, true),
            record("/lib/CreatorX.Pack.1.var", "1", 10, false),
            record("/lib/CreatorX.Pack.3.var", "3", 10, true),
        ];
        let first = plan_all(&records, &ScopeFilter::All, ROOT);
        let second = plan_all(&records, &ScopeFilter::All, ROOT);
        assert_eq!(first, second);
    }
}
