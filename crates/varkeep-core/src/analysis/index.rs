use crate::model::PackageRecord;
use ahash::{AHashMap, AHashSet};
use tracing::debug;

/// Copy counters for one exact-duplicate key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExactCounts {
    pub all_copies: usize,
    pub enabled_copies: usize,
}

/// Lookup structures built in one pass over a snapshot.
///
/// Groups and their members are stored as indices into the snapshot slice,
/// in scan order.
#[derive(Debug, Default)]
pub struct IdentityIndex {
    identity_set: AHashSet<String>,
    base_set: AHashSet<String>,
    groups: AHashMap<String, Vec<usize>>,
    group_order: Vec<String>,
    exact: AHashMap<String, ExactCounts>,
}

impl IdentityIndex {
    pub fn build(records: &[PackageRecord]) -> Self {
        let mut index = IdentityIndex::default();

        for (i, record) in records.iter().enumerate() {
            if record.identity.is_known() {
                index.identity_set.insert(record.identity.lookup_id());
                index.base_set.insert(record.identity.lookup_base());
            }

            let group_key = record.group_key();
            match index.groups.get_mut(&group_key) {
                Some(members) => members.push(i),
                None => {
                    index.group_order.push(group_key.clone());
                    index.groups.insert(group_key, vec![i]);
                }
            }

            let counts = index.exact.entry(record.exact_key()).or_default();
            counts.all_copies += 1;
            if record.is_enabled {
                counts.enabled_copies += 1;
            }
        }

        debug!(
            "Indexed {} records: {} identities, {} groups, {} exact keys",
            records.len(),
            index.identity_set.len(),
            index.groups.len(),
            index.exact.len(),
        );
        index
    }

    /// `lookup_id` must already be lowercased.
    pub fn has_identity(&self, lookup_id: &str) -> bool {
        self.identity_set.contains(lookup_id)
    }

    /// `lookup_base` must already be lowercased `creator.packageName`.
    pub fn has_base(&self, lookup_base: &str) -> bool {
        self.base_set.contains(lookup_base)
    }

    pub fn identity_count(&self) -> usize {
        self.identity_set.len()
    }

    pub fn group(&self, group_key: &str) -> &[usize] {
        self.groups
            .get(group_key)
            .map(|members| members.as_slice())
            .unwrap_or(&[])
    }

    /// Groups in first-seen order.
    pub fn groups(&self) -> impl Iterator<Item = (&str, &[usize])> {
        self.group_order
            .iter()
            .map(move |key| (key.as_str(), self.group(key)))
    }

    pub fn group_count(&self) -> usize {
        self.group_order.len()
    }

    pub fn exact_counts(&self, exact_key: &str) -> ExactCounts {
        self.exact.get(exact_key).copied().unwrap_or_default()
    }

    pub fn exact_key_count(&self) -> usize {
        self.exact.len()
    }
}
