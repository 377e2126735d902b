use super::index::IdentityIndex;
use crate::model::{DependencyRef, PackageRecord, SystemPatterns};
use tracing::debug;

/// Annotate a snapshot with obsolete, exact-duplicate and missing-dependency flags.
///
/// Returns new records; the input is never modified. Every annotation is
/// recomputed from scratch, so classifying an already-classified snapshot
/// yields the same result.
pub fn classify(records: &[PackageRecord], system: &SystemPatterns) -> Vec<PackageRecord> {
    let index = IdentityIndex::build(records);
    classify_with_index(records, &index, system)
}

pub fn classify_with_index(
    records: &[PackageRecord],
    index: &IdentityIndex,
    system: &SystemPatterns,
) -> Vec<PackageRecord> {
    let mut classified: Vec<PackageRecord> = records.to_vec();
    for record in classified.iter_mut() {
        record.clear_annotations();
    }

    // Obsolescence: everything but the highest version of each group.
    let mut obsolete = 0usize;
    for (_group_key, members) in index.groups() {
        if members.len() < 2 {
            continue;
        }
        for &i in members_by_version_desc(records, members).iter().skip(1) {
            classified[i].is_obsolete = true;
            obsolete += 1;
        }
    }

    // Exact duplicates: enabled copies conflict at runtime, disabled copies in storage.
    let mut duplicates = 0usize;
    for record in classified.iter_mut() {
        let counts = index.exact_counts(&record.exact_key());
        let copies = if record.is_enabled {
            counts.enabled_copies
        } else {
            counts.all_copies
        };
        if copies > 1 {
            record.is_exact_duplicate = true;
            duplicates += 1;
        }
    }

    // Missing dependencies, only for enabled records.
    let mut with_missing = 0usize;
    for record in classified.iter_mut() {
        if !record.is_enabled {
            continue;
        }
        let missing: Vec<String> = record
            .declared_dependencies
            .iter()
            .filter(|dep| is_missing(dep, index, system))
            .cloned()
            .collect();
        if !missing.is_empty() {
            with_missing += 1;
        }
        record.missing_dependencies = missing;
    }

    debug!(
        "Classified {} records: {} obsolete, {} exact duplicates, {} with missing dependencies",
        classified.len(),
        obsolete,
        duplicates,
        with_missing,
    );
    classified
}

/// True when `dep_id` is neither a system dependency nor satisfied by the snapshot.
///
/// Only the exact identity satisfies a versioned reference; a `.latest`
/// reference is satisfied by any version of its group.
pub fn is_missing(dep_id: &str, index: &IdentityIndex, system: &SystemPatterns) -> bool {
    if system.matches(dep_id) {
        return false;
    }
    let dep = DependencyRef::parse(dep_id);
    if index.has_identity(&dep.lookup_id) {
        return false;
    }
    match (&dep.base, dep.is_latest) {
        (Some(base), true) => !index.has_base(base),
        _ => true,
    }
}

/// Member indices ordered by parsed version, highest first; ties keep scan order.
pub fn members_by_version_desc(records: &[PackageRecord], members: &[usize]) -> Vec<usize> {
    let mut ordered = members.to_vec();
    ordered.sort_by(|&a, &b| records[b].version_number().cmp(&records[a].version_number()));
    ordered
}

/// Groups whose "latest" designation rests on a tie between different version
/// strings (e.g. `"beta"` and `"rc"`, or `"2"` and `"2.1"`).
pub fn ambiguous_groups(records: &[PackageRecord], index: &IdentityIndex) -> Vec<String> {
    let mut ambiguous = Vec::new();
    for (group_key, members) in index.groups() {
        if members.len() < 2 {
            continue;
        }
        let ordered = members_by_version_desc(records, members);
        let top = &records[ordered[0]];
        let tied = ordered.iter().skip(1).any(|&i| {
            records[i].version_number() == top.version_number()
                && records[i].identity.version != top.identity.version
        });
        if tied {
            ambiguous.push(group_key.to_string());
        }
    }
    ambiguous
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Identity;

    fn system() -> SystemPatterns {
        SystemPatterns::new(&["vam.core*".to_string(), "system.*".to_string()])
    }

    fn record(path: &str, version: &str, enabled: bool) -> PackageRecord {
        PackageRecord::new(path, Identity::new("A", "P", version), 10, enabled)
    }

    #[test]
    fn test_latest_reference_satisfied_by_any_version() {
        let records = vec![record("/l/a", "3", true)];
        let index = IdentityIndex::build(&records);
        assert!(!is_missing("A.P.latest", &index, &system()));
        assert!(!is_missing("a.p.3", &index, &system()));
        assert!(is_missing("A.P.4", &index, &system()));
        assert!(is_missing("B.Q.latest", &index, &system()));
        assert!(!is_missing("VaM.Core.latest", &index, &system()));
    }

    #[test]
    fn test_members_by_version_desc_is_stable() {
        let records = vec![
            record("/l/x", "beta", true),
            record("/l/y", "2", true),
            record("/l/z", "alpha", true),
        ];
        let ordered = members_by_version_desc(&records, &[0, 1, 2]);
        assert_eq!(ordered, vec![1, 0, 2]);
    }

    #[test]
    fn test_ambiguous_groups_flags_string_ties() {
        let records = vec![record("/l/x", "beta", true), record("/l/y", "rc", true)];
        let index = IdentityIndex::build(&records);
        assert_eq!(ambiguous_groups(&records, &index), vec!["A.P".to_string()]);

        let records = vec![record("/l/x", "1", true), record("/l/y", "2", true)];
        let index = IdentityIndex::build(&records);
        assert!(ambiguous_groups(&records, &index).is_empty());
    }
}
