use super::classify::classify;
use crate::model::{file_name_of, PackageRecord, SystemPatterns};
use serde::Serialize;

/// A file mutation that completed successfully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum AppliedChange {
    Toggled {
        from: String,
        to: String,
        enabled: bool,
    },
    Relocated {
        from: String,
        to: String,
    },
    Deleted {
        path: String,
    },
}

/// Apply one change to a copy of `records` without reclassifying.
pub fn patch(records: &[PackageRecord], change: &AppliedChange) -> Vec<PackageRecord> {
    let mut patched: Vec<PackageRecord> = records.to_vec();
    patch_in_place(&mut patched, change);
    patched
}

pub fn patch_in_place(records: &mut Vec<PackageRecord>, change: &AppliedChange) {
    match change {
        AppliedChange::Deleted { path } => {
            records.retain(|r| &r.file_path != path);
        }
        AppliedChange::Relocated { from, to } => {
            move_record(records, from, to, None);
        }
        AppliedChange::Toggled { from, to, enabled } => {
            move_record(records, from, to, Some(*enabled));
        }
    }
}

/// Apply every change in order and reclassify once: the provisional view of a
/// snapshot after a batch, until a fresh scan replaces it.
pub fn apply(
    records: &[PackageRecord],
    changes: &[AppliedChange],
    system: &SystemPatterns,
) -> Vec<PackageRecord> {
    let mut patched = records.to_vec();
    for change in changes {
        patch_in_place(&mut patched, change);
    }
    classify(&patched, system)
}

/// Rename `from` to `to`. When a record already lives at `to` (a merge onto an
/// existing copy), the source record is dropped and the survivor takes the
/// new state instead.
fn move_record(records: &mut Vec<PackageRecord>, from: &str, to: &str, enabled: Option<bool>) {
    if from != to && records.iter().any(|r| r.file_path == to) {
        records.retain(|r| r.file_path != from);
        if let Some(survivor) = records.iter_mut().find(|r| r.file_path == to) {
            if let Some(enabled) = enabled {
                survivor.is_enabled = enabled;
            }
        }
        return;
    }
    if let Some(record) = records.iter_mut().find(|r| r.file_path == from) {
        record.file_path = to.to_string();
        record.file_name = file_name_of(to).to_string();
        if let Some(enabled) = enabled {
            record.is_enabled = enabled;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Identity;

    fn record(path: &str, version: &str, enabled: bool) -> PackageRecord {
        PackageRecord::new(path, Identity::new("A", "P", version), 10, enabled)
    }

    #[test]
    fn test_toggle_patch_renames_and_flips() {
        let records = vec![record("/l/A.P.1.var", "1", true)];
        let change = AppliedChange::Toggled {
            from: "/l/A.P.1.var".to_string(),
            to: "/l/A.P.1.var.disabled".to_string(),
            enabled: false,
        };
        let patched = patch(&records, &change);
        assert_eq!(patched[0].file_path, "/l/A.P.1.var.disabled");
        assert_eq!(patched[0].file_name, "A.P.1.var.disabled");
        assert!(!patched[0].is_enabled);
        assert!(records[0].is_enabled);
    }

    #[test]
    fn test_merge_toggle_drops_source() {
        let records = vec![
            record("/l/A.P.1.var", "1", false),
            record("/l/sub/A.P.1.var.disabled", "1", false),
        ];
        let change = AppliedChange::Toggled {
            from: "/l/sub/A.P.1.var.disabled".to_string(),
            to: "/l/A.P.1.var".to_string(),
            enabled: true,
        };
        let patched = patch(&records, &change);
        assert_eq!(patched.len(), 1);
        assert!(patched[0].is_enabled);
    }

    #[test]
    fn test_apply_reclassifies_after_delete() {
        let records = vec![
            record("/l/A.P.1.var", "1", true),
            record("/l/sub/A.P.1.var", "1", true),
        ];
        let system = SystemPatterns::default();
        let classified = classify(&records, &system);
        assert!(classified.iter().all(|r| r.is_exact_duplicate));

        let view = apply(
            &classified,
            &[AppliedChange::Deleted {
                path: "/l/sub/A.P.1.var".to_string(),
            }],
            &system,
        );
        assert_eq!(view.len(), 1);
        assert!(!view[0].is_exact_duplicate);
    }

    #[test]
    fn test_apply_chains_changes_on_one_copy() {
        let records = vec![
            record("/l/sub/A.P.1.var", "1", true),
            record("/l/A.P.2.var.disabled", "2", false),
        ];
        let changes = vec![
            AppliedChange::Relocated {
                from: "/l/sub/A.P.1.var".to_string(),
                to: "/l/A.P.1.var".to_string(),
            },
            AppliedChange::Toggled {
                from: "/l/A.P.1.var".to_string(),
                to: "/l/A.P.1.var.disabled".to_string(),
                enabled: false,
            },
            AppliedChange::Toggled {
                from: "/l/A.P.2.var.disabled".to_string(),
                to: "/l/A.P.2.var".to_string(),
                enabled: true,
            },
        ];
        let view = apply(&records, &changes, &SystemPatterns::default());
        let paths: Vec<&str> = view.iter().map(|r| r.file_path.as_str()).collect();
        assert_eq!(paths, vec!["/l/A.P.1.var.disabled", "/l/A.P.2.var"]);
        assert!(view[0].is_obsolete);
        assert!(view[1].is_enabled);
        assert_eq!(records[0].file_path, "/l/sub/A.P.1.var");
    }
}
