use crate::error::Error;
use crate::model::PackageRecord;
use serde::Serialize;
use std::fs;
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// An immutable package snapshot.
///
/// Cloning shares the underlying records, so any number of read-only
/// computations can hold the same snapshot while the host swaps in a new one.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    records: Arc<[PackageRecord]>,
}

impl Snapshot {
    pub fn new(records: Vec<PackageRecord>) -> Self {
        Self {
            records: records.into(),
        }
    }

    pub fn records(&self) -> &[PackageRecord] {
        &self.records
    }

    pub fn find(&self, file_path: &str) -> Option<&PackageRecord> {
        self.records.iter().find(|r| r.file_path == file_path)
    }

    pub fn to_vec(&self) -> Vec<PackageRecord> {
        self.records.to_vec()
    }

    pub fn load_json(path: &Path) -> Result<Self, Error> {
        let data = fs::read_to_string(path)?;
        let records: Vec<PackageRecord> = serde_json::from_str(&data)?;
        debug!("Loaded {} records from {}", records.len(), path.display());
        Ok(Self::new(records))
    }

    pub fn save_json(&self, path: &Path) -> Result<(), Error> {
        let data = serde_json::to_string_pretty(self.records())?;
        fs::write(path, data)?;
        debug!("Saved {} records to {}", self.records.len(), path.display());
        Ok(())
    }

    pub fn summary(&self) -> LibrarySummary {
        LibrarySummary::from_records(self.records())
    }
}

impl From<Vec<PackageRecord>> for Snapshot {
    fn from(records: Vec<PackageRecord>) -> Self {
        Self::new(records)
    }
}

impl Deref for Snapshot {
    type Target = [PackageRecord];

    fn deref(&self) -> &Self::Target {
        &self.records
    }
}

/// Counts over a classified snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LibrarySummary {
    pub total: usize,
    pub enabled: usize,
    pub disabled: usize,
    pub obsolete: usize,
    pub exact_duplicates: usize,
    pub missing_dependencies: usize,
    pub total_bytes: u64,
    /// Bytes held by copies beyond the first of each exact-duplicate cluster.
    pub reclaimable_bytes: u64,
}

impl LibrarySummary {
    pub fn from_records(records: &[PackageRecord]) -> Self {
        let mut summary = LibrarySummary::default();
        let mut clusters: ahash::AHashMap<String, (u64, u64)> = ahash::AHashMap::new();

        for record in records {
            summary.total += 1;
            summary.total_bytes += record.size_bytes;
            if record.is_enabled {
                summary.enabled += 1;
            } else {
                summary.disabled += 1;
            }
            if record.is_obsolete {
                summary.obsolete += 1;
            }
            if !record.missing_dependencies.is_empty() {
                summary.missing_dependencies += 1;
            }
            if record.is_exact_duplicate {
                summary.exact_duplicates += 1;
            }
            let cluster = clusters.entry(record.exact_key()).or_insert((0, record.size_bytes));
            cluster.0 += 1;
        }

        summary.reclaimable_bytes = clusters
            .values()
            .map(|(count, size)| count.saturating_sub(1) * size)
            .sum();

        summary
    }
}
