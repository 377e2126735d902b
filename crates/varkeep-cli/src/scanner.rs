use dashmap::DashMap;
use glob::Pattern;
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, error};
use varkeep_core::{
    CancelToken, Error, Identity, LibraryScanner, PackageRecord, ProgressReporter, Snapshot,
};

const ENABLED_SUFFIX: &str = ".var";
const DISABLED_SUFFIX: &str = ".var.disabled";

/// Walks a library directory for `.var` and `.var.disabled` package files.
///
/// Identities come from file names (`Creator.Package.Version.var`). Declared
/// dependencies are carried over by identity from a previous snapshot.
pub struct FsScanner {
    root: PathBuf,
    ignore_patterns: Vec<Pattern>,
    known_dependencies: HashMap<String, BTreeSet<String>>,
}

impl FsScanner {
    pub fn new(root: &str, ignore_globs: &[String]) -> Self {
        let ignore_patterns = ignore_globs
            .iter()
            .filter_map(|glob| match Pattern::new(glob) {
                Ok(p) => Some(p),
                Err(e) => {
                    error!("Invalid glob pattern '{}': {}", glob, e);
                    None
                }
            })
            .collect();
        Self {
            root: PathBuf::from(root),
            ignore_patterns,
            known_dependencies: HashMap::new(),
        }
    }

    pub fn with_previous(mut self, previous: &Snapshot) -> Self {
        for record in previous.iter() {
            if record.declared_dependencies.is_empty() {
                continue;
            }
            self.known_dependencies
                .entry(record.identity.lookup_id())
                .or_default()
                .extend(record.declared_dependencies.iter().cloned());
        }
        self
    }

    fn is_ignored(&self, path: &Path) -> bool {
        self.ignore_patterns
            .iter()
            .any(|pattern| pattern.matches_path(path))
    }

    fn collect_files(&self, dir: &Path, found: &DashMap<PathBuf, u64>) -> io::Result<()> {
        if !dir.is_dir() || self.is_ignored(dir) {
            return Ok(());
        }

        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::PermissionDenied => {
                error!("Access denied reading directory {}: {}", dir.display(), err);
                return Ok(());
            }
            Err(err) => {
                return Err(io::Error::new(
                    err.kind(),
                    format!("Error reading directory {}: {}", dir.display(), err),
                ));
            }
        };

        entries.par_bridge().try_for_each(|entry_result| {
            let entry = entry_result?;
            let path = entry.path();
            let metadata = fs::symlink_metadata(&path)?;

            if metadata.is_dir() {
                self.collect_files(&path, found)?;
            } else if metadata.is_file() && package_state(&path).is_some() && !self.is_ignored(&path)
            {
                found.insert(path, metadata.len());
            }
            Ok(())
        })
    }

    fn build_record(&self, path: &Path, size_bytes: u64) -> Option<PackageRecord> {
        let file_name = path.file_name()?.to_str()?;
        let is_enabled = package_state(path)?;
        let identity = identity_from_file_name(file_name);
        let mut record =
            PackageRecord::new(&path.to_string_lossy(), identity, size_bytes, is_enabled);
        if let Some(deps) = self.known_dependencies.get(&record.identity.lookup_id()) {
            record.declared_dependencies = deps.clone();
        }
        Some(record)
    }
}

impl LibraryScanner for FsScanner {
    fn scan(
        &self,
        cancel: &CancelToken,
        reporter: &dyn ProgressReporter,
    ) -> Result<Vec<PackageRecord>, Error> {
        let found: DashMap<PathBuf, u64> = DashMap::new();
        self.collect_files(&self.root, &found)?;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let total = found.len();
        let current = AtomicUsize::new(0);
        let mut records: Vec<PackageRecord> = found
            .into_iter()
            .collect::<Vec<_>>()
            .into_par_iter()
            .filter_map(|(path, size)| {
                if cancel.is_cancelled() {
                    return None;
                }
                let record = self.build_record(&path, size);
                let done = current.fetch_add(1, Ordering::Relaxed) + 1;
                reporter.on_scan_progress(done, total);
                record
            })
            .collect();
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        records.sort_by(|a, b| a.file_path.cmp(&b.file_path));
        debug!("Found {} packages under {}", records.len(), self.root.display());
        Ok(records)
    }
}

/// `Some(true)` for `.var`, `Some(false)` for `.var.disabled`, `None` otherwise.
pub fn package_state(path: &Path) -> Option<bool> {
    let name = path.file_name()?.to_str()?.to_ascii_lowercase();
    if name.ends_with(DISABLED_SUFFIX) {
        Some(false)
    } else if name.ends_with(ENABLED_SUFFIX) {
        Some(true)
    } else {
        None
    }
}

/// `Creator.Package.Version.var[.disabled]` to an identity. Names with fewer
/// than two segments yield an unknown identity.
pub fn identity_from_file_name(file_name: &str) -> Identity {
    let lower = file_name.to_ascii_lowercase();
    let stem_len = if lower.ends_with(DISABLED_SUFFIX) {
        file_name.len() - DISABLED_SUFFIX.len()
    } else if lower.ends_with(ENABLED_SUFFIX) {
        file_name.len() - ENABLED_SUFFIX.len()
    } else {
        file_name.len()
    };
    Identity::parse(&file_name[..stem_len]).unwrap_or_default()
}
