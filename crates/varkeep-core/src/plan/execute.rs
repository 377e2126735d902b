use super::mutation::MutationService;
use super::resolution::{Plan, ResolutionStrategy, ResolveGroup};
use crate::analysis::classify::classify;
use crate::analysis::provisional::{self, AppliedChange};
use crate::error::MutationError;
use crate::model::{file_name_of, PackageRecord, SystemPatterns};
use crate::progress::{ProgressReporter, SilentReporter};
use crate::session::{CancelToken, LibraryScanner};
use crate::snapshot::Snapshot;
use ahash::{AHashMap, AHashSet};
use chrono::Utc;
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    /// Run the merge phase before version resolution.
    pub apply_merges: bool,
    /// Leave non-root keepers where they are instead of moving them to the root.
    pub in_place: bool,
    pub library_root: String,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            apply_merges: true,
            in_place: false,
            library_root: String::new(),
        }
    }
}

/// Snapshot of batch progress, delivered after every mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionProgress {
    pub processed: usize,
    pub total: usize,
    pub current_file: String,
    pub space_saved_bytes: u64,
}

/// Outcome of a batch. Always produced, even when files failed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionReport {
    pub processed: usize,
    pub total: usize,
    pub space_saved_bytes: u64,
    pub errors: Vec<String>,
    pub completed: bool,
    pub cancelled: bool,
    /// True when the rescan failed and `snapshot` is the patched pre-batch view.
    pub provisional: bool,
    pub started_at: String,
    pub finished_at: String,
    pub changes: Vec<AppliedChange>,
    /// Reclassified snapshot after the batch.
    #[serde(skip)]
    pub snapshot: Snapshot,
}

/// Bookkeeping for one batch.
#[derive(Default)]
struct BatchState {
    processed: usize,
    total: usize,
    space_saved_bytes: u64,
    errors: Vec<String>,
    changes: Vec<AppliedChange>,
    deleted: AHashSet<String>,
    renamed: AHashMap<String, String>,
    cancelled: bool,
}

impl BatchState {
    fn current_path<'p>(&'p self, path: &'p str) -> &'p str {
        self.renamed.get(path).map(String::as_str).unwrap_or(path)
    }

    fn record_change(&mut self, change: AppliedChange) {
        match &change {
            AppliedChange::Deleted { path } => {
                self.deleted.insert(path.clone());
            }
            AppliedChange::Relocated { from, to } | AppliedChange::Toggled { from, to, .. } => {
                self.renamed.insert(from.clone(), to.clone());
            }
        }
        self.changes.push(change);
    }

    fn progress(&self, current_file: &str) -> ExecutionProgress {
        ExecutionProgress {
            processed: self.processed,
            total: self.total,
            current_file: current_file.to_string(),
            space_saved_bytes: self.space_saved_bytes,
        }
    }
}

/// Applies plans through a [`MutationService`], one file at a time.
///
/// A failed file is recorded in the report and the batch moves on. The
/// cancel token is checked before each mutation; an in-flight call always
/// completes. Every batch ends with a rescan and reclassification.
pub struct ExecutionCoordinator<'a> {
    mutations: &'a mut dyn MutationService,
    reporter: &'a dyn ProgressReporter,
    cancel: CancelToken,
    system: SystemPatterns,
    options: ExecutionOptions,
}

impl<'a> ExecutionCoordinator<'a> {
    pub fn new(mutations: &'a mut dyn MutationService, system: SystemPatterns) -> Self {
        Self {
            mutations,
            reporter: &SilentReporter,
            cancel: CancelToken::new(),
            system,
            options: ExecutionOptions::default(),
        }
    }

    pub fn with_reporter(mut self, reporter: &'a dyn ProgressReporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_options(mut self, options: ExecutionOptions) -> Self {
        self.options = options;
        self
    }

    /// Run merges first, then resolve groups against what the merges left.
    pub fn execute(
        &mut self,
        base: &Snapshot,
        plan: &Plan,
        strategy: &ResolutionStrategy,
        scanner: &dyn LibraryScanner,
    ) -> ExecutionReport {
        let started_at = Utc::now().to_rfc3339();
        let mut state = BatchState::default();
        if self.options.apply_merges {
            state.total += plan.merge_deletion_count();
        }
        if !strategy.is_none() {
            state.total += plan.resolve_groups.len();
        }

        info!(
            "Executing plan: {} merges, {} resolve groups, strategy {:?}",
            plan.merges.len(),
            plan.resolve_groups.len(),
            strategy
        );
        self.reporter.on_execute_start(state.total);

        if self.options.apply_merges {
            self.run_merges(plan, &mut state);
        }
        if !strategy.is_none() && !state.cancelled {
            for group in &plan.resolve_groups {
                if self.check_cancelled(&mut state) {
                    break;
                }
                self.resolve_group(group, strategy, &mut state);
                if state.cancelled {
                    break;
                }
                state.processed += 1;
                self.reporter.on_execute_progress(&state.progress(&group.id));
            }
        }

        self.finish(base, state, started_at, scanner)
    }

    /// Delete an explicit list of files (targets plus any cascade the caller chose).
    pub fn execute_deletions<S: AsRef<str>>(
        &mut self,
        base: &Snapshot,
        paths: &[S],
        scanner: &dyn LibraryScanner,
    ) -> ExecutionReport {
        let started_at = Utc::now().to_rfc3339();
        let mut state = BatchState {
            total: paths.len(),
            ..Default::default()
        };
        info!("Deleting {} files", paths.len());
        self.reporter.on_execute_start(state.total);

        let sizes: AHashMap<&str, u64> = base
            .iter()
            .map(|r| (r.file_path.as_str(), r.size_bytes))
            .collect();
        for path in paths {
            if self.check_cancelled(&mut state) {
                break;
            }
            let path = path.as_ref();
            let size = sizes.get(path).copied().unwrap_or(0);
            self.delete_file(path, size, &mut state);
            state.processed += 1;
            self.reporter
                .on_execute_progress(&state.progress(file_name_of(path)));
        }

        self.finish(base, state, started_at, scanner)
    }

    fn run_merges(&mut self, plan: &Plan, state: &mut BatchState) {
        for entry in &plan.merges {
            if self.check_cancelled(state) {
                return;
            }
            let keep = &entry.keep;
            if !self.options.in_place
                && !self.options.library_root.is_empty()
                && !keep.is_in_root(&self.options.library_root)
            {
                // Relocate before deleting, so a failure never loses the only copy.
                match self.mutations.relocate_to_root(&keep.file_path) {
                    Ok(new_path) => {
                        debug!("Relocated {} -> {}", keep.file_path, new_path);
                        state.record_change(AppliedChange::Relocated {
                            from: keep.file_path.clone(),
                            to: new_path,
                        });
                    }
                    Err(e) => {
                        warn!("Failed to relocate keeper {}: {}", keep.file_path, e);
                        state
                            .errors
                            .push(format!("Failed to relocate {}: {}", keep.file_name, e));
                    }
                }
                self.reporter
                    .on_execute_progress(&state.progress(&keep.file_name));
            }

            for duplicate in &entry.delete {
                if self.check_cancelled(state) {
                    return;
                }
                self.delete_file(&duplicate.file_path, duplicate.size_bytes, state);
                state.processed += 1;
                self.reporter
                    .on_execute_progress(&state.progress(&duplicate.file_name));
            }
        }
    }

    fn resolve_group(
        &mut self,
        group: &ResolveGroup,
        strategy: &ResolutionStrategy,
        state: &mut BatchState,
    ) {
        let remaining: Vec<PackageRecord> = group
            .candidates
            .iter()
            .filter(|c| !state.deleted.contains(&c.file_path))
            .map(|c| {
                let mut current = c.clone();
                let path = state.current_path(&c.file_path).to_string();
                current.file_name = file_name_of(&path).to_string();
                current.file_path = path;
                current
            })
            .collect();
        if remaining.len() < 2 {
            debug!("Group {} no longer has competing versions", group.id);
            return;
        }

        let target = match select_target(&group.id, &remaining, strategy, state) {
            Some(target) => target,
            None => {
                info!("No target selected for group {}, skipping", group.id);
                return;
            }
        };

        if !remaining[target].is_enabled {
            self.toggle_file(&remaining[target].file_path, true, state);
            self.reporter
                .on_execute_progress(&state.progress(&remaining[target].file_name));
        }

        for (i, other) in remaining.iter().enumerate() {
            if i == target {
                continue;
            }
            if self.check_cancelled(state) {
                return;
            }
            if strategy.deletes() {
                self.delete_file(&other.file_path, other.size_bytes, state);
            } else if other.is_enabled {
                self.toggle_file(&other.file_path, false, state);
            } else {
                continue;
            }
            self.reporter
                .on_execute_progress(&state.progress(&other.file_name));
        }
    }

    fn delete_file(&mut self, path: &str, size_bytes: u64, state: &mut BatchState) {
        match self.mutations.delete(path) {
            Ok(()) => {
                debug!("Deleted {}", path);
                state.space_saved_bytes += size_bytes;
                state.record_change(AppliedChange::Deleted {
                    path: path.to_string(),
                });
            }
            Err(e) => {
                error!("Failed to delete {}: {}", path, e);
                state
                    .errors
                    .push(format!("Failed to delete {}: {}", file_name_of(path), e));
            }
        }
    }

    /// Toggle, retrying once with merge semantics on a collision.
    fn toggle_file(&mut self, path: &str, enable: bool, state: &mut BatchState) {
        let result = match self.mutations.toggle(path, enable, false) {
            Err(MutationError::Collision { path: existing }) => {
                debug!("Toggle of {} collided with {}, merging", path, existing);
                self.mutations.toggle(path, enable, true)
            }
            other => other,
        };
        match result {
            Ok(new_path) => {
                debug!("Toggled {} -> {} (enabled: {})", path, new_path, enable);
                state.record_change(AppliedChange::Toggled {
                    from: path.to_string(),
                    to: new_path,
                    enabled: enable,
                });
            }
            Err(e) => {
                let action = if enable { "enable" } else { "disable" };
                error!("Failed to {} {}: {}", action, path, e);
                state
                    .errors
                    .push(format!("Failed to {} {}: {}", action, file_name_of(path), e));
            }
        }
    }

    fn check_cancelled(&self, state: &mut BatchState) -> bool {
        if !state.cancelled && self.cancel.is_cancelled() {
            info!(
                "Execution cancelled after {} of {} items",
                state.processed, state.total
            );
            state.cancelled = true;
        }
        state.cancelled
    }

    fn finish(
        &self,
        base: &Snapshot,
        state: BatchState,
        started_at: String,
        scanner: &dyn LibraryScanner,
    ) -> ExecutionReport {
        // A fresh token: cancelling the batch must not cancel the rescan.
        self.reporter.on_scan_start();
        let scan_start = Instant::now();
        let (snapshot, provisional) = match scanner.scan(&CancelToken::new(), self.reporter) {
            Ok(records) => {
                self.reporter
                    .on_scan_complete(records.len(), scan_start.elapsed().as_secs_f64());
                (Snapshot::new(classify(&records, &self.system)), false)
            }
            Err(e) => {
                warn!("Rescan after execution failed, keeping provisional view: {}", e);
                let patched = provisional::apply(base.records(), &state.changes, &self.system);
                (Snapshot::new(patched), true)
            }
        };
        self.reporter.on_reclassified(snapshot.len());

        let report = ExecutionReport {
            processed: state.processed,
            total: state.total,
            space_saved_bytes: state.space_saved_bytes,
            errors: state.errors,
            completed: true,
            cancelled: state.cancelled,
            provisional,
            started_at,
            finished_at: Utc::now().to_rfc3339(),
            changes: state.changes,
            snapshot,
        };

        info!(
            "Execution finished: {}/{} processed, {} bytes reclaimed, {} errors",
            report.processed,
            report.total,
            report.space_saved_bytes,
            report.errors.len()
        );
        self.reporter.on_execute_complete(&report);
        report
    }
}

/// Index into `remaining` of the version to keep.
fn select_target(
    group_id: &str,
    remaining: &[PackageRecord],
    strategy: &ResolutionStrategy,
    state: &BatchState,
) -> Option<usize> {
    match strategy {
        ResolutionStrategy::KeepLatest | ResolutionStrategy::DeleteOlder => Some(0),
        ResolutionStrategy::Manual(selections) => {
            let selected = selections.get(group_id)?;
            let current = state.current_path(selected);
            remaining.iter().position(|r| r.file_path == current)
        }
        ResolutionStrategy::None => None,
    }
}
