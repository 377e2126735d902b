use crate::error::Error;
use crate::model::PackageRecord;
use crate::progress::ProgressReporter;
use crate::snapshot::Snapshot;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Coarse-grained cancellation flag, observed only between file operations.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Produces a fresh package snapshot for a library.
pub trait LibraryScanner {
    fn scan(
        &self,
        cancel: &CancelToken,
        reporter: &dyn ProgressReporter,
    ) -> Result<Vec<PackageRecord>, Error>;
}

/// Handle for one scan issued by a [`ScanGate`].
#[derive(Debug, Clone)]
pub struct ScanTicket {
    pub token: u64,
    pub library_root: String,
    cancel: CancelToken,
}

impl ScanTicket {
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }
}

/// Tracks the single in-flight scan owned by a host.
///
/// Starting a scan cancels the previous one; results are only accepted for the
/// ticket that is still current, so late results from a cancelled scan or a
/// previous library are dropped.
#[derive(Debug, Default)]
pub struct ScanGate {
    next_token: AtomicU64,
    current: Mutex<Option<ScanTicket>>,
}

impl ScanGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self, library_root: &str) -> ScanTicket {
        let mut current = self.current.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(previous) = current.take() {
            debug!("Cancelling scan {} for {}", previous.token, previous.library_root);
            previous.cancel.cancel();
        }

        let token = self.next_token.fetch_add(1, Ordering::SeqCst) + 1;
        let ticket = ScanTicket {
            token,
            library_root: library_root.to_string(),
            cancel: CancelToken::new(),
        };
        *current = Some(ticket.clone());
        debug!("Started scan {} for {}", token, library_root);
        ticket
    }

    pub fn cancel_current(&self) {
        let current = self.current.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(ticket) = current.as_ref() {
            ticket.cancel.cancel();
        }
    }

    pub fn is_current(&self, ticket: &ScanTicket) -> bool {
        let current = self.current.lock().unwrap_or_else(|p| p.into_inner());
        matches!(current.as_ref(), Some(c) if c.token == ticket.token)
    }

    /// Accept a finished scan's records, or drop them if the ticket went stale.
    pub fn accept(&self, ticket: &ScanTicket, records: Vec<PackageRecord>) -> Option<Snapshot> {
        let mut current = self.current.lock().unwrap_or_else(|p| p.into_inner());
        let is_current = matches!(current.as_ref(), Some(c) if c.token == ticket.token);
        if !is_current || ticket.cancel.is_cancelled() {
            debug!(
                "Discarding {} records from stale scan {}",
                records.len(),
                ticket.token
            );
            return None;
        }
        *current = None;
        Some(Snapshot::new(records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Identity;

    fn record(path: &str) -> PackageRecord {
        PackageRecord::new(path, Identity::new("A", "B", "1"), 10, true)
    }

    #[test]
    fn test_tokens_are_monotonic() {
        let gate = ScanGate::new();
        let first = gate.begin("/lib");
        let second = gate.begin("/lib");
        assert!(second.token > first.token);
    }

    #[test]
    fn test_new_scan_cancels_previous() {
        let gate = ScanGate::new();
        let first = gate.begin("/lib-a");
        let second = gate.begin("/lib-b");
        assert!(first.cancel_token().is_cancelled());
        assert!(!second.cancel_token().is_cancelled());
        assert!(!gate.is_current(&first));
        assert!(gate.is_current(&second));
    }

    #[test]
    fn test_stale_results_are_discarded() {
        let gate = ScanGate::new();
        let first = gate.begin("/lib");
        let second = gate.begin("/lib");

        assert!(gate.accept(&first, vec![record("/lib/old.var")]).is_none());
        let snapshot = gate.accept(&second, vec![record("/lib/new.var")]).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].file_path, "/lib/new.var");
    }

    #[test]
    fn test_cancelled_scan_is_discarded() {
        let gate = ScanGate::new();
        let ticket = gate.begin("/lib");
        gate.cancel_current();
        assert!(gate.accept(&ticket, vec![record("/lib/a.var")]).is_none());
    }
}
