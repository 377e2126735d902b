use crate::plan::execute::{ExecutionProgress, ExecutionReport};

/// Trait for reporting scan and execution progress.
///
/// The CLI implements it with indicatif bars. All methods have default no-op
/// implementations. Execution callbacks fire on the coordinator's thread
/// between mutation calls, which is where the host gets to render.
pub trait ProgressReporter: Send + Sync {
    fn on_scan_start(&self) {}
    fn on_scan_progress(&self, _current: usize, _total: usize) {}
    fn on_scan_complete(&self, _total_records: usize, _duration_secs: f64) {}
    fn on_execute_start(&self, _total: usize) {}
    fn on_execute_progress(&self, _progress: &ExecutionProgress) {}
    fn on_execute_complete(&self, _report: &ExecutionReport) {}
    fn on_reclassified(&self, _total_records: usize) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
