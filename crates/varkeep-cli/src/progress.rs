use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use std::time::Duration;
use varkeep_core::plan::execute::{ExecutionProgress, ExecutionReport};
use varkeep_core::ProgressReporter;

const TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// CLI progress reporter using indicatif progress bars.
///
/// - Scan: bar over the package files found
/// - Execution: bar over planned items, message shows the current file
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn set_bar(&self, pb: ProgressBar) {
        let mut guard = self.bar.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(old) = guard.take() {
            old.finish_and_clear();
        }
        *guard = Some(pb);
    }

    fn finish_bar(&self) {
        let mut guard = self.bar.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(pb) = guard.take() {
            pb.finish_and_clear();
        }
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        let guard = self.bar.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(pb) = guard.as_ref() {
            f(pb);
        }
    }
}

fn bar_style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("━╸─")
        .tick_chars(TICK_CHARS)
}

impl ProgressReporter for CliReporter {
    fn on_scan_start(&self) {
        let pb = ProgressBar::new(0);
        pb.set_style(bar_style(
            "  {spinner:.cyan} Scanning [{bar:30.cyan/dim}] {pos}/{len} packages",
        ));
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn on_scan_progress(&self, current: usize, total: usize) {
        self.with_bar(|pb| {
            if pb.length() != Some(total as u64) {
                pb.set_length(total as u64);
            }
            pb.set_position(current as u64);
        });
    }

    fn on_scan_complete(&self, total_records: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Scan complete: {} packages in {:.2}s",
            total_records, duration_secs
        );
    }

    fn on_execute_start(&self, total: usize) {
        let pb = ProgressBar::new(total as u64);
        pb.set_style(bar_style(
            "  {spinner:.cyan} Applying [{bar:30.cyan/dim}] {pos}/{len} {msg}",
        ));
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn on_execute_progress(&self, progress: &ExecutionProgress) {
        self.with_bar(|pb| {
            pb.set_position(progress.processed as u64);
            pb.set_message(progress.current_file.clone());
        });
    }

    fn on_execute_complete(&self, report: &ExecutionReport) {
        self.finish_bar();
        let mark = if report.errors.is_empty() {
            "\x1b[32m✓\x1b[0m"
        } else {
            "\x1b[33m!\x1b[0m"
        };
        eprintln!(
            "  {} Applied {}/{} items, {} errors",
            mark,
            report.processed,
            report.total,
            report.errors.len()
        );
    }

    fn on_reclassified(&self, total_records: usize) {
        eprintln!(
            "  \x1b[32m✓\x1b[0m Reclassified {} packages",
            total_records
        );
    }
}
