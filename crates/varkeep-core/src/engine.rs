use crate::analysis::classify::{ambiguous_groups, classify_with_index};
use crate::analysis::graph::DependencyGraph;
use crate::analysis::impact::{compute_impact, ImpactSet};
use crate::analysis::index::IdentityIndex;
use crate::config::AppConfig;
use crate::error::Error;
use crate::model::{PackageRecord, SystemPatterns};
use crate::plan::execute::{ExecutionCoordinator, ExecutionOptions};
use crate::plan::mutation::MutationService;
use crate::plan::resolution::{self, GroupPlan, Plan, ScopeFilter};
use crate::progress::ProgressReporter;
use crate::session::{LibraryScanner, ScanGate, ScanTicket};
use crate::snapshot::Snapshot;
use std::time::Instant;
use tracing::{debug, info};

/// Entry point over one library's snapshots.
///
/// Holds configuration only. The host owns the current snapshot and scan
/// ticket and passes them into every call.
pub struct LibraryEngine {
    config: AppConfig,
    system: SystemPatterns,
}

impl LibraryEngine {
    pub fn new(config: AppConfig) -> Self {
        let system = config.system_patterns();
        Self { config, system }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn system_patterns(&self) -> &SystemPatterns {
        &self.system
    }

    /// Run `scanner` for `ticket` and classify the result. Returns `None` when
    /// the ticket went stale or was cancelled before the results arrived.
    pub fn scan(
        &self,
        gate: &ScanGate,
        ticket: &ScanTicket,
        scanner: &dyn LibraryScanner,
        reporter: &dyn ProgressReporter,
    ) -> Result<Option<Snapshot>, Error> {
        reporter.on_scan_start();
        let start = Instant::now();
        let records = match scanner.scan(ticket.cancel_token(), reporter) {
            Ok(records) => records,
            Err(Error::Cancelled) => {
                debug!("Scan {} cancelled", ticket.token);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        let classified = self.classify_records(&records);
        let total = classified.len();

        let snapshot = gate.accept(ticket, classified);
        if snapshot.is_some() {
            let secs = start.elapsed().as_secs_f64();
            info!("Scanned {} packages in {:.2}s", total, secs);
            reporter.on_scan_complete(total, secs);
        }
        Ok(snapshot)
    }

    pub fn index(&self, snapshot: &Snapshot) -> IdentityIndex {
        IdentityIndex::build(snapshot.records())
    }

    pub fn classify(&self, snapshot: &Snapshot) -> Snapshot {
        Snapshot::new(self.classify_records(snapshot.records()))
    }

    /// Groups whose latest version is chosen by a tie rather than a higher number.
    pub fn ambiguous_groups(&self, snapshot: &Snapshot) -> Vec<String> {
        ambiguous_groups(snapshot.records(), &self.index(snapshot))
    }

    pub fn graph(&self, snapshot: &Snapshot) -> DependencyGraph {
        DependencyGraph::build(snapshot, &self.system)
    }

    pub fn impact<S: AsRef<str>>(&self, snapshot: &Snapshot, targets: &[S]) -> ImpactSet {
        compute_impact(&self.graph(snapshot), targets)
    }

    pub fn plan_group(&self, snapshot: &Snapshot, group_key: &str) -> GroupPlan {
        resolution::plan_group(snapshot.records(), group_key, &self.config.library_root)
    }

    pub fn plan(&self, snapshot: &Snapshot, scope: &ScopeFilter) -> Plan {
        resolution::plan_all(snapshot.records(), scope, &self.config.library_root)
    }

    /// A coordinator preconfigured for this library.
    pub fn coordinator<'a>(
        &self,
        mutations: &'a mut dyn MutationService,
    ) -> ExecutionCoordinator<'a> {
        ExecutionCoordinator::new(mutations, self.system.clone()).with_options(ExecutionOptions {
            library_root: self.config.library_root.clone(),
            ..Default::default()
        })
    }

    fn classify_records(&self, records: &[PackageRecord]) -> Vec<PackageRecord> {
        let index = IdentityIndex::build(records);
        classify_with_index(records, &index, &self.system)
    }
}
