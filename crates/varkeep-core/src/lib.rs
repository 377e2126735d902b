pub mod analysis;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod plan;
pub mod progress;
pub mod session;
pub mod snapshot;

pub use config::AppConfig;
pub use engine::LibraryEngine;
pub use error::{Error, MutationError};
pub use model::{Identity, PackageRecord, SystemPatterns};
pub use progress::{ProgressReporter, SilentReporter};
pub use session::{CancelToken, LibraryScanner, ScanGate, ScanTicket};
pub use snapshot::{LibrarySummary, Snapshot};
