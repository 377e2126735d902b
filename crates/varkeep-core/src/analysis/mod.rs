//! Pure analysis over a package snapshot: indexing, classification, the
//! dependency graph and deletion impact.

pub mod classify;
pub mod graph;
pub mod impact;
pub mod index;
pub mod provisional;

pub use classify::{classify, classify_with_index};
pub use graph::{DependencyGraph, DependencyStatus, MatchKind, Resolution};
pub use impact::{compute_impact, ImpactSet};
pub use index::{ExactCounts, IdentityIndex};
pub use provisional::AppliedChange;
