//! Resolution planning and side-effecting execution.

pub mod execute;
pub mod mutation;
pub mod resolution;

pub use execute::{
    ExecutionCoordinator, ExecutionOptions, ExecutionProgress, ExecutionReport,
};
pub use mutation::MutationService;
pub use resolution::{
    plan_all, plan_group, GroupPlan, MergePlanEntry, Plan, ResolutionStrategy, ResolveGroup,
    ScopeFilter,
};
