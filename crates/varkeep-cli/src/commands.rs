use clap::{Args, Parser, Subcommand, ValueEnum};
use varkeep_core::plan::resolution::ScopeFilter;

#[derive(Debug, Parser)]
#[command(name = "varkeep")]
#[command(about = "Reconcile duplicate, obsolete and broken packages in a library", long_about = None)]
pub struct Cli {
    /// Library root directory (overrides configuration)
    #[arg(short, long, global = true)]
    pub library: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan the library and save a classified snapshot
    Scan,
    /// Summarize the last snapshot
    Status,
    /// List packages with their classification flags
    List {
        /// Only list packages matching this scope
        #[command(flatten)]
        scope: ScopeArgs,
        /// Write CSV to this file instead of printing a table
        #[arg(long)]
        csv: Option<String>,
    },
    /// Show the dependencies of a package and who depends on it
    Deps {
        /// Package file path
        file: String,
    },
    /// Show what deleting packages would take with it
    Impact {
        files: Vec<String>,
        /// Include dependencies still used by other packages
        #[arg(long)]
        force: bool,
    },
    /// Show the merge and version resolution plan
    Plan {
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Apply the plan
    Resolve {
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long, value_enum, default_value_t = StrategyArg::KeepLatest)]
        strategy: StrategyArg,
        /// Package to keep for its group (manual strategy), repeatable
        #[arg(long = "select")]
        selections: Vec<String>,
        /// Skip merging exact duplicates
        #[arg(long)]
        no_merge: bool,
        /// Keep merge survivors where they are instead of moving them to the root
        #[arg(long)]
        in_place: bool,
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Delete packages
    Delete {
        files: Vec<String>,
        /// Also delete dependencies nothing else uses
        #[arg(long, conflicts_with = "purge")]
        cascade: bool,
        /// Also delete every transitive dependency, even shared ones
        #[arg(long)]
        purge: bool,
        #[arg(short, long)]
        yes: bool,
    },
    /// Print configuration values
    PrintConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScopeKind {
    All,
    ExactDuplicates,
    VersionConflicts,
    MissingDependencies,
    Enabled,
    Disabled,
}

#[derive(Debug, Clone, Args)]
pub struct ScopeArgs {
    #[arg(long, value_enum, default_value_t = ScopeKind::All)]
    pub scope: ScopeKind,
    /// Restrict to one group (`Creator.Package`)
    #[arg(long, conflicts_with_all = ["creator", "package"])]
    pub group: Option<String>,
    /// Restrict to one creator
    #[arg(long, conflicts_with = "package")]
    pub creator: Option<String>,
    /// Restrict to the group of one package file (path or file name)
    #[arg(long)]
    pub package: Option<String>,
}

impl ScopeArgs {
    pub fn to_filter(&self) -> ScopeFilter {
        if let Some(group) = &self.group {
            return ScopeFilter::Group(group.clone());
        }
        if let Some(creator) = &self.creator {
            return ScopeFilter::Creator(creator.clone());
        }
        if let Some(package) = &self.package {
            return ScopeFilter::Package(package.clone());
        }
        match self.scope {
            ScopeKind::All => ScopeFilter::All,
            ScopeKind::ExactDuplicates => ScopeFilter::ExactDuplicates,
            ScopeKind::VersionConflicts => ScopeFilter::VersionConflicts,
            ScopeKind::MissingDependencies => ScopeFilter::MissingDependencies,
            ScopeKind::Enabled => ScopeFilter::Enabled,
            ScopeKind::Disabled => ScopeFilter::Disabled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    KeepLatest,
    Manual,
    DeleteOlder,
    None,
}
