mod commands;
mod fs_mutation;
mod logging;
mod output;
mod progress;
mod scanner;

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::Path;
use std::process;

use anyhow::{anyhow, bail, Context};
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands, ScopeArgs, StrategyArg};
use dotenv::dotenv;
use fs_mutation::FsMutationService;
use progress::CliReporter;
use scanner::FsScanner;
use tracing::{error, info, warn};
use varkeep_core::plan::execute::ExecutionOptions;
use varkeep_core::plan::resolution::{ResolutionStrategy, ScopeFilter};
use varkeep_core::{AppConfig, LibraryEngine, PackageRecord, ScanGate, Snapshot};

fn main() {
    dotenv().ok();

    let _guard = logging::init_logger();

    let mut config = match varkeep_core::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let args = Cli::parse();
    if let Some(library) = args.library {
        config.library_root = library;
    }
    let engine = LibraryEngine::new(config);

    let result = match args.command {
        Some(Commands::Scan) => run_scan(&engine),
        Some(Commands::Status) => run_status(&engine),
        Some(Commands::List { scope, csv }) => run_list(&engine, &scope, csv.as_deref()),
        Some(Commands::Deps { file }) => run_deps(&engine, &file),
        Some(Commands::Impact { files, force }) => run_impact(&engine, &files, force),
        Some(Commands::Plan { scope }) => run_plan(&engine, &scope),
        Some(Commands::Resolve {
            scope,
            strategy,
            selections,
            no_merge,
            in_place,
            yes,
        }) => run_resolve(
            &engine,
            &scope,
            strategy,
            &selections,
            ExecutionOptions {
                apply_merges: !no_merge,
                in_place,
                library_root: engine.config().library_root.clone(),
            },
            yes,
        ),
        Some(Commands::Delete {
            files,
            cascade,
            purge,
            yes,
        }) => run_delete(&engine, &files, cascade, purge, yes),
        Some(Commands::PrintConfig) => engine
            .config()
            .to_toml()
            .map(|rendered| println!("{}", rendered))
            .map_err(Into::into),
        None => {
            let _ = Cli::command().print_long_help();
            Ok(())
        }
    };

    if let Err(err) = result {
        error!("Error: {:#}", err);
        process::exit(1);
    }
}

fn library_root(config: &AppConfig) -> anyhow::Result<&str> {
    if config.library_root.trim().is_empty() {
        bail!("No library root configured; pass --library or set VARKEEP_LIBRARY_ROOT");
    }
    Ok(&config.library_root)
}

fn load_snapshot(config: &AppConfig) -> anyhow::Result<Snapshot> {
    let path = Path::new(&config.snapshot_path);
    Snapshot::load_json(path).with_context(|| {
        format!(
            "No snapshot at {}; run `varkeep scan` first",
            path.display()
        )
    })
}

fn save_snapshot(config: &AppConfig, snapshot: &Snapshot) -> anyhow::Result<()> {
    let path = Path::new(&config.snapshot_path);
    snapshot
        .save_json(path)
        .with_context(|| format!("Failed to save snapshot to {}", path.display()))
}

/// Find a record by full path or, failing that, by file name.
fn find_record<'s>(snapshot: &'s Snapshot, file: &str) -> anyhow::Result<&'s PackageRecord> {
    snapshot
        .find(file)
        .or_else(|| {
            snapshot
                .iter()
                .find(|r| r.file_name.eq_ignore_ascii_case(file))
        })
        .ok_or_else(|| anyhow!("Package '{}' is not in the snapshot", file))
}

/// Scope filter with `--package` resolved to the record's full path.
fn scope_filter(snapshot: &Snapshot, scope: &ScopeArgs) -> anyhow::Result<ScopeFilter> {
    match scope.to_filter() {
        ScopeFilter::Package(file) => {
            let record = find_record(snapshot, &file)?;
            Ok(ScopeFilter::Package(record.file_path.clone()))
        }
        other => Ok(other),
    }
}

fn scanner_for(config: &AppConfig, previous: &Snapshot) -> anyhow::Result<FsScanner> {
    let root = library_root(config)?;
    Ok(FsScanner::new(root, &config.ignore_patterns).with_previous(previous))
}

fn run_scan(engine: &LibraryEngine) -> anyhow::Result<()> {
    let config = engine.config();
    let root = library_root(config)?;
    let previous = load_snapshot(config).unwrap_or_default();
    let scanner = scanner_for(config, &previous)?;

    let gate = ScanGate::new();
    let ticket = gate.begin(root);
    let reporter = CliReporter::new();
    match engine.scan(&gate, &ticket, &scanner, &reporter)? {
        Some(snapshot) => {
            save_snapshot(config, &snapshot)?;
            println!();
            output::print_summary(&snapshot.summary());
        }
        None => warn!("Scan of {} was superseded, results discarded", root),
    }
    Ok(())
}

fn run_status(engine: &LibraryEngine) -> anyhow::Result<()> {
    let snapshot = load_snapshot(engine.config())?;
    output::print_summary(&snapshot.summary());

    let graph = engine.graph(&snapshot);
    if !graph.unresolved().is_empty() {
        println!(
            "  {} dependency ids cannot be located",
            graph.unresolved().len().to_string().red()
        );
    }
    for group in engine.ambiguous_groups(&snapshot) {
        println!(
            "  {} latest version of {} is decided by scan order",
            "note:".dimmed(),
            group
        );
    }
    Ok(())
}

fn run_list(engine: &LibraryEngine, scope: &ScopeArgs, csv: Option<&str>) -> anyhow::Result<()> {
    let snapshot = load_snapshot(engine.config())?;
    let filter = scope_filter(&snapshot, scope)?;
    let selected: Vec<&PackageRecord> = snapshot.iter().filter(|r| filter.matches(r)).collect();

    match csv {
        Some(path) => {
            output::write_csv(Path::new(path), &selected)?;
            info!("Wrote {} rows to {}", selected.len(), path);
        }
        None => {
            for record in &selected {
                output::print_record(record);
            }
            println!("{} packages", selected.len());
        }
    }
    Ok(())
}

fn run_deps(engine: &LibraryEngine, file: &str) -> anyhow::Result<()> {
    let snapshot = load_snapshot(engine.config())?;
    let record = find_record(&snapshot, file)?;
    let graph = engine.graph(&snapshot);

    println!("{}", record.identity.id().bold());
    if record.declared_dependencies.is_empty() {
        println!("  no declared dependencies");
    }
    for dep in &record.declared_dependencies {
        let located = graph
            .locate(dep)
            .map(|r| format!(" -> {}", r.file_path))
            .unwrap_or_default();
        println!("  {} [{}]{}", dep, output::status_label(graph.status(dep)), located);
    }

    let dependents = graph.referenced_by(&record.file_path);
    println!("Referenced by {} packages", dependents.len());
    for path in dependents {
        println!("  {}", path);
    }
    Ok(())
}

fn resolve_targets(snapshot: &Snapshot, files: &[String]) -> anyhow::Result<Vec<String>> {
    if files.is_empty() {
        bail!("No packages given");
    }
    files
        .iter()
        .map(|f| find_record(snapshot, f).map(|r| r.file_path.clone()))
        .collect()
}

fn run_impact(engine: &LibraryEngine, files: &[String], force: bool) -> anyhow::Result<()> {
    let snapshot = load_snapshot(engine.config())?;
    let targets = resolve_targets(&snapshot, files)?;
    let impact = engine.impact(&snapshot, &targets);

    println!("{}", "Targets".bold());
    for target in &targets {
        println!("  {}", target);
    }
    println!("{} ({})", "Safe cascade".bold(), impact.safe_cascade.len());
    for path in &impact.safe_cascade {
        println!("  {}", path.green());
    }
    let shared: Vec<&String> = impact
        .forced_cascade
        .iter()
        .filter(|p| !impact.safe_cascade.contains(p))
        .collect();
    if force {
        println!(
            "{} ({})",
            "Forced cascade, still used elsewhere".bold(),
            shared.len()
        );
        for path in shared {
            println!("  {}", path.red());
        }
    } else if !shared.is_empty() {
        println!(
            "{} more dependencies are shared with other packages (--force to list)",
            shared.len()
        );
    }
    Ok(())
}

fn run_plan(engine: &LibraryEngine, scope: &ScopeArgs) -> anyhow::Result<()> {
    let snapshot = load_snapshot(engine.config())?;
    let plan = engine.plan(&snapshot, &scope_filter(&snapshot, scope)?);
    output::print_plan(&plan);
    Ok(())
}

fn build_strategy(
    snapshot: &Snapshot,
    strategy: StrategyArg,
    selections: &[String],
) -> anyhow::Result<ResolutionStrategy> {
    Ok(match strategy {
        StrategyArg::KeepLatest => ResolutionStrategy::KeepLatest,
        StrategyArg::DeleteOlder => ResolutionStrategy::DeleteOlder,
        StrategyArg::None => ResolutionStrategy::None,
        StrategyArg::Manual => {
            if selections.is_empty() {
                bail!("The manual strategy needs at least one --select");
            }
            let mut chosen = BTreeMap::new();
            for selection in selections {
                let record = find_record(snapshot, selection)?;
                chosen.insert(record.group_key(), record.file_path.clone());
            }
            ResolutionStrategy::Manual(chosen)
        }
    })
}

fn run_resolve(
    engine: &LibraryEngine,
    scope: &ScopeArgs,
    strategy: StrategyArg,
    selections: &[String],
    options: ExecutionOptions,
    yes: bool,
) -> anyhow::Result<()> {
    let config = engine.config();
    let root = library_root(config)?;
    let snapshot = load_snapshot(config)?;
    let strategy = build_strategy(&snapshot, strategy, selections)?;
    let plan = engine.plan(&snapshot, &scope_filter(&snapshot, scope)?);

    output::print_plan(&plan);
    if plan.is_empty() {
        return Ok(());
    }
    if !yes && !prompt_confirm("Apply this plan?", Some(false))? {
        return Ok(());
    }

    let scanner = scanner_for(config, &snapshot)?;
    let mut mutations = FsMutationService::new(root, config.use_trash);
    let reporter = CliReporter::new();
    let report = engine
        .coordinator(&mut mutations)
        .with_reporter(&reporter)
        .with_options(options)
        .execute(&snapshot, &plan, &strategy, &scanner);

    save_snapshot(config, &report.snapshot)?;
    output::print_report(&report);
    Ok(())
}

fn run_delete(
    engine: &LibraryEngine,
    files: &[String],
    cascade: bool,
    purge: bool,
    yes: bool,
) -> anyhow::Result<()> {
    let config = engine.config();
    let root = library_root(config)?;
    let snapshot = load_snapshot(config)?;
    let mut doomed = resolve_targets(&snapshot, files)?;

    let impact = engine.impact(&snapshot, &doomed);
    if purge {
        doomed.extend(impact.forced_cascade.iter().cloned());
    } else if cascade {
        doomed.extend(impact.safe_cascade.iter().cloned());
    }

    println!("{}", "Files to delete".bold());
    for path in &doomed {
        println!("  {}", path.red());
    }
    if purge && impact.forced_cascade.len() > impact.safe_cascade.len() {
        println!(
            "{}",
            "Some of these are still used by other packages.".yellow()
        );
    }
    if !yes && !prompt_confirm("Delete these files?", Some(false))? {
        return Ok(());
    }

    let scanner = scanner_for(config, &snapshot)?;
    let mut mutations = FsMutationService::new(root, config.use_trash);
    let reporter = CliReporter::new();
    let report = engine
        .coordinator(&mut mutations)
        .with_reporter(&reporter)
        .execute_deletions(&snapshot, &doomed, &scanner);

    save_snapshot(config, &report.snapshot)?;
    output::print_report(&report);
    Ok(())
}

fn prompt_confirm(prompt: &str, default: Option<bool>) -> io::Result<bool> {
    let mut input = String::new();

    loop {
        input.clear();

        match default {
            Some(true) => print!("{} (Y/n): ", prompt),
            Some(false) | None => print!("{} (y/N): ", prompt),
        }
        io::stdout().flush()?;

        io::stdin().read_line(&mut input)?;

        match input.trim().to_uppercase().as_str() {
            "Y" => return Ok(true),
            "N" => return Ok(false),
            "" => match default {
                Some(default) => return Ok(default),
                None => continue,
            },
            _ => continue,
        }
    }
}
