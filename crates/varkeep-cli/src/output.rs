use colored::*;
use serde::Serialize;
use std::path::Path;
use varkeep_core::analysis::graph::DependencyStatus;
use varkeep_core::plan::execute::ExecutionReport;
use varkeep_core::plan::resolution::Plan;
use varkeep_core::{LibrarySummary, PackageRecord};

/// One CSV line of `varkeep list --csv`.
#[derive(Debug, Serialize)]
struct ListRow<'a> {
    file_path: &'a str,
    group: String,
    version: &'a str,
    size_bytes: u64,
    enabled: bool,
    obsolete: bool,
    exact_duplicate: bool,
    missing_dependencies: String,
}

impl<'a> From<&'a PackageRecord> for ListRow<'a> {
    fn from(record: &'a PackageRecord) -> Self {
        Self {
            file_path: &record.file_path,
            group: record.group_key(),
            version: &record.identity.version,
            size_bytes: record.size_bytes,
            enabled: record.is_enabled,
            obsolete: record.is_obsolete,
            exact_duplicate: record.is_exact_duplicate,
            missing_dependencies: record.missing_dependencies.join(";"),
        }
    }
}

pub fn write_csv(path: &Path, records: &[&PackageRecord]) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(ListRow::from(*record))?;
    }
    writer.flush()?;
    Ok(())
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

fn flags(record: &PackageRecord) -> String {
    let mut flags = Vec::new();
    if !record.is_enabled {
        flags.push("disabled".dimmed().to_string());
    }
    if record.is_obsolete {
        flags.push("obsolete".yellow().to_string());
    }
    if record.is_exact_duplicate {
        flags.push("duplicate".magenta().to_string());
    }
    if !record.missing_dependencies.is_empty() {
        flags.push(
            format!("missing {}", record.missing_dependencies.len())
                .red()
                .to_string(),
        );
    }
    flags.join(" ")
}

pub fn print_record(record: &PackageRecord) {
    println!(
        "{}  {}  {}",
        record.file_path,
        format_bytes(record.size_bytes).cyan(),
        flags(record)
    );
}

pub fn print_summary(summary: &LibrarySummary) {
    println!("{} packages ({})", summary.total, format_bytes(summary.total_bytes));
    println!(
        "  {} enabled, {} disabled",
        summary.enabled.to_string().green(),
        summary.disabled.to_string().dimmed()
    );
    println!("  {} obsolete", summary.obsolete.to_string().yellow());
    println!(
        "  {} exact duplicates, {} reclaimable",
        summary.exact_duplicates.to_string().magenta(),
        format_bytes(summary.reclaimable_bytes).magenta()
    );
    println!(
        "  {} with missing dependencies",
        summary.missing_dependencies.to_string().red()
    );
}

pub fn status_label(status: DependencyStatus) -> ColoredString {
    match status {
        DependencyStatus::System => "system".dimmed(),
        DependencyStatus::Valid => "ok".green(),
        DependencyStatus::Disabled => "disabled".yellow(),
        DependencyStatus::Mismatch => "version mismatch".yellow(),
        DependencyStatus::Missing => "missing".red(),
    }
}

pub fn print_plan(plan: &Plan) {
    if plan.is_empty() {
        println!("{}", "Nothing to do.".green());
        return;
    }
    if !plan.merges.is_empty() {
        println!(
            "{} ({} files, {} reclaimable)",
            "Merge exact duplicates".bold(),
            plan.merge_deletion_count(),
            format_bytes(plan.reclaimable_bytes())
        );
        for entry in &plan.merges {
            println!("  {} {}", "keep".green(), entry.keep.file_path);
            for duplicate in &entry.delete {
                println!("  {} {}", "del ".red(), duplicate.file_path);
            }
        }
    }
    if !plan.resolve_groups.is_empty() {
        println!("{}", "Resolve versions".bold());
        for group in &plan.resolve_groups {
            println!("  {}", group.id.cyan());
            for (i, candidate) in group.candidates.iter().enumerate() {
                let marker = if i == 0 { "*" } else { " " };
                let state = if candidate.is_enabled {
                    "enabled".green()
                } else {
                    "disabled".dimmed()
                };
                println!(
                    "   {} v{} {} {}",
                    marker, candidate.identity.version, state, candidate.file_path
                );
            }
        }
    }
}

pub fn print_report(report: &ExecutionReport) {
    let headline = format!(
        "Processed {}/{} items, reclaimed {}",
        report.processed,
        report.total,
        format_bytes(report.space_saved_bytes)
    );
    if report.errors.is_empty() {
        println!("{}", headline.green());
    } else {
        println!("{}", headline.yellow());
        println!("{} errors:", report.errors.len().to_string().red());
        for err in &report.errors {
            println!("  {}", err.red());
        }
    }
    if report.cancelled {
        println!("{}", "Cancelled before all items were processed.".yellow());
    }
    if report.provisional {
        println!(
            "{}",
            "Rescan failed; saved snapshot reflects the applied changes only.".yellow()
        );
    }
}
