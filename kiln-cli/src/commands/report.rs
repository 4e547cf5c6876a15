//! Run report rendering

use colored::*;
use kiln_core::domain::run::{RunReport, RunStatus, VariantOutcome};

/// Print a run report
pub fn print_report(report: &RunReport) {
    println!(
        "{} Run {} [{}] {}",
        "▸".cyan(),
        report.run_id.to_string().dimmed(),
        report.group,
        colorize_status(&report.status)
    );

    for entry in &report.variants {
        match &entry.outcome {
            VariantOutcome::Published { image, tags } => {
                println!(
                    "    {} {} {}",
                    entry.variant.as_str().bold(),
                    "published".green(),
                    image.short_digest().dimmed()
                );
                for tag in tags.iter() {
                    println!("        {}", tag);
                }
            }
            VariantOutcome::Built { image, tags, reason } => {
                println!(
                    "    {} {} {} ({})",
                    entry.variant.as_str().bold(),
                    "built".blue(),
                    image.short_digest().dimmed(),
                    reason
                );
                for tag in tags.iter() {
                    println!("        {}", tag.dimmed());
                }
            }
            VariantOutcome::Cancelled => {
                println!("    {} {}", entry.variant.as_str().bold(), "cancelled".yellow());
            }
            VariantOutcome::Failed { error } => {
                println!(
                    "    {} {} ({})",
                    entry.variant.as_str().bold(),
                    "failed".red(),
                    error.kind()
                );
                for line in error.to_string().lines() {
                    println!("        {}", line.dimmed());
                }
            }
        }
    }

    let elapsed = report.finished_at - report.started_at;
    println!(
        "    {}",
        format!("finished in {:.1}s", elapsed.num_milliseconds() as f64 / 1000.0).dimmed()
    );
}

fn colorize_status(status: &RunStatus) -> ColoredString {
    match status {
        RunStatus::Completed => "completed".green(),
        RunStatus::Failed => "failed".red(),
        RunStatus::Cancelled => "cancelled".yellow(),
        RunStatus::Running => "running".cyan(),
        RunStatus::Idle => "idle".dimmed(),
    }
}
