//! Replay command handler

use anyhow::{Context, Result};
use colored::*;
use std::io::Read;
use std::path::Path;
use std::process::ExitCode;
use tracing::warn;

use super::parse_events;
use super::report::print_report;
use super::run::{build_executor, exit_code};
use crate::config::Config;

/// Submit every event of an NDJSON stream in order and report each run
///
/// Events of the same group supersede each other exactly as they would
/// when arriving from the source-control host.
pub async fn replay_events(config: &Config, file: &Path, dry_run: bool) -> Result<ExitCode> {
    let raw = if file == Path::new("-") {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("Failed to read events from stdin")?;
        raw
    } else {
        std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read events from {}", file.display()))?
    };

    let events = parse_events(&raw)?;
    if events.is_empty() {
        println!("{}", "No events to replay.".yellow());
        return Ok(ExitCode::SUCCESS);
    }

    let executor = build_executor(config, dry_run).await?;
    println!("{}", format!("Replaying {} event(s):", events.len()).bold());

    let handles: Vec<_> = events.into_iter().map(|event| executor.submit(event)).collect();

    let mut worst = 0;
    for handle in handles {
        match handle.await {
            Ok(report) => {
                print_report(&report);
                // Superseded runs are expected here; only failures set the exit code
                if report.exit_code() == 1 {
                    worst = 1;
                }
            }
            Err(e) => {
                warn!("Run task ended abnormally: {}", e);
                worst = 1;
            }
        }
    }

    Ok(exit_code(worst))
}
