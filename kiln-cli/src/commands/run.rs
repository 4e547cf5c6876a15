//! Run command handler
//!
//! Wires the pipeline manifest and the runner environment into an executor
//! backed by podman and the filesystem layer cache.

use anyhow::{Context, Result};
use colored::*;
use kiln_core::domain::event::Event;
use kiln_runner::podman::{PodmanRegistry, PodmanToolchain, check_podman_available};
use kiln_runner::service::{FsLayerCache, ImageBuilder};
use kiln_runner::{PipelineExecutor, Stages};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;

use super::report::print_report;
use crate::config::Config;

/// Builds an executor for the configured pipeline
pub async fn build_executor(config: &Config, dry_run: bool) -> Result<Arc<PipelineExecutor>> {
    let manifest = &config.manifest;

    let mut runner = kiln_runner::Config::from_env()?;
    if let Some(platform) = &manifest.platform {
        runner = runner.with_platform(platform.clone());
    }
    runner.validate()?;

    check_podman_available(&runner.podman_bin).await?;

    let description = manifest
        .description(&config.base_dir)
        .context("Failed to load build description")?;

    info!(
        "Pipeline {}: {} variant(s) for {}, cache in {}",
        manifest.image,
        manifest.variants.len(),
        runner.platform,
        runner.cache_dir.display()
    );

    let toolchain = Arc::new(PodmanToolchain::new(
        runner.podman_bin.clone(),
        runner.cache_repo.clone(),
        runner.cache_dir.join("tmp"),
    ));
    let cache = Arc::new(FsLayerCache::new(runner.cache_dir.clone()));
    let registry = Arc::new(PodmanRegistry::new(runner.podman_bin.clone(), manifest.image.clone()));

    let stages = Stages {
        resolver: manifest.resolver()?,
        deriver: manifest.deriver(),
        description,
        builder: ImageBuilder::new(toolchain, cache, runner.platform.clone()),
        registry,
        dry_run,
    };

    Ok(Arc::new(PipelineExecutor::new(stages, runner.max_parallel_variants)))
}

/// Run the pipeline for one event
pub async fn run_event(config: &Config, event: Event, dry_run: bool) -> Result<ExitCode> {
    let executor = build_executor(config, dry_run).await?;

    if dry_run {
        println!("{}", "Dry run: nothing will be pushed".yellow());
    }

    let report = executor.run(event).await;
    print_report(&report);

    Ok(exit_code(report.exit_code()))
}

pub fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
