//! Kiln Runner
//!
//! Executes variant image pipelines on the local machine.
//!
//! Architecture:
//! - Configuration: runner settings from the environment, pipeline manifest from TOML
//! - Services: image building against a layer cache, registry publishing
//! - Podman: the toolchain and registry backed by the podman CLI
//! - Scheduler: run admission per group and the per-variant fan-out

pub mod config;
pub mod manifest;
pub mod podman;
pub mod scheduler;
pub mod service;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use manifest::PipelineManifest;
pub use scheduler::{PipelineExecutor, RunCoordinator, Stages};
