//! Configuration module
//!
//! Locates the pipeline manifest and the directory its paths are relative to.

use anyhow::{Context, Result};
use kiln_runner::PipelineManifest;
use std::path::{Path, PathBuf};
use tracing::info;

/// Manifest looked up in the working directory when none is given
pub const DEFAULT_MANIFEST: &str = "kiln.toml";

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub manifest: PipelineManifest,
    /// Directory the build file and context are resolved against
    pub base_dir: PathBuf,
}

impl Config {
    /// Loads the manifest at `path`, `./kiln.toml`, or the built-in pipeline
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to read working directory")?;

        let path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => Some(cwd.join(DEFAULT_MANIFEST)).filter(|p| p.is_file()),
        };

        match path {
            Some(path) => {
                let manifest = PipelineManifest::load(&path)?;
                let base_dir = path
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .map(Path::to_path_buf)
                    .unwrap_or(cwd);
                info!("Loaded pipeline manifest {}", path.display());
                Ok(Self { manifest, base_dir })
            }
            None => Ok(Self {
                manifest: PipelineManifest::default(),
                base_dir: cwd,
            }),
        }
    }
}
