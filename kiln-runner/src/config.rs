//! Runner configuration
//!
//! Defines the execution settings of the runner: which container runtime to
//! drive, which platform to build for, where the layer cache lives and how
//! many variant builds may run at once.

use std::path::PathBuf;

/// Runner configuration
///
/// Everything here is about *how* a pipeline executes on this machine. What
/// gets built and tagged is declared in the pipeline manifest.
#[derive(Debug, Clone)]
pub struct Config {
    /// Container runtime binary (e.g., "podman" or an absolute path)
    pub podman_bin: String,

    /// Single target platform for every build (e.g., "linux/amd64")
    pub platform: String,

    /// Directory holding layer cache manifests
    pub cache_dir: PathBuf,

    /// Optional remote repository used as shared layer cache
    pub cache_repo: Option<String>,

    /// Max variant builds running at the same time
    pub max_parallel_variants: usize,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            podman_bin: "podman".to_string(),
            platform: "linux/amd64".to_string(),
            cache_dir,
            cache_repo: None,
            max_parallel_variants: 4,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables (all optional):
    /// - KILN_PODMAN_BIN (default: podman)
    /// - KILN_PLATFORM (default: linux/amd64)
    /// - KILN_CACHE_DIR (default: .kiln/cache)
    /// - KILN_CACHE_REPO (default: none)
    /// - KILN_MAX_PARALLEL (default: 4)
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let podman_bin = std::env::var("KILN_PODMAN_BIN").unwrap_or(defaults.podman_bin);

        let platform = std::env::var("KILN_PLATFORM").unwrap_or(defaults.platform);

        let cache_dir = std::env::var("KILN_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.cache_dir);

        let cache_repo = std::env::var("KILN_CACHE_REPO")
            .ok()
            .filter(|s| !s.trim().is_empty());

        let max_parallel_variants = match std::env::var("KILN_MAX_PARALLEL") {
            Ok(raw) => raw
                .parse::<usize>()
                .map_err(|_| anyhow::anyhow!("KILN_MAX_PARALLEL must be a number, got '{}'", raw))?,
            Err(_) => defaults.max_parallel_variants,
        };

        Ok(Self {
            podman_bin,
            platform,
            cache_dir,
            cache_repo,
            max_parallel_variants,
        })
    }

    /// Overrides the build platform
    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.podman_bin.trim().is_empty() {
            anyhow::bail!("podman_bin cannot be empty");
        }

        // Exactly one platform: no multi-arch fan-out
        if self.platform.is_empty() || self.platform.contains(',') {
            anyhow::bail!(
                "platform must name exactly one target (e.g. linux/amd64), got '{}'",
                self.platform
            );
        }

        if !self.platform.contains('/') {
            anyhow::bail!("platform must look like os/arch, got '{}'", self.platform);
        }

        if self.cache_dir.as_os_str().is_empty() {
            anyhow::bail!("cache_dir cannot be empty");
        }

        if self.max_parallel_variants == 0 {
            anyhow::bail!("max_parallel_variants must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(PathBuf::from(".kiln/cache"))
    }
}
