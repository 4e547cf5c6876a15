//! Podman integration
//!
//! Drives the podman CLI for the two external effects of a pipeline:
//! - Building an image from the build description (`podman build`)
//! - Tagging and pushing a built image (`podman tag`, `podman push`)
//!
//! Every subprocess is spawned with `kill_on_drop`, so dropping a build
//! future (on cancellation) also stops the build.

use anyhow::{Context, Result};
use async_trait::async_trait;
use kiln_core::domain::image::Image;
use kiln_core::error::BuildFailure;
use std::path::PathBuf;
use std::process::Output;
use tokio::process::Command;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::service::{BuildOutput, BuildRequest, BuildToolchain, Registry};

/// Label carrying the cache key on every built image
pub const CACHE_KEY_LABEL: &str = "dev.kiln.cache-key";

/// Label naming the image whose layers a build started from
pub const CACHED_FROM_LABEL: &str = "dev.kiln.cached-from";

/// Checks if podman is installed and available
pub async fn check_podman_available(bin: &str) -> Result<()> {
    let output = Command::new(bin)
        .arg("--version")
        .output()
        .await
        .with_context(|| format!("Failed to execute '{} --version'. Is podman installed?", bin))?;

    if !output.status.success() {
        anyhow::bail!("Podman is not working correctly");
    }

    let version = String::from_utf8_lossy(&output.stdout);
    info!("Podman is available: {}", version.trim());

    Ok(())
}

fn combined_output(output: &Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    match (stdout.trim().is_empty(), stderr.trim().is_empty()) {
        (false, false) => format!("{}\n{}", stdout.trim_end(), stderr.trim_end()),
        (false, true) => stdout.trim_end().to_string(),
        _ => stderr.trim_end().to_string(),
    }
}

/// Counts steps podman satisfied from its layer cache
fn count_cached_steps(diagnostics: &str) -> usize {
    diagnostics
        .lines()
        .filter(|line| line.trim_start().starts_with("--> Using cache"))
        .count()
}

/// Build toolchain backed by `podman build`
pub struct PodmanToolchain {
    bin: String,
    /// Remote repository shared as layer cache (`--cache-from`/`--cache-to`)
    cache_repo: Option<String>,
    scratch_dir: PathBuf,
}

impl PodmanToolchain {
    /// Creates a toolchain
    ///
    /// # Arguments
    /// * `bin` - Podman binary
    /// * `cache_repo` - Optional shared cache repository
    /// * `scratch_dir` - Directory for image id files
    pub fn new(bin: impl Into<String>, cache_repo: Option<String>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            bin: bin.into(),
            cache_repo,
            scratch_dir: scratch_dir.into(),
        }
    }

    fn build_command(&self, request: &BuildRequest<'_>, iidfile: &std::path::Path) -> Command {
        let mut cmd = Command::new(&self.bin);
        cmd.arg("build")
            .arg("--layers")
            .arg("--platform")
            .arg(request.platform)
            .arg("-f")
            .arg(&request.description.file)
            .arg("--iidfile")
            .arg(iidfile)
            .arg("--label")
            .arg(format!("{}={}", CACHE_KEY_LABEL, request.cache_key));

        for arg in request.params.to_build_args() {
            cmd.arg("--build-arg").arg(arg);
        }

        // A newer base image would invalidate every cached layer above it
        match request.cached {
            Some(cached) => {
                cmd.arg("--pull=missing")
                    .arg("--label")
                    .arg(format!("{}={}", CACHED_FROM_LABEL, cached.image_digest));
            }
            None => {
                cmd.arg("--pull=newer");
            }
        }

        if let Some(repo) = &self.cache_repo {
            cmd.arg("--cache-from").arg(repo).arg("--cache-to").arg(repo);
        }

        cmd.arg(&request.description.context).kill_on_drop(true);
        cmd
    }

    /// Whether an image is still present in local storage
    async fn image_exists(&self, image_id: &str) -> bool {
        let id = image_id.strip_prefix("sha256:").unwrap_or(image_id);
        match Command::new(&self.bin)
            .arg("image")
            .arg("exists")
            .arg(id)
            .kill_on_drop(true)
            .status()
            .await
        {
            Ok(status) => status.success(),
            Err(e) => {
                debug!("podman image exists failed: {}", e);
                false
            }
        }
    }

    /// Layer digests of a built image, base first
    async fn inspect_layers(&self, image_id: &str) -> Result<Vec<String>> {
        let output = Command::new(&self.bin)
            .arg("image")
            .arg("inspect")
            .arg("--format")
            .arg("{{json .RootFS.Layers}}")
            .arg(image_id)
            .kill_on_drop(true)
            .output()
            .await
            .context("Failed to execute podman image inspect")?;

        if !output.status.success() {
            anyhow::bail!("podman image inspect failed: {}", combined_output(&output));
        }

        serde_json::from_slice(&output.stdout).context("Unexpected podman image inspect output")
    }
}

#[async_trait]
impl BuildToolchain for PodmanToolchain {
    fn name(&self) -> &'static str {
        "podman"
    }

    async fn build(&self, mut request: BuildRequest<'_>) -> Result<BuildOutput, BuildFailure> {
        if let Some(cached) = request.cached {
            if !self.image_exists(&cached.image_digest).await {
                warn!(
                    "Cached image {} is gone from local storage, building {} cold",
                    cached.image_digest,
                    request.cache_key.short()
                );
                request.cached = None;
            }
        }

        tokio::fs::create_dir_all(&self.scratch_dir)
            .await
            .map_err(|e| BuildFailure::toolchain("cannot prepare build", e.to_string()))?;
        let iidfile = self.scratch_dir.join(format!("{}.iid", Uuid::new_v4()));

        debug!(
            "podman build -f {} ({} build arg(s)) for {}",
            request.description.file.display(),
            request.params.len(),
            request.platform
        );

        let output = self
            .build_command(&request, &iidfile)
            .output()
            .await
            .map_err(|e| BuildFailure::toolchain(format!("failed to execute {}", self.bin), e.to_string()))?;

        let diagnostics = combined_output(&output);

        if !output.status.success() {
            let _ = tokio::fs::remove_file(&iidfile).await;
            error!("podman build failed: {}", output.status);
            return Err(match output.status.code() {
                Some(code) => BuildFailure::exited(code, diagnostics),
                None => BuildFailure::toolchain(format!("terminated ({})", output.status), diagnostics),
            });
        }

        let image_id = tokio::fs::read_to_string(&iidfile)
            .await
            .map_err(|e| BuildFailure::toolchain("image id not written", format!("{}\n{}", diagnostics, e)))?;
        let _ = tokio::fs::remove_file(&iidfile).await;
        let digest = image_id.trim().to_string();

        let layers = self
            .inspect_layers(&digest)
            .await
            .map_err(|e| BuildFailure::toolchain("cannot inspect built image", format!("{:#}", e)))?;

        let reused_layers = count_cached_steps(&diagnostics).min(layers.len());

        Ok(BuildOutput {
            digest,
            layers,
            reused_layers,
            diagnostics,
        })
    }
}

/// Registry reached through `podman push`
pub struct PodmanRegistry {
    bin: String,
    /// Repository reference without tag (e.g. "ghcr.io/org/image")
    repository: String,
}

impl PodmanRegistry {
    pub fn new(bin: impl Into<String>, repository: impl Into<String>) -> Self {
        Self {
            bin: bin.into(),
            repository: repository.into(),
        }
    }

    async fn podman(&self, args: &[&str]) -> Result<()> {
        let output = Command::new(&self.bin)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to execute podman {}", args[0]))?;

        if !output.status.success() {
            anyhow::bail!(
                "podman {} exited with {}: {}",
                args[0],
                output.status,
                combined_output(&output)
            );
        }
        Ok(())
    }
}

#[async_trait]
impl Registry for PodmanRegistry {
    fn name(&self) -> &str {
        &self.repository
    }

    async fn push(&self, image: &Image, tag: &str) -> Result<()> {
        let reference = format!("{}:{}", self.repository, tag);
        let image_id = image.digest.strip_prefix("sha256:").unwrap_or(&image.digest);

        self.podman(&["tag", image_id, &reference]).await?;
        self.podman(&["push", &reference]).await?;
        Ok(())
    }
}
