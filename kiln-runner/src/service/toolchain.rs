//! Build toolchain abstraction
//!
//! The toolchain is an opaque subprocess: it receives the build description
//! and a parameter set, and either produces an image or fails with its
//! diagnostic output.

use async_trait::async_trait;
use kiln_core::domain::image::{BuildDescription, CacheKey, CachedLayers};
use kiln_core::domain::variant::BuildParameterSet;
use kiln_core::error::BuildFailure;

/// Everything the toolchain needs for one build
#[derive(Debug, Clone, Copy)]
pub struct BuildRequest<'a> {
    pub description: &'a BuildDescription,
    pub params: &'a BuildParameterSet,
    /// Single target platform
    pub platform: &'a str,
    pub cache_key: &'a CacheKey,
    /// Layers known to be cached for this key
    pub cached: Option<&'a CachedLayers>,
}

/// What a successful build produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutput {
    /// Content digest of the image
    pub digest: String,
    /// Layer digests, base first
    pub layers: Vec<String>,
    /// Layers taken from cache instead of executed
    pub reused_layers: usize,
    /// Combined toolchain output
    pub diagnostics: String,
}

/// Service trait for running a build
///
/// Implementations must stop the underlying process when the returned
/// future is dropped; the image builder drops it on cancellation.
#[async_trait]
pub trait BuildToolchain: Send + Sync {
    /// Toolchain name used in logs
    fn name(&self) -> &'static str;

    /// Runs one build to completion
    async fn build(&self, request: BuildRequest<'_>) -> Result<BuildOutput, BuildFailure>;
}
