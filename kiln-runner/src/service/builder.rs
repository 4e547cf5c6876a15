//! Image builder
//!
//! Builds one variant image from the build description and its parameter
//! set, consulting the layer cache first and recording the produced layers
//! afterwards. Cache problems never fail a build.

use kiln_core::domain::image::{BuildDescription, CacheKey, CachedLayers, Image};
use kiln_core::domain::variant::{BuildParameterSet, Variant};
use kiln_core::error::PipelineError;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::cache::LayerCache;
use super::toolchain::{BuildRequest, BuildToolchain};

/// Result of a build attempt that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Built(Image),
    /// Cancellation was observed before the toolchain finished
    Cancelled,
}

pub struct ImageBuilder {
    toolchain: Arc<dyn BuildToolchain>,
    cache: Arc<dyn LayerCache>,
    platform: String,
}

impl ImageBuilder {
    pub fn new(
        toolchain: Arc<dyn BuildToolchain>,
        cache: Arc<dyn LayerCache>,
        platform: impl Into<String>,
    ) -> Self {
        Self {
            toolchain,
            cache,
            platform: platform.into(),
        }
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    /// Builds the image for `variant`
    ///
    /// Equal description and parameters always map to the same cache key, so
    /// a repeated build reuses every cached layer.
    pub async fn build(
        &self,
        variant: &Variant,
        description: &BuildDescription,
        params: &BuildParameterSet,
        cancel: &CancellationToken,
    ) -> Result<BuildOutcome, PipelineError> {
        description.check_parameters(params)?;
        let key = CacheKey::derive(description, params);

        if cancel.is_cancelled() {
            return Ok(BuildOutcome::Cancelled);
        }

        let cached = match self.cache.read(&key).await {
            Ok(cached) => cached,
            Err(e) => {
                warn!("Variant {}: cache read failed, building cold: {}", variant, e);
                None
            }
        };

        info!(
            "Variant {}: building with {} (key {}, cache {})",
            variant,
            self.toolchain.name(),
            key.short(),
            if cached.is_some() { "hit" } else { "miss" }
        );

        let request = BuildRequest {
            description,
            params,
            platform: &self.platform,
            cache_key: &key,
            cached: cached.as_ref(),
        };

        // Dropping the toolchain future stops the build process
        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Variant {}: build cancelled", variant);
                return Ok(BuildOutcome::Cancelled);
            }
            result = self.toolchain.build(request) => result?,
        };

        let record = CachedLayers {
            image_digest: output.digest.clone(),
            layers: output.layers.clone(),
            written_at: chrono::Utc::now(),
        };
        if let Err(e) = self.cache.write(&key, &record).await {
            warn!("Variant {}: cache write failed: {}", variant, e);
        }

        let image = Image {
            digest: output.digest,
            variant: variant.clone(),
            cache_key: key,
            // The record only says layers should exist; the toolchain knows if it used them
            cache_hit: output.reused_layers > 0,
            reused_layers: output.reused_layers,
        };

        debug!(
            "Variant {}: built {} ({} layer(s) reused)",
            variant,
            image.short_digest(),
            image.reused_layers
        );

        Ok(BuildOutcome::Built(image))
    }
}
