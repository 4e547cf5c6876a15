//! Registry publishing

use async_trait::async_trait;
use kiln_core::domain::image::Image;
use kiln_core::domain::tag::TagSet;
use kiln_core::error::PushFailure;
use tracing::{info, warn};

/// Service trait for a container registry
#[async_trait]
pub trait Registry: Send + Sync {
    /// Registry name used in logs
    fn name(&self) -> &str;

    /// Publishes `image` under a single tag
    async fn push(&self, image: &Image, tag: &str) -> anyhow::Result<()>;
}

/// Pushes every tag of the set, in order
///
/// Stops at the first rejected tag. Tags pushed before it remain published
/// and are reported through [`PushFailure::Partial`].
pub async fn publish(registry: &dyn Registry, image: &Image, tags: &TagSet) -> Result<(), PushFailure> {
    let mut pushed = Vec::with_capacity(tags.len());

    for tag in tags.iter() {
        if let Err(e) = registry.push(image, tag).await {
            warn!(
                "Variant {}: push of '{}' to {} failed after {} tag(s)",
                image.variant,
                tag,
                registry.name(),
                pushed.len()
            );
            return Err(PushFailure::after(pushed, tag, format!("{:#}", e)));
        }
        info!("Variant {}: pushed {} -> {}", image.variant, image.short_digest(), tag);
        pushed.push(tag.to_string());
    }

    Ok(())
}
