//! Service layer
//!
//! Services contain the execution logic of the runner: building images
//! against a layer cache and publishing them to a registry.
//!
//! The external collaborators (toolchain, cache, registry) sit behind traits
//! so the pipeline can be exercised without a container runtime.

mod builder;
mod cache;
mod registry;
mod toolchain;

// Re-export traits
pub use cache::LayerCache;
pub use registry::Registry;
pub use toolchain::BuildToolchain;

// Re-export implementations
pub use builder::{BuildOutcome, ImageBuilder};
pub use cache::{FsLayerCache, InMemoryLayerCache};
pub use registry::publish;
pub use toolchain::{BuildOutput, BuildRequest};
