//! Build description, cache key and image types

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::domain::variant::{BuildParameterSet, Variant};
use crate::error::ConfigurationError;

/// Static build instructions plus their argument slots
///
/// The content is never interpreted here; it is only hashed and handed to the
/// toolchain together with the variant's parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildDescription {
    /// Build instruction file (e.g. a Containerfile)
    pub file: PathBuf,
    /// Directory sent to the toolchain as build context
    pub context: PathBuf,
    /// Build-argument names the description declares
    pub slots: BTreeSet<String>,
    identity: String,
}

impl BuildDescription {
    /// Creates a description from already loaded content
    pub fn new(
        file: impl Into<PathBuf>,
        context: impl Into<PathBuf>,
        slots: impl IntoIterator<Item = String>,
        content: &[u8],
    ) -> Self {
        let slots: BTreeSet<String> = slots.into_iter().collect();
        let identity = identity_of(content, &slots);
        Self {
            file: file.into(),
            context: context.into(),
            slots,
            identity,
        }
    }

    /// Reads the build file and computes its identity
    pub fn load(
        file: impl AsRef<Path>,
        context: impl AsRef<Path>,
        slots: impl IntoIterator<Item = String>,
    ) -> Result<Self, ConfigurationError> {
        let file = file.as_ref();
        let content = std::fs::read(file).map_err(|e| {
            ConfigurationError::MalformedDescription(format!(
                "cannot read build file {}: {}",
                file.display(),
                e
            ))
        })?;
        if content.iter().all(u8::is_ascii_whitespace) {
            return Err(ConfigurationError::MalformedDescription(format!(
                "build file {} is empty",
                file.display()
            )));
        }
        Ok(Self::new(file, context.as_ref(), slots, &content))
    }

    /// Content hash of the instructions and declared slots
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Ensures every parameter fills a declared slot
    pub fn check_parameters(&self, params: &BuildParameterSet) -> Result<(), ConfigurationError> {
        let unknown: Vec<&str> = params
            .names()
            .filter(|name| !self.slots.contains(*name))
            .collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(ConfigurationError::MalformedDescription(format!(
                "{} declares no build-argument slot for {}",
                self.file.display(),
                unknown.join(", ")
            )))
        }
    }
}

fn identity_of(content: &[u8], slots: &BTreeSet<String>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    for slot in slots {
        hasher.update([0u8]);
        hasher.update(slot.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Layer cache key
///
/// Derived from the build description identity and the parameter set only,
/// so equal inputs always land on the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn derive(description: &BuildDescription, params: &BuildParameterSet) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(description.identity().as_bytes());
        for (name, value) in params.iter() {
            hasher.update([0u8]);
            hasher.update(name.as_bytes());
            hasher.update([b'=']);
            hasher.update(value.as_bytes());
        }
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for logs
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cached layer record for one key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedLayers {
    /// Digest of the image the layers were produced for
    pub image_digest: String,
    /// Layer digests, base first
    pub layers: Vec<String>,
    pub written_at: chrono::DateTime<chrono::Utc>,
}

/// Handle to a built image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    /// Content digest (e.g. "sha256:...")
    pub digest: String,
    pub variant: Variant,
    pub cache_key: CacheKey,
    /// Whether the toolchain reused cached layers for this build
    pub cache_hit: bool,
    /// Number of layers reused instead of executed
    pub reused_layers: usize,
}

impl Image {
    /// Digest shortened for display
    pub fn short_digest(&self) -> &str {
        let hex = self.digest.strip_prefix("sha256:").unwrap_or(&self.digest);
        &hex[..hex.len().min(12)]
    }
}
