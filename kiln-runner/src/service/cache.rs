//! Layer cache service
//!
//! Read/write store of layer records keyed by [`CacheKey`]. The cache never
//! carries correctness: a failed read is treated as a miss and a failed write
//! only costs the next run its cache benefit.

use async_trait::async_trait;
use kiln_core::domain::image::{CacheKey, CachedLayers};
use kiln_core::error::CacheError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// Service trait for the layer cache
///
/// Implementations must tolerate concurrent readers and writers; a collision
/// may lose a write but must never leave a half-written record behind.
#[async_trait]
pub trait LayerCache: Send + Sync {
    /// Returns the cached record for `key`, or `None` on a miss
    async fn read(&self, key: &CacheKey) -> Result<Option<CachedLayers>, CacheError>;

    /// Stores the record for `key`, replacing any previous one
    async fn write(&self, key: &CacheKey, layers: &CachedLayers) -> Result<(), CacheError>;
}

/// Filesystem cache: one JSON record per key
///
/// Records are written to a temporary file and renamed into place, so
/// concurrent writers race on the rename instead of interleaving bytes.
pub struct FsLayerCache {
    root: PathBuf,
}

impl FsLayerCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.root.join(format!("{}.json", key))
    }
}

#[async_trait]
impl LayerCache for FsLayerCache {
    async fn read(&self, key: &CacheKey) -> Result<Option<CachedLayers>, CacheError> {
        let path = self.path_for(key);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Cache miss for {}", key.short());
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let record = serde_json::from_slice(&raw).map_err(|e| CacheError::Corrupt {
            key: key.to_string(),
            reason: e.to_string(),
        })?;

        debug!("Cache hit for {}", key.short());
        Ok(Some(record))
    }

    async fn write(&self, key: &CacheKey, layers: &CachedLayers) -> Result<(), CacheError> {
        tokio::fs::create_dir_all(&self.root).await?;

        let body = serde_json::to_vec_pretty(layers).map_err(|e| CacheError::Corrupt {
            key: key.to_string(),
            reason: e.to_string(),
        })?;

        let tmp = self.root.join(format!(".{}.{}.tmp", key, Uuid::new_v4()));
        tokio::fs::write(&tmp, body).await?;
        if let Err(e) = tokio::fs::rename(&tmp, self.path_for(key)).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!("Cache record written for {}", key.short());
        Ok(())
    }
}

/// In-memory cache, shared by all runs of one process
#[derive(Default)]
pub struct InMemoryLayerCache {
    entries: Mutex<HashMap<CacheKey, CachedLayers>>,
}

impl InMemoryLayerCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl LayerCache for InMemoryLayerCache {
    async fn read(&self, key: &CacheKey) -> Result<Option<CachedLayers>, CacheError> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| CacheError::Io(format!("cache lock poisoned: {}", e)))?;
        Ok(entries.get(key).cloned())
    }

    async fn write(&self, key: &CacheKey, layers: &CachedLayers) -> Result<(), CacheError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| CacheError::Io(format!("cache lock poisoned: {}", e)))?;
        entries.insert(key.clone(), layers.clone());
        Ok(())
    }
}
