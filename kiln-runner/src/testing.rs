//! In-process fakes for the toolchain, cache and registry seams

use async_trait::async_trait;
use kiln_core::domain::image::{CacheKey, CachedLayers, Image};
use kiln_core::error::{BuildFailure, CacheError};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};

use crate::service::{BuildOutput, BuildRequest, BuildToolchain, LayerCache, Registry};

/// Toolchain producing a deterministic digest per cache key
pub struct FakeToolchain {
    pub layers: usize,
    pub delay: Duration,
    /// Fails every build whose parameters contain this value
    pub fail_on_value: Option<String>,
    /// Ignores cache records, as if local layer storage had been pruned
    pub evicted: bool,
    invocations: AtomicUsize,
    executed_layers: AtomicUsize,
}

impl FakeToolchain {
    pub fn new(layers: usize) -> Self {
        Self {
            layers,
            delay: Duration::ZERO,
            fail_on_value: None,
            evicted: false,
            invocations: AtomicUsize::new(0),
            executed_layers: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_on(mut self, value: impl Into<String>) -> Self {
        self.fail_on_value = Some(value.into());
        self
    }

    pub fn with_evicted_storage(mut self) -> Self {
        self.evicted = true;
        self
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    pub fn executed_layers(&self) -> usize {
        self.executed_layers.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BuildToolchain for FakeToolchain {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn build(&self, request: BuildRequest<'_>) -> Result<BuildOutput, BuildFailure> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if let Some(bad) = &self.fail_on_value {
            if request.params.iter().any(|(_, value)| value == bad) {
                return Err(BuildFailure::exited(1, format!("CMake Error: unsupported {}", bad)));
            }
        }

        let reused = request
            .cached
            .filter(|_| !self.evicted)
            .map(|c| c.layers.len())
            .unwrap_or(0)
            .min(self.layers);
        self.executed_layers
            .fetch_add(self.layers - reused, Ordering::SeqCst);

        let key = request.cache_key.as_str();
        Ok(BuildOutput {
            digest: format!("sha256:{}", key),
            layers: (0..self.layers)
                .map(|i| format!("sha256:{}-{}", &key[..8], i))
                .collect(),
            reused_layers: reused,
            diagnostics: String::new(),
        })
    }
}

/// Registry that records every push
pub struct FakeRegistry {
    pub fail_on: Option<String>,
    /// Notified when a push begins
    pub push_started: Notify,
    /// Permits for pushes to proceed, when gated
    pub release: Semaphore,
    gated: bool,
    pushes: Mutex<Vec<(String, String)>>,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self {
            fail_on: None,
            push_started: Notify::new(),
            release: Semaphore::new(0),
            gated: false,
            pushes: Mutex::default(),
        }
    }

    pub fn failing_on(tag: impl Into<String>) -> Self {
        Self {
            fail_on: Some(tag.into()),
            ..Self::new()
        }
    }

    /// Every push waits for a permit on `release`
    pub fn gated() -> Self {
        Self {
            gated: true,
            ..Self::new()
        }
    }

    /// Pushed `(digest, tag)` pairs in push order
    pub fn pushes(&self) -> Vec<(String, String)> {
        self.pushes.lock().unwrap().clone()
    }

    pub fn pushed_tags(&self) -> Vec<String> {
        self.pushes().into_iter().map(|(_, tag)| tag).collect()
    }
}

#[async_trait]
impl Registry for FakeRegistry {
    fn name(&self) -> &str {
        "fake"
    }

    async fn push(&self, image: &Image, tag: &str) -> anyhow::Result<()> {
        self.push_started.notify_one();
        if self.gated {
            self.release.acquire().await?.forget();
        }
        if self.fail_on.as_deref() == Some(tag) {
            anyhow::bail!("denied: requested access to {} is denied", tag);
        }
        self.pushes
            .lock()
            .unwrap()
            .push((image.digest.clone(), tag.to_string()));
        Ok(())
    }
}

/// Cache whose writes block until released by the test
///
/// Lets a test hold a run right between "build succeeded" and "push".
pub struct GatedCache {
    pub write_started: Notify,
    pub release: Semaphore,
}

impl GatedCache {
    pub fn new() -> Self {
        Self {
            write_started: Notify::new(),
            release: Semaphore::new(0),
        }
    }
}

#[async_trait]
impl LayerCache for GatedCache {
    async fn read(&self, _key: &CacheKey) -> Result<Option<CachedLayers>, CacheError> {
        Ok(None)
    }

    async fn write(&self, _key: &CacheKey, _layers: &CachedLayers) -> Result<(), CacheError> {
        self.write_started.notify_one();
        let permit = self
            .release
            .acquire()
            .await
            .map_err(|e| CacheError::Io(e.to_string()))?;
        permit.forget();
        Ok(())
    }
}

/// Cache failing every operation
pub struct BrokenCache;

#[async_trait]
impl LayerCache for BrokenCache {
    async fn read(&self, _key: &CacheKey) -> Result<Option<CachedLayers>, CacheError> {
        Err(CacheError::Io("disk unavailable".to_string()))
    }

    async fn write(&self, _key: &CacheKey, _layers: &CachedLayers) -> Result<(), CacheError> {
        Err(CacheError::Io("disk unavailable".to_string()))
    }
}
