//! Named cache lookup
//!
//! A `CacheManager` hands out stores by name. Names not declared at
//! startup resolve to nothing unless dynamic creation is allowed.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};
use waypost_core::{CacheConfig, TimeProvider};

use crate::gzip::GzipStore;
use crate::memory::MemoryCacheStore;
use crate::store::CacheStore;

/// Store lookup by name
#[async_trait]
pub trait CacheManager: Send + Sync + Debug {
    /// Look up a store, `None` if no such cache exists
    async fn cache(&self, name: &str) -> Option<Arc<dyn CacheStore>>;

    /// Names of all known caches, sorted
    async fn cache_names(&self) -> Vec<String>;
}

/// Manager over in-memory stores
#[derive(Debug)]
pub struct MemoryCacheManager {
    caches: RwLock<BTreeMap<String, MemoryCacheStore>>,
    allow_dynamic: bool,
    clock: Option<Arc<dyn TimeProvider>>,
}

impl MemoryCacheManager {
    /// Create a manager with the given declared caches
    pub fn new<I, S>(names: I, allow_dynamic: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::build(names, allow_dynamic, None)
    }

    /// Create a manager whose stores honor per-entry TTL against `clock`
    pub fn with_expiry<I, S>(names: I, allow_dynamic: bool, clock: Arc<dyn TimeProvider>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::build(names, allow_dynamic, Some(clock))
    }

    fn build<I, S>(names: I, allow_dynamic: bool, clock: Option<Arc<dyn TimeProvider>>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let caches = names
            .into_iter()
            .map(Into::into)
            .map(|name: String| {
                let store = Self::new_store(&name, clock.as_ref());
                (name, store)
            })
            .collect();
        Self {
            caches: RwLock::new(caches),
            allow_dynamic,
            clock,
        }
    }

    fn new_store(name: &str, clock: Option<&Arc<dyn TimeProvider>>) -> MemoryCacheStore {
        match clock {
            Some(clock) => MemoryCacheStore::with_expiry(name, clock.clone()),
            None => MemoryCacheStore::new(name),
        }
    }

    /// Concrete handle to a declared store
    pub async fn memory_store(&self, name: &str) -> Option<MemoryCacheStore> {
        self.caches.read().await.get(name).cloned()
    }
}

#[async_trait]
impl CacheManager for MemoryCacheManager {
    async fn cache(&self, name: &str) -> Option<Arc<dyn CacheStore>> {
        if let Some(store) = self.caches.read().await.get(name) {
            return Some(Arc::new(store.clone()));
        }
        if !self.allow_dynamic {
            return None;
        }

        let mut caches = self.caches.write().await;
        let store = caches
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(cache = %name, "Creating cache on demand");
                Self::new_store(name, self.clock.as_ref())
            })
            .clone();
        Some(Arc::new(store))
    }

    async fn cache_names(&self) -> Vec<String> {
        self.caches.read().await.keys().cloned().collect()
    }
}

/// Manager wrapping every store of another manager in `GzipStore`
#[derive(Debug)]
pub struct GzipCacheManager {
    inner: Arc<dyn CacheManager>,
}

impl GzipCacheManager {
    /// Wrap a manager
    pub fn new(inner: Arc<dyn CacheManager>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl CacheManager for GzipCacheManager {
    async fn cache(&self, name: &str) -> Option<Arc<dyn CacheStore>> {
        let store = self.inner.cache(name).await?;
        Some(Arc::new(GzipStore::new(store)))
    }

    async fn cache_names(&self) -> Vec<String> {
        self.inner.cache_names().await
    }
}

/// Build the cache manager described by configuration.
///
/// With a clock the stores support native TTL; compression wraps the
/// result in the gzip decorator.
pub fn build_cache_manager(
    config: &CacheConfig,
    clock: Option<Arc<dyn TimeProvider>>,
) -> Arc<dyn CacheManager> {
    let base = MemoryCacheManager::build(config.names.iter().cloned(), config.allow_dynamic, clock);
    info!(
        caches = config.names.len(),
        compression = config.compression,
        allow_dynamic = config.allow_dynamic,
        "Cache manager configured"
    );
    if config.compression {
        Arc::new(GzipCacheManager::new(Arc::new(base)))
    } else {
        Arc::new(base)
    }
}
