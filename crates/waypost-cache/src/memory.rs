//! In-memory cache store
//!
//! For single-process deployments, tests, and as the backing map of the
//! local cluster engine.
//!
//! TigerStyle: Single lock, atomic read-modify-write, lazy expiry.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, instrument};
use waypost_core::TimeProvider;

use crate::error::{CacheError, CacheResult};
use crate::store::{CacheStore, UpdateFn};
use crate::value::CacheValue;

#[derive(Debug, Clone)]
struct Entry {
    value: CacheValue,
    /// Absolute expiry in clock milliseconds, `None` for no expiry
    expires_at_ms: Option<u64>,
}

impl Entry {
    fn new(value: CacheValue) -> Self {
        Self {
            value,
            expires_at_ms: None,
        }
    }

    fn is_live(&self, now_ms: u64) -> bool {
        self.expires_at_ms.map_or(true, |at| now_ms < at)
    }
}

/// In-memory `CacheStore`
///
/// Clones share the same underlying map.
#[derive(Clone)]
pub struct MemoryCacheStore {
    name: String,
    data: Arc<RwLock<HashMap<String, Entry>>>,
    /// Present when the store honors per-entry TTL
    clock: Option<Arc<dyn TimeProvider>>,
    /// Fault switch: while set every operation fails as unavailable
    unavailable: Arc<AtomicBool>,
}

impl MemoryCacheStore {
    /// Create a store without native expiry
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: Arc::new(RwLock::new(HashMap::new())),
            clock: None,
            unavailable: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create a store that expires entries against `clock`
    pub fn with_expiry(name: impl Into<String>, clock: Arc<dyn TimeProvider>) -> Self {
        Self {
            clock: Some(clock),
            ..Self::new(name)
        }
    }

    /// Make every subsequent operation fail with `StoreUnavailable`
    /// until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Drop expired entries, returning how many were removed
    pub async fn purge_expired(&self) -> usize {
        let now_ms = self.now_ms();
        let mut data = self.data.write().await;
        let before = data.len();
        data.retain(|_, entry| entry.is_live(now_ms));
        let purged = before - data.len();
        if purged > 0 {
            debug!(store = %self.name, purged, "Purged expired entries");
        }
        purged
    }

    /// Number of live entries
    pub async fn len(&self) -> usize {
        let now_ms = self.now_ms();
        self.data
            .read()
            .await
            .values()
            .filter(|entry| entry.is_live(now_ms))
            .count()
    }

    /// Whether the store holds no live entries
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn now_ms(&self) -> u64 {
        self.clock.as_ref().map_or(0, |clock| clock.now_ms())
    }

    fn check_available(&self) -> CacheResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::store_unavailable(
                &self.name,
                "store marked unavailable",
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for MemoryCacheStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCacheStore")
            .field("name", &self.name)
            .field("supports_ttl", &self.clock.is_some())
            .finish()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self), fields(store = %self.name))]
    async fn get(&self, key: &str) -> CacheResult<Option<CacheValue>> {
        self.check_available()?;
        let now_ms = self.now_ms();
        let data = self.data.read().await;
        Ok(data
            .get(key)
            .filter(|entry| entry.is_live(now_ms))
            .map(|entry| entry.value.clone()))
    }

    #[instrument(skip(self, value), fields(store = %self.name, value_len = value.size_bytes()))]
    async fn put(&self, key: &str, value: CacheValue) -> CacheResult<()> {
        self.check_available()?;
        self.data
            .write()
            .await
            .insert(key.to_string(), Entry::new(value));
        Ok(())
    }

    #[instrument(skip(self, value), fields(store = %self.name))]
    async fn put_if_absent(
        &self,
        key: &str,
        value: CacheValue,
    ) -> CacheResult<Option<CacheValue>> {
        self.check_available()?;
        let now_ms = self.now_ms();
        let mut data = self.data.write().await;
        if let Some(existing) = data.get(key).filter(|entry| entry.is_live(now_ms)) {
            return Ok(Some(existing.value.clone()));
        }
        data.insert(key.to_string(), Entry::new(value));
        Ok(None)
    }

    fn supports_ttl(&self) -> bool {
        self.clock.is_some()
    }

    #[instrument(skip(self, value), fields(store = %self.name, ttl_ms = ttl.as_millis() as u64))]
    async fn put_with_ttl(&self, key: &str, value: CacheValue, ttl: Duration) -> CacheResult<()> {
        self.check_available()?;
        let expires_at_ms = self
            .clock
            .as_ref()
            .map(|clock| clock.now_ms().saturating_add(ttl.as_millis() as u64));
        self.data.write().await.insert(
            key.to_string(),
            Entry {
                value,
                expires_at_ms,
            },
        );
        Ok(())
    }

    #[instrument(skip(self), fields(store = %self.name))]
    async fn remove(&self, key: &str) -> CacheResult<Option<CacheValue>> {
        self.check_available()?;
        let now_ms = self.now_ms();
        Ok(self
            .data
            .write()
            .await
            .remove(key)
            .filter(|entry| entry.is_live(now_ms))
            .map(|entry| entry.value))
    }

    #[instrument(skip(self), fields(store = %self.name))]
    async fn clear(&self) -> CacheResult<()> {
        self.check_available()?;
        self.data.write().await.clear();
        Ok(())
    }

    #[instrument(skip(self), fields(store = %self.name))]
    async fn entries(&self) -> CacheResult<Vec<(String, CacheValue)>> {
        self.check_available()?;
        let now_ms = self.now_ms();
        let data = self.data.read().await;
        Ok(data
            .iter()
            .filter(|(_, entry)| entry.is_live(now_ms))
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect())
    }

    #[instrument(skip(self, f), fields(store = %self.name))]
    async fn update(&self, key: &str, f: UpdateFn) -> CacheResult<Option<CacheValue>> {
        self.check_available()?;
        let now_ms = self.now_ms();
        let mut data = self.data.write().await;
        let live = data.get(key).filter(|entry| entry.is_live(now_ms));
        // An update keeps the remaining TTL of the entry it replaces
        let expires_at_ms = live.and_then(|entry| entry.expires_at_ms);
        let current = live.map(|entry| entry.value.clone());
        match f(current)? {
            Some(next) => {
                data.insert(
                    key.to_string(),
                    Entry {
                        value: next.clone(),
                        expires_at_ms,
                    },
                );
                Ok(Some(next))
            }
            None => {
                data.remove(key);
                Ok(None)
            }
        }
    }
}
