//! Keyed store abstraction
//!
//! TigerStyle: Explicit atomic primitives, explicit TTL capability.
//!
//! A `CacheStore` is the shared-map capability both the cache gateway and
//! the service directory are written against. Local maps and cluster maps
//! implement it alike.

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::CacheResult;
use crate::value::CacheValue;

/// Read-modify-write function applied by `CacheStore::update`.
///
/// Receives the current value (if any) and returns the replacement;
/// `Ok(None)` removes the entry.
pub type UpdateFn =
    Box<dyn FnOnce(Option<CacheValue>) -> CacheResult<Option<CacheValue>> + Send>;

/// Loader invoked by `CacheStore::get_or_load` on a miss
pub type LoaderFn = Box<dyn FnOnce() -> CacheResult<CacheValue> + Send>;

/// Keyed shared map
#[async_trait]
pub trait CacheStore: Send + Sync + Debug {
    /// Store name
    fn name(&self) -> &str;

    /// Get a value
    async fn get(&self, key: &str) -> CacheResult<Option<CacheValue>>;

    /// Store a value, replacing any previous one
    async fn put(&self, key: &str, value: CacheValue) -> CacheResult<()>;

    /// Store a value only if the key is absent.
    ///
    /// Returns the existing value when one was present (and nothing was
    /// written), `None` when this call won.
    async fn put_if_absent(&self, key: &str, value: CacheValue)
        -> CacheResult<Option<CacheValue>>;

    /// Whether `put_with_ttl` honors the expiry
    fn supports_ttl(&self) -> bool {
        false
    }

    /// Store a value that expires after `ttl`.
    ///
    /// Stores without native expiry write the value without one.
    async fn put_with_ttl(&self, key: &str, value: CacheValue, ttl: Duration) -> CacheResult<()> {
        let _ = ttl;
        self.put(key, value).await
    }

    /// Remove a value, returning it if present
    async fn remove(&self, key: &str) -> CacheResult<Option<CacheValue>>;

    /// Remove every entry
    async fn clear(&self) -> CacheResult<()>;

    /// Snapshot of all entries
    async fn entries(&self) -> CacheResult<Vec<(String, CacheValue)>>;

    /// Snapshot of all values
    async fn values(&self) -> CacheResult<Vec<CacheValue>> {
        Ok(self
            .entries()
            .await?
            .into_iter()
            .map(|(_, value)| value)
            .collect())
    }

    /// Apply a read-modify-write to one key.
    ///
    /// The default is get-then-write and may lose concurrent updates;
    /// stores that can do better override it.
    async fn update(&self, key: &str, f: UpdateFn) -> CacheResult<Option<CacheValue>> {
        let current = self.get(key).await?;
        match f(current)? {
            Some(next) => {
                self.put(key, next.clone()).await?;
                Ok(Some(next))
            }
            None => {
                self.remove(key).await?;
                Ok(None)
            }
        }
    }

    /// Return the cached value, or load, publish and return it.
    ///
    /// When two loaders race, the value that reached the store first wins
    /// and both callers observe it.
    async fn get_or_load(&self, key: &str, loader: LoaderFn) -> CacheResult<CacheValue> {
        if let Some(existing) = self.get(key).await? {
            return Ok(existing);
        }
        let loaded = loader()?;
        match self.put_if_absent(key, loaded.clone()).await? {
            None => Ok(loaded),
            Some(winner) => Ok(winner),
        }
    }
}
