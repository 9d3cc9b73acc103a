//! Cache gateway
//!
//! Typed read/write/evict over named stores. Two write styles:
//! - raw: recompute the whole value from its source and overwrite
//! - smart: merge a delta into whatever is stored
//!
//! TTL is forwarded to stores with native expiry and ignored elsewhere.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument};
use waypost_core::CACHE_TTL_SECONDS_MAX;

use crate::error::{CacheError, CacheResult};
use crate::manager::CacheManager;
use crate::store::CacheStore;
use crate::value::CacheValue;

/// Per-write options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOpts {
    /// Expiry in seconds; `None` or zero means no expiry
    pub ttl_seconds: Option<u32>,
    /// Correlation id attached to write logs
    pub trace_id: Option<String>,
}

impl WriteOpts {
    /// No expiry, no trace id
    pub fn none() -> Self {
        Self::default()
    }

    /// Expire after `seconds`
    pub fn ttl(seconds: u32) -> Self {
        Self {
            ttl_seconds: Some(seconds),
            trace_id: None,
        }
    }

    /// Attach a trace id
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    fn effective_ttl(&self) -> CacheResult<Option<Duration>> {
        match self.ttl_seconds {
            None | Some(0) => Ok(None),
            Some(seconds) if seconds > CACHE_TTL_SECONDS_MAX => Err(CacheError::InvalidTtl {
                seconds,
                max: CACHE_TTL_SECONDS_MAX,
            }),
            Some(seconds) => Ok(Some(Duration::from_secs(u64::from(seconds)))),
        }
    }
}

/// Typed access to named caches
#[derive(Debug, Clone)]
pub struct CacheGateway {
    manager: Arc<dyn CacheManager>,
}

impl CacheGateway {
    /// Create a gateway over a cache manager
    pub fn new(manager: Arc<dyn CacheManager>) -> Self {
        Self { manager }
    }

    /// The underlying manager
    pub fn manager(&self) -> &Arc<dyn CacheManager> {
        &self.manager
    }

    /// Look up a cache, failing on unknown names
    pub async fn require_cache(&self, name: &str) -> CacheResult<Arc<dyn CacheStore>> {
        self.manager
            .cache(name)
            .await
            .ok_or_else(|| CacheError::unknown_cache(name))
    }

    /// Read a value; `None` on miss
    pub async fn get<T: DeserializeOwned>(&self, cache: &str, key: &str) -> CacheResult<Option<T>> {
        let store = self.require_cache(cache).await?;
        store.get(key).await?.map(CacheValue::decode).transpose()
    }

    /// Recompute a value from `supplier` and overwrite whatever is stored
    #[instrument(skip(self, supplier, opts), fields(trace_id = opts.trace_id.as_deref()))]
    pub async fn put_raw<T, F>(
        &self,
        cache: &str,
        key: &str,
        supplier: F,
        opts: &WriteOpts,
    ) -> CacheResult<T>
    where
        T: Serialize + Send,
        F: FnOnce() -> T + Send,
    {
        let value = supplier();
        let store = self.require_cache(cache).await?;
        self.write(store.as_ref(), key, CacheValue::encode(&value)?, opts)
            .await?;
        Ok(value)
    }

    /// Merge `delta` into the stored value and write the result
    #[instrument(skip(self, delta, merge, opts), fields(trace_id = opts.trace_id.as_deref()))]
    pub async fn put_smart<T, F>(
        &self,
        cache: &str,
        key: &str,
        delta: T,
        merge: F,
        opts: &WriteOpts,
    ) -> CacheResult<T>
    where
        T: Serialize + DeserializeOwned + Send,
        F: FnOnce(Option<T>, T) -> T + Send,
    {
        let store = self.require_cache(cache).await?;
        let existing = store.get(key).await?.map(CacheValue::decode).transpose()?;
        let merged = merge(existing, delta);
        self.write(store.as_ref(), key, CacheValue::encode(&merged)?, opts)
            .await?;
        Ok(merged)
    }

    /// Return the cached value or load, publish and return it.
    ///
    /// Under contention the first value to reach the store wins; the
    /// loser's loaded value is discarded.
    pub async fn get_or_load<T, F>(&self, cache: &str, key: &str, loader: F) -> CacheResult<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> CacheResult<T> + Send + 'static,
    {
        let store = self.require_cache(cache).await?;
        let key_owned = key.to_string();
        let value = store
            .get_or_load(
                key,
                Box::new(move || {
                    let loaded = loader().map_err(|e| CacheError::LoaderFailed {
                        key: key_owned,
                        reason: e.to_string(),
                    })?;
                    CacheValue::encode(&loaded)
                }),
            )
            .await?;
        value.decode()
    }

    /// Remove one entry
    pub async fn evict(&self, cache: &str, key: &str) -> CacheResult<()> {
        let store = self.require_cache(cache).await?;
        store.remove(key).await?;
        Ok(())
    }

    /// Remove every entry of a cache
    pub async fn evict_all(&self, cache: &str) -> CacheResult<()> {
        let store = self.require_cache(cache).await?;
        store.clear().await
    }

    async fn write(
        &self,
        store: &dyn CacheStore,
        key: &str,
        value: CacheValue,
        opts: &WriteOpts,
    ) -> CacheResult<()> {
        match opts.effective_ttl()? {
            Some(ttl) if store.supports_ttl() => store.put_with_ttl(key, value, ttl).await,
            Some(ttl) => {
                debug!(
                    cache = %store.name(),
                    key,
                    ttl_secs = ttl.as_secs(),
                    "Store has no native expiry, ttl ignored"
                );
                store.put(key, value).await
            }
            None => store.put(key, value).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::{build_cache_manager, MemoryCacheManager};
    use waypost_core::io::ManualClock;
    use waypost_core::CacheConfig;

    fn gateway(compression: bool) -> CacheGateway {
        let config = CacheConfig {
            names: vec!["main".into()],
            compression,
            allow_dynamic: false,
        };
        CacheGateway::new(build_cache_manager(&config, None))
    }

    fn add(existing: Option<i64>, delta: i64) -> i64 {
        existing.unwrap_or(0) + delta
    }

    #[tokio::test]
    async fn test_raw_round_trip_with_compression() {
        let gateway = gateway(true);

        gateway
            .put_raw("main", "k", || "hello".to_string(), &WriteOpts::none())
            .await
            .unwrap();

        let value: Option<String> = gateway.get("main", "k").await.unwrap();
        assert_eq!(value.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_get_miss_is_none() {
        let gateway = gateway(false);
        let value: Option<String> = gateway.get("main", "missing").await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_smart_merge_accumulates() {
        let gateway = gateway(true);

        let first = gateway
            .put_smart("main", "counter", 1i64, add, &WriteOpts::none())
            .await
            .unwrap();
        assert_eq!(first, 1);

        let second = gateway
            .put_smart("main", "counter", 2i64, add, &WriteOpts::none())
            .await
            .unwrap();
        assert_eq!(second, 3);

        let stored: Option<i64> = gateway.get("main", "counter").await.unwrap();
        assert_eq!(stored, Some(3));
    }

    #[tokio::test]
    async fn test_unknown_cache_is_configuration_error() {
        let gateway = gateway(false);

        let err = gateway
            .put_raw("nope", "k", || 1u32, &WriteOpts::none())
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::UnknownCache { ref name } if name == "nope"));
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_ttl_uses_native_expiry() {
        let clock = Arc::new(ManualClock::new(0));
        let manager = MemoryCacheManager::with_expiry(["main"], false, clock.clone());
        let gateway = CacheGateway::new(Arc::new(manager));

        gateway
            .put_raw(
                "main",
                "session",
                || "token".to_string(),
                &WriteOpts::ttl(10).with_trace_id("req-1"),
            )
            .await
            .unwrap();
        assert!(gateway
            .get::<String>("main", "session")
            .await
            .unwrap()
            .is_some());

        clock.advance_ms(10_000);
        assert!(gateway
            .get::<String>("main", "session")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_ttl_ignored_without_native_expiry() {
        let gateway = gateway(false);

        gateway
            .put_raw("main", "k", || 7u32, &WriteOpts::ttl(1))
            .await
            .unwrap();
        assert_eq!(gateway.get::<u32>("main", "k").await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn test_ttl_above_limit_rejected() {
        let gateway = gateway(false);

        let err = gateway
            .put_raw(
                "main",
                "k",
                || 1u32,
                &WriteOpts::ttl(CACHE_TTL_SECONDS_MAX + 1),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::InvalidTtl { .. }));
    }

    #[tokio::test]
    async fn test_evict_and_evict_all() {
        let gateway = gateway(true);
        for key in ["a", "b", "c"] {
            gateway
                .put_raw("main", key, || key.to_string(), &WriteOpts::none())
                .await
                .unwrap();
        }

        gateway.evict("main", "a").await.unwrap();
        assert!(gateway.get::<String>("main", "a").await.unwrap().is_none());
        assert!(gateway.get::<String>("main", "b").await.unwrap().is_some());

        gateway.evict_all("main").await.unwrap();
        assert!(gateway.get::<String>("main", "b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_or_load_loads_once() {
        let gateway = gateway(true);

        let first: String = gateway
            .get_or_load("main", "k", || Ok("loaded".to_string()))
            .await
            .unwrap();
        assert_eq!(first, "loaded");

        let second: String = gateway
            .get_or_load("main", "k", || Ok("other".to_string()))
            .await
            .unwrap();
        assert_eq!(second, "loaded");
    }

    #[tokio::test]
    async fn test_get_or_load_race_returns_winner() {
        let gateway = gateway(true);
        let store = gateway.require_cache("main").await.unwrap();

        // Another writer lands between the miss and the insert.
        let racer = store.clone();
        let value = store
            .get_or_load(
                "k",
                Box::new(move || {
                    let handle = tokio::runtime::Handle::current();
                    std::thread::spawn(move || {
                        handle.block_on(racer.put("k", CacheValue::from("winner")))
                    })
                    .join()
                    .unwrap()
                    .unwrap();
                    Ok(CacheValue::from("loser"))
                }),
            )
            .await
            .unwrap();

        assert_eq!(value, CacheValue::from("winner"));
        let stored: Option<String> = gateway.get("main", "k").await.unwrap();
        assert_eq!(stored.as_deref(), Some("winner"));
    }

    #[tokio::test]
    async fn test_concurrent_loaders_agree() {
        let gateway = gateway(true);
        let calls = (0..8).map(|i| {
            let gateway = gateway.clone();
            async move {
                gateway
                    .get_or_load("main", "k", move || Ok(format!("v{}", i)))
                    .await
                    .unwrap()
            }
        });

        let results: Vec<String> = futures::future::join_all(calls).await;
        assert!(results.iter().all(|r| r == &results[0]));
        let stored: Option<String> = gateway.get("main", "k").await.unwrap();
        assert_eq!(stored.as_ref(), Some(&results[0]));
    }

    #[tokio::test]
    async fn test_loader_failure_surfaces() {
        let gateway = gateway(false);

        let err = gateway
            .get_or_load::<String, _>("main", "k", || Err(CacheError::codec("boom")))
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::LoaderFailed { ref key, .. } if key == "k"));
        assert!(gateway.get::<String>("main", "k").await.unwrap().is_none());
    }
}
