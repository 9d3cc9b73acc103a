//! Transparent gzip compression
//!
//! `GzipStore` wraps any `CacheStore`: string values are gzipped on the way
//! in and gunzipped on the way out. Non-string values pass through
//! unchanged. Callers observe exactly the semantics of the inner store.

use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{CacheError, CacheResult};
use crate::store::{CacheStore, UpdateFn};
use crate::value::CacheValue;

/// Compressing decorator over another store
#[derive(Debug, Clone)]
pub struct GzipStore {
    inner: Arc<dyn CacheStore>,
}

impl GzipStore {
    /// Wrap a store
    pub fn new(inner: Arc<dyn CacheStore>) -> Self {
        Self { inner }
    }

    /// The wrapped store
    pub fn inner(&self) -> &Arc<dyn CacheStore> {
        &self.inner
    }
}

/// Gzip a string value; other variants are returned as-is
pub fn compress(value: CacheValue) -> CacheResult<CacheValue> {
    let text = match value {
        CacheValue::Text(text) => text,
        other => return Ok(other),
    };
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(text.as_bytes())
        .map_err(|e| CacheError::Compression {
            reason: e.to_string(),
        })?;
    let compressed = encoder.finish().map_err(|e| CacheError::Compression {
        reason: e.to_string(),
    })?;
    Ok(CacheValue::Compressed(Bytes::from(compressed)))
}

/// Gunzip a compressed value; other variants are returned as-is
pub fn decompress(value: CacheValue) -> CacheResult<CacheValue> {
    let payload = match value {
        CacheValue::Compressed(payload) => payload,
        other => return Ok(other),
    };
    let mut decoder = GzDecoder::new(&payload[..]);
    let mut text = String::new();
    decoder
        .read_to_string(&mut text)
        .map_err(|e| CacheError::Compression {
            reason: e.to_string(),
        })?;
    Ok(CacheValue::Text(text))
}

fn decompress_opt(value: Option<CacheValue>) -> CacheResult<Option<CacheValue>> {
    value.map(decompress).transpose()
}

#[async_trait]
impl CacheStore for GzipStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn get(&self, key: &str) -> CacheResult<Option<CacheValue>> {
        decompress_opt(self.inner.get(key).await?)
    }

    async fn put(&self, key: &str, value: CacheValue) -> CacheResult<()> {
        self.inner.put(key, compress(value)?).await
    }

    async fn put_if_absent(
        &self,
        key: &str,
        value: CacheValue,
    ) -> CacheResult<Option<CacheValue>> {
        decompress_opt(self.inner.put_if_absent(key, compress(value)?).await?)
    }

    fn supports_ttl(&self) -> bool {
        self.inner.supports_ttl()
    }

    async fn put_with_ttl(&self, key: &str, value: CacheValue, ttl: Duration) -> CacheResult<()> {
        self.inner.put_with_ttl(key, compress(value)?, ttl).await
    }

    async fn remove(&self, key: &str) -> CacheResult<Option<CacheValue>> {
        decompress_opt(self.inner.remove(key).await?)
    }

    async fn clear(&self) -> CacheResult<()> {
        self.inner.clear().await
    }

    async fn entries(&self) -> CacheResult<Vec<(String, CacheValue)>> {
        self.inner
            .entries()
            .await?
            .into_iter()
            .map(|(key, value)| Ok((key, decompress(value)?)))
            .collect()
    }

    async fn update(&self, key: &str, f: UpdateFn) -> CacheResult<Option<CacheValue>> {
        let wrapped: UpdateFn = Box::new(move |current| {
            let next = f(decompress_opt(current)?)?;
            next.map(compress).transpose()
        });
        decompress_opt(self.inner.update(key, wrapped).await?)
    }

    // get_or_load keeps the trait default: it runs against this decorator's
    // get/put_if_absent, so the race winner is decompressed for both callers.
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCacheStore;

    fn gzip_over_memory() -> (GzipStore, MemoryCacheStore) {
        let memory = MemoryCacheStore::new("zipped");
        (GzipStore::new(Arc::new(memory.clone())), memory)
    }

    #[tokio::test]
    async fn test_strings_are_compressed_at_rest() {
        let (store, raw) = gzip_over_memory();
        let text = "registry ".repeat(100);

        store.put("k", CacheValue::from(text.as_str())).await.unwrap();

        let at_rest = raw.get("k").await.unwrap().unwrap();
        assert!(at_rest.is_compressed());
        assert!(at_rest.size_bytes() < text.len());

        let read = store.get("k").await.unwrap().unwrap();
        assert_eq!(read.as_text(), Some(text.as_str()));
    }

    #[tokio::test]
    async fn test_non_strings_pass_through() {
        let (store, raw) = gzip_over_memory();
        let value = CacheValue::Json(serde_json::json!({"n": 1}));

        store.put("k", value.clone()).await.unwrap();

        assert_eq!(raw.get("k").await.unwrap(), Some(value.clone()));
        assert_eq!(store.get("k").await.unwrap(), Some(value));
    }

    #[tokio::test]
    async fn test_put_if_absent_returns_decompressed_winner() {
        let (store, _raw) = gzip_over_memory();

        assert!(store
            .put_if_absent("k", CacheValue::from("first"))
            .await
            .unwrap()
            .is_none());
        let existing = store
            .put_if_absent("k", CacheValue::from("second"))
            .await
            .unwrap();
        assert_eq!(existing, Some(CacheValue::from("first")));
    }

    #[tokio::test]
    async fn test_update_sees_plain_text() {
        let (store, raw) = gzip_over_memory();
        store.put("k", CacheValue::from("a")).await.unwrap();

        store
            .update(
                "k",
                Box::new(|current| {
                    let mut text = current
                        .and_then(|v| v.as_text().map(str::to_string))
                        .unwrap_or_default();
                    text.push('b');
                    Ok(Some(CacheValue::Text(text)))
                }),
            )
            .await
            .unwrap();

        assert!(raw.get("k").await.unwrap().unwrap().is_compressed());
        assert_eq!(store.get("k").await.unwrap(), Some(CacheValue::from("ab")));
    }

    #[tokio::test]
    async fn test_get_or_load_through_decorator() {
        let (store, raw) = gzip_over_memory();

        let loaded = store
            .get_or_load("k", Box::new(|| Ok(CacheValue::from("loaded"))))
            .await
            .unwrap();
        assert_eq!(loaded, CacheValue::from("loaded"));
        assert!(raw.get("k").await.unwrap().unwrap().is_compressed());

        let again = store
            .get_or_load("k", Box::new(|| Ok(CacheValue::from("ignored"))))
            .await
            .unwrap();
        assert_eq!(again, CacheValue::from("loaded"));
    }

    #[test]
    fn test_corrupt_payload_is_compression_error() {
        let corrupt = CacheValue::Compressed(Bytes::from_static(b"not gzip"));
        assert!(matches!(
            decompress(corrupt),
            Err(CacheError::Compression { .. })
        ));
    }
}
