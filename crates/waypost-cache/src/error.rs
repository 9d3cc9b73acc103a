//! Cache error types
//!
//! TigerStyle: Explicit error variants with context.

use thiserror::Error;

/// Cache-specific errors
#[derive(Error, Debug)]
pub enum CacheError {
    /// No cache registered under this name
    #[error("unknown cache: {name}")]
    UnknownCache { name: String },

    /// Backing store was shut down
    #[error("store {store} is no longer active")]
    StoreInactive { store: String },

    /// Backing store temporarily unreachable
    #[error("store {store} unavailable: {reason}")]
    StoreUnavailable { store: String, reason: String },

    /// Value could not be encoded or decoded
    #[error("codec error: {reason}")]
    Codec { reason: String },

    /// Gzip compression or decompression failed
    #[error("compression error: {reason}")]
    Compression { reason: String },

    /// Loader passed to get-or-load failed
    #[error("loader failed for key {key}: {reason}")]
    LoaderFailed { key: String, reason: String },

    /// TTL outside the supported range
    #[error("invalid ttl: {seconds}s exceeds limit {max}s")]
    InvalidTtl { seconds: u32, max: u32 },
}

impl CacheError {
    /// Create an unknown cache error
    pub fn unknown_cache(name: impl Into<String>) -> Self {
        Self::UnknownCache { name: name.into() }
    }

    /// Create a store inactive error
    pub fn store_inactive(store: impl Into<String>) -> Self {
        Self::StoreInactive {
            store: store.into(),
        }
    }

    /// Create a store unavailable error
    pub fn store_unavailable(store: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            store: store.into(),
            reason: reason.into(),
        }
    }

    /// Create a codec error
    pub fn codec(reason: impl Into<String>) -> Self {
        Self::Codec {
            reason: reason.into(),
        }
    }

    /// Transient failures; the caller may retry
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }

    /// Misconfiguration; fatal at startup
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::UnknownCache { .. } | Self::InvalidTtl { .. })
    }

    /// Store already shut down
    pub fn is_inactive(&self) -> bool {
        matches!(self, Self::StoreInactive { .. })
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec {
            reason: err.to_string(),
        }
    }
}

/// Result type for cache operations
pub type CacheResult<T> = std::result::Result<T, CacheError>;
