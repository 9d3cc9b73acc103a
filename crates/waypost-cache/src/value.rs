//! Stored value representation
//!
//! Values are either strings, raw bytes, structured JSON, or a gzip
//! payload produced by the compression decorator. The compressed variant
//! never leaks past `GzipStore`; callers always see the decompressed form.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{CacheError, CacheResult};

/// A value held by a `CacheStore`
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    /// UTF-8 string; the only variant the gzip decorator compresses
    Text(String),
    /// Opaque binary payload
    Bytes(Bytes),
    /// Structured value
    Json(Value),
    /// Gzip-compressed UTF-8 string
    Compressed(Bytes),
}

impl CacheValue {
    /// Encode a serializable value.
    ///
    /// Plain strings become `Text` so the compression decorator can act on
    /// them; everything else is stored as structured JSON.
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> CacheResult<Self> {
        match serde_json::to_value(value)? {
            Value::String(s) => Ok(Self::Text(s)),
            other => Ok(Self::Json(other)),
        }
    }

    /// Decode into a concrete type
    pub fn decode<T: DeserializeOwned>(self) -> CacheResult<T> {
        let json = match self {
            Self::Text(s) => Value::String(s),
            Self::Json(v) => v,
            Self::Bytes(b) => Value::Array(b.iter().map(|byte| Value::from(*byte)).collect()),
            Self::Compressed(_) => {
                return Err(CacheError::codec(
                    "compressed payload read without a decompressing store",
                ))
            }
        };
        Ok(serde_json::from_value(json)?)
    }

    /// Borrow the string payload, if any
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Whether this is a gzip payload
    pub fn is_compressed(&self) -> bool {
        matches!(self, Self::Compressed(_))
    }

    /// Approximate payload size
    pub fn size_bytes(&self) -> usize {
        match self {
            Self::Text(s) => s.len(),
            Self::Bytes(b) | Self::Compressed(b) => b.len(),
            Self::Json(v) => v.to_string().len(),
        }
    }
}

impl From<String> for CacheValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for CacheValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<Bytes> for CacheValue {
    fn from(b: Bytes) -> Self {
        Self::Bytes(b)
    }
}

impl From<Value> for CacheValue {
    fn from(v: Value) -> Self {
        Self::Json(v)
    }
}
