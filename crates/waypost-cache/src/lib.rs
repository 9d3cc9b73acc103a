//! Waypost Cache
//!
//! Keyed read/write/evict gateway over pluggable backing stores.
//!
//! # Overview
//!
//! - `CacheStore`: the keyed shared map capability (local map or a
//!   distributed map handed out by a cluster engine)
//! - `MemoryCacheStore`: in-memory store, optionally with native per-entry TTL
//! - `GzipStore`: decorator gzipping string payloads transparently
//! - `CacheManager`: named store lookup, unknown names are configuration errors
//! - `CacheGateway`: typed `get` / `put_raw` / `put_smart` / `evict` /
//!   `evict_all` / `get_or_load`

pub mod error;
pub mod gateway;
pub mod gzip;
pub mod manager;
pub mod memory;
pub mod store;
pub mod value;

pub use error::{CacheError, CacheResult};
pub use gateway::{CacheGateway, WriteOpts};
pub use gzip::GzipStore;
pub use manager::{build_cache_manager, CacheManager, GzipCacheManager, MemoryCacheManager};
pub use memory::MemoryCacheStore;
pub use store::{CacheStore, LoaderFn, UpdateFn};
pub use value::CacheValue;
