//! Waypost Cluster
//!
//! The cluster capability the registry rides on: membership and lifecycle
//! events, plus keyed maps shared by every member.
//!
//! # Overview
//!
//! - `ClusterEngine`: what a cluster product must provide
//! - `LocalGrid`: in-process engine for standalone mode and multi-member tests
//! - `GridCacheManager`: exposes engine shared maps as named caches

pub mod cache;
pub mod engine;
pub mod error;
pub mod event;
pub mod local;
pub mod member;

pub use cache::GridCacheManager;
pub use engine::ClusterEngine;
pub use error::{ClusterError, ClusterResult};
pub use event::{ClusterEvent, LifecycleState};
pub use local::{LocalGrid, LocalMember};
pub use member::MemberId;
