//! Cluster engine capability
//!
//! The registry needs three things from a cluster product: a local
//! identity, keyed maps shared by every member, and a stream of membership
//! and lifecycle events. Consensus and replication live behind this trait.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use waypost_cache::CacheStore;

use crate::error::ClusterResult;
use crate::event::ClusterEvent;
use crate::member::MemberId;

/// Cluster engine as seen from one member
#[async_trait]
pub trait ClusterEngine: Send + Sync + Debug {
    /// Name of the cluster
    fn cluster_name(&self) -> &str;

    /// Identity of this member
    fn local_member_id(&self) -> &MemberId;

    /// Whether this member is currently active
    fn is_running(&self) -> bool;

    /// Running members, this one included, sorted by id
    async fn members(&self) -> Vec<MemberId>;

    /// Handle to a cluster-wide keyed map, created on first use.
    ///
    /// Operations on the handle fail with `CacheError::StoreInactive` once
    /// this member stops running.
    async fn shared_map(&self, name: &str) -> ClusterResult<Arc<dyn CacheStore>>;

    /// Subscribe to events delivered to this member
    fn subscribe(&self) -> broadcast::Receiver<ClusterEvent>;

    /// Leave the cluster gracefully.
    ///
    /// # Errors
    /// `ClusterError::NotRunning` if this member already stopped.
    async fn shutdown(&self) -> ClusterResult<()>;
}
