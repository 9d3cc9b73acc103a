//! Membership reconciler
//!
//! Reacts to cluster events:
//! - `MemberRemoved(m)`: purge every directory entry owned by `m`
//! - `MemberAdded(_)`: informational
//! - `Lifecycle(Merged)`: republish unconditionally
//! - `Lifecycle(Started)`: republish if this is a restart (instance already
//!   initialized), nothing on first boot
//!
//! No state beyond its two dependencies.

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use waypost_cluster::{ClusterEvent, LifecycleState};

use crate::directory::Directory;
use crate::error::RegistryResult;
use crate::publisher::SelfRegistration;

/// What handling one event did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Orphaned entries removed
    Purged(usize),
    /// Local descriptor published again
    Republished,
    /// Nothing to do
    Ignored,
}

/// Keeps the directory consistent with cluster membership
#[derive(Debug)]
pub struct MembershipReconciler {
    directory: Directory,
    registration: Arc<SelfRegistration>,
}

impl MembershipReconciler {
    /// Create a reconciler
    pub fn new(directory: Directory, registration: Arc<SelfRegistration>) -> Self {
        Self {
            directory,
            registration,
        }
    }

    /// Handle one event
    pub async fn handle(&self, event: &ClusterEvent) -> RegistryResult<ReconcileOutcome> {
        match event {
            ClusterEvent::MemberRemoved(member_id) => {
                let purged = self.directory.remove_owned_by(member_id.as_str()).await?;
                info!(member_id = %member_id, purged, "Member removed");
                Ok(ReconcileOutcome::Purged(purged))
            }
            ClusterEvent::MemberAdded(member_id) => {
                info!(member_id = %member_id, "Member added");
                Ok(ReconcileOutcome::Ignored)
            }
            ClusterEvent::Lifecycle(LifecycleState::Merged) => {
                let descriptor = self.registration.register_self().await?;
                info!(instance_id = %descriptor.instance_id, "Republished after merge");
                Ok(ReconcileOutcome::Republished)
            }
            ClusterEvent::Lifecycle(LifecycleState::Started) => {
                if !self.registration.is_initialized().await {
                    debug!("First start, publish deferred to initialization");
                    return Ok(ReconcileOutcome::Ignored);
                }
                let descriptor = self.registration.register_self().await?;
                info!(instance_id = %descriptor.instance_id, "Republished after restart");
                Ok(ReconcileOutcome::Republished)
            }
            ClusterEvent::Lifecycle(state) => {
                debug!(?state, "Lifecycle transition");
                Ok(ReconcileOutcome::Ignored)
            }
        }
    }

    /// Run the reconciler on a background task until the member shuts down
    /// or the event channel closes.
    ///
    /// Failures are logged and the task keeps going; the next refresh or
    /// lifecycle event is the retry.
    pub fn spawn(self: Arc<Self>, mut events: broadcast::Receiver<ClusterEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if let Err(e) = self.handle(&event).await {
                            warn!(?event, error = %e, retriable = e.is_retriable(), "Reconciliation failed");
                        }
                        if event == ClusterEvent::Lifecycle(LifecycleState::Shutdown) {
                            debug!("Member shut down, reconciler stopping");
                            return;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Reconciler lagged behind cluster events");
                    }
                    Err(RecvError::Closed) => {
                        debug!("Event channel closed, reconciler stopping");
                        return;
                    }
                }
            }
        })
    }
}
