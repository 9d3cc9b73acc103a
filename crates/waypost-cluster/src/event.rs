//! Membership and lifecycle events

use serde::{Deserialize, Serialize};

use crate::member::MemberId;

/// Local lifecycle transitions of a member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Starting,
    /// Member is active; after a crash this signals a restart
    Started,
    /// View of the cluster was reconciled after a partition healed
    Merged,
    ShuttingDown,
    Shutdown,
}

/// Event delivered to each member's subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterEvent {
    /// Another member joined or came back
    MemberAdded(MemberId),
    /// Another member left, gracefully or not
    MemberRemoved(MemberId),
    /// This member changed lifecycle state
    Lifecycle(LifecycleState),
}
