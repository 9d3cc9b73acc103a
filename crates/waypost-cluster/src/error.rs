//! Cluster error types
//!
//! TigerStyle: Explicit error variants with context.

use thiserror::Error;
use waypost_cache::CacheError;

/// Cluster-specific errors
#[derive(Error, Debug)]
pub enum ClusterError {
    /// Member has left or crashed
    #[error("member {member_id} is not running")]
    NotRunning { member_id: String },

    /// Invalid member identifier
    #[error("invalid member id '{id}': {reason}")]
    InvalidMemberId { id: String, reason: String },

    /// A member with this id is already part of the cluster
    #[error("member {member_id} already joined")]
    MemberAlreadyJoined { member_id: String },

    /// No member with this id
    #[error("member not found: {member_id}")]
    MemberNotFound { member_id: String },

    /// Cluster size limit reached
    #[error("cluster member limit exceeded: {count} >= {limit}")]
    MemberLimitExceeded { count: usize, limit: usize },

    /// Shared map error
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// Core error
    #[error("core error: {0}")]
    Core(#[from] waypost_core::Error),
}

impl ClusterError {
    /// Create a not running error
    pub fn not_running(member_id: impl ToString) -> Self {
        Self::NotRunning {
            member_id: member_id.to_string(),
        }
    }

    /// Create a member not found error
    pub fn member_not_found(member_id: impl ToString) -> Self {
        Self::MemberNotFound {
            member_id: member_id.to_string(),
        }
    }

    /// Check if this error is retriable
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Cache(e) => e.is_retriable(),
            _ => false,
        }
    }

    /// Whether the member was already stopped
    pub fn is_not_running(&self) -> bool {
        matches!(self, Self::NotRunning { .. })
    }
}

/// Result type for cluster operations
pub type ClusterResult<T> = Result<T, ClusterError>;
