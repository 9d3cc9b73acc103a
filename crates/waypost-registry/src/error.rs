//! Registry error types
//!
//! TigerStyle: Explicit error variants with context.

use thiserror::Error;
use waypost_cache::CacheError;
use waypost_cluster::ClusterError;

/// Registry-specific errors
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Local instance not yet bound to the network
    #[error("local service instance not initialized")]
    NotInitialized,

    /// Descriptor or instance violates an invariant
    #[error("invalid descriptor {instance_id}: {reason}")]
    InvalidDescriptor { instance_id: String, reason: String },

    /// Feature name rejected
    #[error("invalid feature '{name}': {reason}")]
    InvalidFeature { name: String, reason: String },

    /// Directory store error
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// Cluster engine error
    #[error("cluster error: {0}")]
    Cluster(#[from] ClusterError),

    /// Core error
    #[error("core error: {0}")]
    Core(#[from] waypost_core::Error),
}

impl RegistryError {
    /// Create an invalid descriptor error
    pub fn invalid_descriptor(instance_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDescriptor {
            instance_id: instance_id.into(),
            reason: reason.into(),
        }
    }

    /// Transient failures; the caller may retry
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Cache(e) => e.is_retriable(),
            Self::Cluster(e) => e.is_retriable(),
            _ => false,
        }
    }

    /// The store or member was already shut down
    pub fn is_inactive(&self) -> bool {
        match self {
            Self::Cache(e) => e.is_inactive(),
            Self::Cluster(ClusterError::Cache(e)) => e.is_inactive(),
            Self::Cluster(e) => e.is_not_running(),
            _ => false,
        }
    }

    /// Misconfiguration; fatal at startup
    pub fn is_configuration(&self) -> bool {
        match self {
            Self::Cache(e) => e.is_configuration(),
            Self::Core(e) => e.is_configuration(),
            _ => false,
        }
    }
}

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RegistryError::invalid_descriptor("svc@1.2.3.4:80", "empty service name");
        assert!(err.to_string().contains("svc@1.2.3.4:80"));
    }

    #[test]
    fn test_classification() {
        let transient = RegistryError::from(CacheError::store_unavailable("dir", "down"));
        assert!(transient.is_retriable());
        assert!(!transient.is_inactive());

        let inactive = RegistryError::from(ClusterError::from(CacheError::store_inactive("dir")));
        assert!(inactive.is_inactive());

        let stopped = RegistryError::from(ClusterError::not_running("m1"));
        assert!(stopped.is_inactive());

        let unknown = RegistryError::from(CacheError::unknown_cache("dir"));
        assert!(unknown.is_configuration());
        assert!(!RegistryError::NotInitialized.is_retriable());
    }
}
