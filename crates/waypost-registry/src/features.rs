//! Feature-flag overlay
//!
//! Features are optional capabilities a process advertises. The enabled
//! set is read at call time so toggles show up on the next publish or
//! resolve without a restart.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;
use waypost_core::constants::FEATURE_NAME_LENGTH_BYTES_MAX;
use waypost_core::FeatureConfig;

use crate::error::{RegistryError, RegistryResult};

/// Source of currently-enabled features
#[async_trait]
pub trait FeatureProvider: Send + Sync + Debug {
    /// Names of features enabled right now
    async fn enabled_features(&self) -> BTreeSet<String>;
}

/// No flag source configured: nothing is enabled
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFeatures;

#[async_trait]
impl FeatureProvider for NoFeatures {
    async fn enabled_features(&self) -> BTreeSet<String> {
        BTreeSet::new()
    }
}

/// Runtime-togglable boolean flags
#[derive(Debug, Default)]
pub struct FeatureFlags {
    flags: RwLock<BTreeMap<String, bool>>,
}

impl FeatureFlags {
    /// Create an empty flag set
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from configuration
    pub fn from_config(config: &FeatureConfig) -> Self {
        Self {
            flags: RwLock::new(config.flags.clone()),
        }
    }

    /// Set a flag
    pub async fn set(&self, name: &str, enabled: bool) -> RegistryResult<()> {
        if name.is_empty() || name.len() > FEATURE_NAME_LENGTH_BYTES_MAX {
            return Err(RegistryError::InvalidFeature {
                name: name.to_string(),
                reason: format!("length must be in 1..={}", FEATURE_NAME_LENGTH_BYTES_MAX),
            });
        }
        self.flags.write().await.insert(name.to_string(), enabled);
        info!(feature = %name, enabled, "Feature flag changed");
        Ok(())
    }

    /// Whether a flag is on
    pub async fn is_enabled(&self, name: &str) -> bool {
        self.flags.read().await.get(name).copied().unwrap_or(false)
    }
}

#[async_trait]
impl FeatureProvider for FeatureFlags {
    async fn enabled_features(&self) -> BTreeSet<String> {
        self.flags
            .read()
            .await
            .iter()
            .filter(|(_, enabled)| **enabled)
            .map(|(name, _)| name.clone())
            .collect()
    }
}
