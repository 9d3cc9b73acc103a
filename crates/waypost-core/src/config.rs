//! Configuration for Waypost
//!
//! TigerStyle: Explicit defaults, validation, reasonable limits.

use crate::constants::*;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Main configuration for Waypost
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WaypostConfig {
    /// Registry configuration
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Cache gateway configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Cluster configuration
    #[serde(default)]
    pub cluster: ClusterConfig,

    /// Static feature flag source
    #[serde(default)]
    pub features: FeatureConfig,
}

impl WaypostConfig {
    /// Parse a TOML document and validate it
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: Self = toml::from_str(input).map_err(|e| Error::ConfigurationParseFailed {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.registry.validate()?;
        self.cache.validate()?;
        self.cluster.validate()?;
        self.features.validate()?;
        Ok(())
    }
}

/// Which directory backend the registry runs against
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryStrategy {
    /// Single process, no cluster (local map)
    #[default]
    Standalone,

    /// Shared directory across cluster members
    Cluster,
}

/// Registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Directory backend
    #[serde(default)]
    pub strategy: RegistryStrategy,

    /// Name of the shared map holding descriptors
    #[serde(default = "default_directory_name")]
    pub directory_name: String,

    /// Local instance settings
    #[serde(default)]
    pub instance: InstanceConfig,
}

fn default_directory_name() -> String {
    DIRECTORY_NAME_DEFAULT.to_string()
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            strategy: RegistryStrategy::default(),
            directory_name: default_directory_name(),
            instance: InstanceConfig::default(),
        }
    }
}

impl RegistryConfig {
    fn validate(&self) -> Result<()> {
        validate_cache_name("registry.directory_name", &self.directory_name)?;
        self.instance.validate()
    }
}

/// Static settings for the local service instance
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceConfig {
    /// Logical service name (falls back to `unknown-service`)
    #[serde(default)]
    pub service_name: Option<String>,

    /// Address reachable from outside the cluster (reverse proxy, NAT)
    #[serde(default)]
    pub external_base_url: Option<String>,

    /// IP announced to the cluster instead of the bound one
    #[serde(default)]
    pub announced_ip: Option<String>,

    /// Static metadata merged into every published descriptor
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl InstanceConfig {
    fn validate(&self) -> Result<()> {
        if let Some(name) = &self.service_name {
            if name.trim().is_empty() {
                return Err(Error::invalid_configuration(
                    "registry.instance.service_name",
                    "must not be blank when set",
                ));
            }
            if name.len() > SERVICE_NAME_LENGTH_BYTES_MAX {
                return Err(Error::invalid_configuration(
                    "registry.instance.service_name",
                    format!(
                        "length {} exceeds limit {}",
                        name.len(),
                        SERVICE_NAME_LENGTH_BYTES_MAX
                    ),
                ));
            }
        }

        if let Some(url) = &self.external_base_url {
            if !url.trim().is_empty() && !url.contains("://") {
                return Err(Error::invalid_configuration(
                    "registry.instance.external_base_url",
                    "must be an absolute URL with a scheme",
                ));
            }
        }

        if self.metadata.len() > DESCRIPTOR_METADATA_COUNT_MAX {
            return Err(Error::invalid_configuration(
                "registry.instance.metadata",
                format!(
                    "{} entries exceeds limit {}",
                    self.metadata.len(),
                    DESCRIPTOR_METADATA_COUNT_MAX
                ),
            ));
        }

        if self.metadata.keys().any(|k| k.starts_with("registry.")) {
            return Err(Error::invalid_configuration(
                "registry.instance.metadata",
                "keys starting with `registry.` are reserved",
            ));
        }

        Ok(())
    }
}

/// Cache gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Declared cache names
    #[serde(default)]
    pub names: Vec<String>,

    /// Transparently gzip string values
    #[serde(default = "default_true")]
    pub compression: bool,

    /// Create undeclared caches on first use instead of failing
    #[serde(default)]
    pub allow_dynamic: bool,
}

fn default_true() -> bool {
    true
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            names: Vec::new(),
            compression: true,
            allow_dynamic: false,
        }
    }
}

impl CacheConfig {
    fn validate(&self) -> Result<()> {
        for name in &self.names {
            validate_cache_name("cache.names", name)?;
        }
        Ok(())
    }
}

/// Cluster configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Cluster name shared by all members
    #[serde(default = "default_cluster_name")]
    pub cluster_name: String,

    /// Member identity (generated when absent)
    #[serde(default)]
    pub member_id: Option<String>,

    /// Buffered membership events per member
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

fn default_cluster_name() -> String {
    "waypost".to_string()
}

fn default_event_channel_capacity() -> usize {
    CLUSTER_EVENT_CHANNEL_CAPACITY_DEFAULT
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            cluster_name: default_cluster_name(),
            member_id: None,
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

impl ClusterConfig {
    fn validate(&self) -> Result<()> {
        if self.cluster_name.trim().is_empty() {
            return Err(Error::invalid_configuration(
                "cluster.cluster_name",
                "must not be empty",
            ));
        }

        if self.event_channel_capacity == 0
            || self.event_channel_capacity > CLUSTER_EVENT_CHANNEL_CAPACITY_MAX
        {
            return Err(Error::invalid_configuration(
                "cluster.event_channel_capacity",
                format!(
                    "{} must be in 1..={}",
                    self.event_channel_capacity, CLUSTER_EVENT_CHANNEL_CAPACITY_MAX
                ),
            ));
        }

        if let Some(id) = &self.member_id {
            if id.is_empty() || id.len() > MEMBER_ID_LENGTH_BYTES_MAX {
                return Err(Error::invalid_configuration(
                    "cluster.member_id",
                    format!("length must be in 1..={}", MEMBER_ID_LENGTH_BYTES_MAX),
                ));
            }
        }

        Ok(())
    }
}

/// Static feature flag source: feature name -> enabled
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureConfig {
    #[serde(default)]
    pub flags: BTreeMap<String, bool>,
}

impl FeatureConfig {
    fn validate(&self) -> Result<()> {
        for name in self.flags.keys() {
            if name.is_empty() || name.len() > FEATURE_NAME_LENGTH_BYTES_MAX {
                return Err(Error::invalid_configuration(
                    "features.flags",
                    format!("feature name `{}` has invalid length", name),
                ));
            }
        }
        Ok(())
    }
}

fn validate_cache_name(field: &str, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::invalid_configuration(field, "cache name must not be empty"));
    }
    if name.len() > CACHE_NAME_LENGTH_BYTES_MAX {
        return Err(Error::invalid_configuration(
            field,
            format!(
                "cache name length {} exceeds limit {}",
                name.len(),
                CACHE_NAME_LENGTH_BYTES_MAX
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = WaypostConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.registry.strategy, RegistryStrategy::Standalone);
        assert_eq!(config.registry.directory_name, DIRECTORY_NAME_DEFAULT);
        assert!(config.cache.compression);
    }

    #[test]
    fn test_from_toml_str() {
        let config = WaypostConfig::from_toml_str(
            r#"
            [registry]
            strategy = "cluster"

            [registry.instance]
            service_name = "billing"
            external_base_url = "https://api.example.com/billing"

            [registry.instance.metadata]
            zone = "eu-west-1a"

            [cache]
            names = ["sessions", "quotas"]

            [cluster]
            cluster_name = "prod"
            member_id = "member-1"

            [features.flags]
            invoices = true
            refunds = false
            "#,
        )
        .unwrap();

        assert_eq!(config.registry.strategy, RegistryStrategy::Cluster);
        assert_eq!(config.registry.instance.service_name.as_deref(), Some("billing"));
        assert_eq!(config.registry.instance.metadata["zone"], "eu-west-1a");
        assert_eq!(config.cache.names, vec!["sessions", "quotas"]);
        assert_eq!(config.cluster.member_id.as_deref(), Some("member-1"));
        assert_eq!(config.features.flags.get("invoices"), Some(&true));
        assert_eq!(config.features.flags.get("refunds"), Some(&false));
    }

    #[test]
    fn test_unknown_strategy_fails_to_parse() {
        let err = WaypostConfig::from_toml_str("[registry]\nstrategy = \"zookeeper\"\n").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_empty_directory_name_rejected() {
        let mut config = WaypostConfig::default();
        config.registry.directory_name = "  ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_external_url_requires_scheme() {
        let mut config = WaypostConfig::default();
        config.registry.instance.external_base_url = Some("api.example.com".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reserved_metadata_key_rejected() {
        let mut config = WaypostConfig::default();
        config
            .registry
            .instance
            .metadata
            .insert(METADATA_MEMBER_ID_KEY.into(), "spoofed".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_event_capacity_rejected() {
        let mut config = WaypostConfig::default();
        config.cluster.event_channel_capacity = 0;
        assert!(config.validate().is_err());
    }
}
