//! Local service instance
//!
//! `ServiceInstance` is the runtime state of this process: configured
//! identity plus the network binding learned once the listener is up.
//! Every descriptor is derived from it on demand.

use std::collections::{BTreeMap, BTreeSet};

use tokio::sync::RwLock;
use waypost_core::constants::{METADATA_CONTAINER_KEY, SERVICE_NAME_UNKNOWN};
use waypost_core::InstanceConfig;

use crate::descriptor::ServiceDescriptor;
use crate::error::{RegistryError, RegistryResult};
use crate::features::FeatureProvider;

/// Network facts known once the listener is bound
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkBinding {
    /// Local address the listener is bound to
    pub ip: String,
    /// Bound port
    pub port: u16,
    /// Listener terminates TLS
    pub tls: bool,
    /// Process runs in a container
    pub container: bool,
}

impl NetworkBinding {
    /// Plain-HTTP binding outside a container
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
            tls: false,
            container: false,
        }
    }

    /// Set the TLS flag
    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    /// Set the container flag
    pub fn with_container(mut self, container: bool) -> Self {
        self.container = container;
        self
    }
}

/// Runtime state of the local service instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInstance {
    pub service_name: String,
    pub internal_ip: Option<String>,
    pub server_port: u16,
    pub ssl_enabled: bool,
    pub external_base_url: Option<String>,
    /// Set by `complete`; `None` until the instance is bound
    pub instance_id: Option<String>,
    /// Address to advertise instead of the bound one (NAT, port mapping)
    pub announced_ip: Option<String>,
    pub container_environment: bool,
    pub metadata: BTreeMap<String, String>,
}

impl ServiceInstance {
    /// Create an unbound instance for `service_name`.
    ///
    /// A blank name falls back to `unknown-service`.
    pub fn new(service_name: impl Into<String>) -> Self {
        let service_name = service_name.into();
        let service_name = if service_name.trim().is_empty() {
            SERVICE_NAME_UNKNOWN.to_string()
        } else {
            service_name
        };
        Self {
            service_name,
            internal_ip: None,
            server_port: 0,
            ssl_enabled: false,
            external_base_url: None,
            instance_id: None,
            announced_ip: None,
            container_environment: false,
            metadata: BTreeMap::new(),
        }
    }

    /// Create an unbound instance from configuration
    pub fn from_config(config: &InstanceConfig) -> Self {
        let mut instance = Self::new(config.service_name.clone().unwrap_or_default());
        instance.external_base_url = non_blank(config.external_base_url.as_deref());
        instance.announced_ip = non_blank(config.announced_ip.as_deref());
        instance.metadata = config.metadata.clone();
        instance
    }

    /// Set the external base URL
    pub fn with_external_base_url(mut self, url: impl Into<String>) -> Self {
        self.external_base_url = non_blank(Some(&url.into()));
        self
    }

    /// Set the announced IP
    pub fn with_announced_ip(mut self, ip: impl Into<String>) -> Self {
        self.announced_ip = non_blank(Some(&ip.into()));
        self
    }

    /// Fill in the network part and compute the instance id
    pub fn complete(&mut self, binding: NetworkBinding) -> RegistryResult<()> {
        if binding.ip.trim().is_empty() {
            return Err(RegistryError::invalid_descriptor(
                &self.service_name,
                "bound ip cannot be empty",
            ));
        }
        if binding.port == 0 {
            return Err(RegistryError::invalid_descriptor(
                &self.service_name,
                "bound port cannot be zero",
            ));
        }

        self.instance_id = Some(build_instance_id(
            &self.service_name,
            &binding.ip,
            binding.port,
            self.external_base_url.as_deref(),
        ));
        self.internal_ip = Some(binding.ip);
        self.server_port = binding.port;
        self.ssl_enabled = binding.tls;
        self.container_environment = binding.container;
        Ok(())
    }

    /// Whether `complete` has run
    pub fn is_complete(&self) -> bool {
        self.instance_id.is_some() && self.internal_ip.is_some()
    }

    /// Cluster-internal URL; the announced IP wins over the bound one
    pub fn internal_base_url(&self) -> Option<String> {
        let host = self.announced_ip.as_ref().or(self.internal_ip.as_ref())?;
        let scheme = if self.ssl_enabled { "https" } else { "http" };
        Some(format!("{}://{}:{}", scheme, host, self.server_port))
    }

    /// Build the descriptor with the given feature set.
    ///
    /// # Errors
    /// `NotInitialized` before `complete`.
    pub fn to_descriptor(&self, features: BTreeSet<String>) -> RegistryResult<ServiceDescriptor> {
        let (Some(instance_id), Some(internal_base_url)) =
            (self.instance_id.clone(), self.internal_base_url())
        else {
            return Err(RegistryError::NotInitialized);
        };

        let mut metadata = self.metadata.clone();
        metadata.insert(
            METADATA_CONTAINER_KEY.to_string(),
            self.container_environment.to_string(),
        );

        Ok(ServiceDescriptor {
            service_name: self.service_name.clone(),
            instance_id,
            internal_base_url,
            external_base_url: self.external_base_url.clone(),
            features,
            metadata,
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// `service@ip:port`, plus `@externalUrl` when one is configured
fn build_instance_id(service: &str, ip: &str, port: u16, external: Option<&str>) -> String {
    match external {
        Some(url) if !url.trim().is_empty() => format!("{}@{}:{}@{}", service, ip, port, url),
        _ => format!("{}@{}:{}", service, ip, port),
    }
}

/// Thread-safe holder for the local instance
///
/// Written once at startup, read from request handlers and the membership
/// reconciler alike.
#[derive(Debug, Default)]
pub struct SelfInstance {
    inner: RwLock<Option<ServiceInstance>>,
}

impl SelfInstance {
    /// Create an empty holder
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the completed instance, replacing any previous one
    pub async fn set(&self, instance: ServiceInstance) -> RegistryResult<()> {
        if !instance.is_complete() {
            return Err(RegistryError::NotInitialized);
        }
        *self.inner.write().await = Some(instance);
        Ok(())
    }

    /// Whether an instance has been installed
    pub async fn is_initialized(&self) -> bool {
        self.inner.read().await.is_some()
    }

    /// Snapshot of the current instance
    pub async fn get(&self) -> RegistryResult<ServiceInstance> {
        self.inner
            .read()
            .await
            .clone()
            .ok_or(RegistryError::NotInitialized)
    }

    /// Attach metadata published with every later descriptor
    pub async fn insert_metadata(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> RegistryResult<()> {
        let mut guard = self.inner.write().await;
        let instance = guard.as_mut().ok_or(RegistryError::NotInitialized)?;
        instance.metadata.insert(key.into(), value.into());
        Ok(())
    }

    /// Build a fresh descriptor, pulling features at call time
    pub async fn descriptor(
        &self,
        features: &dyn FeatureProvider,
    ) -> RegistryResult<ServiceDescriptor> {
        let instance = self.get().await?;
        instance.to_descriptor(features.enabled_features().await)
    }
}
