//! Service registry
//!
//! TigerStyle: Explicit lifecycle, resolution never errors on "not found".
//!
//! Feature-based resolution and the bulk listings evaluate features against
//! the *local* enabled-feature set, and report descriptors with their
//! `features` replaced by that set. This is only accurate when every member
//! shares one feature configuration.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use waypost_cluster::{ClusterEngine, LocalGrid};
use waypost_core::{Error, IoContext, RegistryStrategy, RngProvider, WaypostConfig};

use crate::balancer::LoadBalancer;
use crate::descriptor::ServiceDescriptor;
use crate::directory::Directory;
use crate::error::{RegistryError, RegistryResult};
use crate::features::FeatureProvider;
use crate::instance::ServiceInstance;
use crate::publisher::SelfRegistration;
use crate::reconciler::MembershipReconciler;

/// Service registry contract
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// Bind the local instance and publish it; calling again overwrites
    async fn complete_init(&self, instance: ServiceInstance) -> RegistryResult<ServiceDescriptor>;

    /// Publish a fresh local descriptor
    async fn register_self(&self) -> RegistryResult<ServiceDescriptor>;

    /// Remove every entry of `service_name`, cluster-wide
    async fn unregister(&self, service_name: &str) -> RegistryResult<usize>;

    /// Remove one entry by instance id
    async fn unregister_instance(&self, instance_id: &str) -> RegistryResult<bool>;

    /// Drop one feature from one entry.
    ///
    /// Read-modify-write; concurrent removals on the same entry may lose
    /// updates where the store offers no atomic update.
    async fn unregister_feature(&self, instance_id: &str, feature: &str) -> RegistryResult<bool>;

    /// Internal URL of a random instance of `service_name`
    async fn resolve_internal_service_url(&self, service_name: &str)
        -> RegistryResult<Option<String>>;

    /// External URL of a random instance of `service_name` that has one
    async fn resolve_external_service_url(&self, service_name: &str)
        -> RegistryResult<Option<String>>;

    /// Internal URL of a random instance offering `feature`
    async fn resolve_internal_feature_url(&self, feature: &str) -> RegistryResult<Option<String>>;

    /// External URL of a random instance offering `feature`
    async fn resolve_external_feature_url(&self, feature: &str) -> RegistryResult<Option<String>>;

    /// All entries grouped by service name
    async fn registered_services(&self) -> RegistryResult<BTreeMap<String, Vec<ServiceDescriptor>>>;

    /// All entries grouped by enabled feature
    async fn registered_features(&self) -> RegistryResult<BTreeMap<String, Vec<ServiceDescriptor>>>;

    /// The local descriptor as it would be published now, `None` before init
    async fn self_descriptor(&self) -> RegistryResult<Option<ServiceDescriptor>>;

    /// Unregister the local instance and leave the cluster. Idempotent.
    async fn shutdown(&self) -> RegistryResult<()>;
}

/// Which URL a resolution extracts
#[derive(Debug, Clone, Copy)]
enum UrlKind {
    Internal,
    External,
}

impl UrlKind {
    fn extract(self, descriptor: ServiceDescriptor) -> Option<String> {
        match self {
            Self::Internal => Some(descriptor.internal_base_url),
            Self::External => descriptor.external_base_url,
        }
    }
}

/// Registry over a cluster engine's shared map
///
/// Runs unchanged over a single standalone member or a real cluster.
pub struct ClusterServiceRegistry {
    engine: Arc<dyn ClusterEngine>,
    directory: Directory,
    registration: Arc<SelfRegistration>,
    balancer: LoadBalancer,
    reconciler_task: Mutex<Option<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl ClusterServiceRegistry {
    /// Open the directory map and start reconciling membership events
    pub async fn new(
        engine: Arc<dyn ClusterEngine>,
        directory_name: &str,
        features: Arc<dyn FeatureProvider>,
        rng: Arc<dyn RngProvider>,
    ) -> RegistryResult<Self> {
        // Subscribe first so no event between open and spawn is missed
        let events = engine.subscribe();
        let directory = Directory::new(engine.shared_map(directory_name).await?);
        let registration = Arc::new(SelfRegistration::new(
            directory.clone(),
            features,
            engine.local_member_id().clone(),
        ));
        let reconciler = Arc::new(MembershipReconciler::new(
            directory.clone(),
            registration.clone(),
        ));
        let task = reconciler.spawn(events);

        info!(
            cluster = %engine.cluster_name(),
            member_id = %engine.local_member_id(),
            directory = %directory_name,
            "Service registry started"
        );

        Ok(Self {
            engine,
            directory,
            registration,
            balancer: LoadBalancer::new(rng),
            reconciler_task: Mutex::new(Some(task)),
            shut_down: AtomicBool::new(false),
        })
    }

    /// The shared directory
    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// The self-registration component
    pub fn registration(&self) -> &Arc<SelfRegistration> {
        &self.registration
    }

    /// The cluster engine
    pub fn engine(&self) -> &Arc<dyn ClusterEngine> {
        &self.engine
    }

    /// Republish after a configuration refresh; no-op before init
    pub async fn on_configuration_refresh(&self) -> RegistryResult<()> {
        if !self.registration.is_initialized().await {
            debug!("Configuration refreshed before initialization, nothing to publish");
            return Ok(());
        }
        self.registration.register_self().await?;
        info!("Republished after configuration refresh");
        Ok(())
    }

    async fn resolve_service(&self, service_name: &str, kind: UrlKind) -> RegistryResult<Option<String>> {
        let candidates = self
            .directory
            .list()
            .await?
            .into_iter()
            .filter(|d| d.service_name == service_name)
            .map(|d| kind.extract(d));
        let url = self.balancer.pick(candidates);
        debug!(service = %service_name, ?kind, found = url.is_some(), "Resolved service");
        Ok(url)
    }

    async fn resolve_feature(&self, feature: &str, kind: UrlKind) -> RegistryResult<Option<String>> {
        let enabled = self.registration.features().enabled_features().await;
        if !enabled.contains(feature) {
            debug!(feature = %feature, "Feature not enabled locally");
            return Ok(None);
        }
        let candidates = self
            .directory
            .list()
            .await?
            .into_iter()
            .map(|d| kind.extract(d));
        let url = self.balancer.pick(candidates);
        debug!(feature = %feature, ?kind, found = url.is_some(), "Resolved feature");
        Ok(url)
    }
}

impl std::fmt::Debug for ClusterServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterServiceRegistry")
            .field("member_id", self.engine.local_member_id())
            .field("directory", &self.directory.name())
            .field("shut_down", &self.shut_down.load(Ordering::SeqCst))
            .finish()
    }
}

#[async_trait]
impl ServiceRegistry for ClusterServiceRegistry {
    async fn complete_init(&self, instance: ServiceInstance) -> RegistryResult<ServiceDescriptor> {
        self.registration.complete_init(instance).await
    }

    async fn register_self(&self) -> RegistryResult<ServiceDescriptor> {
        self.registration.register_self().await
    }

    #[instrument(skip(self))]
    async fn unregister(&self, service_name: &str) -> RegistryResult<usize> {
        let removed = self
            .directory
            .remove_where(|d| d.service_name == service_name)
            .await?;
        info!(service = %service_name, removed, "Service unregistered");
        Ok(removed)
    }

    #[instrument(skip(self))]
    async fn unregister_instance(&self, instance_id: &str) -> RegistryResult<bool> {
        let removed = self.directory.remove(instance_id).await?.is_some();
        info!(instance_id = %instance_id, removed, "Instance unregistered");
        Ok(removed)
    }

    #[instrument(skip(self))]
    async fn unregister_feature(&self, instance_id: &str, feature: &str) -> RegistryResult<bool> {
        let removed = self.directory.remove_feature(instance_id, feature).await?;
        info!(instance_id = %instance_id, feature = %feature, removed, "Feature unregistered");
        Ok(removed)
    }

    async fn resolve_internal_service_url(
        &self,
        service_name: &str,
    ) -> RegistryResult<Option<String>> {
        self.resolve_service(service_name, UrlKind::Internal).await
    }

    async fn resolve_external_service_url(
        &self,
        service_name: &str,
    ) -> RegistryResult<Option<String>> {
        self.resolve_service(service_name, UrlKind::External).await
    }

    async fn resolve_internal_feature_url(&self, feature: &str) -> RegistryResult<Option<String>> {
        self.resolve_feature(feature, UrlKind::Internal).await
    }

    async fn resolve_external_feature_url(&self, feature: &str) -> RegistryResult<Option<String>> {
        self.resolve_feature(feature, UrlKind::External).await
    }

    async fn registered_services(&self) -> RegistryResult<BTreeMap<String, Vec<ServiceDescriptor>>> {
        let enabled = self.registration.features().enabled_features().await;
        let mut grouped: BTreeMap<String, Vec<ServiceDescriptor>> = BTreeMap::new();
        for descriptor in self.directory.list().await? {
            grouped
                .entry(descriptor.service_name.clone())
                .or_default()
                .push(descriptor.with_features(enabled.clone()));
        }
        Ok(grouped)
    }

    async fn registered_features(&self) -> RegistryResult<BTreeMap<String, Vec<ServiceDescriptor>>> {
        let enabled = self.registration.features().enabled_features().await;
        if enabled.is_empty() {
            return Ok(BTreeMap::new());
        }
        let descriptors: Vec<ServiceDescriptor> = self
            .directory
            .list()
            .await?
            .into_iter()
            .map(|d| d.with_features(enabled.clone()))
            .collect();
        if descriptors.is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(enabled
            .into_iter()
            .map(|feature| (feature, descriptors.clone()))
            .collect())
    }

    async fn self_descriptor(&self) -> RegistryResult<Option<ServiceDescriptor>> {
        match self.registration.descriptor().await {
            Ok(descriptor) => Ok(Some(descriptor)),
            Err(RegistryError::NotInitialized) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn shutdown(&self) -> RegistryResult<()> {
        if self.shut_down.load(Ordering::SeqCst) {
            debug!("Registry already shut down");
            return Ok(());
        }

        match self.registration.unregister_self().await {
            Ok(_) | Err(RegistryError::NotInitialized) => {}
            Err(e) if e.is_inactive() => {
                warn!(error = %e, "Directory already inactive, skipping unregister");
            }
            Err(e) => {
                warn!(error = %e, "Failed to unregister local instance");
            }
        }

        if let Some(task) = self.reconciler_task.lock().await.take() {
            task.abort();
        }

        match self.engine.shutdown().await {
            Ok(()) => {}
            Err(e) if e.is_not_running() => {
                warn!(error = %e, "Cluster member already stopped");
            }
            Err(e) => return Err(e.into()),
        }

        // Set only once the engine is released so a failed attempt can retry
        self.shut_down.store(true, Ordering::SeqCst);
        info!(member_id = %self.engine.local_member_id(), "Service registry shut down");
        Ok(())
    }
}

/// Wire a registry from configuration.
///
/// The standalone strategy starts a single-member local engine when none is
/// supplied; the cluster strategy requires one.
///
/// # Errors
/// Configuration problems fail fast as `RegistryError::Core`.
pub async fn start_registry(
    config: &WaypostConfig,
    engine: Option<Arc<dyn ClusterEngine>>,
    features: Arc<dyn FeatureProvider>,
    io: &IoContext,
) -> RegistryResult<Arc<ClusterServiceRegistry>> {
    config.validate()?;

    let engine = match (engine, config.registry.strategy) {
        (Some(engine), _) => engine,
        (None, RegistryStrategy::Standalone) => {
            let member: Arc<dyn ClusterEngine> = LocalGrid::standalone(&config.cluster, io).await?;
            member
        }
        (None, RegistryStrategy::Cluster) => {
            return Err(Error::invalid_configuration(
                "registry.strategy",
                "cluster strategy requires a cluster engine",
            )
            .into())
        }
    };

    let registry = ClusterServiceRegistry::new(
        engine,
        &config.registry.directory_name,
        features,
        io.rng.clone(),
    )
    .await?;
    Ok(Arc::new(registry))
}
