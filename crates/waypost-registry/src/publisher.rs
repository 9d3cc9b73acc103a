//! Self-registration lifecycle
//!
//! Publishes, refreshes and removes the local descriptor. Every publish
//! stamps the owning member id together with the rest of the descriptor.

use std::sync::Arc;

use tracing::{debug, info};
use waypost_cluster::MemberId;

use crate::descriptor::ServiceDescriptor;
use crate::directory::Directory;
use crate::error::RegistryResult;
use crate::features::FeatureProvider;
use crate::instance::{SelfInstance, ServiceInstance};

/// Publisher of the local descriptor
#[derive(Debug)]
pub struct SelfRegistration {
    directory: Directory,
    instance: SelfInstance,
    features: Arc<dyn FeatureProvider>,
    member_id: MemberId,
}

impl SelfRegistration {
    /// Create a publisher for `member_id`
    pub fn new(directory: Directory, features: Arc<dyn FeatureProvider>, member_id: MemberId) -> Self {
        Self {
            directory,
            instance: SelfInstance::new(),
            features,
            member_id,
        }
    }

    /// Member this process runs as
    pub fn member_id(&self) -> &MemberId {
        &self.member_id
    }

    /// Local instance holder
    pub fn instance(&self) -> &SelfInstance {
        &self.instance
    }

    /// Feature source
    pub fn features(&self) -> &Arc<dyn FeatureProvider> {
        &self.features
    }

    /// Whether `complete_init` has run
    pub async fn is_initialized(&self) -> bool {
        self.instance.is_initialized().await
    }

    /// Bind the local instance and publish it.
    ///
    /// Calling again replaces the instance. When the instance id changes
    /// the previously published entry is removed, so the member keeps a
    /// single descriptor.
    pub async fn complete_init(&self, instance: ServiceInstance) -> RegistryResult<ServiceDescriptor> {
        let previous_id = match self.instance.get().await {
            Ok(previous) => previous.instance_id,
            Err(_) => None,
        };
        self.instance.set(instance).await?;
        let descriptor = self.register_self().await?;
        if let Some(previous_id) = previous_id.filter(|id| *id != descriptor.instance_id) {
            self.directory.remove(&previous_id).await?;
            info!(
                previous_instance_id = %previous_id,
                instance_id = %descriptor.instance_id,
                "Replaced self descriptor"
            );
        }
        info!(
            instance_id = %descriptor.instance_id,
            service = %descriptor.service_name,
            member_id = %self.member_id,
            "Service instance initialized"
        );
        Ok(descriptor)
    }

    /// Fresh descriptor as it would be published now
    pub async fn descriptor(&self) -> RegistryResult<ServiceDescriptor> {
        let mut descriptor = self.instance.descriptor(self.features.as_ref()).await?;
        descriptor.stamp_owner(self.member_id.as_str());
        Ok(descriptor)
    }

    /// Publish the local descriptor under its instance id
    pub async fn register_self(&self) -> RegistryResult<ServiceDescriptor> {
        let descriptor = self.descriptor().await?;
        self.directory.put(&descriptor).await?;
        debug!(
            instance_id = %descriptor.instance_id,
            features = descriptor.features.len(),
            "Self descriptor published"
        );
        Ok(descriptor)
    }

    /// Remove the local descriptor, returning whether it was present
    pub async fn unregister_self(&self) -> RegistryResult<bool> {
        let instance = self.instance.get().await?;
        let Some(instance_id) = instance.instance_id else {
            return Ok(false);
        };
        let removed = self.directory.remove(&instance_id).await?.is_some();
        info!(instance_id = %instance_id, removed, "Self descriptor unregistered");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RegistryError;
    use crate::features::FeatureFlags;
    use crate::instance::NetworkBinding;
    use waypost_cache::MemoryCacheStore;
    use waypost_core::constants::METADATA_MEMBER_ID_KEY;

    fn setup() -> (SelfRegistration, Directory, Arc<FeatureFlags>) {
        let directory = Directory::new(Arc::new(MemoryCacheStore::new("service-registry")));
        let flags = Arc::new(FeatureFlags::new());
        let registration = SelfRegistration::new(
            directory.clone(),
            flags.clone(),
            MemberId::new("m1").unwrap(),
        );
        (registration, directory, flags)
    }

    fn instance() -> ServiceInstance {
        let mut instance = ServiceInstance::new("billing");
        instance
            .complete(NetworkBinding::new("10.0.0.5", 8080))
            .unwrap();
        instance
    }

    #[tokio::test]
    async fn test_register_before_init_fails() {
        let (registration, directory, _) = setup();
        assert!(matches!(
            registration.register_self().await,
            Err(RegistryError::NotInitialized)
        ));
        assert!(directory.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_complete_init_publishes_with_owner() {
        let (registration, directory, _) = setup();

        registration.complete_init(instance()).await.unwrap();
        registration.complete_init(instance()).await.unwrap();

        let entries = directory.list().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].metadata[METADATA_MEMBER_ID_KEY], "m1");
        assert_eq!(entries[0].owner(), Some("m1"));
    }

    #[tokio::test]
    async fn test_complete_init_with_new_binding_replaces_entry() {
        let (registration, directory, _) = setup();
        registration.complete_init(instance()).await.unwrap();

        let mut moved = ServiceInstance::new("billing");
        moved
            .complete(NetworkBinding::new("10.0.0.5", 9090))
            .unwrap();
        registration.complete_init(moved).await.unwrap();

        let ids: Vec<String> = directory
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.instance_id)
            .collect();
        assert_eq!(ids, vec!["billing@10.0.0.5:9090".to_string()]);
        assert!(directory.get("billing@10.0.0.5:8080").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_republish_picks_up_feature_toggle() {
        let (registration, directory, flags) = setup();
        registration.complete_init(instance()).await.unwrap();

        flags.set("export", true).await.unwrap();
        registration.register_self().await.unwrap();

        let stored = directory.get("billing@10.0.0.5:8080").await.unwrap().unwrap();
        assert!(stored.features.contains("export"));
    }

    #[tokio::test]
    async fn test_unregister_self() {
        let (registration, directory, _) = setup();
        registration.complete_init(instance()).await.unwrap();

        assert!(registration.unregister_self().await.unwrap());
        assert!(!registration.unregister_self().await.unwrap());
        assert!(directory.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_unavailable_store_surfaces_transient_error() {
        let store = MemoryCacheStore::new("service-registry");
        let registration = SelfRegistration::new(
            Directory::new(Arc::new(store.clone())),
            Arc::new(FeatureFlags::new()),
            MemberId::new("m1").unwrap(),
        );
        registration.complete_init(instance()).await.unwrap();

        store.set_unavailable(true);
        let err = registration.register_self().await.unwrap_err();
        assert!(err.is_retriable());
    }
}
