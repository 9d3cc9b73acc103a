//! Service directory
//!
//! One shared keyed collection, `instance_id -> ServiceDescriptor`. The
//! instance id is the map key, so republishing replaces in place.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use waypost_cache::{CacheError, CacheManager, CacheStore, CacheValue};

use crate::descriptor::ServiceDescriptor;
use crate::error::RegistryResult;

/// Typed view over the shared directory map
#[derive(Debug, Clone)]
pub struct Directory {
    store: Arc<dyn CacheStore>,
}

impl Directory {
    /// Wrap a shared map directly
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Open the named cache of a cache manager.
    ///
    /// # Errors
    /// `CacheError::UnknownCache` when the manager has no such cache.
    pub async fn open(manager: &dyn CacheManager, name: &str) -> RegistryResult<Self> {
        let store = manager
            .cache(name)
            .await
            .ok_or_else(|| CacheError::unknown_cache(name))?;
        Ok(Self::new(store))
    }

    /// Name of the backing map
    pub fn name(&self) -> &str {
        self.store.name()
    }

    /// Publish a descriptor under its instance id
    #[instrument(skip(self, descriptor), fields(instance_id = %descriptor.instance_id))]
    pub async fn put(&self, descriptor: &ServiceDescriptor) -> RegistryResult<()> {
        descriptor.validate()?;
        self.store
            .put(&descriptor.instance_id, descriptor.to_value()?)
            .await?;
        Ok(())
    }

    /// Look up one entry
    pub async fn get(&self, instance_id: &str) -> RegistryResult<Option<ServiceDescriptor>> {
        self.store
            .get(instance_id)
            .await?
            .map(ServiceDescriptor::from_value)
            .transpose()
    }

    /// Remove one entry by key
    #[instrument(skip(self))]
    pub async fn remove(&self, instance_id: &str) -> RegistryResult<Option<ServiceDescriptor>> {
        self.store
            .remove(instance_id)
            .await?
            .map(ServiceDescriptor::from_value)
            .transpose()
    }

    /// Snapshot of every readable entry.
    ///
    /// Entries that do not decode as descriptors are skipped.
    pub async fn list(&self) -> RegistryResult<Vec<ServiceDescriptor>> {
        let entries = self.store.entries().await?;
        let mut descriptors = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            match ServiceDescriptor::from_value(value) {
                Ok(descriptor) => descriptors.push(descriptor),
                Err(e) => warn!(directory = %self.name(), key = %key, error = %e, "Skipping unreadable entry"),
            }
        }
        descriptors.sort_by(|a, b| a.instance_id.cmp(&b.instance_id));
        Ok(descriptors)
    }

    /// Number of readable entries, consistent with `list`
    pub async fn len(&self) -> RegistryResult<usize> {
        Ok(self.list().await?.len())
    }

    /// Whether the directory is empty
    pub async fn is_empty(&self) -> RegistryResult<bool> {
        Ok(self.len().await? == 0)
    }

    /// Remove every entry matching `predicate`, returning how many went.
    ///
    /// Full scan, not atomic as a whole: writes landing mid-scan may survive.
    pub async fn remove_where<F>(&self, predicate: F) -> RegistryResult<usize>
    where
        F: Fn(&ServiceDescriptor) -> bool + Send,
    {
        let mut removed = 0;
        for descriptor in self.list().await? {
            if predicate(&descriptor) && self.store.remove(&descriptor.instance_id).await?.is_some()
            {
                debug!(instance_id = %descriptor.instance_id, "Directory entry removed");
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Remove every entry published by `member_id`
    pub async fn remove_owned_by(&self, member_id: &str) -> RegistryResult<usize> {
        let removed = self
            .remove_where(|descriptor| descriptor.owner() == Some(member_id))
            .await?;
        if removed > 0 {
            info!(directory = %self.name(), member_id = %member_id, removed, "Purged orphaned entries");
        }
        Ok(removed)
    }

    /// Drop `feature` from one entry's feature set.
    ///
    /// Goes through the store's read-modify-write primitive, which is atomic
    /// only where the store makes it so. Returns whether the feature was
    /// present.
    #[instrument(skip(self))]
    pub async fn remove_feature(&self, instance_id: &str, feature: &str) -> RegistryResult<bool> {
        let removed = Arc::new(AtomicBool::new(false));
        let flag = removed.clone();
        let feature = feature.to_string();

        self.store
            .update(
                instance_id,
                Box::new(move |current| {
                    let Some(value) = current else {
                        return Ok(None);
                    };
                    let mut descriptor: ServiceDescriptor = value.decode()?;
                    if descriptor.features.remove(&feature) {
                        flag.store(true, Ordering::SeqCst);
                    }
                    Ok(Some(CacheValue::encode(&descriptor)?))
                }),
            )
            .await?;

        Ok(removed.load(Ordering::SeqCst))
    }
}
