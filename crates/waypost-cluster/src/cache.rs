//! Named caches backed by engine shared maps

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::warn;
use waypost_cache::{CacheManager, CacheStore, GzipCacheManager};
use waypost_core::CacheConfig;

use crate::engine::ClusterEngine;

/// `CacheManager` handing out cluster-wide maps
///
/// Declared names resolve to the engine map of the same name; undeclared
/// names resolve only when dynamic creation is allowed.
#[derive(Debug)]
pub struct GridCacheManager {
    engine: Arc<dyn ClusterEngine>,
    names: RwLock<BTreeSet<String>>,
    allow_dynamic: bool,
}

impl GridCacheManager {
    /// Create a manager over `engine` with the given declared caches
    pub fn new<I, S>(engine: Arc<dyn ClusterEngine>, names: I, allow_dynamic: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            engine,
            names: RwLock::new(names.into_iter().map(Into::into).collect()),
            allow_dynamic,
        }
    }

    /// Build from configuration, adding the gzip decorator when enabled
    pub fn from_config(engine: Arc<dyn ClusterEngine>, config: &CacheConfig) -> Arc<dyn CacheManager> {
        let manager = Self::new(engine, config.names.iter().cloned(), config.allow_dynamic);
        if config.compression {
            Arc::new(GzipCacheManager::new(Arc::new(manager)))
        } else {
            Arc::new(manager)
        }
    }
}

#[async_trait]
impl CacheManager for GridCacheManager {
    async fn cache(&self, name: &str) -> Option<Arc<dyn CacheStore>> {
        let declared = self.names.read().await.contains(name);
        if !declared && !self.allow_dynamic {
            return None;
        }

        match self.engine.shared_map(name).await {
            Ok(store) => {
                if !declared {
                    self.names.write().await.insert(name.to_string());
                }
                Some(store)
            }
            Err(e) => {
                warn!(cache = %name, error = %e, "Shared map unavailable");
                None
            }
        }
    }

    async fn cache_names(&self) -> Vec<String> {
        self.names.read().await.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalGrid;
    use crate::member::MemberId;
    use waypost_cache::{CacheGateway, WriteOpts};

    #[tokio::test]
    async fn test_caches_are_cluster_wide() {
        let grid = LocalGrid::new("test", 16);
        let m1 = grid.join(MemberId::new("m1").unwrap()).await.unwrap();
        let m2 = grid.join(MemberId::new("m2").unwrap()).await.unwrap();
        let config = CacheConfig {
            names: vec!["pages".into()],
            compression: true,
            allow_dynamic: false,
        };

        let g1 = CacheGateway::new(GridCacheManager::from_config(m1, &config));
        let g2 = CacheGateway::new(GridCacheManager::from_config(m2, &config));

        g1.put_raw("pages", "home", || "<html>".to_string(), &WriteOpts::none())
            .await
            .unwrap();
        let read: Option<String> = g2.get("pages", "home").await.unwrap();
        assert_eq!(read.as_deref(), Some("<html>"));

        assert!(g1.require_cache("other").await.unwrap_err().is_configuration());
    }

    #[tokio::test]
    async fn test_dynamic_names_are_recorded() {
        let grid = LocalGrid::new("test", 16);
        let m1 = grid.join(MemberId::new("m1").unwrap()).await.unwrap();
        let manager = GridCacheManager::new(m1, Vec::<String>::new(), true);

        assert!(manager.cache("adhoc").await.is_some());
        assert_eq!(manager.cache_names().await, vec!["adhoc"]);
    }
}
