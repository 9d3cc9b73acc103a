//! Shared helpers for registry integration tests

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use waypost_cluster::{LocalGrid, MemberId};
use waypost_core::{StdRngProvider, DIRECTORY_NAME_DEFAULT};
use waypost_registry::{
    ClusterServiceRegistry, FeatureProvider, NetworkBinding, NoFeatures, ServiceInstance,
};

/// Poll attempts before `wait_until` gives up
const WAIT_ATTEMPTS_MAX: usize = 200;
const WAIT_INTERVAL_MS: u64 = 10;

pub fn member(id: &str) -> MemberId {
    MemberId::new(id).unwrap()
}

pub fn grid() -> LocalGrid {
    LocalGrid::new("test-cluster", 64)
}

/// Join `id` to the grid and start a registry on it
pub async fn join_with(
    grid: &LocalGrid,
    id: &str,
    seed: u64,
    features: Arc<dyn FeatureProvider>,
) -> Arc<ClusterServiceRegistry> {
    let engine = grid.join(member(id)).await.unwrap();
    let registry = ClusterServiceRegistry::new(
        engine,
        DIRECTORY_NAME_DEFAULT,
        features,
        Arc::new(StdRngProvider::with_seed(seed)),
    )
    .await
    .unwrap();
    Arc::new(registry)
}

pub async fn join(grid: &LocalGrid, id: &str) -> Arc<ClusterServiceRegistry> {
    join_with(grid, id, 1, Arc::new(NoFeatures)).await
}

/// Bound instance of `service` at `ip:port`
pub fn instance(service: &str, ip: &str, port: u16) -> ServiceInstance {
    let mut instance = ServiceInstance::new(service);
    instance.complete(NetworkBinding::new(ip, port)).unwrap();
    instance
}

/// Sorted instance ids currently in the directory
pub async fn directory_ids(registry: &ClusterServiceRegistry) -> Vec<String> {
    registry
        .directory()
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.instance_id)
        .collect()
}

/// Wait for background reconciliation to reach a condition
pub async fn wait_until<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..WAIT_ATTEMPTS_MAX {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(WAIT_INTERVAL_MS)).await;
    }
    panic!("condition not reached after {} attempts", WAIT_ATTEMPTS_MAX);
}
