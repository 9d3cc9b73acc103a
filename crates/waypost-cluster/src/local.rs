//! In-process cluster engine
//!
//! `LocalGrid` simulates a cluster inside one process: every member shares
//! the same maps and receives membership events the way a real cluster
//! member would. A single-member grid is the standalone (non-distributed)
//! mode; multi-member grids drive failure scenarios in tests.
//!
//! TigerStyle: Explicit member states, bounded membership, no hidden I/O.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};
use waypost_cache::{CacheError, CacheResult, CacheStore, CacheValue, MemoryCacheStore, UpdateFn};
use waypost_core::constants::CLUSTER_MEMBERS_COUNT_MAX;
use waypost_core::{ClusterConfig, IoContext, TimeProvider};

use crate::engine::ClusterEngine;
use crate::error::{ClusterError, ClusterResult};
use crate::event::{ClusterEvent, LifecycleState};
use crate::member::MemberId;

// =============================================================================
// Grid state
// =============================================================================

/// Per-member slot; kept after a crash so the member can restart
struct MemberSlot {
    running: Arc<AtomicBool>,
    events: broadcast::Sender<ClusterEvent>,
}

impl MemberSlot {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn send(&self, event: ClusterEvent) {
        // No subscribers is not an error
        let _ = self.events.send(event);
    }
}

struct GridState {
    cluster_name: String,
    event_channel_capacity: usize,
    /// Clock for native map expiry; maps ignore TTL without one
    clock: Option<Arc<dyn TimeProvider>>,
    maps: RwLock<HashMap<String, MemoryCacheStore>>,
    members: RwLock<BTreeMap<MemberId, MemberSlot>>,
}

impl GridState {
    /// Deliver an event to every running member except `except`
    fn broadcast_to_peers(
        members: &BTreeMap<MemberId, MemberSlot>,
        except: &MemberId,
        event: &ClusterEvent,
    ) {
        for (id, slot) in members {
            if id != except && slot.is_running() {
                slot.send(event.clone());
            }
        }
    }

    async fn map(&self, name: &str) -> MemoryCacheStore {
        if let Some(store) = self.maps.read().await.get(name) {
            return store.clone();
        }
        let mut maps = self.maps.write().await;
        maps.entry(name.to_string())
            .or_insert_with(|| match &self.clock {
                Some(clock) => MemoryCacheStore::with_expiry(name, clock.clone()),
                None => MemoryCacheStore::new(name),
            })
            .clone()
    }

    async fn leave(&self, member_id: &MemberId) -> ClusterResult<()> {
        let mut members = self.members.write().await;
        let slot = members
            .get(member_id)
            .ok_or_else(|| ClusterError::member_not_found(member_id))?;
        if !slot.is_running() {
            return Err(ClusterError::not_running(member_id));
        }

        slot.send(ClusterEvent::Lifecycle(LifecycleState::ShuttingDown));
        slot.running.store(false, Ordering::SeqCst);
        slot.send(ClusterEvent::Lifecycle(LifecycleState::Shutdown));

        members.remove(member_id);
        Self::broadcast_to_peers(
            &members,
            member_id,
            &ClusterEvent::MemberRemoved(member_id.clone()),
        );

        info!(cluster = %self.cluster_name, member_id = %member_id, "Member left");
        Ok(())
    }
}

// =============================================================================
// LocalGrid
// =============================================================================

/// In-process cluster
///
/// Clones refer to the same grid.
#[derive(Clone)]
pub struct LocalGrid {
    state: Arc<GridState>,
}

impl LocalGrid {
    /// Create an empty grid whose maps ignore TTL
    ///
    /// # Panics
    /// Panics if `event_channel_capacity` is zero. `from_config` callers are
    /// covered by `WaypostConfig::validate`.
    pub fn new(cluster_name: impl Into<String>, event_channel_capacity: usize) -> Self {
        Self::build(cluster_name.into(), event_channel_capacity, None)
    }

    /// Create an empty grid whose maps expire entries against `clock`
    ///
    /// # Panics
    /// Panics if `event_channel_capacity` is zero. `from_config` callers are
    /// covered by `WaypostConfig::validate`.
    pub fn with_expiry(
        cluster_name: impl Into<String>,
        event_channel_capacity: usize,
        clock: Arc<dyn TimeProvider>,
    ) -> Self {
        Self::build(cluster_name.into(), event_channel_capacity, Some(clock))
    }

    /// Create an empty grid from configuration, with native map expiry
    pub fn from_config(config: &ClusterConfig, io: &IoContext) -> Self {
        Self::with_expiry(
            config.cluster_name.clone(),
            config.event_channel_capacity,
            io.time.clone(),
        )
    }

    /// Single-member grid: the local, non-distributed mode.
    ///
    /// Uses the configured member id, or generates one.
    pub async fn standalone(
        config: &ClusterConfig,
        io: &IoContext,
    ) -> ClusterResult<Arc<LocalMember>> {
        let grid = Self::from_config(config, io);
        let member_id = match &config.member_id {
            Some(id) => MemberId::new(id.clone())?,
            None => MemberId::generate(io.rng.as_ref()),
        };
        grid.join(member_id).await
    }

    fn build(
        cluster_name: String,
        event_channel_capacity: usize,
        clock: Option<Arc<dyn TimeProvider>>,
    ) -> Self {
        assert!(event_channel_capacity > 0, "event channel capacity must be positive");
        Self {
            state: Arc::new(GridState {
                cluster_name,
                event_channel_capacity,
                clock,
                maps: RwLock::new(HashMap::new()),
                members: RwLock::new(BTreeMap::new()),
            }),
        }
    }

    /// Name of the cluster
    pub fn cluster_name(&self) -> &str {
        &self.state.cluster_name
    }

    /// Add a member. Peers receive `MemberAdded`.
    pub async fn join(&self, member_id: MemberId) -> ClusterResult<Arc<LocalMember>> {
        let mut members = self.state.members.write().await;

        if members.contains_key(&member_id) {
            return Err(ClusterError::MemberAlreadyJoined {
                member_id: member_id.to_string(),
            });
        }
        if members.len() >= CLUSTER_MEMBERS_COUNT_MAX {
            return Err(ClusterError::MemberLimitExceeded {
                count: members.len(),
                limit: CLUSTER_MEMBERS_COUNT_MAX,
            });
        }

        let (events, _) = broadcast::channel(self.state.event_channel_capacity);
        let running = Arc::new(AtomicBool::new(true));
        members.insert(
            member_id.clone(),
            MemberSlot {
                running: running.clone(),
                events: events.clone(),
            },
        );
        GridState::broadcast_to_peers(
            &members,
            &member_id,
            &ClusterEvent::MemberAdded(member_id.clone()),
        );

        info!(
            cluster = %self.state.cluster_name,
            member_id = %member_id,
            members = members.len(),
            "Member joined"
        );

        Ok(Arc::new(LocalMember {
            id: member_id,
            grid: self.state.clone(),
            running,
            events,
        }))
    }

    /// Gracefully remove a member
    pub async fn leave(&self, member_id: &MemberId) -> ClusterResult<()> {
        self.state.leave(member_id).await
    }

    /// Abrupt departure: the member does nothing on its way out, peers
    /// receive `MemberRemoved`.
    pub async fn crash(&self, member_id: &MemberId) -> ClusterResult<()> {
        let members = self.state.members.read().await;
        let slot = members
            .get(member_id)
            .ok_or_else(|| ClusterError::member_not_found(member_id))?;
        if !slot.is_running() {
            return Err(ClusterError::not_running(member_id));
        }

        slot.running.store(false, Ordering::SeqCst);
        GridState::broadcast_to_peers(
            &members,
            member_id,
            &ClusterEvent::MemberRemoved(member_id.clone()),
        );

        warn!(cluster = %self.state.cluster_name, member_id = %member_id, "Member crashed");
        Ok(())
    }

    /// Bring a crashed member back under the same identity.
    ///
    /// The member receives `Lifecycle(Started)`, peers receive `MemberAdded`.
    pub async fn restart(&self, member_id: &MemberId) -> ClusterResult<()> {
        let members = self.state.members.read().await;
        let slot = members
            .get(member_id)
            .ok_or_else(|| ClusterError::member_not_found(member_id))?;
        if slot.is_running() {
            return Err(ClusterError::MemberAlreadyJoined {
                member_id: member_id.to_string(),
            });
        }

        slot.running.store(true, Ordering::SeqCst);
        slot.send(ClusterEvent::Lifecycle(LifecycleState::Started));
        GridState::broadcast_to_peers(
            &members,
            member_id,
            &ClusterEvent::MemberAdded(member_id.clone()),
        );

        info!(cluster = %self.state.cluster_name, member_id = %member_id, "Member restarted");
        Ok(())
    }

    /// Signal a healed partition: every running member receives
    /// `Lifecycle(Merged)`.
    pub async fn merge(&self) {
        let members = self.state.members.read().await;
        for slot in members.values().filter(|slot| slot.is_running()) {
            slot.send(ClusterEvent::Lifecycle(LifecycleState::Merged));
        }
        info!(cluster = %self.state.cluster_name, "Partition merged");
    }

    /// Running members, sorted by id
    pub async fn members(&self) -> Vec<MemberId> {
        running_members(&*self.state.members.read().await)
    }
}

impl fmt::Debug for LocalGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalGrid")
            .field("cluster_name", &self.state.cluster_name)
            .finish()
    }
}

fn running_members(members: &BTreeMap<MemberId, MemberSlot>) -> Vec<MemberId> {
    members
        .iter()
        .filter(|(_, slot)| slot.is_running())
        .map(|(id, _)| id.clone())
        .collect()
}

// =============================================================================
// LocalMember
// =============================================================================

/// One member's view of a `LocalGrid`
pub struct LocalMember {
    id: MemberId,
    grid: Arc<GridState>,
    running: Arc<AtomicBool>,
    events: broadcast::Sender<ClusterEvent>,
}

impl LocalMember {
    /// Handle to the grid this member belongs to
    pub fn grid(&self) -> LocalGrid {
        LocalGrid {
            state: self.grid.clone(),
        }
    }
}

impl fmt::Debug for LocalMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalMember")
            .field("id", &self.id)
            .field("cluster_name", &self.grid.cluster_name)
            .field("running", &self.is_running())
            .finish()
    }
}

#[async_trait]
impl ClusterEngine for LocalMember {
    fn cluster_name(&self) -> &str {
        &self.grid.cluster_name
    }

    fn local_member_id(&self) -> &MemberId {
        &self.id
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn members(&self) -> Vec<MemberId> {
        running_members(&*self.grid.members.read().await)
    }

    async fn shared_map(&self, name: &str) -> ClusterResult<Arc<dyn CacheStore>> {
        if !self.is_running() {
            return Err(ClusterError::not_running(&self.id));
        }
        let store = self.grid.map(name).await;
        debug!(member_id = %self.id, map = %name, "Shared map handle issued");
        Ok(Arc::new(MemberMap {
            inner: store,
            member_id: self.id.clone(),
            running: self.running.clone(),
        }))
    }

    fn subscribe(&self) -> broadcast::Receiver<ClusterEvent> {
        self.events.subscribe()
    }

    async fn shutdown(&self) -> ClusterResult<()> {
        if !self.is_running() {
            return Err(ClusterError::not_running(&self.id));
        }
        self.grid.leave(&self.id).await
    }
}

// =============================================================================
// Member-scoped map handle
// =============================================================================

/// Shared map as seen through one member; inert once the member stops
#[derive(Debug)]
struct MemberMap {
    inner: MemoryCacheStore,
    member_id: MemberId,
    running: Arc<AtomicBool>,
}

impl MemberMap {
    fn check_active(&self) -> CacheResult<()> {
        if self.running.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CacheError::store_inactive(format!(
                "{}@{}",
                self.inner.name(),
                self.member_id
            )))
        }
    }
}

#[async_trait]
impl CacheStore for MemberMap {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn get(&self, key: &str) -> CacheResult<Option<CacheValue>> {
        self.check_active()?;
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: CacheValue) -> CacheResult<()> {
        self.check_active()?;
        self.inner.put(key, value).await
    }

    async fn put_if_absent(
        &self,
        key: &str,
        value: CacheValue,
    ) -> CacheResult<Option<CacheValue>> {
        self.check_active()?;
        self.inner.put_if_absent(key, value).await
    }

    fn supports_ttl(&self) -> bool {
        self.inner.supports_ttl()
    }

    async fn put_with_ttl(&self, key: &str, value: CacheValue, ttl: Duration) -> CacheResult<()> {
        self.check_active()?;
        self.inner.put_with_ttl(key, value, ttl).await
    }

    async fn remove(&self, key: &str) -> CacheResult<Option<CacheValue>> {
        self.check_active()?;
        self.inner.remove(key).await
    }

    async fn clear(&self) -> CacheResult<()> {
        self.check_active()?;
        self.inner.clear().await
    }

    async fn entries(&self) -> CacheResult<Vec<(String, CacheValue)>> {
        self.check_active()?;
        self.inner.entries().await
    }

    async fn update(&self, key: &str, f: UpdateFn) -> CacheResult<Option<CacheValue>> {
        self.check_active()?;
        self.inner.update(key, f).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::TryRecvError;
    use waypost_core::io::ManualClock;

    fn member(id: &str) -> MemberId {
        MemberId::new(id).unwrap()
    }

    fn drain(rx: &mut broadcast::Receiver<ClusterEvent>) -> Vec<ClusterEvent> {
        let mut events = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return events,
                Err(TryRecvError::Lagged(_)) => continue,
            }
        }
    }

    #[test]
    #[should_panic(expected = "event channel capacity must be positive")]
    fn test_zero_event_capacity_panics() {
        let _ = LocalGrid::new("test", 0);
    }

    #[tokio::test]
    async fn test_join_notifies_peers() {
        let grid = LocalGrid::new("test", 16);
        let m1 = grid.join(member("m1")).await.unwrap();
        let mut rx1 = m1.subscribe();

        grid.join(member("m2")).await.unwrap();

        assert_eq!(drain(&mut rx1), vec![ClusterEvent::MemberAdded(member("m2"))]);
        assert_eq!(m1.members().await, vec![member("m1"), member("m2")]);
    }

    #[tokio::test]
    async fn test_duplicate_join_rejected() {
        let grid = LocalGrid::new("test", 16);
        grid.join(member("m1")).await.unwrap();
        assert!(matches!(
            grid.join(member("m1")).await,
            Err(ClusterError::MemberAlreadyJoined { .. })
        ));
    }

    #[tokio::test]
    async fn test_maps_are_shared() {
        let grid = LocalGrid::new("test", 16);
        let m1 = grid.join(member("m1")).await.unwrap();
        let m2 = grid.join(member("m2")).await.unwrap();

        let map1 = m1.shared_map("dir").await.unwrap();
        let map2 = m2.shared_map("dir").await.unwrap();
        map1.put("k", CacheValue::from("v")).await.unwrap();

        assert_eq!(map2.get("k").await.unwrap(), Some(CacheValue::from("v")));
    }

    #[tokio::test]
    async fn test_crash_and_restart() {
        let grid = LocalGrid::new("test", 16);
        let m1 = grid.join(member("m1")).await.unwrap();
        let m2 = grid.join(member("m2")).await.unwrap();
        let mut rx1 = m1.subscribe();
        let mut rx2 = m2.subscribe();
        let map2 = m2.shared_map("dir").await.unwrap();

        grid.crash(&member("m2")).await.unwrap();
        assert!(!m2.is_running());
        assert_eq!(drain(&mut rx1), vec![ClusterEvent::MemberRemoved(member("m2"))]);
        assert!(drain(&mut rx2).is_empty());
        assert!(map2.get("k").await.unwrap_err().is_inactive());
        assert_eq!(grid.members().await, vec![member("m1")]);

        grid.restart(&member("m2")).await.unwrap();
        assert!(m2.is_running());
        assert_eq!(drain(&mut rx1), vec![ClusterEvent::MemberAdded(member("m2"))]);
        assert_eq!(
            drain(&mut rx2),
            vec![ClusterEvent::Lifecycle(LifecycleState::Started)]
        );
        assert!(map2.get("k").await.is_ok());
    }

    #[tokio::test]
    async fn test_shutdown_twice_is_not_running() {
        let grid = LocalGrid::new("test", 16);
        let m1 = grid.join(member("m1")).await.unwrap();
        let m2 = grid.join(member("m2")).await.unwrap();
        let mut own = m1.subscribe();
        let mut peer = m2.subscribe();

        m1.shutdown().await.unwrap();
        assert_eq!(
            drain(&mut own),
            vec![
                ClusterEvent::Lifecycle(LifecycleState::ShuttingDown),
                ClusterEvent::Lifecycle(LifecycleState::Shutdown),
            ]
        );
        assert_eq!(drain(&mut peer), vec![ClusterEvent::MemberRemoved(member("m1"))]);

        assert!(m1.shutdown().await.unwrap_err().is_not_running());
        assert!(m1.shared_map("dir").await.is_err());
    }

    #[tokio::test]
    async fn test_merge_reaches_running_members() {
        let grid = LocalGrid::new("test", 16);
        let m1 = grid.join(member("m1")).await.unwrap();
        let m2 = grid.join(member("m2")).await.unwrap();
        let mut rx1 = m1.subscribe();
        let mut rx2 = m2.subscribe();
        grid.crash(&member("m2")).await.unwrap();
        drain(&mut rx1);

        grid.merge().await;

        assert_eq!(
            drain(&mut rx1),
            vec![ClusterEvent::Lifecycle(LifecycleState::Merged)]
        );
        assert!(drain(&mut rx2).is_empty());
    }

    #[tokio::test]
    async fn test_grid_maps_expire() {
        let clock = Arc::new(ManualClock::new(0));
        let grid = LocalGrid::with_expiry("test", 16, clock.clone());
        let m1 = grid.join(member("m1")).await.unwrap();
        let map = m1.shared_map("sessions").await.unwrap();
        assert!(map.supports_ttl());

        map.put_with_ttl("k", CacheValue::from("v"), Duration::from_secs(1))
            .await
            .unwrap();
        clock.advance_ms(1_000);
        assert!(map.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_standalone_uses_configured_id() {
        let config = ClusterConfig {
            member_id: Some("solo".into()),
            ..ClusterConfig::default()
        };
        let io = IoContext::seeded(1, 0);
        let member = LocalGrid::standalone(&config, &io).await.unwrap();
        assert_eq!(member.local_member_id().as_str(), "solo");
        assert_eq!(member.cluster_name(), "waypost");
        assert_eq!(member.grid().members().await, vec![MemberId::new("solo").unwrap()]);
    }
}
