pub mod registry;
pub mod room;
pub mod store;

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use tokio::sync::RwLock;

use crate::{
    config::AppConfig,
    dao::vote_store::VoteStore,
    error::ServiceError,
};

pub use self::registry::{ClientConnection, ConnectionId, ConnectionRegistry, MemberKey};
pub use self::room::{FlipOutcome, FlipRecord, Room, RoomStatus};
pub use self::store::{RoomHandle, RoomStore};

/// Cheaply clonable handle to the central application state.
pub type SharedState = Arc<AppState>;

/// Central application state: live rooms, connection registry, and the
/// optional persistence sink.
pub struct AppState {
    config: AppConfig,
    rooms: RoomStore,
    connections: ConnectionRegistry,
    vote_store: RwLock<Option<Arc<dyn VoteStore>>>,
    degraded: RwLock<bool>,
    heartbeats_served: AtomicU64,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`].
    ///
    /// The application starts in degraded mode until a storage backend is
    /// installed; room synchronization works either way.
    pub fn new(config: AppConfig) -> SharedState {
        Arc::new(Self {
            config,
            rooms: RoomStore::new(),
            connections: ConnectionRegistry::new(),
            vote_store: RwLock::new(None),
            degraded: RwLock::new(true),
            heartbeats_served: AtomicU64::new(0),
        })
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The collection of live rooms.
    pub fn rooms(&self) -> &RoomStore {
        &self.rooms
    }

    /// Registry of active client connections.
    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    /// Obtain a handle to the current vote store, if one is installed.
    pub async fn vote_store(&self) -> Option<Arc<dyn VoteStore>> {
        let guard = self.vote_store.read().await;
        guard.as_ref().cloned()
    }

    /// Obtain the vote store or fail with a degraded-mode error.
    pub async fn require_vote_store(&self) -> Result<Arc<dyn VoteStore>, ServiceError> {
        self.vote_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new vote store implementation and leave degraded mode.
    pub async fn set_vote_store(&self, store: Arc<dyn VoteStore>) {
        {
            let mut guard = self.vote_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        *self.degraded.read().await
    }

    /// Update the degraded flag.
    pub async fn update_degraded(&self, value: bool) {
        let mut guard = self.degraded.write().await;
        *guard = value;
    }

    /// Count one served heartbeat, for the counters endpoint.
    pub fn count_heartbeat(&self) {
        self.heartbeats_served.fetch_add(1, Ordering::Relaxed);
    }

    /// Total heartbeats served since startup.
    pub fn heartbeats_served(&self) -> u64 {
        self.heartbeats_served.load(Ordering::Relaxed)
    }
}
