use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::state::room::Room;

/// Handle to a live room. The mutex serializes mutations within one room;
/// different rooms are fully independent, there is no global lock. The lock
/// is never held across I/O: broadcasts snapshot under the lock and send
/// outside it.
pub type RoomHandle = Arc<Mutex<Room>>;

/// Owns the collection of live room aggregates, keyed by room id.
///
/// Rooms are created lazily on first join and deleted the instant their user
/// collection becomes empty.
#[derive(Default)]
pub struct RoomStore {
    rooms: DashMap<u64, RoomHandle>,
}

impl RoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the room, creating it if absent.
    pub fn get_or_create(&self, room_id: u64) -> RoomHandle {
        self.rooms
            .entry(room_id)
            .or_insert_with(|| Arc::new(Mutex::new(Room::new(room_id))))
            .clone()
    }

    /// Fetch an existing room.
    pub fn get(&self, room_id: u64) -> Option<RoomHandle> {
        self.rooms.get(&room_id).map(|entry| entry.clone())
    }

    /// Delete the room if its user collection is empty.
    ///
    /// Uses `try_lock` inside the shard-locked removal so a concurrent join
    /// (which goes through the same shard) cannot slip a user into a room
    /// while it is being deleted. When the lock is contended the removal is
    /// skipped; the heartbeat sweep reclaims any empty room left behind.
    pub fn remove_if_empty(&self, room_id: u64) {
        self.rooms.remove_if(&room_id, |_, room| {
            room.try_lock()
                .map(|guard| guard.is_empty())
                .unwrap_or(false)
        });
    }

    /// Snapshot of all live rooms, for the heartbeat sweep and counters.
    pub fn all(&self) -> Vec<(u64, RoomHandle)> {
        self.rooms
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }

    /// Number of live rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Total users across all rooms.
    pub async fn total_users(&self) -> usize {
        let mut total = 0;
        for (_, room) in self.all() {
            total += room.lock().await.user_count();
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_lazily_and_reuses_handles() {
        let store = RoomStore::new();
        let first = store.get_or_create(1);
        let second = store.get_or_create(1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.room_count(), 1);
        assert!(store.get(2).is_none());
    }

    #[tokio::test]
    async fn removes_only_empty_rooms() {
        let store = RoomStore::new();
        let room = store.get_or_create(1);
        room.lock().await.add_or_rejoin_user("aaaaaaaaaaaaaaaaaaaaa", "a");

        store.remove_if_empty(1);
        assert_eq!(store.room_count(), 1);

        room.lock().await.remove_user("aaaaaaaaaaaaaaaaaaaaa");
        store.remove_if_empty(1);
        assert_eq!(store.room_count(), 0);
    }

    #[tokio::test]
    async fn contended_removal_is_skipped() {
        let store = RoomStore::new();
        let room = store.get_or_create(1);
        let guard = room.lock().await;
        store.remove_if_empty(1);
        drop(guard);
        // Still present: the heartbeat sweep picks it up later.
        assert_eq!(store.room_count(), 1);
    }
}
