use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Identifier assigned to each transport connection at upgrade time.
pub type ConnectionId = Uuid;

/// The (room, user) pair a connection speaks for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberKey {
    pub room_id: u64,
    pub user_id: String,
}

impl MemberKey {
    pub fn new(room_id: u64, user_id: impl Into<String>) -> Self {
        Self {
            room_id,
            user_id: user_id.into(),
        }
    }
}

/// Handle used to push messages to a connected client.
#[derive(Clone)]
pub struct ClientConnection {
    pub connection_id: ConnectionId,
    pub tx: mpsc::UnboundedSender<Message>,
}

/// Bidirectional mapping between live transport connections and the
/// (room, user) pairs they represent.
///
/// Never the source of truth for room membership: a user can sit in a room
/// with zero active connections (briefly disconnected) without being evicted.
#[derive(Default)]
pub struct ConnectionRegistry {
    by_connection: DashMap<ConnectionId, MemberKey>,
    by_member: DashMap<MemberKey, ClientConnection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection for a (room, user) pair.
    ///
    /// Any existing registration for the same pair is purged first, which is
    /// what makes a browser refresh or reconnect silently supersede the old
    /// socket.
    pub fn register(
        &self,
        connection_id: ConnectionId,
        key: MemberKey,
        tx: mpsc::UnboundedSender<Message>,
    ) {
        if let Some((_, stale)) = self.by_member.remove(&key) {
            self.by_connection.remove(&stale.connection_id);
        }
        self.by_connection.insert(connection_id, key.clone());
        self.by_member.insert(
            key,
            ClientConnection {
                connection_id,
                tx,
            },
        );
    }

    /// Remove the mapping for a closed connection, returning the pair it held.
    ///
    /// The caller decides whether to also touch the room (explicit leave) or
    /// leave the user intact (ordinary disconnect). If a newer connection has
    /// already superseded this one for the same pair, that newer mapping is
    /// left untouched.
    pub fn unregister_by_connection(&self, connection_id: ConnectionId) -> Option<MemberKey> {
        let (_, key) = self.by_connection.remove(&connection_id)?;
        self.by_member
            .remove_if(&key, |_, conn| conn.connection_id == connection_id);
        Some(key)
    }

    /// Drop whatever connection a (room, user) pair currently holds.
    pub fn purge_member(&self, key: &MemberKey) -> Option<ClientConnection> {
        let (_, conn) = self.by_member.remove(key)?;
        self.by_connection.remove(&conn.connection_id);
        Some(conn)
    }

    /// Whether the pair currently has a live connection. Used by the
    /// broadcast fan-out to skip known-dead sockets.
    pub fn is_active(&self, key: &MemberKey) -> bool {
        self.by_member.contains_key(key)
    }

    /// Outbound sender for the pair, if it has a live connection.
    pub fn sender_for(&self, key: &MemberKey) -> Option<mpsc::UnboundedSender<Message>> {
        self.by_member.get(key).map(|conn| conn.tx.clone())
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.by_connection.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> mpsc::UnboundedSender<Message> {
        let (tx, _rx) = mpsc::unbounded_channel();
        tx
    }

    fn key() -> MemberKey {
        MemberKey::new(7, "uuuuuuuuuuuuuuuuuuuuu")
    }

    #[test]
    fn register_purges_stale_connection_for_same_pair() {
        let registry = ConnectionRegistry::new();
        let old = Uuid::new_v4();
        let new = Uuid::new_v4();

        registry.register(old, key(), channel());
        registry.register(new, key(), channel());

        assert_eq!(registry.connection_count(), 1);
        assert!(registry.is_active(&key()));
        // The superseded connection no longer maps to anything.
        assert_eq!(registry.unregister_by_connection(old), None);
        assert!(registry.is_active(&key()));
    }

    #[test]
    fn unregister_returns_held_pair() {
        let registry = ConnectionRegistry::new();
        let id = Uuid::new_v4();
        registry.register(id, key(), channel());

        assert_eq!(registry.unregister_by_connection(id), Some(key()));
        assert!(!registry.is_active(&key()));
        assert_eq!(registry.connection_count(), 0);
    }

    #[test]
    fn stale_unregister_leaves_newer_registration_alone() {
        let registry = ConnectionRegistry::new();
        let old = Uuid::new_v4();
        let new = Uuid::new_v4();
        registry.register(old, key(), channel());
        registry.register(new, key(), channel());

        // The old socket closing after the refresh must not tear down the
        // fresh registration.
        registry.unregister_by_connection(old);
        assert!(registry.is_active(&key()));
        assert!(registry.sender_for(&key()).is_some());
    }

    #[test]
    fn purge_member_clears_both_directions() {
        let registry = ConnectionRegistry::new();
        let id = Uuid::new_v4();
        registry.register(id, key(), channel());

        assert!(registry.purge_member(&key()).is_some());
        assert!(!registry.is_active(&key()));
        assert_eq!(registry.connection_count(), 0);
        assert_eq!(registry.unregister_by_connection(id), None);
    }
}
