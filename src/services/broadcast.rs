use std::time::Duration;

use axum::extract::ws::Message;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::{
    dto::room::RoomSnapshot,
    state::{MemberKey, RoomHandle, SharedState},
};

/// Serialize a payload and push it onto the provided WebSocket sender.
///
/// A serialization failure is a bug, not a transport problem; it is logged
/// and swallowed. A closed writer means a stale connection that a future
/// disconnect event or the heartbeat monitor will reconcile.
pub fn send_message_to_websocket<T>(
    tx: &mpsc::UnboundedSender<Message>,
    value: &T,
    context: &'static str,
) where
    T: ?Sized + Serialize,
{
    let payload = match serde_json::to_string(value) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, context, "failed to serialize outbound message");
            return;
        }
    };

    if tx.send(Message::Text(payload.into())).is_err() {
        debug!(context, "writer closed; dropping outbound message");
    }
}

/// Deliver the room's current snapshot to every member with an active
/// connection.
///
/// One canonical snapshot is built under the room lock, then sends happen
/// off the lock through per-connection channels; a dead recipient never
/// aborts delivery to the rest. Completing the fan-out clears the dirty flag
/// and refreshes `lastUpdated`.
pub async fn broadcast_room(state: &SharedState, room: &RoomHandle) {
    let (room_id, payload, user_ids) = {
        let mut guard = room.lock().await;
        let snapshot = RoomSnapshot::from(&*guard);
        let payload = match serde_json::to_string(&snapshot) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(room_id = guard.id(), error = %err, "failed to serialize room snapshot");
                return;
            }
        };
        let user_ids: Vec<String> = guard.users().keys().cloned().collect();
        guard.broadcast_completed();
        (guard.id(), payload, user_ids)
    };

    for user_id in user_ids {
        let key = MemberKey::new(room_id, user_id);
        // Users without a live connection are skipped, not errors: they may
        // be mid-reconnect and will receive the next snapshot.
        let Some(tx) = state.connections().sender_for(&key) else {
            continue;
        };
        if tx.send(Message::Text(payload.clone().into())).is_err() {
            warn!(
                room_id,
                user_id = %key.user_id,
                "snapshot delivery failed (stale connection)"
            );
        }
    }
}

/// Broadcast a room after a fixed grace period.
///
/// Used by rejoin so the fresh connection has settled by the time the
/// snapshot goes out. Tolerates the room having disappeared in the meantime.
pub fn broadcast_room_after(state: SharedState, room_id: u64, delay: Duration) {
    tokio::spawn(async move {
        sleep(delay).await;
        let Some(room) = state.rooms().get(room_id) else {
            return;
        };
        broadcast_room(&state, &room).await;
    });
}
