//! Routes validated client actions onto room state.
//!
//! Every handler follows the same shape: mutate under the room lock, capture
//! whatever the follow-up work needs, release the lock, then broadcast,
//! schedule or reply. Direct replies (heartbeat acks, error payloads) only
//! ever go to the originating connection.

use axum::extract::ws::Message;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    dto::{
        actions::{ActionEnvelope, ClientAction},
        room::{ErrorReply, HEARTBEAT_ACK, KickNotification, RoomRenamedNotification},
    },
    services::{auto_flip, broadcast, vote_log},
    state::{ConnectionId, FlipOutcome, MemberKey, RoomHandle, SharedState},
};

/// Apply one client action. Infallible from the transport's point of view:
/// every failure turns into an error payload on the originating connection.
pub async fn dispatch(
    state: &SharedState,
    connection_id: ConnectionId,
    tx: &mpsc::UnboundedSender<Message>,
    envelope: ActionEnvelope,
) {
    let action_tag = envelope.action_tag();
    let room_id = envelope.room_id;
    let user_id = envelope.user_id;

    // Rejoin is the one action allowed to (re)create its room; everything
    // else targets a room that must already exist.
    let action = match envelope.action {
        ClientAction::Rejoin { username } => {
            handle_rejoin(state, connection_id, tx, room_id, &user_id, &username).await;
            return;
        }
        action => action,
    };

    let Some(room) = state.rooms().get(room_id) else {
        debug!(room_id, user_id = %user_id, action = action_tag, "action targets unknown room");
        reply_error(tx, "unknown room", action_tag, room_id, &user_id);
        return;
    };

    match action {
        ClientAction::Heartbeat => {
            handle_heartbeat(state, tx, &room, room_id, &user_id).await;
        }
        ClientAction::Estimate { estimation } => {
            let result = {
                let mut guard = room.lock().await;
                guard
                    .set_estimation(&user_id, estimation)
                    .map(|()| (guard.needs_auto_flip(), guard.generation()))
            };
            match result {
                Ok((needs_auto_flip, generation)) => {
                    if needs_auto_flip {
                        auto_flip::schedule(state.clone(), room_id, generation);
                    }
                    broadcast::broadcast_room(state, &room).await;
                }
                Err(_) => reply_unknown_user(tx, action_tag, room_id, &user_id),
            }
        }
        ClientAction::SetSpectator {
            target_user_id,
            is_spectator,
        } => {
            let result = {
                let mut guard = room.lock().await;
                guard
                    .set_spectator(&target_user_id, is_spectator)
                    .map(|()| (guard.needs_auto_flip(), guard.generation()))
            };
            match result {
                Ok((needs_auto_flip, generation)) => {
                    if needs_auto_flip {
                        auto_flip::schedule(state.clone(), room_id, generation);
                    }
                    broadcast::broadcast_room(state, &room).await;
                }
                Err(_) => reply_unknown_user(tx, action_tag, room_id, &user_id),
            }
        }
        ClientAction::Reset => {
            {
                let mut guard = room.lock().await;
                guard.reset();
            }
            info!(room_id, user_id = %user_id, "room reset");
            broadcast::broadcast_room(state, &room).await;
        }
        ClientAction::SetAutoFlip { is_auto_flip } => {
            let (needs_auto_flip, generation) = {
                let mut guard = room.lock().await;
                guard.set_auto_flip(is_auto_flip);
                (guard.needs_auto_flip(), guard.generation())
            };
            if needs_auto_flip {
                auto_flip::schedule(state.clone(), room_id, generation);
            }
            broadcast::broadcast_room(state, &room).await;
        }
        ClientAction::Flip => {
            handle_flip(state, tx, &room, room_id, &user_id).await;
        }
        ClientAction::Leave => {
            handle_departure(state, &room, room_id, &user_id, None).await;
        }
        ClientAction::Kick { target_user_id } => {
            handle_departure(state, &room, room_id, &target_user_id, Some(&user_id)).await;
        }
        ClientAction::ChangeUsername { username } => {
            let result = {
                let mut guard = room.lock().await;
                guard.change_username(&user_id, &username)
            };
            match result {
                Ok(()) => broadcast::broadcast_room(state, &room).await,
                Err(_) => reply_unknown_user(tx, action_tag, room_id, &user_id),
            }
        }
        ClientAction::SetPresence { is_present } => {
            let result = {
                let mut guard = room.lock().await;
                guard.set_presence(&user_id, is_present)
            };
            match result {
                Ok(()) => broadcast::broadcast_room(state, &room).await,
                Err(_) => reply_unknown_user(tx, action_tag, room_id, &user_id),
            }
        }
        ClientAction::ChangeRoomName { room_name } => {
            handle_room_rename(state, &room, room_id, &room_name).await;
        }
        // Handled before the room lookup.
        ClientAction::Rejoin { .. } => unreachable!("rejoin handled above"),
    }
}

async fn handle_heartbeat(
    state: &SharedState,
    tx: &mpsc::UnboundedSender<Message>,
    room: &RoomHandle,
    room_id: u64,
    user_id: &str,
) {
    let result = {
        let mut guard = room.lock().await;
        guard.touch_heartbeat(user_id)
    };
    match result {
        Ok(()) => {
            state.count_heartbeat();
            // Literal text frame, not JSON: the client matches on the raw
            // string to measure round-trip liveness.
            if tx.send(Message::Text(HEARTBEAT_ACK.into())).is_err() {
                debug!(room_id, user_id, "heartbeat ack dropped (writer closed)");
            }
        }
        // An unknown user on heartbeat means the server evicted them while
        // the client believed itself connected; the error nudges a rejoin.
        Err(_) => reply_unknown_user(tx, "heartbeat", room_id, user_id),
    }
}

async fn handle_rejoin(
    state: &SharedState,
    connection_id: ConnectionId,
    tx: &mpsc::UnboundedSender<Message>,
    room_id: u64,
    user_id: &str,
    username: &str,
) {
    let room = state.rooms().get_or_create(room_id);
    {
        let mut guard = room.lock().await;
        guard.add_or_rejoin_user(user_id, username);
    }
    state.connections().register(
        connection_id,
        MemberKey::new(room_id, user_id),
        tx.clone(),
    );
    info!(room_id, user_id, "user rejoined");
    broadcast::broadcast_room_after(state.clone(), room_id, state.config().rejoin_grace);
}

async fn handle_flip(
    state: &SharedState,
    tx: &mpsc::UnboundedSender<Message>,
    room: &RoomHandle,
    room_id: u64,
    user_id: &str,
) {
    let outcome = {
        let mut guard = room.lock().await;
        guard.flip()
    };
    match outcome {
        FlipOutcome::Flipped(record) => {
            info!(room_id, user_id, "room flipped");
            vote_log::record_flip(state, record);
            broadcast::broadcast_room(state, room).await;
        }
        FlipOutcome::Rejected => {
            warn!(room_id, user_id, "flip rejected (room not flippable)");
            reply_error(tx, "room is not flippable", "flip", room_id, user_id);
            // The rejected flip marked the room dirty; the corrective
            // snapshot realigns any client that believed a flip happened.
            broadcast::broadcast_room(state, room).await;
        }
        FlipOutcome::AlreadyFlipped => {
            debug!(room_id, user_id, "flip ignored (already flipped)");
        }
    }
}

/// Shared tail of `leave` and `kick`: drop the user from the room, purge
/// their connection, then reconcile whatever the departure changed.
async fn handle_departure(
    state: &SharedState,
    room: &RoomHandle,
    room_id: u64,
    departing_user_id: &str,
    kicked_by: Option<&str>,
) {
    let (removed, is_empty, needs_auto_flip, generation) = {
        let mut guard = room.lock().await;
        let removed = guard.remove_user(departing_user_id);
        (
            removed,
            guard.is_empty(),
            guard.needs_auto_flip(),
            guard.generation(),
        )
    };
    if !removed {
        debug!(room_id, user_id = departing_user_id, "departure for unknown user");
        return;
    }

    let key = MemberKey::new(room_id, departing_user_id);
    if let Some(conn) = state.connections().purge_member(&key) {
        if kicked_by.is_some() {
            broadcast::send_message_to_websocket(
                &conn.tx,
                &KickNotification::new("you have been removed from the room"),
                "kick notification",
            );
        }
    }

    match kicked_by {
        Some(actor) => {
            info!(room_id, user_id = departing_user_id, kicked_by = actor, "user kicked")
        }
        None => info!(room_id, user_id = departing_user_id, "user left"),
    }

    if is_empty {
        state.rooms().remove_if_empty(room_id);
        return;
    }
    // Removing the last unvoted participant can complete the round.
    if needs_auto_flip {
        auto_flip::schedule(state.clone(), room_id, generation);
    }
    broadcast::broadcast_room(state, room).await;
}

/// Room renames carry no server-side state; the notification is relayed to
/// every socket in the room and nothing else changes.
async fn handle_room_rename(state: &SharedState, room: &RoomHandle, room_id: u64, room_name: &str) {
    let user_ids: Vec<String> = {
        let guard = room.lock().await;
        guard.users().keys().cloned().collect()
    };
    let notification = RoomRenamedNotification::new(room_name);
    for user_id in user_ids {
        let key = MemberKey::new(room_id, user_id);
        if let Some(tx) = state.connections().sender_for(&key) {
            broadcast::send_message_to_websocket(&tx, &notification, "room rename notification");
        }
    }
}

fn reply_unknown_user(
    tx: &mpsc::UnboundedSender<Message>,
    action: &str,
    room_id: u64,
    user_id: &str,
) {
    reply_error(tx, "user not found in room", action, room_id, user_id);
}

fn reply_error(
    tx: &mpsc::UnboundedSender<Message>,
    error: &str,
    action: &str,
    room_id: u64,
    user_id: &str,
) {
    broadcast::send_message_to_websocket(
        tx,
        &ErrorReply::for_action(error, action, room_id, user_id),
        "error reply",
    );
}
