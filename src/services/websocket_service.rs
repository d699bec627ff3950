//! Lifecycle of an individual client WebSocket connection.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};
use utoipa::IntoParams;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::{
    dto::{actions::ActionEnvelope, room::ErrorReply, validation::validate_user_token},
    services::{broadcast, dispatcher},
    state::{MemberKey, SharedState},
};

/// Identity a client presents in the query string of the upgrade request.
///
/// Validated before the upgrade completes; a bad token or room id is a 400,
/// never a half-open socket.
#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    /// Numeric room id, >= 1.
    pub room_id: u64,
    /// 21-character client-generated user token.
    pub user_id: String,
    /// Display name shown to the rest of the room.
    pub username: String,
}

impl Validate for ConnectParams {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.room_id == 0 {
            let mut err = ValidationError::new("room_id_range");
            err.message = Some("roomId must be >= 1".into());
            errors.add("room_id", err);
        }

        if let Err(err) = validate_user_token(&self.user_id) {
            errors.add("user_id", err);
        }

        if self.username.is_empty() {
            let mut err = ValidationError::new("username_empty");
            err.message = Some("username must not be empty".into());
            errors.add("username", err);
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Handle the full lifecycle of one client connection.
///
/// The socket is split; a dedicated writer task drains an unbounded channel
/// so outbound snapshots keep flowing while we await inbound frames. The
/// user joins (or rejoins) the room before the first frame is read, and the
/// whole room gets a snapshot immediately.
pub async fn handle_socket(state: SharedState, socket: WebSocket, params: ConnectParams) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let connection_id = Uuid::new_v4();
    let room_id = params.room_id;
    let user_id = params.user_id;

    let room = state.rooms().get_or_create(room_id);
    {
        let mut guard = room.lock().await;
        guard.add_or_rejoin_user(&user_id, &params.username);
    }
    state.connections().register(
        connection_id,
        MemberKey::new(room_id, &user_id),
        outbound_tx.clone(),
    );
    info!(room_id, user_id = %user_id, %connection_id, "client connected");

    broadcast::broadcast_room(&state, &room).await;

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => match ActionEnvelope::from_json_str(&text) {
                Ok(envelope) => {
                    dispatcher::dispatch(&state, connection_id, &outbound_tx, envelope).await;
                }
                Err(err) => {
                    // Malformed frames are answered, not fatal: the client
                    // stays connected and can send a correct message next.
                    warn!(room_id, user_id = %user_id, error = %err, "rejected inbound message");
                    broadcast::send_message_to_websocket(
                        &outbound_tx,
                        &ErrorReply::bare(err.to_string()),
                        "parse error reply",
                    );
                }
            },
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                debug!(room_id, user_id = %user_id, "client closed");
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {}
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(room_id, user_id = %user_id, error = %err, "websocket error");
                break;
            }
        }
    }

    // Only the connection mapping goes away here. The user stays in the
    // room until they leave explicitly, are kicked, or miss heartbeats;
    // a reconnect within the timeout resumes with their vote intact.
    state.connections().unregister_by_connection(connection_id);
    info!(room_id, user_id = %user_id, %connection_id, "client disconnected");

    finalize(writer_task, outbound_tx).await;
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_a_well_formed_identity() {
        let params = ConnectParams {
            room_id: 42,
            user_id: "V1StGXR8_Z5jdHi6B-myT".into(),
            username: "ada".into(),
        };
        assert!(params.validate().is_ok());
    }

    #[test]
    fn rejects_room_zero_and_short_tokens() {
        let params = ConnectParams {
            room_id: 0,
            user_id: "short".into(),
            username: "ada".into(),
        };
        let errors = params.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("room_id"));
        assert!(errors.field_errors().contains_key("user_id"));
    }

    #[test]
    fn rejects_an_empty_username() {
        let params = ConnectParams {
            room_id: 1,
            user_id: "V1StGXR8_Z5jdHi6B-myT".into(),
            username: String::new(),
        };
        assert!(params.validate().is_err());
    }
}
