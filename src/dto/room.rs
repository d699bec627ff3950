use std::time::SystemTime;

use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    dto::{epoch_millis, format_system_time},
    state::room::{Room, RoomStatus, User},
};

/// Literal acknowledgement sent in direct reply to a heartbeat.
pub const HEARTBEAT_ACK: &str = "ok";

/// Wire form of the derived room status.
#[derive(Debug, Clone, Copy, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RoomStatusDto {
    Estimating,
    Flippable,
    Flipped,
}

impl From<RoomStatus> for RoomStatusDto {
    fn from(status: RoomStatus) -> Self {
        match status {
            RoomStatus::Estimating => Self::Estimating,
            RoomStatus::Flippable => Self::Flippable,
            RoomStatus::Flipped => Self::Flipped,
        }
    }
}

/// Projection of one room user for external serialization.
///
/// This type structurally cannot carry a transport handle; connections live
/// in the registry side-table, never in the snapshot.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserSnapshot {
    pub id: String,
    pub name: String,
    pub estimation: Option<f64>,
    pub is_spectator: bool,
    pub is_present: bool,
}

impl From<&User> for UserSnapshot {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            estimation: user.estimation,
            is_spectator: user.is_spectator,
            is_present: user.is_present,
        }
    }
}

/// Canonical full-room snapshot carried by every room broadcast.
///
/// Delivery is at-least-once; each snapshot carries the entire current state
/// so clients apply it as an idempotent overwrite.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub id: u64,
    /// Epoch milliseconds.
    pub started_at: i64,
    /// Epoch milliseconds.
    pub last_updated: i64,
    /// Users in insertion order.
    pub users: Vec<UserSnapshot>,
    pub is_flipped: bool,
    pub is_auto_flip: bool,
    pub status: RoomStatusDto,
}

impl From<&Room> for RoomSnapshot {
    fn from(room: &Room) -> Self {
        Self {
            id: room.id(),
            started_at: epoch_millis(room.started_at()),
            last_updated: epoch_millis(room.last_updated()),
            users: room.users().values().map(UserSnapshot::from).collect(),
            is_flipped: room.is_flipped(),
            is_auto_flip: room.is_auto_flip(),
            status: room.status().into(),
        }
    }
}

/// Inline error payload sent only to the originating connection.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReply {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl ErrorReply {
    /// An error with no echoed context, for messages that never parsed.
    pub fn bare(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            action: None,
            room_id: None,
            user_id: None,
        }
    }

    /// An error echoing the action context so the client can correlate it.
    pub fn for_action(
        error: impl Into<String>,
        action: &str,
        room_id: u64,
        user_id: &str,
    ) -> Self {
        Self {
            error: error.into(),
            action: Some(action.to_owned()),
            room_id: Some(room_id),
            user_id: Some(user_id.to_owned()),
        }
    }
}

/// Notification delivered only to a kicked user's connection.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct KickNotification {
    #[serde(rename = "type")]
    kind: &'static str,
    pub message: String,
}

impl KickNotification {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            kind: "kicked",
            message: message.into(),
        }
    }
}

/// Notification delivered to every socket in a room when it is renamed.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomRenamedNotification {
    #[serde(rename = "type")]
    kind: &'static str,
    pub room_name: String,
    pub timestamp: String,
}

impl RoomRenamedNotification {
    pub fn new(room_name: impl Into<String>) -> Self {
        Self {
            kind: "roomNameChanged",
            room_name: room_name.into(),
            timestamp: format_system_time(SystemTime::now()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_serializes_camel_case_without_handles() {
        let mut room = Room::new(9);
        room.add_or_rejoin_user("V1StGXR8_Z5jdHi6B-myT", "ada");
        let snapshot = RoomSnapshot::from(&room);
        let json = serde_json::to_value(&snapshot).unwrap();

        assert_eq!(json["id"], 9);
        assert_eq!(json["status"], "estimating");
        assert_eq!(json["users"][0]["isSpectator"], false);
        assert_eq!(json["users"][0]["estimation"], serde_json::Value::Null);
        // Nothing transport-shaped may leak into the wire form.
        assert!(json["users"][0].get("tx").is_none());
        assert!(json.get("connections").is_none());
    }

    #[test]
    fn notifications_carry_their_type_markers() {
        let kick = serde_json::to_value(KickNotification::new("kicked by moderator")).unwrap();
        assert_eq!(kick["type"], "kicked");

        let renamed = serde_json::to_value(RoomRenamedNotification::new("sprint 12")).unwrap();
        assert_eq!(renamed["type"], "roomNameChanged");
        assert_eq!(renamed["roomName"], "sprint 12");
        assert!(renamed["timestamp"].is_string());
    }

    #[test]
    fn error_reply_omits_absent_context() {
        let bare = serde_json::to_value(ErrorReply::bare("boom")).unwrap();
        assert_eq!(bare["error"], "boom");
        assert!(bare.get("action").is_none());

        let full = serde_json::to_value(ErrorReply::for_action(
            "user not found",
            "estimate",
            4,
            "V1StGXR8_Z5jdHi6B-myT",
        ))
        .unwrap();
        assert_eq!(full["action"], "estimate");
        assert_eq!(full["roomId"], 4);
    }
}
