use serde::Deserialize;
use utoipa::ToSchema;
use validator::ValidationErrors;

use crate::dto::validation::validate_user_token;

/// Envelope around every inbound client message.
///
/// `roomId` and `userId` are required on every action; the `action` field
/// discriminates the variant. Anything that fails to match a known variant is
/// rejected at the boundary, before any room is touched.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActionEnvelope {
    /// Numeric room id the action targets.
    pub room_id: u64,
    /// 21-character token of the acting user.
    pub user_id: String,
    /// The action payload, discriminated by the `action` field.
    #[serde(flatten)]
    pub action: ClientAction,
}

/// Tagged union of everything a client can ask the engine to do.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientAction {
    /// Place (or clear) a vote. Placing a vote always exits spectator mode.
    Estimate {
        /// Required on the wire; `null` clears the vote, absence is a
        /// schema error rather than an implicit clear.
        #[serde(deserialize_with = "required_nullable_number")]
        estimation: Option<f64>,
    },
    /// Toggle another (or one's own) spectator flag.
    SetSpectator {
        target_user_id: String,
        is_spectator: bool,
    },
    /// Start a fresh voting round.
    Reset,
    /// Toggle the automatic flip for the room.
    SetAutoFlip { is_auto_flip: bool },
    /// Reveal all votes; rejected while the room is not flippable.
    Flip,
    /// Leave the room and drop the connection mapping.
    Leave,
    /// Re-enter a room after a reconnect, preserving prior vote state.
    Rejoin { username: String },
    /// Rename the acting user.
    ChangeUsername { username: String },
    /// Propagate a room rename notification to every socket in the room.
    ChangeRoomName { room_name: String },
    /// Remove another user from the room.
    Kick { target_user_id: String },
    /// Update the client-reported foreground/background indicator.
    SetPresence { is_present: bool },
    /// Liveness signal; answered directly, never broadcast.
    Heartbeat,
}

/// Deserialize a nullable number whose field must still be present.
///
/// Plain `Option` fields treat a missing key as `None`, which would turn a
/// malformed estimate message into a silent vote clear.
fn required_nullable_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<f64>::deserialize(deserializer)
}

impl ActionEnvelope {
    /// Parse and validate a JSON action message.
    pub fn from_json_str(payload: &str) -> Result<Self, ActionParseError> {
        let envelope: Self = serde_json::from_str(payload)?;
        envelope.validate()?;
        Ok(envelope)
    }

    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Err(err) = validate_user_token(&self.user_id) {
            errors.add("userId", err);
        }
        if self.room_id == 0 {
            let mut err = validator::ValidationError::new("room_id_range");
            err.message = Some("roomId must be >= 1".into());
            errors.add("roomId", err);
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    /// The wire tag of the contained action, echoed back in error replies.
    pub fn action_tag(&self) -> &'static str {
        match self.action {
            ClientAction::Estimate { .. } => "estimate",
            ClientAction::SetSpectator { .. } => "setSpectator",
            ClientAction::Reset => "reset",
            ClientAction::SetAutoFlip { .. } => "setAutoFlip",
            ClientAction::Flip => "flip",
            ClientAction::Leave => "leave",
            ClientAction::Rejoin { .. } => "rejoin",
            ClientAction::ChangeUsername { .. } => "changeUsername",
            ClientAction::ChangeRoomName { .. } => "changeRoomName",
            ClientAction::Kick { .. } => "kick",
            ClientAction::SetPresence { .. } => "setPresence",
            ClientAction::Heartbeat => "heartbeat",
        }
    }
}

/// Why an inbound message was rejected at the boundary.
#[derive(Debug, thiserror::Error)]
pub enum ActionParseError {
    /// Malformed JSON, missing fields or an unknown `action` tag.
    #[error("invalid action message: {0}")]
    Schema(#[from] serde_json::Error),
    /// Well-formed message carrying out-of-range identifiers.
    #[error("invalid action fields: {0}")]
    Fields(#[from] ValidationErrors),
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "V1StGXR8_Z5jdHi6B-myT";

    #[test]
    fn parses_every_documented_action() {
        let cases = [
            format!(r#"{{"action":"estimate","roomId":1,"userId":"{TOKEN}","estimation":5}}"#),
            format!(
                r#"{{"action":"setSpectator","roomId":1,"userId":"{TOKEN}","targetUserId":"{TOKEN}","isSpectator":true}}"#
            ),
            format!(r#"{{"action":"reset","roomId":1,"userId":"{TOKEN}"}}"#),
            format!(
                r#"{{"action":"setAutoFlip","roomId":1,"userId":"{TOKEN}","isAutoFlip":true}}"#
            ),
            format!(r#"{{"action":"flip","roomId":1,"userId":"{TOKEN}"}}"#),
            format!(r#"{{"action":"leave","roomId":1,"userId":"{TOKEN}"}}"#),
            format!(r#"{{"action":"rejoin","roomId":1,"userId":"{TOKEN}","username":"ada"}}"#),
            format!(
                r#"{{"action":"changeUsername","roomId":1,"userId":"{TOKEN}","username":"ada"}}"#
            ),
            format!(
                r#"{{"action":"changeRoomName","roomId":1,"userId":"{TOKEN}","roomName":"sprint 12"}}"#
            ),
            format!(
                r#"{{"action":"kick","roomId":1,"userId":"{TOKEN}","targetUserId":"{TOKEN}"}}"#
            ),
            format!(
                r#"{{"action":"setPresence","roomId":1,"userId":"{TOKEN}","isPresent":false}}"#
            ),
            format!(r#"{{"action":"heartbeat","roomId":1,"userId":"{TOKEN}"}}"#),
        ];

        for payload in cases {
            ActionEnvelope::from_json_str(&payload)
                .unwrap_or_else(|err| panic!("failed to parse `{payload}`: {err}"));
        }
    }

    #[test]
    fn null_estimation_clears_a_vote() {
        let payload =
            format!(r#"{{"action":"estimate","roomId":1,"userId":"{TOKEN}","estimation":null}}"#);
        let envelope = ActionEnvelope::from_json_str(&payload).unwrap();
        assert!(matches!(
            envelope.action,
            ClientAction::Estimate { estimation: None }
        ));
    }

    #[test]
    fn estimate_without_the_estimation_field_is_rejected() {
        // Absence is not the same as null: a vote may only be cleared by an
        // explicit `"estimation": null`.
        let payload = format!(r#"{{"action":"estimate","roomId":1,"userId":"{TOKEN}"}}"#);
        assert!(matches!(
            ActionEnvelope::from_json_str(&payload),
            Err(ActionParseError::Schema(_))
        ));
    }

    #[test]
    fn unknown_action_tag_is_rejected() {
        let payload = format!(r#"{{"action":"selfDestruct","roomId":1,"userId":"{TOKEN}"}}"#);
        assert!(matches!(
            ActionEnvelope::from_json_str(&payload),
            Err(ActionParseError::Schema(_))
        ));
    }

    #[test]
    fn missing_required_fields_are_rejected() {
        let payload = format!(r#"{{"action":"estimate","userId":"{TOKEN}","estimation":3}}"#);
        assert!(ActionEnvelope::from_json_str(&payload).is_err());

        let payload = r#"{"action":"flip","roomId":1}"#;
        assert!(ActionEnvelope::from_json_str(payload).is_err());
    }

    #[test]
    fn bad_identifiers_are_rejected() {
        let payload = format!(r#"{{"action":"flip","roomId":0,"userId":"{TOKEN}"}}"#);
        assert!(matches!(
            ActionEnvelope::from_json_str(&payload),
            Err(ActionParseError::Fields(_))
        ));

        let payload = r#"{"action":"flip","roomId":1,"userId":"short"}"#;
        assert!(matches!(
            ActionEnvelope::from_json_str(payload),
            Err(ActionParseError::Fields(_))
        ));
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(ActionEnvelope::from_json_str("{not json").is_err());
    }
}
