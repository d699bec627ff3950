use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

/// Aggregate vote record persisted when a room flips.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoteEntity {
    /// Primary key of the vote record.
    pub id: Uuid,
    /// Room the vote was taken in.
    pub room_id: u64,
    /// When the room was created for this round.
    pub started_at: SystemTime,
    /// When the flip happened.
    pub flipped_at: SystemTime,
    /// Per-user estimations captured at flip time.
    pub estimations: Vec<EstimationEntity>,
}

/// One user's estimation inside a persisted vote record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EstimationEntity {
    /// Stable user identifier (21-character token).
    pub user_id: String,
    /// Display name at flip time.
    pub user_name: String,
    /// The numeric estimation the user placed.
    pub estimation: f64,
}

impl From<crate::state::room::FlipRecord> for VoteEntity {
    fn from(record: crate::state::room::FlipRecord) -> Self {
        Self {
            id: Uuid::new_v4(),
            room_id: record.room_id,
            started_at: record.started_at,
            flipped_at: record.flipped_at,
            estimations: record
                .estimations
                .into_iter()
                .map(|estimation| EstimationEntity {
                    user_id: estimation.user_id,
                    user_name: estimation.user_name,
                    estimation: estimation.estimation,
                })
                .collect(),
        }
    }
}
