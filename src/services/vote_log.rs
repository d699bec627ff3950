use tracing::{error, warn};

use crate::{dao::models::VoteEntity, state::FlipRecord, state::SharedState};

/// Hand a flip's vote snapshot to the persistence sink, fire-and-forget.
///
/// The in-memory flip already happened; a sink failure is reported and
/// swallowed, never rolled back into room state.
pub fn record_flip(state: &SharedState, record: FlipRecord) {
    let state = state.clone();
    tokio::spawn(async move {
        let room_id = record.room_id;
        let Some(store) = state.vote_store().await else {
            warn!(room_id, "vote store unavailable (degraded mode); flip not persisted");
            return;
        };

        if let Err(err) = store.record_vote(VoteEntity::from(record)).await {
            error!(room_id, error = %err, "failed to persist vote record");
        }
    });
}
