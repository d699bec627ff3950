use tokio::time::{Instant, sleep};
use tracing::{debug, info};

use crate::{
    services::{broadcast, vote_log},
    state::{FlipOutcome, SharedState},
};

/// Schedule the delayed automatic flip for a room that just became flippable.
///
/// The task captures the room's generation counter; a manual flip or a reset
/// during the delay window advances the generation and the stale task
/// self-invalidates. The room may also have disappeared entirely by the time
/// the task fires, so everything is re-fetched and re-validated then.
pub fn schedule(state: SharedState, room_id: u64, generation: u64) {
    tokio::spawn(run_scheduled(state, room_id, generation));
}

async fn run_scheduled(state: SharedState, room_id: u64, generation: u64) {
    let delay = state.config().auto_flip_delay;
    let tick = state.config().auto_flip_tick;

    // Elapsed-time recheck loop rather than a single timer firing: under
    // scheduler drift an early wakeup must not under-fire the delay.
    let scheduled_at = Instant::now();
    while scheduled_at.elapsed() < delay {
        sleep(tick).await;
    }

    let Some(room) = state.rooms().get(room_id) else {
        debug!(room_id, "auto-flip target room is gone");
        return;
    };

    let outcome = {
        let mut guard = room.lock().await;
        if guard.generation() != generation {
            debug!(room_id, "auto-flip superseded by a manual flip or reset");
            return;
        }
        if !guard.is_auto_flip() || !guard.is_flippable() {
            debug!(room_id, "auto-flip no longer applicable");
            return;
        }
        guard.flip()
    };

    if let FlipOutcome::Flipped(record) = outcome {
        info!(room_id, "auto-flip fired");
        vote_log::record_flip(&state, record);
        broadcast::broadcast_room(&state, &room).await;
    }
}
