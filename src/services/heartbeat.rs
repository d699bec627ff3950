//! Background presence monitor.
//!
//! Clients prove liveness with heartbeat actions; this task sweeps every
//! room on a fixed interval and evicts users whose last heartbeat is older
//! than the configured timeout, then reconciles whatever the evictions
//! changed (snapshots, auto-flip, empty-room deletion).

use tracing::info;

use crate::{
    services::{auto_flip, broadcast},
    state::{MemberKey, SharedState},
};

/// Run the sweep loop forever. Spawned once at startup.
pub async fn run(state: SharedState) {
    let mut ticker = tokio::time::interval(state.config().heartbeat_sweep_interval);
    // A slow sweep must not cause a burst of catch-up sweeps.
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        sweep(&state).await;
    }
}

/// One pass over every room: evict expired users, then reconcile.
pub async fn sweep(state: &SharedState) {
    let timeout = state.config().heartbeat_timeout;

    for (room_id, room) in state.rooms().all() {
        let (evicted, is_empty, needs_auto_flip, generation) = {
            let mut guard = room.lock().await;
            let expired = guard.expired_users(timeout);
            for user_id in &expired {
                guard.remove_user(user_id);
            }
            (
                expired,
                guard.is_empty(),
                guard.needs_auto_flip(),
                guard.generation(),
            )
        };

        if evicted.is_empty() {
            // An empty room can outlive a contended removal at leave time;
            // the sweep reclaims it on the next pass.
            if is_empty {
                state.rooms().remove_if_empty(room_id);
            }
            continue;
        }
        for user_id in &evicted {
            info!(room_id, user_id = %user_id, "user evicted (heartbeat timeout)");
            state
                .connections()
                .purge_member(&MemberKey::new(room_id, user_id.as_str()));
        }

        if is_empty {
            state.rooms().remove_if_empty(room_id);
            continue;
        }
        // Evicting the last unvoted participant can complete the round.
        if needs_auto_flip {
            auto_flip::schedule(state.clone(), room_id, generation);
        }
        broadcast::broadcast_room(state, &room).await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{config::AppConfig, state::AppState};

    const ALICE: &str = "aaaaaaaaaaaaaaaaaaaaa";
    const BOB: &str = "bbbbbbbbbbbbbbbbbbbbb";

    #[tokio::test(start_paused = true)]
    async fn evicts_only_users_past_the_timeout() {
        let state = AppState::new(AppConfig::default());
        let room = state.rooms().get_or_create(1);
        room.lock().await.add_or_rejoin_user(ALICE, "ada");

        tokio::time::advance(Duration::from_secs(20)).await;
        room.lock().await.add_or_rejoin_user(BOB, "bob");

        // Alice is now 31s stale, Bob only 11s.
        tokio::time::advance(Duration::from_secs(11)).await;
        sweep(&state).await;

        let guard = room.lock().await;
        assert!(!guard.users().contains_key(ALICE));
        assert!(guard.users().contains_key(BOB));
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeats_keep_a_user_alive_indefinitely() {
        let state = AppState::new(AppConfig::default());
        let room = state.rooms().get_or_create(1);
        room.lock().await.add_or_rejoin_user(ALICE, "ada");

        for _ in 0..5 {
            tokio::time::advance(Duration::from_secs(20)).await;
            room.lock().await.touch_heartbeat(ALICE).unwrap();
            sweep(&state).await;
        }

        assert!(room.lock().await.users().contains_key(ALICE));
    }

    #[tokio::test(start_paused = true)]
    async fn eviction_purges_the_connection_and_deletes_an_emptied_room() {
        let state = AppState::new(AppConfig::default());
        let room = state.rooms().get_or_create(1);
        room.lock().await.add_or_rejoin_user(ALICE, "ada");
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        state
            .connections()
            .register(uuid::Uuid::new_v4(), MemberKey::new(1, ALICE), tx);

        tokio::time::advance(Duration::from_secs(31)).await;
        sweep(&state).await;

        assert!(state.rooms().get(1).is_none());
        assert!(!state.connections().is_active(&MemberKey::new(1, ALICE)));
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_reclaims_an_empty_room_left_by_a_contended_removal() {
        let state = AppState::new(AppConfig::default());
        let room = state.rooms().get_or_create(1);
        {
            let mut guard = room.lock().await;
            guard.add_or_rejoin_user(ALICE, "ada");
            guard.remove_user(ALICE);
        }

        // The leave-time removal races a task holding the room lock and
        // gets skipped.
        let guard = room.lock().await;
        state.rooms().remove_if_empty(1);
        drop(guard);
        assert_eq!(state.rooms().room_count(), 1);

        sweep(&state).await;
        assert!(state.rooms().get(1).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn evicting_the_last_unvoted_user_triggers_the_auto_flip() {
        let state = AppState::new(AppConfig::default());
        let room = state.rooms().get_or_create(1);
        {
            let mut guard = room.lock().await;
            guard.add_or_rejoin_user(ALICE, "ada");
            // Bob joins but never votes, blocking the flip.
            guard.add_or_rejoin_user(BOB, "bob");
            guard.set_auto_flip(true);
            guard.set_estimation(ALICE, Some(2.0)).unwrap();
            assert!(!guard.is_flippable());
        }
        tokio::time::advance(Duration::from_secs(20)).await;
        // Alice stays fresh; Bob goes silent.
        room.lock().await.touch_heartbeat(ALICE).unwrap();

        tokio::time::advance(Duration::from_secs(11)).await;
        sweep(&state).await;

        // The eviction made the room flippable; the scheduled flip fires
        // after the configured delay.
        tokio::time::sleep(Duration::from_millis(2_000)).await;
        assert!(room.lock().await.is_flipped());
    }
}
