use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{storage::StorageError, vote_store::VoteStore},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Keep the vote store connected and the shared state's degraded flag honest.
///
/// Rooms run fully in memory, so a lost store never blocks gameplay; flip
/// records are simply dropped while degraded and recording resumes once the
/// backend is healthy again. The loop never returns: a store that cannot be
/// revived is abandoned and a fresh connection is attempted from scratch.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn VoteStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        match connect().await {
            Ok(store) => {
                state.set_vote_store(store.clone()).await;
                info!("vote store connected; leaving degraded mode");
                delay = INITIAL_DELAY;

                supervise_store(&state, store.as_ref()).await;
            }
            Err(err) => {
                warn!(error = %err, "vote store connection attempt failed");
            }
        }
        sleep(delay).await;
        delay = (delay * 2).min(MAX_DELAY);
    }
}

/// Poll the store until it dies and cannot be revived in place.
async fn supervise_store(state: &SharedState, store: &dyn VoteStore) {
    loop {
        match store.health_check().await {
            Ok(()) => {
                if state.is_degraded().await {
                    info!("vote store healthy again; leaving degraded mode");
                    state.update_degraded(false).await;
                }
            }
            Err(err) => {
                warn!(error = %err, "vote store health check failed; entering degraded mode");
                state.update_degraded(true).await;
                if !revive(store).await {
                    warn!("exhausted vote store reconnect attempts; staying degraded");
                    return;
                }
                state.update_degraded(false).await;
            }
        }
        sleep(HEALTH_POLL_INTERVAL).await;
    }
}

/// Bounded in-place reconnect with doubling backoff. Returns whether the
/// store answered again.
async fn revive(store: &dyn VoteStore) -> bool {
    let mut reconnect_delay = INITIAL_DELAY;
    for attempt in 0..MAX_RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => {
                info!(attempt, "vote store reconnection succeeded");
                return true;
            }
            Err(err) => {
                warn!(attempt, error = %err, "vote store reconnect attempt failed");
                sleep(reconnect_delay).await;
                reconnect_delay = (reconnect_delay * 2).min(MAX_DELAY);
            }
        }
    }
    false
}
