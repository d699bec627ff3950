use axum::{Json, Router, extract::State, routing::get};

use crate::{dto::stats::StatsResponse, state::SharedState};

#[utoipa::path(
    get,
    path = "/stats",
    responses((status = 200, description = "Runtime counters", body = StatsResponse))
)]
/// Return live counters over the in-memory engine state.
pub async fn stats(State(state): State<SharedState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        connections: state.connections().connection_count(),
        rooms: state.rooms().room_count(),
        users: state.rooms().total_users().await,
        heartbeats_served: state.heartbeats_served(),
    })
}

/// Configure the stats routes subtree.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/stats", get(stats))
}
