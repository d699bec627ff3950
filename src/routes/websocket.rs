use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use axum_valid::Valid;

use crate::{
    services::websocket_service::{self, ConnectParams},
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/ws",
    params(ConnectParams),
    responses(
        (status = 101, description = "Switching protocols to WebSocket"),
        (status = 400, description = "Invalid roomId, userId or username"),
    )
)]
/// Upgrade the HTTP connection into a room WebSocket session.
///
/// Identity is carried in the query string and validated before the upgrade;
/// the user joins the room as soon as the socket is established.
pub async fn ws_handler(
    State(state): State<SharedState>,
    Valid(Query(params)): Valid<Query<ConnectParams>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| websocket_service::handle_socket(state, socket, params))
}

/// Configure the WebSocket endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/ws", get(ws_handler))
}
