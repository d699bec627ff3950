use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Pointing Poker Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::stats::stats,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::stats::StatsResponse,
            crate::dto::actions::ActionEnvelope,
            crate::dto::actions::ClientAction,
            crate::dto::room::RoomSnapshot,
            crate::dto::room::UserSnapshot,
            crate::dto::room::RoomStatusDto,
            crate::dto::room::ErrorReply,
            crate::dto::room::KickNotification,
            crate::dto::room::RoomRenamedNotification,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "stats", description = "Runtime counters"),
        (name = "rooms", description = "WebSocket operations for room clients"),
    )
)]
pub struct ApiDoc;
