/// Delayed automatic flip scheduling.
pub mod auto_flip;
/// Room snapshot fan-out to connected clients.
pub mod broadcast;
/// Routing of validated client actions onto room state.
pub mod dispatcher;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Background heartbeat sweep and user eviction.
pub mod heartbeat;
/// Vote store connection supervision and degraded mode.
pub mod storage_supervisor;
/// Fire-and-forget flip record persistence.
pub mod vote_log;
/// WebSocket connection and message handling service.
pub mod websocket_service;
