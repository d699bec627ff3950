use serde::Serialize;
use utoipa::ToSchema;

/// Read-only aggregate counters exposed for operational monitoring.
///
/// Counts only — this surface never mutates state and never serializes room
/// internals, so transport handles cannot leak through it.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    /// Live WebSocket connections.
    pub connections: usize,
    /// Live rooms.
    pub rooms: usize,
    /// Users across all live rooms.
    pub users: usize,
    /// Heartbeats served since startup.
    pub heartbeats_served: u64,
}
