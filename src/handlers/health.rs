use axum::{extract::State, Json};
use std::sync::Arc;
use tracing::debug;

use crate::models::HealthResponse;
use crate::sync::registry::RoomRegistry;

/// Liveness endpoint: status plus current relay load. Read-only.
pub async fn health_check(State(registry): State<Arc<RoomRegistry>>) -> Json<HealthResponse> {
    debug!("Health check requested");
    Json(HealthResponse {
        status: "ok".to_string(),
        rooms: registry.room_count().await,
        connections: registry.connection_count().await,
    })
}
