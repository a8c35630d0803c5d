use crate::handlers::{diagnostics, doc_delete, doc_get, doc_list, doc_save, room_export};
use crate::routes::auth_middleware::auth_middleware;
use crate::sync::registry::RoomRegistry;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Create API routes
pub fn create_api_routes(registry: Arc<RoomRegistry>) -> Router {
    Router::new()
        .route("/v1/documents", get(doc_list))
        .route(
            "/v1/documents/:room_id",
            post(doc_save).get(doc_get).delete(doc_delete),
        )
        .route("/v1/rooms/:room_id/export", get(room_export))
        .route("/v1/diagnostics", get(diagnostics))
        .route_layer(middleware::from_fn(auth_middleware)) // Applies to all routes added above
        .with_state(registry)
}
