use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use base64::{engine::general_purpose, Engine as _};
use std::sync::Arc;

use crate::auth::auth;
use crate::models::{ErrorResponse, RoomExportResponse};
use crate::sync::registry::RoomRegistry;

/// Export a live room: materialized content plus the state vector a
/// consumer can later hand back as a sync request.
pub async fn room_export(
    State(registry): State<Arc<RoomRegistry>>,
    Extension(prpls): Extension<Vec<String>>,
    Path(room_id): Path<String>,
) -> Result<(StatusCode, Json<RoomExportResponse>), (StatusCode, Json<ErrorResponse>)> {
    let _ = auth::ensure_service(&prpls, "coderoom-app")?;

    let room = registry.get(&room_id).await.ok_or_else(|| {
        ErrorResponse::of(
            StatusCode::NOT_FOUND,
            format!("Room '{}' is not live on this server", room_id),
        )
    })?;
    let connections = registry.room_connections(&room_id).await.unwrap_or(0);

    let (content, state_vector) = {
        let doc = room.doc().lock().await;
        (doc.content(), doc.state_vector())
    };

    Ok((
        StatusCode::OK,
        Json(RoomExportResponse {
            room_id,
            content,
            state_vector: general_purpose::STANDARD.encode(state_vector),
            connections,
        }),
    ))
}
