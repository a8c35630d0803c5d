use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::{error, info};

use crate::db::dbroom;
use crate::models::{ErrorResponse, RoomDocumentRecord, SaveDocumentRequest};
use crate::services::persist_service;
use crate::sync::registry::RoomRegistry;

/// Save a document: upsert by room id. When the room is live on this
/// server, the live replica's content wins over the caller-supplied
/// snapshot, so a save always captures the latest merged state.
pub async fn doc_save(
    State(registry): State<Arc<RoomRegistry>>,
    Extension(uid): Extension<String>,
    Path(room_id): Path<String>,
    Json(body): Json<SaveDocumentRequest>,
) -> Result<(StatusCode, Json<RoomDocumentRecord>), (StatusCode, Json<ErrorResponse>)> {
    let db = dbroom::get_db().ok_or_else(|| {
        ErrorResponse::of(
            StatusCode::SERVICE_UNAVAILABLE,
            "Persistence store not configured",
        )
    })?;

    let content = match registry.get(&room_id).await {
        Some(room) => room.doc().lock().await.content(),
        None => body.content,
    };

    let fallback_title = persist_service::default_title(&room_id);
    let record = db
        .upsert_document(
            &room_id,
            &content,
            &body.language,
            body.title.as_deref(),
            &fallback_title,
            &uid,
        )
        .await
        .map_err(|e| {
            error!("Failed to save document for room {}: {}", room_id, e);
            ErrorResponse::of(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to save document for room '{}'", room_id),
            )
        })?;

    info!("Document for room {} saved by {}", room_id, uid);
    Ok((StatusCode::OK, Json(record)))
}
