use axum::{extract::Path, http::StatusCode, Json};
use tracing::error;

use crate::db::dbroom;
use crate::models::{ErrorResponse, RoomDocumentRecord};

/// Fetch the persisted record for a room id.
pub async fn doc_get(
    Path(room_id): Path<String>,
) -> Result<(StatusCode, Json<RoomDocumentRecord>), (StatusCode, Json<ErrorResponse>)> {
    let db = dbroom::get_db().ok_or_else(|| {
        ErrorResponse::of(
            StatusCode::SERVICE_UNAVAILABLE,
            "Persistence store not configured",
        )
    })?;

    let record = db.get_document(&room_id).await.map_err(|e| {
        error!("Failed to load document for room {}: {}", room_id, e);
        ErrorResponse::of(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to load document for room '{}'", room_id),
        )
    })?;

    match record {
        Some(record) => Ok((StatusCode::OK, Json(record))),
        None => Err(ErrorResponse::of(
            StatusCode::NOT_FOUND,
            format!("No document found for room '{}'", room_id),
        )),
    }
}
