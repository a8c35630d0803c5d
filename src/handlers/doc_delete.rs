use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};
use tracing::{error, info};

use crate::db::dbroom::{self, DeleteOutcome};
use crate::models::{DeleteDocumentResponse, ErrorResponse};

/// Delete a persisted document. Only the record's creator may delete it.
pub async fn doc_delete(
    Extension(uid): Extension<String>,
    Path(room_id): Path<String>,
) -> Result<(StatusCode, Json<DeleteDocumentResponse>), (StatusCode, Json<ErrorResponse>)> {
    let db = dbroom::get_db().ok_or_else(|| {
        ErrorResponse::of(
            StatusCode::SERVICE_UNAVAILABLE,
            "Persistence store not configured",
        )
    })?;

    let outcome = db.delete_document(&room_id, &uid).await.map_err(|e| {
        error!("Failed to delete document for room {}: {}", room_id, e);
        ErrorResponse::of(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to delete document for room '{}'", room_id),
        )
    })?;

    match outcome {
        DeleteOutcome::Deleted => {
            info!("Document for room {} deleted by {}", room_id, uid);
            Ok((
                StatusCode::OK,
                Json(DeleteDocumentResponse {
                    status: "deleted".to_string(),
                    room_id,
                }),
            ))
        }
        DeleteOutcome::NotFound => Err(ErrorResponse::of(
            StatusCode::NOT_FOUND,
            format!("No document found for room '{}'", room_id),
        )),
        DeleteOutcome::Forbidden => Err(ErrorResponse::of(
            StatusCode::FORBIDDEN,
            "Only the creator may delete this document",
        )),
    }
}
