use axum::{extract::Extension, http::StatusCode, Json};
use tracing::error;

use crate::db::dbroom;
use crate::models::{ErrorResponse, RoomDocumentRecord};

/// List the caller's documents, most recently modified first.
pub async fn doc_list(
    Extension(uid): Extension<String>,
) -> Result<(StatusCode, Json<Vec<RoomDocumentRecord>>), (StatusCode, Json<ErrorResponse>)> {
    let db = dbroom::get_db().ok_or_else(|| {
        ErrorResponse::of(
            StatusCode::SERVICE_UNAVAILABLE,
            "Persistence store not configured",
        )
    })?;

    let records = db.list_documents_by_creator(&uid).await.map_err(|e| {
        error!("Failed to list documents for {}: {}", uid, e);
        ErrorResponse::of(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to list documents",
        )
    })?;

    Ok((StatusCode::OK, Json(records)))
}
