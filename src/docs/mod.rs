use crate::models::*;
use utoipa::OpenApi;

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn health_check_doc() {}

/// Save (upsert) a document by room id
#[utoipa::path(
    post,
    path = "/api/v1/documents/{room_id}",
    request_body = SaveDocumentRequest,
    responses(
        (status = 200, description = "Document saved", body = RoomDocumentRecord),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn doc_save_doc() {}

/// Fetch the persisted document for a room id
#[utoipa::path(
    get,
    path = "/api/v1/documents/{room_id}",
    responses(
        (status = 200, description = "Document found", body = RoomDocumentRecord),
        (status = 404, description = "No document for this room", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn doc_get_doc() {}

/// List the caller's documents, most recently modified first
#[utoipa::path(
    get,
    path = "/api/v1/documents",
    responses(
        (status = 200, description = "Documents created by the caller", body = [RoomDocumentRecord])
    )
)]
#[allow(dead_code)]
pub async fn doc_list_doc() {}

/// Delete a document; creator only
#[utoipa::path(
    delete,
    path = "/api/v1/documents/{room_id}",
    responses(
        (status = 200, description = "Document deleted", body = DeleteDocumentResponse),
        (status = 403, description = "Caller is not the creator", body = ErrorResponse),
        (status = 404, description = "No document for this room", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn doc_delete_doc() {}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check_doc,
        doc_save_doc,
        doc_get_doc,
        doc_list_doc,
        doc_delete_doc,
    ),
    components(
        schemas(
            HealthResponse,
            RoomDocumentRecord,
            SaveDocumentRequest,
            DeleteDocumentResponse,
            ErrorResponse
        )
    ),
    tags(
        (name = "api", description = "API endpoints")
    )
)]
pub struct ApiDoc;
