use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Durable document record, one per room id. The sync core only ever
/// contributes the `content` string; everything else is bookkeeping for
/// the callers of the persistence API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RoomDocumentRecord {
    pub room_id: String,
    pub content: String,
    pub language: String,
    pub title: String,
    pub created_by: String,
    pub last_modified_by: String,
    pub last_modified: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Save request body. `content` is the caller's replica snapshot; when
/// the room is live on this server the live document wins.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SaveDocumentRequest {
    pub content: String,
    pub language: String,
    pub title: Option<String>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteDocumentResponse {
    pub status: String,
    pub room_id: String,
}
