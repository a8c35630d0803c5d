use serde::Serialize;
use utoipa::ToSchema;

/// Live-room export: materialized content plus the base64 state vector a
/// consumer needs to request incremental fragments later.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomExportResponse {
    pub room_id: String,
    pub content: String,
    pub state_vector: String,
    pub connections: usize,
}
