use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Liveness response with the current relay load.
#[derive(Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub rooms: usize,
    pub connections: usize,
}
