use serde::Serialize;
use utoipa::ToSchema;

/// Admin diagnostics: relay load plus process resource usage.
#[derive(Serialize, ToSchema)]
pub struct DiagnosticsResponse {
    pub rooms: usize,
    pub connections: usize,
    pub dirty_rooms: usize,
    pub cpu_usage: f32,
    pub memory_used: u64,
    pub memory_free: u64,
    pub memory_total: u64,
}
