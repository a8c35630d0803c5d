use axum::{
    extract::{Extension, State},
    http::StatusCode,
    Json,
};
use std::sync::{Arc, Mutex, OnceLock};
use sysinfo::System;
use tracing::info;

use crate::auth::auth;
use crate::models::{DiagnosticsResponse, ErrorResponse};
use crate::sync::registry::RoomRegistry;

static SYSTEM_MONITOR: OnceLock<Mutex<System>> = OnceLock::new();

/// Admin diagnostics: relay load and process resource usage.
pub async fn diagnostics(
    State(registry): State<Arc<RoomRegistry>>,
    Extension(prpls): Extension<Vec<String>>,
) -> Result<(StatusCode, Json<DiagnosticsResponse>), (StatusCode, Json<ErrorResponse>)> {
    let _ = auth::ensure_admin(&prpls)?;

    let rooms = registry.room_count().await;
    let connections = registry.connection_count().await;
    let mut dirty_rooms = 0;
    for (_, room) in registry.live_rooms().await {
        if room.is_dirty() {
            dirty_rooms += 1;
        }
    }

    // System stats
    let (cpu_usage, memory_used, memory_free, memory_total) = {
        let sys_lock = SYSTEM_MONITOR.get_or_init(|| Mutex::new(System::new_all()));
        match sys_lock.lock() {
            Ok(mut sys) => {
                sys.refresh_cpu();
                sys.refresh_memory();
                (
                    sys.global_cpu_info().cpu_usage(),
                    sys.used_memory(),
                    sys.free_memory(),
                    sys.total_memory(),
                )
            }
            Err(_) => (0.0, 0, 0, 0),
        }
    };

    info!(
        "Diagnostics: CPU: {:.2}%, Mem: {}/{} MB (Free: {} MB), Conn: {}, Rooms: {}",
        cpu_usage,
        memory_used / 1024 / 1024,
        memory_total / 1024 / 1024,
        memory_free / 1024 / 1024,
        connections,
        rooms
    );

    Ok((
        StatusCode::OK,
        Json(DiagnosticsResponse {
            rooms,
            connections,
            dirty_rooms,
            cpu_usage,
            memory_used,
            memory_free,
            memory_total,
        }),
    ))
}
