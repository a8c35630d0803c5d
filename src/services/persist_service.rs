use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::db::dbroom;
use crate::sync::registry::RoomRegistry;

/// Title assigned on first save when the caller does not provide one.
pub fn default_title(room_id: &str) -> String {
    let short: String = room_id.chars().take(8).collect();
    format!("Collaborative Session {}", short)
}

/// Persisted content for a room, used to rehydrate a freshly created
/// document. Returns None when no store is configured or no record
/// exists; store errors are logged, not propagated, so a flaky database
/// never blocks a join.
pub async fn seed_for_room(room_id: &str) -> Option<String> {
    let db = dbroom::get_db()?;
    match db.seed_content(room_id).await {
        Ok(seed) => seed,
        Err(e) => {
            error!("Failed to load seed content for room {}: {}", room_id, e);
            None
        }
    }
}

/// Periodic flush of live rooms with unsaved fragment activity.
///
/// Only rooms that already have a persisted record are written: the
/// autosave pass carries no caller identity, so it never creates records,
/// it only keeps known documents fresh between explicit saves.
pub async fn autosave_loop(
    registry: Arc<RoomRegistry>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => autosave_pass(&registry).await,
            _ = shutdown.changed() => break,
        }
    }

    // Final flush so edits made just before shutdown are not lost.
    autosave_pass(&registry).await;
    info!("Autosave loop stopped");
}

async fn autosave_pass(registry: &Arc<RoomRegistry>) {
    let Some(db) = dbroom::get_db() else {
        return;
    };

    for (room_id, room) in registry.live_rooms().await {
        if !room.take_dirty() {
            continue;
        }
        let content = room.doc().lock().await.content();
        match db.refresh_content(&room_id, &content).await {
            Ok(true) => debug!("Autosaved room {} ({} bytes)", room_id, content.len()),
            Ok(false) => debug!("Room {} has no persisted record, skipping autosave", room_id),
            Err(e) => {
                warn!("Autosave for room {} failed: {}", room_id, e);
                // Keep the room flagged so the next pass retries.
                room.mark_dirty();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_title_uses_room_id_prefix() {
        assert_eq!(
            default_title("abcdef1234567890"),
            "Collaborative Session abcdef12"
        );
    }

    #[test]
    fn test_default_title_handles_short_room_ids() {
        assert_eq!(default_title("r1"), "Collaborative Session r1");
    }
}
