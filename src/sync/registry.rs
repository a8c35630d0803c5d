use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::doc::SyncDoc;
use super::protocol::{PresenceDelta, WireMessage};
use super::room::Room;

struct RoomEntry {
    room: Arc<Room>,
    conns: HashSet<Uuid>,
    /// Pending grace-delay teardown, armed when the last connection
    /// leaves and aborted when a connection joins before it fires.
    teardown: Option<JoinHandle<()>>,
}

/// Process-wide mapping from room id to live room state.
///
/// The registry is the only structure mutated by multiple connection
/// tasks; all mutations go through one mutex so that concurrent joins to
/// a not-yet-created room cannot race to create two documents, and so
/// that join/teardown interleavings stay atomic.
pub struct RoomRegistry {
    rooms: Arc<Mutex<HashMap<String, RoomEntry>>>,
    grace: Duration,
    channel_capacity: usize,
}

impl RoomRegistry {
    pub fn new(grace: Duration, channel_capacity: usize) -> Self {
        Self {
            rooms: Arc::new(Mutex::new(HashMap::new())),
            grace,
            channel_capacity,
        }
    }

    /// Register a connection with a room, creating the room on first
    /// join. A pending teardown for the room is cancelled, so a client
    /// reconnecting within the grace delay reuses the live document.
    ///
    /// `seed` is only consulted when the room does not exist yet; it
    /// rehydrates the fresh document from previously persisted text.
    pub async fn join(&self, room_id: &str, conn_id: Uuid, seed: Option<String>) -> Arc<Room> {
        let mut rooms = self.rooms.lock().await;
        let entry = rooms.entry(room_id.to_string()).or_insert_with(|| {
            let doc = match seed {
                Some(text) if !text.is_empty() => {
                    info!("Creating room {} seeded from persisted snapshot", room_id);
                    SyncDoc::with_seed(&text)
                }
                _ => {
                    info!("Creating room {}", room_id);
                    SyncDoc::new()
                }
            };
            RoomEntry {
                room: Arc::new(Room::with_doc(doc, self.channel_capacity)),
                conns: HashSet::new(),
                teardown: None,
            }
        });

        if let Some(handle) = entry.teardown.take() {
            handle.abort();
            debug!("Cancelled pending teardown for room {}", room_id);
        }
        entry.conns.insert(conn_id);
        entry.room.clone()
    }

    /// Deregister a connection: drops its presence entries (broadcasting
    /// the removals to the remaining peers) and, when the room becomes
    /// empty, arms the grace-delay teardown.
    pub async fn leave(&self, room_id: &str, conn_id: Uuid) {
        let mut rooms = self.rooms.lock().await;
        let Some(entry) = rooms.get_mut(room_id) else {
            return;
        };
        if !entry.conns.remove(&conn_id) {
            return;
        }

        let cleared = entry.room.presence().lock().await.remove_connection(conn_id);
        for client in cleared {
            let delta = PresenceDelta { client, fields: None };
            match WireMessage::Presence(delta).encode(usize::MAX) {
                Ok(frame) => entry.room.publish(conn_id, Arc::new(frame)),
                Err(e) => warn!("Failed to encode presence removal: {}", e),
            }
        }

        if entry.conns.is_empty() {
            debug!(
                "Room {} has no connections, teardown in {:?}",
                room_id, self.grace
            );
            entry.teardown = Some(self.schedule_teardown(room_id.to_string(), entry.room.clone()));
        }
    }

    fn schedule_teardown(&self, room_id: String, room: Arc<Room>) -> JoinHandle<()> {
        let rooms = self.rooms.clone();
        let grace = self.grace;
        tokio::spawn(async move {
            // No connection depends on old history anymore, so the idle
            // document can be compacted before the room either dies or is
            // rejoined.
            if let Err(e) = room.doc().lock().await.compact() {
                warn!("Failed to compact document for room {}: {}", room_id, e);
            }
            drop(room);

            tokio::time::sleep(grace).await;

            let mut rooms = rooms.lock().await;
            if let Some(entry) = rooms.get(&room_id) {
                if entry.conns.is_empty() {
                    rooms.remove(&room_id);
                    info!("Room {} torn down after grace delay", room_id);
                }
            }
        })
    }

    pub async fn get(&self, room_id: &str) -> Option<Arc<Room>> {
        self.rooms.lock().await.get(room_id).map(|e| e.room.clone())
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.lock().await.len()
    }

    pub async fn connection_count(&self) -> usize {
        self.rooms.lock().await.values().map(|e| e.conns.len()).sum()
    }

    /// Connections currently joined to one room, if it is live.
    pub async fn room_connections(&self, room_id: &str) -> Option<usize> {
        self.rooms.lock().await.get(room_id).map(|e| e.conns.len())
    }

    /// Snapshot of the live rooms, for the autosave pass and diagnostics.
    pub async fn live_rooms(&self) -> Vec<(String, Arc<Room>)> {
        self.rooms
            .lock()
            .await
            .iter()
            .map(|(id, entry)| (id.clone(), entry.room.clone()))
            .collect()
    }
}
