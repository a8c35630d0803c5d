use std::collections::HashMap;
use uuid::Uuid;

use super::protocol::{PresenceDelta, PresenceFields};

/// Ephemeral per-room presence state: client id → cursor/identity fields.
///
/// Each entry is owned by the connection that first published its client
/// id; last-write-wins per entry, no cross-entry merging. Nothing here is
/// persisted, and the whole map dies with the room.
#[derive(Default)]
pub struct PresenceChannel {
    entries: HashMap<u64, PresenceFields>,
    owners: HashMap<u64, Uuid>,
}

impl PresenceChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a presence mutation on behalf of `conn_id`. Returns false
    /// when the client id is owned by a different live connection; the
    /// caller drops the delta instead of relaying it.
    pub fn apply(&mut self, conn_id: Uuid, delta: &PresenceDelta) -> bool {
        if let Some(owner) = self.owners.get(&delta.client) {
            if *owner != conn_id {
                return false;
            }
        }
        match &delta.fields {
            Some(fields) => {
                self.entries.insert(delta.client, fields.clone());
                self.owners.insert(delta.client, conn_id);
            }
            None => {
                self.entries.remove(&delta.client);
                self.owners.remove(&delta.client);
            }
        }
        true
    }

    /// Drop every entry owned by a disconnecting connection, returning the
    /// cleared client ids so the caller can broadcast the removals.
    /// Idempotent: a second call for the same connection clears nothing.
    pub fn remove_connection(&mut self, conn_id: Uuid) -> Vec<u64> {
        let removed: Vec<u64> = self
            .owners
            .iter()
            .filter(|(_, owner)| **owner == conn_id)
            .map(|(client, _)| *client)
            .collect();
        for client in &removed {
            self.entries.remove(client);
            self.owners.remove(client);
        }
        removed
    }

    /// Current full map, sent to a joining connection during handshake.
    pub fn snapshot(&self) -> HashMap<u64, PresenceFields> {
        self.entries.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
