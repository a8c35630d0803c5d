use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

use super::doc::SyncDoc;
use super::presence::PresenceChannel;

/// A frame fanned out to the other connections in a room. Receivers skip
/// frames carrying their own connection id to prevent echo.
#[derive(Clone)]
pub struct RoomMessage {
    pub sender: Uuid,
    pub frame: Arc<Vec<u8>>,
}

/// One live collaboration room: the shared replicated document, the
/// ephemeral presence map, and the fan-out channel connecting its
/// connection handlers.
pub struct Room {
    doc: Mutex<SyncDoc>,
    presence: Mutex<PresenceChannel>,
    tx: broadcast::Sender<RoomMessage>,
    dirty: AtomicBool,
}

impl Room {
    pub fn new(channel_capacity: usize) -> Self {
        Self::with_doc(SyncDoc::new(), channel_capacity)
    }

    pub fn with_doc(doc: SyncDoc, channel_capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(channel_capacity);
        Self {
            doc: Mutex::new(doc),
            presence: Mutex::new(PresenceChannel::new()),
            tx,
            dirty: AtomicBool::new(false),
        }
    }

    pub fn doc(&self) -> &Mutex<SyncDoc> {
        &self.doc
    }

    pub fn presence(&self) -> &Mutex<PresenceChannel> {
        &self.presence
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoomMessage> {
        self.tx.subscribe()
    }

    /// Fan a pre-encoded frame out to every subscribed connection. A send
    /// error only means no one is subscribed.
    pub fn publish(&self, sender: Uuid, frame: Arc<Vec<u8>>) {
        let _ = self.tx.send(RoomMessage { sender, frame });
    }

    /// Unsaved fragment activity since the last autosave pass.
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Relaxed);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Relaxed)
    }

    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let room = Room::new(16);
        let mut rx = room.subscribe();

        let sender = Uuid::new_v4();
        room.publish(sender, Arc::new(vec![1, 2, 3]));

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.sender, sender);
        assert_eq!(*msg.frame, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_harmless() {
        let room = Room::new(16);
        room.publish(Uuid::new_v4(), Arc::new(vec![0]));
    }

    #[test]
    fn test_dirty_flag_take_semantics() {
        let room = Room::new(16);
        assert!(!room.is_dirty());
        room.mark_dirty();
        assert!(room.is_dirty());
        assert!(room.take_dirty());
        assert!(!room.take_dirty());
    }
}
