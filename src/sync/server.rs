use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use super::connection;
use super::registry::RoomRegistry;

/// Shared state handed to every connection handler.
pub struct RelayState {
    pub registry: Arc<RoomRegistry>,
    pub compress_threshold: usize,
}

/// Accept loop of the sync relay. On shutdown it stops accepting, drops
/// the listener, and waits for the outstanding connection tasks to finish
/// their close sequence instead of aborting them.
pub async fn run_relay(
    listener: TcpListener,
    state: Arc<RelayState>,
    mut shutdown: watch::Receiver<bool>,
) {
    match listener.local_addr() {
        Ok(addr) => info!("Sync relay listening on ws://{}", addr),
        Err(e) => error!("Sync relay listener has no local address: {}", e),
    }

    let mut sessions = JoinSet::new();
    let session_shutdown = shutdown.clone();
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    debug!("Accepted connection from {}", addr);
                    let state = state.clone();
                    let shutdown_rx = session_shutdown.clone();
                    sessions.spawn(async move {
                        if let Err(e) =
                            connection::handle_connection(stream, addr, state, shutdown_rx).await
                        {
                            debug!("Connection from {} failed: {}", addr, e);
                        }
                    });
                }
                Err(e) => error!("Failed to accept connection: {}", e),
            },
            _ = shutdown.changed() => break,
        }

        // Reap finished sessions so the set does not grow unbounded.
        while sessions.try_join_next().is_some() {}
    }

    drop(listener);
    info!(
        "Sync relay stopped accepting, draining {} active connections",
        sessions.len()
    );
    while sessions.join_next().await.is_some() {}
    info!("Sync relay shut down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::doc::SyncDoc;
    use crate::sync::protocol::{PresenceDelta, PresenceFields, WireMessage};
    use futures_util::{SinkExt, StreamExt};
    use std::time::Duration;
    use tokio::net::TcpStream;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    const GRACE: Duration = Duration::from_millis(200);
    const RECV_TIMEOUT: Duration = Duration::from_secs(5);

    async fn start_relay() -> (std::net::SocketAddr, watch::Sender<bool>) {
        let registry = Arc::new(RoomRegistry::new(GRACE, 64));
        let state = Arc::new(RelayState {
            registry,
            compress_threshold: 1024,
        });
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(run_relay(listener, state, shutdown_rx));
        (addr, shutdown_tx)
    }

    async fn connect(addr: std::net::SocketAddr, room: &str) -> Client {
        let url = format!("ws://{}/?room={}", addr, room);
        let (client, _resp) = tokio_tungstenite::connect_async(url).await.unwrap();
        client
    }

    async fn recv_wire(client: &mut Client) -> WireMessage {
        loop {
            let msg = tokio::time::timeout(RECV_TIMEOUT, client.next())
                .await
                .expect("timed out waiting for frame")
                .expect("connection closed")
                .expect("transport error");
            if let Message::Binary(data) = msg {
                return WireMessage::decode(&data).unwrap();
            }
        }
    }

    async fn send_wire(client: &mut Client, message: &WireMessage) {
        let frame = message.encode(1024).unwrap();
        client.send(Message::Binary(frame.into())).await.unwrap();
    }

    /// Consume the three handshake frames, feeding the document snapshot
    /// into a fresh local replica.
    async fn complete_handshake(client: &mut Client) -> SyncDoc {
        let doc = SyncDoc::new();
        match recv_wire(client).await {
            WireMessage::Update(snapshot) => doc.apply_fragment(&snapshot).unwrap(),
            other => panic!("expected snapshot, got {:?}", other),
        }
        match recv_wire(client).await {
            WireMessage::SyncRequest(_) => {}
            other => panic!("expected sync request, got {:?}", other),
        }
        match recv_wire(client).await {
            WireMessage::PresenceState(_) => {}
            other => panic!("expected presence state, got {:?}", other),
        }
        doc
    }

    /// Send a local edit and wait until the server acknowledges having
    /// applied it by answering a sync request.
    async fn push_edit(client: &mut Client, doc: &SyncDoc, pos: usize, text: &str) {
        let before = doc.state_vector();
        doc.insert(pos, text).unwrap();
        let fragment = doc.diff_since(&before).unwrap();
        send_wire(client, &WireMessage::Update(fragment)).await;

        // Frames from one connection are processed in order, so the sync
        // reply implies the update fragment has been applied.
        send_wire(client, &WireMessage::SyncRequest(doc.state_vector())).await;
        match recv_wire(client).await {
            WireMessage::Update(ack) => doc.apply_fragment(&ack).unwrap(),
            other => panic!("expected sync reply, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_room_id_closes_with_policy_violation() {
        let (addr, _shutdown) = start_relay().await;
        let (mut client, _resp) = tokio_tungstenite::connect_async(format!("ws://{}/", addr))
            .await
            .unwrap();

        let msg = tokio::time::timeout(RECV_TIMEOUT, client.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        match msg {
            Message::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::Policy),
            other => panic!("expected policy close, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_late_joiner_is_seeded_with_current_content() {
        let (addr, _shutdown) = start_relay().await;

        let mut alice = connect(addr, "r1").await;
        let alice_doc = complete_handshake(&mut alice).await;
        push_edit(&mut alice, &alice_doc, 0, "hello").await;

        let mut bob = connect(addr, "r1").await;
        let bob_doc = complete_handshake(&mut bob).await;
        assert_eq!(bob_doc.content(), "hello");
    }

    #[tokio::test]
    async fn test_concurrent_edits_converge_across_clients() {
        let (addr, _shutdown) = start_relay().await;

        let mut alice = connect(addr, "r1").await;
        let alice_doc = complete_handshake(&mut alice).await;
        push_edit(&mut alice, &alice_doc, 0, "hello").await;

        let mut bob = connect(addr, "r1").await;
        let bob_doc = complete_handshake(&mut bob).await;

        // Bob's join must not replay history into Alice; only fresh
        // fragments flow. Both now append concurrently, before seeing
        // each other's edit.
        let alice_before = alice_doc.state_vector();
        alice_doc.insert(5, " world").unwrap();
        let from_alice = alice_doc.diff_since(&alice_before).unwrap();

        let bob_before = bob_doc.state_vector();
        bob_doc.insert(5, "!").unwrap();
        let from_bob = bob_doc.diff_since(&bob_before).unwrap();

        send_wire(&mut alice, &WireMessage::Update(from_alice)).await;
        send_wire(&mut bob, &WireMessage::Update(from_bob)).await;

        // Each client receives the other's fragment via the room fan-out.
        match recv_wire(&mut alice).await {
            WireMessage::Update(fragment) => alice_doc.apply_fragment(&fragment).unwrap(),
            other => panic!("expected update, got {:?}", other),
        }
        match recv_wire(&mut bob).await {
            WireMessage::Update(fragment) => bob_doc.apply_fragment(&fragment).unwrap(),
            other => panic!("expected update, got {:?}", other),
        }

        assert_eq!(alice_doc.content(), bob_doc.content());
        assert!(alice_doc.content().contains(" world"));
        assert!(alice_doc.content().contains('!'));
    }

    #[tokio::test]
    async fn test_presence_reaches_room_peers_only() {
        let (addr, _shutdown) = start_relay().await;

        let mut alice = connect(addr, "r1").await;
        complete_handshake(&mut alice).await;
        let mut bob = connect(addr, "r1").await;
        complete_handshake(&mut bob).await;
        let mut carol = connect(addr, "r2").await;
        complete_handshake(&mut carol).await;

        let delta = PresenceDelta {
            client: 11,
            fields: Some(PresenceFields {
                name: Some("alice".to_string()),
                color: Some("#00ffaa".to_string()),
                cursor: Some(4),
            }),
        };
        send_wire(&mut alice, &WireMessage::Presence(delta.clone())).await;

        match recv_wire(&mut bob).await {
            WireMessage::Presence(received) => assert_eq!(received, delta),
            other => panic!("expected presence delta, got {:?}", other),
        }

        // Carol is in another room and must see nothing.
        let nothing = tokio::time::timeout(Duration::from_millis(300), carol.next()).await;
        assert!(nothing.is_err(), "presence leaked across rooms");

        // Alice disconnecting clears exactly her entry for the peers.
        alice.close(None).await.unwrap();
        match recv_wire(&mut bob).await {
            WireMessage::Presence(removal) => {
                assert_eq!(removal.client, 11);
                assert!(removal.fields.is_none());
            }
            other => panic!("expected presence removal, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_fragment_does_not_poison_the_room() {
        let (addr, _shutdown) = start_relay().await;

        let mut alice = connect(addr, "r1").await;
        let alice_doc = complete_handshake(&mut alice).await;

        // Garbage fragment: dropped server-side, connection stays up.
        send_wire(&mut alice, &WireMessage::Update(vec![0xde, 0xad, 0xbe, 0xef])).await;
        push_edit(&mut alice, &alice_doc, 0, "still alive").await;

        let mut bob = connect(addr, "r1").await;
        let bob_doc = complete_handshake(&mut bob).await;
        assert_eq!(bob_doc.content(), "still alive");
    }

    #[tokio::test]
    async fn test_shutdown_closes_active_connections() {
        let (addr, shutdown) = start_relay().await;

        let mut alice = connect(addr, "r1").await;
        complete_handshake(&mut alice).await;

        shutdown.send(true).unwrap();

        loop {
            let msg = tokio::time::timeout(RECV_TIMEOUT, alice.next())
                .await
                .expect("timed out waiting for close");
            match msg {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => continue,
                Some(Err(_)) => break,
            }
        }

        // New connections are refused once the listener is gone.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(
            tokio_tungstenite::connect_async(format!("ws://{}/?room=r1", addr))
                .await
                .is_err()
        );
    }
}
