use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, watch};
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::protocol::WireMessage;
use super::registry::RoomRegistry;
use super::room::Room;
use super::server::RelayState;
use crate::services::persist_service;

type WsSender = SplitSink<WebSocketStream<TcpStream>, Message>;
type SessionError = Box<dyn std::error::Error + Send + Sync>;

/// Deregisters the connection from the registry on every exit path,
/// including panics in the relay loop.
struct DisconnectGuard {
    registry: Arc<RoomRegistry>,
    room_id: String,
    conn_id: Uuid,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        let registry = self.registry.clone();
        let room_id = std::mem::take(&mut self.room_id);
        let conn_id = self.conn_id;
        tokio::spawn(async move {
            registry.leave(&room_id, conn_id).await;
        });
    }
}

/// Drive one client connection through its lifecycle: extract the room
/// id, handshake, relay fragments and presence, deregister on close.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    state: Arc<RelayState>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), SessionError> {
    let mut request_uri = None;
    let ws_stream = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, resp: Response| {
        request_uri = Some(req.uri().clone());
        Ok(resp)
    })
    .await?;

    let room_id = request_uri
        .as_ref()
        .and_then(|uri| uri.query())
        .and_then(room_query_param);

    let Some(room_id) = room_id else {
        // Protocol-level rejection, distinguishable from a dead server.
        info!("Connection from {} rejected: no room id provided", addr);
        let mut ws_stream = ws_stream;
        ws_stream
            .close(Some(CloseFrame {
                code: CloseCode::Policy,
                reason: "Room ID required".into(),
            }))
            .await
            .ok();
        return Ok(());
    };

    let conn_id = Uuid::new_v4();
    info!(
        "Connection {} from {} joining room {}",
        conn_id, addr, room_id
    );

    // Rehydrate from the durable store when this join creates the room.
    let seed = persist_service::seed_for_room(&room_id).await;
    let room = state.registry.join(&room_id, conn_id, seed).await;
    let _guard = DisconnectGuard {
        registry: state.registry.clone(),
        room_id: room_id.clone(),
        conn_id,
    };

    let result = run_session(ws_stream, &room, conn_id, &state, &mut shutdown).await;
    match &result {
        Ok(()) => info!("Connection {} left room {}", conn_id, room_id),
        Err(e) => debug!(
            "Connection {} in room {} closed with transport error: {}",
            conn_id, room_id, e
        ),
    }
    // A transport error is an ordinary disconnect as far as the room is
    // concerned; the guard deregisters either way.
    Ok(())
}

async fn run_session(
    ws_stream: WebSocketStream<TcpStream>,
    room: &Arc<Room>,
    conn_id: Uuid,
    state: &Arc<RelayState>,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<(), SessionError> {
    let threshold = state.compress_threshold;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // Subscribe before the handshake so no fragment broadcast between
    // handshake and relay loop is missed.
    let mut room_rx = room.subscribe();

    // Handshake: the full current document state, our state vector (so
    // the client can push whatever we are missing), and the presence map.
    let (snapshot, state_vector) = {
        let doc = room.doc().lock().await;
        (doc.snapshot()?, doc.state_vector())
    };
    send_frame(&mut ws_sender, &WireMessage::Update(snapshot), threshold).await?;
    send_frame(&mut ws_sender, &WireMessage::SyncRequest(state_vector), threshold).await?;
    let presence_map = room.presence().lock().await.snapshot();
    send_frame(&mut ws_sender, &WireMessage::PresenceState(presence_map), threshold).await?;

    loop {
        tokio::select! {
            inbound = ws_receiver.next() => match inbound {
                Some(Ok(Message::Binary(data))) => {
                    handle_frame(&data, room, conn_id, &mut ws_sender, threshold).await?;
                }
                Some(Ok(Message::Ping(payload))) => {
                    ws_sender.send(Message::Pong(payload)).await?;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {
                    // Only binary frames carry protocol messages.
                }
                Some(Err(e)) => return Err(e.into()),
            },

            outbound = room_rx.recv() => match outbound {
                Ok(msg) => {
                    if msg.sender != conn_id {
                        ws_sender.send(Message::Binary(msg.frame.to_vec().into())).await?;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // The client fell behind the room's fan-out; it can
                    // recover by sending a fresh sync request.
                    warn!("Connection {} lagged by {} room frames", conn_id, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },

            changed = shutdown.changed() => {
                // The watch value only ever flips to true, so any change
                // means shutdown; a dropped sender means the same thing.
                if changed.is_ok() {
                    ws_sender
                        .send(Message::Close(Some(CloseFrame {
                            code: CloseCode::Away,
                            reason: "server shutting down".into(),
                        })))
                        .await
                        .ok();
                }
                break;
            }
        }
    }

    Ok(())
}

/// Dispatch one inbound binary frame. Malformed frames and fragments are
/// dropped with a log line; they never take down the connection or the
/// room.
async fn handle_frame(
    data: &[u8],
    room: &Arc<Room>,
    conn_id: Uuid,
    ws_sender: &mut WsSender,
    threshold: usize,
) -> Result<(), SessionError> {
    let message = match WireMessage::decode(data) {
        Ok(message) => message,
        Err(e) => {
            warn!("Dropping malformed frame from connection {}: {}", conn_id, e);
            return Ok(());
        }
    };

    match message {
        WireMessage::SyncRequest(state_vector) => {
            let reply = {
                let doc = room.doc().lock().await;
                match doc.diff_since(&state_vector) {
                    Ok(diff) => diff,
                    Err(e) => {
                        // State vector predates compacted history: fall
                        // back to the full snapshot, which merges the
                        // same way.
                        debug!(
                            "Diff for connection {} unavailable ({}), sending snapshot",
                            conn_id, e
                        );
                        doc.snapshot()?
                    }
                }
            };
            send_frame(ws_sender, &WireMessage::Update(reply), threshold).await?;
        }

        WireMessage::Update(fragment) => {
            let applied = room.doc().lock().await.apply_fragment(&fragment);
            match applied {
                Ok(()) => {
                    room.mark_dirty();
                    // Rebroadcast the original frame verbatim; peers
                    // decode it exactly as we received it.
                    room.publish(conn_id, Arc::new(data.to_vec()));
                }
                Err(e) => {
                    warn!(
                        "Dropping malformed fragment from connection {}: {}",
                        conn_id, e
                    );
                }
            }
        }

        WireMessage::Presence(delta) => {
            let accepted = room.presence().lock().await.apply(conn_id, &delta);
            if accepted {
                room.publish(conn_id, Arc::new(data.to_vec()));
            } else {
                warn!(
                    "Connection {} tried to update presence entry {} it does not own",
                    conn_id, delta.client
                );
            }
        }

        WireMessage::PresenceState(_) => {
            debug!("Ignoring presence snapshot from connection {}", conn_id);
        }
    }

    Ok(())
}

async fn send_frame(
    ws_sender: &mut WsSender,
    message: &WireMessage,
    threshold: usize,
) -> Result<(), SessionError> {
    let frame = message.encode(threshold)?;
    ws_sender.send(Message::Binary(frame.into())).await?;
    Ok(())
}

fn room_query_param(query: &str) -> Option<String> {
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("room="))
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_query_param_extraction() {
        assert_eq!(room_query_param("room=r1"), Some("r1".to_string()));
        assert_eq!(room_query_param("a=b&room=r1&c=d"), Some("r1".to_string()));
        assert_eq!(room_query_param("room="), None);
        assert_eq!(room_query_param("a=b"), None);
    }
}
