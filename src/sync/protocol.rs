use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Frame layout: one type byte, one flags byte, then the payload.
/// Payloads larger than the configured threshold are LZ4-compressed and
/// flagged; compression is a transport detail invisible to the merge.
const HEADER_LEN: usize = 2;

const MSG_SYNC_REQUEST: u8 = 0x01;
const MSG_UPDATE: u8 = 0x02;
const MSG_PRESENCE: u8 = 0x03;
const MSG_PRESENCE_STATE: u8 = 0x04;

const FLAG_COMPRESSED: u8 = 0b0000_0001;

/// Ephemeral per-connection presence fields. Cursor offsets and display
/// identity only; this never touches the document or the durable store.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct PresenceFields {
    pub name: Option<String>,
    pub color: Option<String>,
    pub cursor: Option<u64>,
}

/// A single presence mutation. `fields: None` clears the entry.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PresenceDelta {
    pub client: u64,
    pub fields: Option<PresenceFields>,
}

/// Messages exchanged on the sync channel.
#[derive(Debug, Clone, PartialEq)]
pub enum WireMessage {
    /// A state vector declaring what the sender has already incorporated.
    /// The receiver answers with the missing fragments.
    SyncRequest(Vec<u8>),
    /// An incremental document update (or a full snapshot, which merges
    /// the same way).
    Update(Vec<u8>),
    /// A presence mutation for one client.
    Presence(PresenceDelta),
    /// The full presence map, sent to a client during handshake.
    PresenceState(HashMap<u64, PresenceFields>),
}

#[derive(Debug)]
pub enum ProtocolError {
    Truncated,
    UnknownType(u8),
    Codec(serde_cbor::Error),
    Decompress(lz4_flex::block::DecompressError),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolError::Truncated => write!(f, "frame shorter than header"),
            ProtocolError::UnknownType(t) => write!(f, "unknown message type {:#04x}", t),
            ProtocolError::Codec(e) => write!(f, "payload codec error: {}", e),
            ProtocolError::Decompress(e) => write!(f, "payload decompression error: {}", e),
        }
    }
}

impl std::error::Error for ProtocolError {}

impl WireMessage {
    /// Encode into a binary frame, compressing the payload when it exceeds
    /// `compress_threshold` bytes.
    pub fn encode(&self, compress_threshold: usize) -> Result<Vec<u8>, ProtocolError> {
        let (msg_type, payload) = match self {
            WireMessage::SyncRequest(sv) => (MSG_SYNC_REQUEST, sv.clone()),
            WireMessage::Update(fragment) => (MSG_UPDATE, fragment.clone()),
            WireMessage::Presence(delta) => (
                MSG_PRESENCE,
                serde_cbor::to_vec(delta).map_err(ProtocolError::Codec)?,
            ),
            WireMessage::PresenceState(map) => (
                MSG_PRESENCE_STATE,
                serde_cbor::to_vec(map).map_err(ProtocolError::Codec)?,
            ),
        };

        let mut flags = 0u8;
        let payload = if payload.len() > compress_threshold {
            flags |= FLAG_COMPRESSED;
            lz4_flex::compress_prepend_size(&payload)
        } else {
            payload
        };

        let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
        frame.push(msg_type);
        frame.push(flags);
        frame.extend_from_slice(&payload);
        Ok(frame)
    }

    /// Decode a binary frame.
    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        if frame.len() < HEADER_LEN {
            return Err(ProtocolError::Truncated);
        }
        let msg_type = frame[0];
        let flags = frame[1];

        let payload = if flags & FLAG_COMPRESSED != 0 {
            lz4_flex::decompress_size_prepended(&frame[HEADER_LEN..])
                .map_err(ProtocolError::Decompress)?
        } else {
            frame[HEADER_LEN..].to_vec()
        };

        match msg_type {
            MSG_SYNC_REQUEST => Ok(WireMessage::SyncRequest(payload)),
            MSG_UPDATE => Ok(WireMessage::Update(payload)),
            MSG_PRESENCE => serde_cbor::from_slice(&payload)
                .map(WireMessage::Presence)
                .map_err(ProtocolError::Codec),
            MSG_PRESENCE_STATE => serde_cbor::from_slice(&payload)
                .map(WireMessage::PresenceState)
                .map_err(ProtocolError::Codec),
            other => Err(ProtocolError::UnknownType(other)),
        }
    }
}
