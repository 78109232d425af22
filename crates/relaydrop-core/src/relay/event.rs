//! Wire events exchanged through the relay.
//!
//! Every event is a JSON object `{"event": "<name>", "data": ...}`:
//!
//! | Event | Direction | Data |
//! |-------|-----------|------|
//! | `join-room` | either -> relay | `roomId` |
//! | `leave-room` | either -> relay | `roomId` |
//! | `receiver-ready` | receiver -> sender | `roomId` |
//! | `file-chunk` | sender -> receiver | `{roomId, fileName, chunk, chunkIndex, totalChunks}` |
//! | `send-file-complete` | sender -> receiver | `{roomId, fileName}` |
//! | `cancel-transfer` | either -> other | `roomId` |

use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::code::RoomCode;
use crate::error::{Error, Result};

/// An event on the relay channel, scoped to one room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum RelayEvent {
    /// Subscribe to a room's event stream
    JoinRoom(RoomCode),
    /// Release a room subscription
    LeaveRoom(RoomCode),
    /// The receiver is ready; the sender may start streaming
    ReceiverReady(RoomCode),
    /// One chunk of the active payload
    FileChunk(FileChunk),
    /// The sender has emitted every chunk
    SendFileComplete(SendFileComplete),
    /// Abort the in-progress transfer
    CancelTransfer(RoomCode),
}

impl RelayEvent {
    /// The room this event is scoped to.
    #[must_use]
    pub const fn room_id(&self) -> &RoomCode {
        match self {
            Self::JoinRoom(room)
            | Self::LeaveRoom(room)
            | Self::ReceiverReady(room)
            | Self::CancelTransfer(room) => room,
            Self::FileChunk(chunk) => &chunk.room_id,
            Self::SendFileComplete(complete) => &complete.room_id,
        }
    }

    /// Wire name of the event.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::JoinRoom(_) => "join-room",
            Self::LeaveRoom(_) => "leave-room",
            Self::ReceiverReady(_) => "receiver-ready",
            Self::FileChunk(_) => "file-chunk",
            Self::SendFileComplete(_) => "send-file-complete",
            Self::CancelTransfer(_) => "cancel-transfer",
        }
    }

    /// Whether the relay handles this event itself instead of forwarding it.
    #[must_use]
    pub const fn is_membership(&self) -> bool {
        matches!(self, Self::JoinRoom(_) | Self::LeaveRoom(_))
    }

    /// Encode the event as a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Decode an event from a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid event.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Serialization(e.to_string()))
    }
}

/// Data of a `file-chunk` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChunk {
    /// Room the chunk is addressed to
    pub room_id: RoomCode,
    /// Name of the payload being sent
    pub file_name: String,
    /// Chunk bytes
    pub chunk: ChunkBytes,
    /// Position of this chunk, `0..total_chunks`
    pub chunk_index: u64,
    /// Number of chunks in the payload
    pub total_chunks: u64,
}

/// Data of a `send-file-complete` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendFileComplete {
    /// Room the payload was sent to
    pub room_id: RoomCode,
    /// Name of the payload
    pub file_name: String,
}

/// Raw chunk bytes, normalized from any of the wire representations.
///
/// Encodes as a base64 string. Decodes from:
///
/// - a base64 string (plain binary),
/// - an array-like wrapper object `{"type": "Buffer", "data": [..]}`,
/// - a bare array of byte values.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChunkBytes(pub Vec<u8>);

impl ChunkBytes {
    /// Length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the chunk holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Take the raw bytes.
    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for ChunkBytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for ChunkBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireChunk {
    Binary(String),
    Wrapped { data: Vec<u8> },
    Sequence(Vec<u8>),
}

impl Serialize for ChunkBytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::prelude::BASE64_STANDARD.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for ChunkBytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match WireChunk::deserialize(deserializer)? {
            WireChunk::Binary(encoded) => base64::prelude::BASE64_STANDARD
                .decode(encoded.as_bytes())
                .map(Self)
                .map_err(serde::de::Error::custom),
            WireChunk::Wrapped { data } | WireChunk::Sequence(data) => Ok(Self(data)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room() -> RoomCode {
        RoomCode::parse("246810").expect("valid code")
    }

    #[test]
    fn test_event_names_on_wire() {
        let json = RelayEvent::ReceiverReady(room()).to_json().expect("encode");
        assert_eq!(json, r#"{"event":"receiver-ready","data":"246810"}"#);

        let json = RelayEvent::CancelTransfer(room()).to_json().expect("encode");
        assert_eq!(json, r#"{"event":"cancel-transfer","data":"246810"}"#);
    }

    #[test]
    fn test_file_chunk_field_names() {
        let event = RelayEvent::FileChunk(FileChunk {
            room_id: room(),
            file_name: "a.bin".to_string(),
            chunk: ChunkBytes(vec![1, 2, 3]),
            chunk_index: 0,
            total_chunks: 1,
        });
        let value: serde_json::Value =
            serde_json::from_str(&event.to_json().expect("encode")).expect("json");

        assert_eq!(value["event"], "file-chunk");
        assert_eq!(value["data"]["roomId"], "246810");
        assert_eq!(value["data"]["fileName"], "a.bin");
        assert_eq!(value["data"]["chunk"], "AQID");
        assert_eq!(value["data"]["chunkIndex"], 0);
        assert_eq!(value["data"]["totalChunks"], 1);
    }

    #[test]
    fn test_chunk_accepts_all_wire_forms() {
        let binary: ChunkBytes = serde_json::from_str(r#""AQID""#).expect("base64");
        let wrapped: ChunkBytes =
            serde_json::from_str(r#"{"type":"Buffer","data":[1,2,3]}"#).expect("wrapper");
        let sequence: ChunkBytes = serde_json::from_str("[1,2,3]").expect("array");

        assert_eq!(binary.0, vec![1, 2, 3]);
        assert_eq!(wrapped, binary);
        assert_eq!(sequence, binary);
    }

    #[test]
    fn test_chunk_rejects_out_of_range_values() {
        assert!(serde_json::from_str::<ChunkBytes>("[1,256]").is_err());
        assert!(serde_json::from_str::<ChunkBytes>(r#""not base64!""#).is_err());
    }

    #[test]
    fn test_decode_event_with_wrapped_chunk() {
        let text = r#"{"event":"file-chunk","data":{"roomId":"246810","fileName":"x",
            "chunk":{"type":"Buffer","data":[9,8]},"chunkIndex":2,"totalChunks":3}}"#;
        let event = RelayEvent::from_json(text).expect("decode");

        let RelayEvent::FileChunk(chunk) = event else {
            panic!("expected file-chunk, got {event:?}");
        };
        assert_eq!(chunk.chunk.0, vec![9, 8]);
        assert_eq!(chunk.chunk_index, 2);
    }

    #[test]
    fn test_rejects_invalid_room_on_wire() {
        assert!(RelayEvent::from_json(r#"{"event":"join-room","data":"12"}"#).is_err());
    }

    #[test]
    fn test_room_id_accessor() {
        let complete = RelayEvent::SendFileComplete(SendFileComplete {
            room_id: room(),
            file_name: "x".to_string(),
        });
        assert_eq!(complete.room_id(), &room());
        assert_eq!(complete.name(), "send-file-complete");
        assert!(!complete.is_membership());
        assert!(RelayEvent::JoinRoom(room()).is_membership());
    }
}
