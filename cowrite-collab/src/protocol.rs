//! Binary wire protocol for the collaboration channel.
//!
//! Events are bincode-encoded serde enums carried in WebSocket binary
//! frames. The client speaks [`ClientEvent`], the hub answers with
//! [`ServerEvent`]; the first client frame on a connection must be
//! `Authenticate`.

use chrono::{DateTime, Utc};
use cowrite_core::Note;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// A live participant in a note room. One entry per (note, connection),
/// so the same user joining from two tabs appears twice with distinct
/// connection ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: Uuid,
    pub connection_id: Uuid,
    pub name: String,
}

/// Caret/selection position inside a note's content. Anchor and head
/// are equal for a plain caret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorPosition {
    pub anchor: u64,
    pub head: u64,
}

impl CursorPosition {
    pub fn caret(offset: u64) -> Self {
        Self {
            anchor: offset,
            head: offset,
        }
    }
}

/// The note state handed to a joiner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteSnapshot {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub owner_id: Uuid,
    pub updated_at: DateTime<Utc>,
}

impl From<&Note> for NoteSnapshot {
    fn from(note: &Note) -> Self {
        Self {
            id: note.id,
            title: note.title.clone(),
            content: note.content.clone(),
            owner_id: note.owner_id,
            updated_at: note.updated_at,
        }
    }
}

/// Attribution on a broadcast edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatedBy {
    pub id: Uuid,
    pub name: String,
}

/// Events sent client → hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientEvent {
    /// Handshake: must be the first frame on the connection.
    Authenticate { token: String },
    JoinNote {
        note_id: Uuid,
    },
    NoteUpdate {
        note_id: Uuid,
        title: Option<String>,
        content: Option<String>,
    },
    CursorMove {
        note_id: Uuid,
        position: CursorPosition,
    },
    LeaveNote {
        note_id: Uuid,
    },
}

/// Events sent hub → client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerEvent {
    /// Handshake accepted; the connection is bound to this identity.
    Authenticated {
        user_id: Uuid,
        connection_id: Uuid,
    },
    /// Join succeeded; sent to the joiner alone.
    Joined {
        note_id: Uuid,
        note: NoteSnapshot,
    },
    /// Full ordered membership of a room, sent whenever it changes.
    ActiveUsers {
        note_id: Uuid,
        users: Vec<Participant>,
    },
    /// An accepted edit, sent to every room member except the sender.
    NoteUpdated {
        note_id: Uuid,
        title: Option<String>,
        content: Option<String>,
        updated_by: UpdatedBy,
        updated_at: DateTime<Utc>,
    },
    /// Best-effort cursor broadcast, sender excluded.
    CursorMoved {
        user_id: Uuid,
        name: String,
        position: CursorPosition,
    },
    /// Any rejected operation; the connection stays alive.
    Error { reason: String },
}

impl ClientEvent {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (event, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| ProtocolError::Decode(e.to_string()))?;
        Ok(event)
    }
}

impl ServerEvent {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (event, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| ProtocolError::Decode(e.to_string()))?;
        Ok(event)
    }

    pub fn error(reason: impl Into<String>) -> Self {
        ServerEvent::Error {
            reason: reason.into(),
        }
    }
}

/// Protocol-level failures.
#[derive(Debug, Clone, Error)]
pub enum ProtocolError {
    #[error("encode error: {0}")]
    Encode(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("connection closed")]
    ConnectionClosed,
}
