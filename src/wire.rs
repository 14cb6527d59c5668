//! Wire-format (de)serialization (§6): the tagged envelope exchanged with
//! a host/transport, covering deltas, full-document snapshots, remote
//! cursor updates and version acknowledgements.
//!
//! Grounded on the teacher's `EditorProtocolMessageToEditor`
//! (`editor_protocol.rs`): a `#[serde(tag = ..., content = ...)]`
//! enum-to-JSON shape, reused here for the core's own message set
//! instead of the teacher's JSON-RPC-to-editor notifications.

use serde::{Deserialize, Serialize};

use crate::diff::Delta;
use crate::model::{Document, Position, Selection};

/// One message exchanged between this core and a host/transport, tagged
/// by `type` with the payload under `content` (mirrors the teacher's
/// `editor_protocol.rs` envelope convention).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum WireMessage {
    /// A batch of ops produced by one client (§4.3/§4.6).
    Delta(Delta),
    /// A full-document snapshot, sent e.g. on initial connect.
    Snapshot { doc: Document },
    /// A remote collaborator's cursor/selection moved.
    Cursor {
        client_id: String,
        position: Position,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selection: Option<Selection>,
    },
    /// A collaborator disconnected; hosts should drop its cursor.
    CursorCleared { client_id: String },
    /// Acknowledges a delta was applied, carrying the resulting version.
    Ack { client_id: String, result_version: u64 },
}

/// Serializes `message` to its wire JSON form.
pub fn encode(message: &WireMessage) -> serde_json::Result<String> {
    serde_json::to_string(message)
}

/// Parses a wire JSON string back into a `WireMessage`.
pub fn decode(raw: &str) -> serde_json::Result<WireMessage> {
    serde_json::from_str(raw)
}
