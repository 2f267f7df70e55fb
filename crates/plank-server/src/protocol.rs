//! Subscriber wire protocol.
//!
//! Both transports speak the same tagged JSON envelopes. The NDJSON stream
//! emits one envelope per line; the WebSocket sends one per text frame and
//! additionally accepts [`ClientMessage`] frames.

use plank_core::change::ChangeRecord;
use serde::{Deserialize, Serialize};

/// Server-to-client envelope.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage<'a> {
    /// One change event.
    Change {
        /// Monotonic event id, the resume marker.
        event_id: u64,
        /// The change record.
        record: &'a ChangeRecord,
    },
    /// At least one event was dropped for this session before the next
    /// `change` envelope.
    MissedEvents,
    /// The requested resume point is older than retained history; the
    /// client must refetch board state.
    ResumeGap {
        /// Oldest event id still resumable.
        oldest_retained: u64,
    },
    /// Reply to a client ping.
    Pong,
}

impl ServerMessage<'_> {
    /// Serialize to a JSON line (no trailing newline).
    #[must_use]
    pub fn to_json(&self) -> String {
        // Infallible for these shapes.
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{\"type\":\"error\"}"))
    }
}

/// Client-to-server WebSocket message.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Client confirms processing up to `event_id`.
    Ack {
        /// Highest processed event id.
        event_id: u64,
    },
    /// Liveness probe; the server answers `pong`.
    Ping,
    /// Orderly goodbye.
    Disconnect,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
