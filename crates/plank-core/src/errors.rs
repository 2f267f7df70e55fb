//! Relay-facing error taxonomy.
//!
//! Store-internal failures live in `plank-store`; this enum covers the
//! session/delivery surface shared by the relay and the server. Nothing in
//! the pipeline is allowed to crash the hosting process — the worst case for
//! any single-session failure is that session's closure.

use thiserror::Error;

/// Errors surfaced by the session registry and transports.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The addressed session does not exist (stale or never registered).
    #[error("session '{0}' not found")]
    SessionNotFound(String),

    /// A resume marker points before the replay buffer's retention window.
    /// The client must perform a full resync; events are never skipped
    /// silently.
    #[error("cannot resume from event {requested}: oldest retained event is {oldest_retained}")]
    ResumeGapTooLarge {
        /// Marker the client asked to resume after.
        requested: u64,
        /// Oldest event id still held in the replay buffer.
        oldest_retained: u64,
    },

    /// The relay is shutting down and no longer accepts registrations.
    #[error("relay is shutting down")]
    ShuttingDown,
}
