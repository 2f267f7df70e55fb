//! # plank-relay
//!
//! The delivery half of the change pipeline. A single [`feed::ChangeFeed`]
//! listener tails the store's change log and fans each event out to every
//! registered subscriber session:
//!
//! - [`queue::SessionQueue`] — bounded per-session buffer; overflow drops
//!   the oldest event and flags the session so the client learns it missed
//!   something
//! - [`replay::ReplayBuffer`] — shared ring of recent events backing
//!   WebSocket resume
//! - [`registry::SessionRegistry`] — session lifecycle, admin listing and
//!   forced disconnect
//!
//! Delivery is at-most-once across listener restarts: on (re)start the
//! listener picks up at the current log head.

#![deny(unsafe_code)]

pub mod event;
pub mod feed;
pub mod queue;
pub mod registry;
pub mod replay;

pub use event::ChangeEvent;
pub use feed::{ChangeFeed, FeedConfig};
pub use queue::{Delivery, SessionQueue};
pub use registry::{Session, SessionInfo, SessionRegistry, SessionState, Transport};
pub use replay::ReplayBuffer;
