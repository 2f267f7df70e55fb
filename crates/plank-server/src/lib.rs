//! # plank-server
//!
//! The HTTP surface over the store and relay: board object CRUD, the two
//! change delivery transports (NDJSON stream and resumable WebSocket), and
//! the admin/observability endpoints.

#![deny(unsafe_code)]

pub mod admin;
pub mod error;
pub mod metrics;
pub mod objects;
pub mod protocol;
pub mod routes;
pub mod state;
pub mod stream;
pub mod ws;

pub use routes::router;
pub use state::AppState;
