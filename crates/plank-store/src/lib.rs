//! # plank-store
//!
//! SQLite-backed object store for the board, plus the change-detection core:
//!
//! - [`store::ObjectStore`] — transactional create/update/delete/get/list;
//!   every write that changes observable state appends exactly one
//!   [`plank_core::change::ChangeRecord`] to the `change_log` outbox table
//!   in the same transaction (a failed publish fails the write)
//! - [`diff::build_record`] — the pure change detector: relationship and
//!   dependency set diffing, parent derivation, no-op suppression
//! - [`sqlite`] — connection pool, migrations, and row repositories
//!
//! The `change_log` table plays the role of a database notification channel:
//! the relay's single listener tails it by monotonic sequence number.

#![deny(unsafe_code)]

pub mod diff;
pub mod errors;
pub mod sqlite;
pub mod store;

pub use errors::{Result, StoreError};
pub use sqlite::connection::{ConnectionConfig, ConnectionPool, PooledConnection};
pub use sqlite::repositories::change_log::ChangeLogEntry;
pub use store::{NewObject, ObjectPatch, ObjectStore};
