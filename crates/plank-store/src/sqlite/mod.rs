//! SQLite plumbing: connection pool, schema migrations, row repositories.

pub mod connection;
pub mod migrations;
pub mod repositories;
