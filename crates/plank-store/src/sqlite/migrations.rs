//! Schema migrations.
//!
//! Idempotent: every statement is `IF NOT EXISTS`, so `run_migrations` is
//! safe to call on every startup.

use rusqlite::Connection;

use crate::errors::Result;

/// Apply the full schema to a connection.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS objects (
             id            INTEGER PRIMARY KEY AUTOINCREMENT,
             category      TEXT NOT NULL,
             stage         TEXT NOT NULL DEFAULT 'draft',
             parent_id     INTEGER,
             related       TEXT NOT NULL DEFAULT '[]',
             dependencies  TEXT NOT NULL DEFAULT '[]',
             created_at    TEXT NOT NULL,
             updated_at    TEXT NOT NULL,
             updated_by    TEXT NOT NULL
         );

         CREATE INDEX IF NOT EXISTS idx_objects_parent_id ON objects(parent_id);
         CREATE INDEX IF NOT EXISTS idx_objects_category ON objects(category);

         CREATE TABLE IF NOT EXISTS change_log (
             seq         INTEGER PRIMARY KEY AUTOINCREMENT,
             object_id   INTEGER NOT NULL,
             record      TEXT NOT NULL,
             created_at  TEXT NOT NULL
         );

         CREATE INDEX IF NOT EXISTS idx_change_log_object_id ON change_log(object_id);",
    )?;
    Ok(())
}
