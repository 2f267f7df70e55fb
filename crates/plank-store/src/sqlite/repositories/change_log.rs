//! Change log repository.
//!
//! The `change_log` table is the in-database notification channel: the store
//! appends a serialized [`ChangeRecord`] in the same transaction as the row
//! write, and the feed listener tails the table by `seq`.

use plank_core::change::ChangeRecord;
use rusqlite::{params, Connection};

use crate::errors::Result;

/// One tailed change log row.
#[derive(Clone, Debug)]
pub struct ChangeLogEntry {
    /// Monotonic sequence number assigned on append.
    pub seq: u64,
    /// The deserialized change record.
    pub record: ChangeRecord,
}

/// Repository over the `change_log` table.
pub struct ChangeLogRepo;

impl ChangeLogRepo {
    /// Append a record, returning its assigned sequence number.
    pub fn append(conn: &Connection, record: &ChangeRecord) -> Result<u64> {
        let _ = conn.execute(
            "INSERT INTO change_log (object_id, record, created_at) VALUES (?1, ?2, ?3)",
            params![
                record.object_id,
                serde_json::to_string(record)?,
                record.timestamp,
            ],
        )?;
        Ok(conn.last_insert_rowid() as u64)
    }

    /// Entries with `seq` strictly greater than `after`, oldest first.
    pub fn fetch_after(conn: &Connection, after: u64, limit: u32) -> Result<Vec<ChangeLogEntry>> {
        let mut stmt = conn.prepare(
            "SELECT seq, record FROM change_log WHERE seq > ?1 ORDER BY seq LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![after, limit], |row| {
            let seq: u64 = row.get(0)?;
            let raw: String = row.get(1)?;
            Ok((seq, raw))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (seq, raw) = row?;
            out.push(ChangeLogEntry {
                seq,
                record: serde_json::from_str(&raw)?,
            });
        }
        Ok(out)
    }

    /// Highest assigned sequence number, 0 when the log is empty.
    pub fn max_seq(conn: &Connection) -> Result<u64> {
        let seq: u64 = conn.query_row(
            "SELECT COALESCE(MAX(seq), 0) FROM change_log",
            [],
            |row| row.get(0),
        )?;
        Ok(seq)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
