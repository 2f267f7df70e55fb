//! Object row repository.
//!
//! Stateless: every method takes a `&Connection` so callers control
//! transaction boundaries. JSON columns are parsed leniently on read —
//! a malformed array logs a warning and reads as empty rather than failing
//! the whole query.

use plank_core::object::{Category, Dependency, Object, Relationship, Stage};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::warn;

use crate::errors::{Result, StoreError};

/// Repository over the `objects` table.
pub struct ObjectRepo;

const SELECT_COLUMNS: &str = "id, category, stage, parent_id, related, dependencies, \
                              created_at, updated_at, updated_by";

impl ObjectRepo {
    /// Insert a row and return its assigned id.
    pub fn insert(
        conn: &Connection,
        category: Category,
        stage: Stage,
        parent_id: Option<i64>,
        related: &[Relationship],
        dependencies: &[Dependency],
        timestamp: &str,
        updated_by: &str,
    ) -> Result<i64> {
        let _ = conn.execute(
            "INSERT INTO objects (category, stage, parent_id, related, dependencies,
                                  created_at, updated_at, updated_by)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, ?7)",
            params![
                category.as_str(),
                stage.as_str(),
                parent_id,
                serde_json::to_string(related)?,
                serde_json::to_string(dependencies)?,
                timestamp,
                updated_by,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Fetch one object by id.
    pub fn get(conn: &Connection, id: i64) -> Result<Option<Object>> {
        conn.query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM objects WHERE id = ?1"),
            params![id],
            row_to_object,
        )
        .optional()
        .map_err(StoreError::from)
    }

    /// List objects, optionally filtered by category, ordered by id.
    pub fn list(conn: &Connection, category: Option<Category>) -> Result<Vec<Object>> {
        let mut out = Vec::new();
        match category {
            Some(cat) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SELECT_COLUMNS} FROM objects WHERE category = ?1 ORDER BY id"
                ))?;
                let rows = stmt.query_map(params![cat.as_str()], row_to_object)?;
                for row in rows {
                    out.push(row?);
                }
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SELECT_COLUMNS} FROM objects ORDER BY id"
                ))?;
                let rows = stmt.query_map([], row_to_object)?;
                for row in rows {
                    out.push(row?);
                }
            }
        }
        Ok(out)
    }

    /// Overwrite the mutable columns of a row.
    pub fn update_row(
        conn: &Connection,
        id: i64,
        stage: Stage,
        parent_id: Option<i64>,
        related: &[Relationship],
        dependencies: &[Dependency],
        timestamp: &str,
        updated_by: &str,
    ) -> Result<()> {
        let affected = conn.execute(
            "UPDATE objects
             SET stage = ?2, parent_id = ?3, related = ?4, dependencies = ?5,
                 updated_at = ?6, updated_by = ?7
             WHERE id = ?1",
            params![
                id,
                stage.as_str(),
                parent_id,
                serde_json::to_string(related)?,
                serde_json::to_string(dependencies)?,
                timestamp,
                updated_by,
            ],
        )?;
        if affected == 0 {
            return Err(StoreError::ObjectNotFound(id));
        }
        Ok(())
    }

    /// Delete a single row.
    pub fn delete(conn: &Connection, id: i64) -> Result<()> {
        let affected = conn.execute("DELETE FROM objects WHERE id = ?1", params![id])?;
        if affected == 0 {
            return Err(StoreError::ObjectNotFound(id));
        }
        Ok(())
    }

    /// Ids of objects whose `related` array carries a parent link to `id`.
    ///
    /// Matches on the relationship array, not the denormalized `parent_id`
    /// column, because `related` is the canonical source. Rows with malformed
    /// JSON simply never match.
    pub fn children_of(conn: &Connection, id: i64) -> Result<Vec<i64>> {
        let mut stmt = conn.prepare(
            "SELECT DISTINCT o.id
             FROM objects o,
                  json_each(CASE WHEN json_valid(o.related) THEN o.related ELSE '[]' END) entry
             WHERE json_extract(entry.value, '$.relation_kind') = 'parent'
               AND json_extract(entry.value, '$.id') = ?1
             ORDER BY o.id",
        )?;
        let rows = stmt.query_map(params![id], |row| row.get::<_, i64>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

fn row_to_object(row: &Row<'_>) -> rusqlite::Result<Object> {
    let id: i64 = row.get(0)?;
    let category: String = row.get(1)?;
    let stage: String = row.get(2)?;
    let related_json: String = row.get(4)?;
    let dependencies_json: String = row.get(5)?;

    let category = category.parse::<Category>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, e.into())
    })?;
    let stage = stage.parse::<Stage>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, e.into())
    })?;

    Ok(Object {
        id,
        category,
        stage,
        parent_id: row.get(3)?,
        related: parse_json_array(id, "related", &related_json),
        dependencies: parse_json_array(id, "dependencies", &dependencies_json),
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
        updated_by: row.get(8)?,
    })
}

fn parse_json_array<T: serde::de::DeserializeOwned>(id: i64, column: &str, raw: &str) -> Vec<T> {
    match serde_json::from_str(raw) {
        Ok(parsed) => parsed,
        Err(error) => {
            warn!(object_id = id, column, %error, "malformed JSON array column, treating as empty");
            Vec::new()
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
