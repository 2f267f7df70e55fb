//! The transactional object store.
//!
//! All writes funnel through a process-wide write lock and a short
//! busy-retry loop, then run inside a single SQLite transaction that covers
//! both the row mutation and the change log append. A write that cannot
//! publish its change record does not commit.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use plank_core::change::EventType;
use plank_core::object::{derived_parent_id, Category, Dependency, Object, Relationship, Stage};
use rusqlite::Connection;
use tracing::{debug, instrument, warn};

use crate::diff::build_record;
use crate::errors::{Result, StoreError};
use crate::sqlite::connection::{self, ConnectionConfig, ConnectionPool};
use crate::sqlite::migrations::run_migrations;
use crate::sqlite::repositories::change_log::{ChangeLogEntry, ChangeLogRepo};
use crate::sqlite::repositories::object::ObjectRepo;

const MAX_BUSY_RETRIES: u32 = 32;
const RETRY_STEP_MS: u64 = 10;
const RETRY_CAP_MS: u64 = 500;

/// Fields for a freshly created object.
#[derive(Clone, Debug)]
pub struct NewObject {
    /// Schema discriminator.
    pub category: Category,
    /// Initial stage.
    pub stage: Stage,
    /// Initial relationship array.
    pub related: Vec<Relationship>,
    /// Initial dependency array.
    pub dependencies: Vec<Dependency>,
    /// Acting user.
    pub updated_by: String,
}

/// Partial update of an object. `None` fields keep their current value.
#[derive(Clone, Debug, Default)]
pub struct ObjectPatch {
    /// New stage, if changing.
    pub stage: Option<Stage>,
    /// Replacement relationship array, if changing.
    pub related: Option<Vec<Relationship>>,
    /// Replacement dependency array, if changing.
    pub dependencies: Option<Vec<Dependency>>,
}

/// SQLite-backed store with transactional change publication.
pub struct ObjectStore {
    pool: ConnectionPool,
    // Serializes writers within the process so the busy-retry loop only has
    // to cover other processes on the same file.
    write_lock: Mutex<()>,
}

impl ObjectStore {
    /// Open (or create) a store at the given database file.
    pub fn open(path: impl AsRef<std::path::Path>, config: &ConnectionConfig) -> Result<Self> {
        Self::from_pool(connection::new_file(path, config)?)
    }

    /// Open a fresh in-memory store.
    pub fn in_memory() -> Result<Self> {
        Self::from_pool(connection::new_in_memory(&ConnectionConfig::default())?)
    }

    fn from_pool(pool: ConnectionPool) -> Result<Self> {
        let conn = pool.get()?;
        run_migrations(&conn)?;
        drop(conn);
        Ok(Self {
            pool,
            write_lock: Mutex::new(()),
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────

    /// Fetch one object.
    pub fn get(&self, id: i64) -> Result<Object> {
        let conn = self.pool.get()?;
        ObjectRepo::get(&conn, id)?.ok_or(StoreError::ObjectNotFound(id))
    }

    /// List objects, optionally filtered by category.
    pub fn list(&self, category: Option<Category>) -> Result<Vec<Object>> {
        let conn = self.pool.get()?;
        ObjectRepo::list(&conn, category)
    }

    /// Highest change log sequence number (0 when empty).
    pub fn head_seq(&self) -> Result<u64> {
        let conn = self.pool.get()?;
        ChangeLogRepo::max_seq(&conn)
    }

    /// Change log entries after `after`, oldest first.
    pub fn changes_after(&self, after: u64, limit: u32) -> Result<Vec<ChangeLogEntry>> {
        let conn = self.pool.get()?;
        ChangeLogRepo::fetch_after(&conn, after, limit)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────

    /// Create an object. Always publishes a `created` change record.
    #[instrument(skip(self, input), fields(category = %input.category))]
    pub fn create(&self, input: NewObject) -> Result<Object> {
        let _guard = self.lock_writes()?;
        retry_on_sqlite_busy(|| {
            let conn = self.pool.get()?;
            let tx = conn.unchecked_transaction()?;
            let timestamp = now();
            let parent_id = derived_parent_id(&input.related);

            let id = ObjectRepo::insert(
                &tx,
                input.category,
                input.stage,
                parent_id,
                &input.related,
                &input.dependencies,
                &timestamp,
                &input.updated_by,
            )?;
            let object = ObjectRepo::get(&tx, id)?
                .ok_or_else(|| StoreError::Internal(format!("inserted object {id} missing")))?;

            let record =
                build_record(EventType::Created, None, Some(&object), &input.updated_by, &timestamp)
                    .ok_or_else(|| StoreError::Internal("create produced no record".into()))?;
            let seq = ChangeLogRepo::append(&tx, &record)?;
            tx.commit()?;

            debug!(object_id = id, seq, "object created");
            Ok(object)
        })
    }

    /// Apply a partial update.
    ///
    /// Returns the stored object and whether a change record was published.
    /// When the patch leaves stage, relationships, and dependencies all
    /// byte-equal the write is skipped entirely: no row touch, no record,
    /// no `updated_at` bump.
    #[instrument(skip(self, patch))]
    pub fn update(&self, id: i64, patch: ObjectPatch, actor: &str) -> Result<(Object, bool)> {
        let _guard = self.lock_writes()?;
        retry_on_sqlite_busy(|| {
            let conn = self.pool.get()?;
            let tx = conn.unchecked_transaction()?;

            let old = ObjectRepo::get(&tx, id)?.ok_or(StoreError::ObjectNotFound(id))?;

            let stage = patch.stage.unwrap_or(old.stage);
            let related = patch.related.clone().unwrap_or_else(|| old.related.clone());
            let dependencies = patch
                .dependencies
                .clone()
                .unwrap_or_else(|| old.dependencies.clone());

            if stage == old.stage && related == old.related && dependencies == old.dependencies {
                debug!(object_id = id, "update is a no-op, skipping write");
                return Ok((old, false));
            }

            let timestamp = now();
            let parent_id = derived_parent_id(&related);
            ObjectRepo::update_row(
                &tx, id, stage, parent_id, &related, &dependencies, &timestamp, actor,
            )?;
            let new = ObjectRepo::get(&tx, id)?
                .ok_or_else(|| StoreError::Internal(format!("updated object {id} missing")))?;

            let published = match build_record(
                EventType::Updated,
                Some(&old),
                Some(&new),
                actor,
                &timestamp,
            ) {
                Some(record) => {
                    let seq = ChangeLogRepo::append(&tx, &record)?;
                    debug!(object_id = id, seq, "object updated");
                    true
                }
                // Row content changed (relationship category edits) without
                // any tracked change, so persist silently.
                None => false,
            };
            tx.commit()?;
            Ok((new, published))
        })
    }

    /// Delete an object and, recursively, everything parented under it.
    ///
    /// Children are discovered through parent entries in `related` arrays
    /// and removed leaves first, each with its own `deleted` change record,
    /// all inside one transaction. Returns ids in deletion order.
    #[instrument(skip(self))]
    pub fn delete(&self, id: i64, actor: &str) -> Result<Vec<i64>> {
        let _guard = self.lock_writes()?;
        retry_on_sqlite_busy(|| {
            let conn = self.pool.get()?;
            let tx = conn.unchecked_transaction()?;

            if ObjectRepo::get(&tx, id)?.is_none() {
                return Err(StoreError::ObjectNotFound(id));
            }

            let order = cascade_order(&tx, id)?;
            let timestamp = now();
            for &victim in &order {
                let Some(old) = ObjectRepo::get(&tx, victim)? else {
                    continue;
                };
                ObjectRepo::delete(&tx, victim)?;
                if let Some(record) =
                    build_record(EventType::Deleted, Some(&old), None, actor, &timestamp)
                {
                    let _ = ChangeLogRepo::append(&tx, &record)?;
                }
            }
            tx.commit()?;

            debug!(object_id = id, deleted = order.len(), "cascade delete committed");
            Ok(order)
        })
    }

    fn lock_writes(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| StoreError::Internal("write lock poisoned".into()))
    }
}

/// Post-order traversal of the parent tree rooted at `root`: leaves first,
/// `root` last. A visited set guards against relationship cycles.
fn cascade_order(conn: &Connection, root: i64) -> Result<Vec<i64>> {
    let mut order = Vec::new();
    let mut visited = std::collections::HashSet::new();
    visit(conn, root, &mut visited, &mut order)?;
    Ok(order)
}

fn visit(
    conn: &Connection,
    id: i64,
    visited: &mut std::collections::HashSet<i64>,
    order: &mut Vec<i64>,
) -> Result<()> {
    if !visited.insert(id) {
        return Ok(());
    }
    for child in ObjectRepo::children_of(conn, id)? {
        visit(conn, child, visited, order)?;
    }
    order.push(id);
    Ok(())
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Run `op`, retrying on SQLITE_BUSY/SQLITE_LOCKED with linearly growing,
/// jittered sleeps. Other errors pass through immediately.
fn retry_on_sqlite_busy<T>(mut op: impl FnMut() -> Result<T>) -> Result<T> {
    let mut attempt: u32 = 0;
    loop {
        match op() {
            Err(StoreError::Sqlite(err)) if is_busy(&err) && attempt < MAX_BUSY_RETRIES => {
                attempt += 1;
                let base = (u64::from(attempt) * RETRY_STEP_MS).min(RETRY_CAP_MS);
                let jittered = apply_jitter(base);
                warn!(attempt, sleep_ms = jittered, "database busy, retrying write");
                std::thread::sleep(Duration::from_millis(jittered));
            }
            other => return other,
        }
    }
}

fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
    )
}

// ±25% so concurrent writers desynchronize.
fn apply_jitter(base_ms: u64) -> u64 {
    use rand::Rng;
    let factor: f64 = rand::rng().random_range(0.75..=1.25);
    let jittered = (base_ms as f64 * factor) as u64;
    jittered.max(1)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use plank_core::change::EventType;

    fn setup() -> ObjectStore {
        ObjectStore::in_memory().unwrap()
    }

    fn rel(id: i64, kind: &str) -> Relationship {
        Relationship {
            id,
            relation_kind: kind.into(),
            category: "task".into(),
        }
    }

    fn new_task(related: Vec<Relationship>) -> NewObject {
        NewObject {
            category: Category::Task,
            stage: Stage::Draft,
            related,
            dependencies: vec![],
            updated_by: "alice".into(),
        }
    }

    #[test]
    fn create_derives_parent_and_publishes_record() {
        let store = setup();
        let parent = store
            .create(NewObject {
                category: Category::Project,
                ..new_task(vec![])
            })
            .unwrap();
        let child = store.create(new_task(vec![rel(parent.id, "parent")])).unwrap();

        assert_eq!(child.parent_id, Some(parent.id));

        let entries = store.changes_after(0, 100).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].record.event_type, EventType::Created);
        assert_eq!(entries[1].record.object_id, child.id);
        assert!(entries[1].record.changes.parent_id_changed);
    }

    #[test]
    fn update_publishes_diff() {
        let store = setup();
        let a = store.create(new_task(vec![])).unwrap();
        let before = store.head_seq().unwrap();

        let (updated, published) = store
            .update(
                a.id,
                ObjectPatch {
                    related: Some(vec![rel(99, "blocks")]),
                    ..ObjectPatch::default()
                },
                "bob",
            )
            .unwrap();

        assert!(published);
        assert_eq!(updated.updated_by, "bob");

        let entries = store.changes_after(before, 10).unwrap();
        assert_eq!(entries.len(), 1);
        let record = &entries[0].record;
        assert_eq!(record.event_type, EventType::Updated);
        assert!(record.changes.related_changed);
        assert_eq!(record.changes.added_relationships, vec![rel(99, "blocks")]);
    }

    #[test]
    fn noop_update_publishes_nothing_and_keeps_timestamps() {
        let store = setup();
        let a = store.create(new_task(vec![rel(5, "blocks")])).unwrap();
        let before = store.head_seq().unwrap();

        let (same, published) = store
            .update(
                a.id,
                ObjectPatch {
                    related: Some(vec![rel(5, "blocks")]),
                    ..ObjectPatch::default()
                },
                "bob",
            )
            .unwrap();

        assert!(!published);
        assert_eq!(same.updated_at, a.updated_at);
        assert_eq!(same.updated_by, "alice");
        assert_eq!(store.head_seq().unwrap(), before);
    }

    #[test]
    fn reordered_related_is_a_noop() {
        let store = setup();
        let a = store
            .create(new_task(vec![rel(1, "blocks"), rel(2, "relates_to")]))
            .unwrap();
        let before = store.head_seq().unwrap();

        // Reordering changes the array bytes, so the row is rewritten, but
        // the keyed sets match and no record is published.
        let (_, published) = store
            .update(
                a.id,
                ObjectPatch {
                    related: Some(vec![rel(2, "relates_to"), rel(1, "blocks")]),
                    ..ObjectPatch::default()
                },
                "bob",
            )
            .unwrap();
        assert!(!published);
        assert_eq!(store.head_seq().unwrap(), before);
    }

    #[test]
    fn stage_only_update_publishes() {
        let store = setup();
        let a = store.create(new_task(vec![])).unwrap();
        let (updated, published) = store
            .update(
                a.id,
                ObjectPatch {
                    stage: Some(Stage::Doing),
                    ..ObjectPatch::default()
                },
                "bob",
            )
            .unwrap();
        assert!(published);
        assert_eq!(updated.stage, Stage::Doing);
    }

    #[test]
    fn update_missing_is_not_found() {
        let store = setup();
        let err = store.update(404, ObjectPatch::default(), "bob").unwrap_err();
        assert!(matches!(err, StoreError::ObjectNotFound(404)));
    }

    #[test]
    fn reparent_emits_parent_change_with_add_and_remove() {
        let store = setup();
        let p1 = store.create(new_task(vec![])).unwrap();
        let p2 = store.create(new_task(vec![])).unwrap();
        let child = store.create(new_task(vec![rel(p1.id, "parent")])).unwrap();
        let before = store.head_seq().unwrap();

        let (updated, _) = store
            .update(
                child.id,
                ObjectPatch {
                    related: Some(vec![rel(p2.id, "parent")]),
                    ..ObjectPatch::default()
                },
                "bob",
            )
            .unwrap();
        assert_eq!(updated.parent_id, Some(p2.id));

        let record = &store.changes_after(before, 10).unwrap()[0].record;
        assert!(record.changes.parent_id_changed);
        assert_eq!(record.changes.added_relationships, vec![rel(p2.id, "parent")]);
        assert_eq!(record.changes.removed_relationships, vec![rel(p1.id, "parent")]);
    }

    #[test]
    fn delete_cascades_leaves_first() {
        let store = setup();
        let root = store.create(new_task(vec![])).unwrap();
        let mid = store.create(new_task(vec![rel(root.id, "parent")])).unwrap();
        let leaf = store.create(new_task(vec![rel(mid.id, "parent")])).unwrap();
        let before = store.head_seq().unwrap();

        let deleted = store.delete(root.id, "carol").unwrap();
        assert_eq!(deleted, vec![leaf.id, mid.id, root.id]);
        assert!(matches!(
            store.get(root.id).unwrap_err(),
            StoreError::ObjectNotFound(_)
        ));

        let entries = store.changes_after(before, 10).unwrap();
        assert_eq!(entries.len(), 3);
        for entry in &entries {
            assert_eq!(entry.record.event_type, EventType::Deleted);
            assert_eq!(entry.record.updated_by, "carol");
        }
        assert_eq!(entries[0].record.object_id, leaf.id);
        assert_eq!(entries[2].record.object_id, root.id);
    }

    #[test]
    fn delete_survives_parent_cycles() {
        let store = setup();
        let a = store.create(new_task(vec![])).unwrap();
        let b = store.create(new_task(vec![rel(a.id, "parent")])).unwrap();
        // Make a a child of b too.
        let _ = store
            .update(
                a.id,
                ObjectPatch {
                    related: Some(vec![rel(b.id, "parent")]),
                    ..ObjectPatch::default()
                },
                "alice",
            )
            .unwrap();

        let deleted = store.delete(a.id, "carol").unwrap();
        assert_eq!(deleted.len(), 2);
        assert!(store.get(b.id).is_err());
    }

    #[test]
    fn delete_missing_is_not_found() {
        let store = setup();
        let err = store.delete(404, "carol").unwrap_err();
        assert!(matches!(err, StoreError::ObjectNotFound(404)));
    }

    #[test]
    fn deleted_record_lists_removed_relationships() {
        let store = setup();
        let a = store
            .create(new_task(vec![rel(1, "blocks"), rel(2, "relates_to")]))
            .unwrap();
        let before = store.head_seq().unwrap();

        let _ = store.delete(a.id, "carol").unwrap();
        let record = &store.changes_after(before, 10).unwrap()[0].record;
        assert_eq!(record.changes.removed_relationships.len(), 2);
        assert!(record.changes.added_relationships.is_empty());
    }

    #[test]
    fn list_and_get_round_trip() {
        let store = setup();
        let a = store.create(new_task(vec![])).unwrap();
        let _b = store
            .create(NewObject {
                category: Category::Project,
                ..new_task(vec![])
            })
            .unwrap();

        assert_eq!(store.get(a.id).unwrap().id, a.id);
        assert_eq!(store.list(Some(Category::Task)).unwrap().len(), 1);
        assert_eq!(store.list(None).unwrap().len(), 2);
    }

    #[test]
    fn every_read_path_works_from_the_pool() {
        let store = setup();
        let a = store.create(new_task(vec![])).unwrap();

        assert_eq!(store.get(a.id).unwrap().id, a.id);
        assert_eq!(store.list(None).unwrap().len(), 1);
        assert_eq!(store.head_seq().unwrap(), 1);
        assert_eq!(store.changes_after(0, 10).unwrap().len(), 1);
    }

    #[test]
    fn file_backed_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plank.db");
        let id = {
            let store = ObjectStore::open(&path, &ConnectionConfig::default()).unwrap();
            store.create(new_task(vec![])).unwrap().id
        };
        let store = ObjectStore::open(&path, &ConnectionConfig::default()).unwrap();
        assert_eq!(store.get(id).unwrap().id, id);
        assert_eq!(store.head_seq().unwrap(), 1);
    }
}
