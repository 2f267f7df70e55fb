//! Pure relationship diffing.
//!
//! Everything here is side-effect free: snapshots in, [`ChangeSet`] /
//! [`ChangeRecord`] out. The store calls [`build_record`] inside its write
//! transaction; tests can exercise the diff rules without a database.

use std::collections::HashSet;

use plank_core::change::{ChangeRecord, ChangeSet, EventType};
use plank_core::object::{derived_parent_id, Dependency, Object, Relationship};

/// Compute the structured diff between two relationship snapshots.
///
/// Entries are keyed by `(id, relation_kind)`; the `category` field is
/// ignored, so editing only a relationship's category is not a change.
/// Duplicate keys within one array are collapsed to the first occurrence.
/// `added_relationships` preserves `new` array order and
/// `removed_relationships` preserves `old` array order.
#[must_use]
pub fn compute_changes(
    old_related: &[Relationship],
    new_related: &[Relationship],
    old_dependencies: &[Dependency],
    new_dependencies: &[Dependency],
) -> ChangeSet {
    let old_keys: HashSet<(i64, &str)> = old_related.iter().map(Relationship::key).collect();
    let new_keys: HashSet<(i64, &str)> = new_related.iter().map(Relationship::key).collect();

    let added_relationships = distinct_not_in(new_related, &old_keys);
    let removed_relationships = distinct_not_in(old_related, &new_keys);

    let old_dep_keys: HashSet<(i64, &str)> =
        old_dependencies.iter().map(Dependency::key).collect();
    let new_dep_keys: HashSet<(i64, &str)> =
        new_dependencies.iter().map(Dependency::key).collect();

    ChangeSet {
        related_changed: !added_relationships.is_empty() || !removed_relationships.is_empty(),
        dependencies_changed: old_dep_keys != new_dep_keys,
        parent_id_changed: derived_parent_id(old_related) != derived_parent_id(new_related),
        added_relationships,
        removed_relationships,
    }
}

fn distinct_not_in(
    source: &[Relationship],
    exclude: &HashSet<(i64, &str)>,
) -> Vec<Relationship> {
    let mut seen: HashSet<(i64, &str)> = HashSet::new();
    source
        .iter()
        .filter(|entry| !exclude.contains(&entry.key()) && seen.insert(entry.key()))
        .cloned()
        .collect()
}

/// Build the change record for one write, or `None` when the write is a
/// suppressed no-op.
///
/// `Created` diffs the new snapshot against emptiness; `Deleted` diffs
/// emptiness against the old snapshot (so every prior relationship appears
/// in `removed_relationships`) and stamps the deleting actor and time over
/// the stale snapshot columns. `Updated` is suppressed when neither the
/// tracked relationship state nor the stage changed.
#[must_use]
pub fn build_record(
    event_type: EventType,
    old: Option<&Object>,
    new: Option<&Object>,
    actor: &str,
    timestamp: &str,
) -> Option<ChangeRecord> {
    match event_type {
        EventType::Created => {
            let new = new?;
            let changes = compute_changes(&[], &new.related, &[], &new.dependencies);
            Some(ChangeRecord::from_snapshot(event_type, new, changes))
        }
        EventType::Updated => {
            let (old, new) = (old?, new?);
            let changes = compute_changes(
                &old.related,
                &new.related,
                &old.dependencies,
                &new.dependencies,
            );
            if changes.is_noop() && old.stage == new.stage {
                return None;
            }
            Some(ChangeRecord::from_snapshot(event_type, new, changes))
        }
        EventType::Deleted => {
            let old = old?;
            let changes = compute_changes(&old.related, &[], &old.dependencies, &[]);
            let mut record = ChangeRecord::from_snapshot(event_type, old, changes);
            record.updated_by = actor.to_owned();
            record.timestamp = timestamp.to_owned();
            Some(record)
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
