//! Change records — the structured diff-plus-snapshot emitted for every
//! observable mutation of a board object.
//!
//! A `ChangeRecord` is ephemeral: it exists only between the write that
//! produced it and its delivery to subscribers. The wire field set is load
//! bearing — connected clients parse these exact names.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::object::{Category, Dependency, Object, Relationship, Stage};

/// What kind of write produced a change record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    /// Object inserted.
    Created,
    /// Object mutated.
    Updated,
    /// Object deleted (directly or by cascade).
    Deleted,
}

impl EventType {
    /// Wire name of the event type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "updated" => Ok(Self::Updated),
            "deleted" => Ok(Self::Deleted),
            other => Err(format!("unknown event type '{other}'")),
        }
    }
}

/// The `changes` sub-object of a change record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    /// Whether the relationship set changed.
    pub related_changed: bool,
    /// Whether the dependency set changed.
    pub dependencies_changed: bool,
    /// Whether the derived parent pointer changed.
    pub parent_id_changed: bool,
    /// Relationships present in the new set but not the old.
    pub added_relationships: Vec<Relationship>,
    /// Relationships present in the old set but not the new.
    pub removed_relationships: Vec<Relationship>,
}

impl ChangeSet {
    /// True when no tracked relationship/dependency/parent change occurred.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        !self.related_changed && !self.dependencies_changed && !self.parent_id_changed
    }
}

/// One change event, as delivered to every subscriber.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Kind of write.
    pub event_type: EventType,
    /// Subject object id.
    pub object_id: i64,
    /// Subject category.
    pub category: Category,
    /// Parent pointer after the write (null for deletes of roots).
    pub parent_id: Option<i64>,
    /// Stage after the write.
    pub stage: Stage,
    /// Relationship array after the write.
    pub related: Vec<Relationship>,
    /// Dependency array after the write.
    pub dependencies: Vec<Dependency>,
    /// Acting user.
    pub updated_by: String,
    /// RFC 3339 timestamp of the write.
    pub timestamp: String,
    /// Structured diff.
    pub changes: ChangeSet,
}

impl ChangeRecord {
    /// Build a record snapshotting `object`, with the given diff.
    #[must_use]
    pub fn from_snapshot(event_type: EventType, object: &Object, changes: ChangeSet) -> Self {
        Self {
            event_type,
            object_id: object.id,
            category: object.category,
            parent_id: object.parent_id,
            stage: object.stage,
            related: object.related.clone(),
            dependencies: object.dependencies.clone(),
            updated_by: object.updated_by.clone(),
            timestamp: object.updated_at.clone(),
            changes,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
