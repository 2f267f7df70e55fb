//! The board object model.
//!
//! Every board record (task, project, epic, rule) shares one polymorphic
//! shape: scalar identity/stage columns plus two JSON arrays — the canonical
//! `related` relationship list and the `dependencies` list. The denormalized
//! `parent_id` column is always derived from `related` at write time; see
//! [`derived_parent_id`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// The relation kind that marks the owning parent link inside `related`.
pub const PARENT_KIND: &str = "parent";

/// Workflow stage of a board object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Not yet scheduled.
    Draft,
    /// Scheduled, not started.
    Backlog,
    /// In progress.
    Doing,
    /// Awaiting review.
    Review,
    /// Done.
    Completed,
}

impl Stage {
    /// Wire/storage name of the stage.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Backlog => "backlog",
            Self::Doing => "doing",
            Self::Review => "review",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "backlog" => Ok(Self::Backlog),
            "doing" => Ok(Self::Doing),
            "review" => Ok(Self::Review),
            "completed" => Ok(Self::Completed),
            other => Err(format!("unknown stage '{other}'")),
        }
    }
}

/// Business schema discriminator for a board object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// A unit of work.
    Task,
    /// A container of tasks.
    Project,
    /// A large initiative spanning projects.
    Epic,
    /// An automation rule.
    Rule,
}

impl Category {
    /// Wire/storage name of the category.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Project => "project",
            Self::Epic => "epic",
            Self::Rule => "rule",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "task" => Ok(Self::Task),
            "project" => Ok(Self::Project),
            "epic" => Ok(Self::Epic),
            "rule" => Ok(Self::Rule),
            other => Err(format!("unknown category '{other}'")),
        }
    }
}

/// One typed relationship entry in an object's `related` array.
///
/// Two entries are the "same" relationship when `(id, relation_kind)` match;
/// `category` is display metadata and does not participate in diffing.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relationship {
    /// Target object id.
    pub id: i64,
    /// Relation kind (e.g. `"parent"`, `"blocks"`, `"relates_to"`).
    pub relation_kind: String,
    /// Category of the target object, as a free-form string.
    pub category: String,
}

impl Relationship {
    /// The diff key for this entry.
    #[must_use]
    pub fn key(&self) -> (i64, &str) {
        (self.id, self.relation_kind.as_str())
    }

    /// Whether this entry is a parent link.
    #[must_use]
    pub fn is_parent(&self) -> bool {
        self.relation_kind == PARENT_KIND
    }
}

/// One entry in an object's `dependencies` array.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dependency {
    /// Target object id.
    pub id: i64,
    /// Dependency kind (e.g. `"blocked_by"`).
    pub relation_kind: String,
}

impl Dependency {
    /// The diff key for this entry.
    #[must_use]
    pub fn key(&self) -> (i64, &str) {
        (self.id, self.relation_kind.as_str())
    }
}

/// Full snapshot of a board object row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Object {
    /// Stable integer identity.
    pub id: i64,
    /// Schema discriminator.
    pub category: Category,
    /// Workflow stage.
    pub stage: Stage,
    /// Denormalized single-parent pointer. Always equals
    /// [`derived_parent_id`] of `related` after a successful write.
    pub parent_id: Option<i64>,
    /// Canonical ordered relationship list.
    pub related: Vec<Relationship>,
    /// Dependency list.
    pub dependencies: Vec<Dependency>,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// RFC 3339 last-update timestamp.
    pub updated_at: String,
    /// Actor of the last write.
    pub updated_by: String,
}

/// Derive the parent pointer from a `related` array.
///
/// Scans for entries with `relation_kind == "parent"`. When more than one is
/// present the last by array order wins — preserved source behavior, not a
/// validated business rule, so it is logged rather than rejected.
#[must_use]
pub fn derived_parent_id(related: &[Relationship]) -> Option<i64> {
    let mut parent = None;
    let mut seen = 0u32;
    for entry in related {
        if entry.is_parent() {
            seen += 1;
            parent = Some(entry.id);
        }
    }
    if seen > 1 {
        warn!(count = seen, "multiple parent relationships in related array, last one wins");
    }
    parent
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
