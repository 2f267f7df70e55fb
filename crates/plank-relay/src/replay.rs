//! Resume replay buffer.
//!
//! A fixed-capacity ring of the most recent change events, shared by all
//! sessions. A resuming client asks for everything after its last seen
//! event id; if that id has already been evicted the gap is unrecoverable
//! and the client must refetch board state instead.

use std::collections::VecDeque;

use parking_lot::Mutex;
use plank_core::errors::RelayError;

use crate::event::ChangeEvent;

/// Default number of retained events.
pub const DEFAULT_REPLAY_CAPACITY: usize = 1024;

struct ReplayInner {
    buf: VecDeque<ChangeEvent>,
    // Highest event id no longer retained. Resumes at or below this point
    // cannot be satisfied.
    floor: u64,
}

/// Shared ring buffer of recent events.
pub struct ReplayBuffer {
    capacity: usize,
    inner: Mutex<ReplayInner>,
}

impl ReplayBuffer {
    /// Create a buffer retaining `capacity` events, with `floor` marking
    /// the log position history starts after (typically the log head at
    /// listener start).
    #[must_use]
    pub fn new(capacity: usize, floor: u64) -> Self {
        assert!(capacity > 0, "replay capacity must be positive");
        Self {
            capacity,
            inner: Mutex::new(ReplayInner {
                buf: VecDeque::with_capacity(capacity),
                floor,
            }),
        }
    }

    /// Record an event, evicting the oldest at capacity.
    pub fn push(&self, event: ChangeEvent) {
        let mut inner = self.inner.lock();
        if inner.buf.len() == self.capacity {
            if let Some(evicted) = inner.buf.pop_front() {
                inner.floor = evicted.event_id;
            }
        }
        inner.buf.push_back(event);
    }

    /// All retained events with id greater than `after`, oldest first.
    ///
    /// Fails with [`RelayError::ResumeGapTooLarge`] when `after` precedes
    /// retained history.
    pub fn since(&self, after: u64) -> Result<Vec<ChangeEvent>, RelayError> {
        let inner = self.inner.lock();
        if after < inner.floor {
            return Err(RelayError::ResumeGapTooLarge {
                requested: after,
                oldest_retained: inner.floor + 1,
            });
        }
        Ok(inner
            .buf
            .iter()
            .filter(|event| event.event_id > after)
            .cloned()
            .collect())
    }

    /// Id of the newest retained event, or the floor when empty.
    #[must_use]
    pub fn head(&self) -> u64 {
        let inner = self.inner.lock();
        inner.buf.back().map_or(inner.floor, |event| event.event_id)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use plank_core::change::{ChangeRecord, ChangeSet, EventType};
    use plank_core::object::{Category, Stage};

    fn event(id: u64) -> ChangeEvent {
        ChangeEvent::new(
            id,
            ChangeRecord {
                event_type: EventType::Updated,
                object_id: 1,
                category: Category::Task,
                parent_id: None,
                stage: Stage::Doing,
                related: vec![],
                dependencies: vec![],
                updated_by: "alice".into(),
                timestamp: "2026-01-01T00:00:00+00:00".into(),
                changes: ChangeSet::default(),
            },
        )
    }

    #[test]
    fn since_returns_events_after_marker() {
        let buffer = ReplayBuffer::new(8, 0);
        for id in 1..=4 {
            buffer.push(event(id));
        }

        let events = buffer.since(2).unwrap();
        assert_eq!(
            events.iter().map(|e| e.event_id).collect::<Vec<_>>(),
            vec![3, 4]
        );
    }

    #[test]
    fn since_head_is_empty() {
        let buffer = ReplayBuffer::new(8, 0);
        for id in 1..=3 {
            buffer.push(event(id));
        }
        assert!(buffer.since(3).unwrap().is_empty());
        assert_eq!(buffer.head(), 3);
    }

    #[test]
    fn eviction_raises_the_floor() {
        let buffer = ReplayBuffer::new(2, 0);
        for id in 1..=4 {
            buffer.push(event(id));
        }

        // 1 and 2 were evicted.
        let err = buffer.since(1).unwrap_err();
        assert!(matches!(
            err,
            RelayError::ResumeGapTooLarge {
                requested: 1,
                oldest_retained: 3,
            }
        ));
        assert_eq!(
            buffer.since(2).unwrap().iter().map(|e| e.event_id).collect::<Vec<_>>(),
            vec![3, 4]
        );
    }

    #[test]
    fn resume_before_listener_start_is_a_gap() {
        let buffer = ReplayBuffer::new(8, 100);
        buffer.push(event(101));

        assert!(buffer.since(50).is_err());
        assert_eq!(buffer.since(100).unwrap().len(), 1);
    }

    #[test]
    fn head_of_empty_buffer_is_floor() {
        let buffer = ReplayBuffer::new(8, 42);
        assert_eq!(buffer.head(), 42);
    }
}
