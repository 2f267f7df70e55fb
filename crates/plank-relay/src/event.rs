//! The fan-out unit.

use std::sync::Arc;

use plank_core::change::ChangeRecord;

/// One change event as it travels from the feed to subscriber sessions.
///
/// The record is shared behind an `Arc` so fanning out to N sessions clones
/// a pointer, not the payload.
#[derive(Clone, Debug)]
pub struct ChangeEvent {
    /// Monotonic id, the change log sequence number.
    pub event_id: u64,
    /// The change record.
    pub record: Arc<ChangeRecord>,
}

impl ChangeEvent {
    /// Wrap a record with its assigned id.
    #[must_use]
    pub fn new(event_id: u64, record: ChangeRecord) -> Self {
        Self {
            event_id,
            record: Arc::new(record),
        }
    }
}
