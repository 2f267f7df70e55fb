//! Bounded per-session delivery queue.
//!
//! Backpressure policy is drop-oldest: a slow consumer keeps receiving the
//! newest events and is told, in band, that older ones were discarded. The
//! missed flag rides along with the next successful delivery.

use std::collections::VecDeque;

use metrics::counter;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::event::ChangeEvent;

/// Events dropped from session queues due to overflow.
pub const QUEUE_DROPPED_TOTAL: &str = "plank_session_queue_dropped_total";

/// One dequeued event plus whether deliveries were lost before it.
#[derive(Clone, Debug)]
pub struct Delivery {
    /// The event to deliver.
    pub event: ChangeEvent,
    /// True when at least one older event was dropped since the last
    /// delivery to this session.
    pub missed: bool,
}

struct QueueInner {
    buf: VecDeque<ChangeEvent>,
    missed: bool,
    closed: bool,
}

/// Bounded drop-oldest queue feeding one transport task.
pub struct SessionQueue {
    capacity: usize,
    inner: Mutex<QueueInner>,
    notify: Notify,
}

impl SessionQueue {
    /// Create a queue holding at most `capacity` undelivered events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be positive");
        Self {
            capacity,
            inner: Mutex::new(QueueInner {
                buf: VecDeque::with_capacity(capacity),
                missed: false,
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Enqueue an event, dropping the oldest on overflow.
    ///
    /// Returns `true` when an event was dropped. Pushes to a closed queue
    /// are discarded.
    pub fn push(&self, event: ChangeEvent) -> bool {
        let dropped = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return false;
            }
            let mut dropped = false;
            if inner.buf.len() == self.capacity {
                let _ = inner.buf.pop_front();
                inner.missed = true;
                dropped = true;
            }
            inner.buf.push_back(event);
            dropped
        };
        if dropped {
            counter!(QUEUE_DROPPED_TOTAL).increment(1);
        }
        self.notify.notify_one();
        dropped
    }

    /// Await the next event. Returns `None` once the queue is closed and
    /// drained.
    pub async fn recv(&self) -> Option<Delivery> {
        loop {
            let notified = self.notify.notified();
            {
                let mut inner = self.inner.lock();
                if let Some(event) = inner.buf.pop_front() {
                    let missed = std::mem::take(&mut inner.missed);
                    return Some(Delivery { event, missed });
                }
                if inner.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Close the queue. Pending events remain receivable; new pushes are
    /// discarded. Idempotent.
    pub fn close(&self) {
        {
            let mut inner = self.inner.lock();
            inner.closed = true;
        }
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Undelivered events currently buffered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().buf.len()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
