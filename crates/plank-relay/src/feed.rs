//! The change feed listener.
//!
//! One background task tails the store's change log, starting at the head
//! at spawn time, and pushes each new event into the replay buffer, the
//! session registry, and a broadcast mirror for in-process subscribers.
//! Log read failures back off exponentially with jitter; after recovery
//! the listener resumes at the then-current head, so events published
//! during an outage are not redelivered (at-most-once).

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use plank_store::{ObjectStore, StoreError};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::event::ChangeEvent;
use crate::registry::SessionRegistry;
use crate::replay::{ReplayBuffer, DEFAULT_REPLAY_CAPACITY};

/// Events observed by the feed listener.
pub const FEED_EVENTS_TOTAL: &str = "plank_feed_events_total";
/// Feed listener read failures.
pub const FEED_ERRORS_TOTAL: &str = "plank_feed_errors_total";

const BROADCAST_CAPACITY: usize = 256;
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Tuning for the feed listener.
#[derive(Clone, Copy, Debug)]
pub struct FeedConfig {
    /// Idle sleep between log polls.
    pub poll_interval: Duration,
    /// Maximum entries fetched per poll.
    pub batch_limit: u32,
    /// Replay buffer capacity.
    pub replay_capacity: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            batch_limit: 256,
            replay_capacity: DEFAULT_REPLAY_CAPACITY,
        }
    }
}

/// Handle to the running listener task.
pub struct ChangeFeed {
    token: CancellationToken,
    handle: JoinHandle<()>,
    replay: Arc<ReplayBuffer>,
    broadcast_tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeFeed {
    /// Spawn the listener. The replay floor is set to the current log head,
    /// so only events from this point on are resumable.
    pub fn start(
        store: Arc<ObjectStore>,
        registry: Arc<SessionRegistry>,
        config: FeedConfig,
    ) -> Result<Self, StoreError> {
        let start = store.head_seq()?;
        let replay = Arc::new(ReplayBuffer::new(config.replay_capacity, start));
        let (broadcast_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        let token = CancellationToken::new();

        let handle = tokio::spawn(run_loop(
            store,
            registry,
            replay.clone(),
            broadcast_tx.clone(),
            config,
            start,
            token.clone(),
        ));
        info!(start_seq = start, "change feed started");
        Ok(Self {
            token,
            handle,
            replay,
            broadcast_tx,
        })
    }

    /// The replay buffer the listener fills.
    #[must_use]
    pub fn replay(&self) -> Arc<ReplayBuffer> {
        self.replay.clone()
    }

    /// Subscribe to the live event mirror.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.broadcast_tx.subscribe()
    }

    /// Stop the listener and wait for it to exit.
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(error) = self.handle.await {
            error!(%error, "feed listener task panicked");
        }
        info!("change feed stopped");
    }
}

async fn run_loop(
    store: Arc<ObjectStore>,
    registry: Arc<SessionRegistry>,
    replay: Arc<ReplayBuffer>,
    broadcast_tx: broadcast::Sender<ChangeEvent>,
    config: FeedConfig,
    start: u64,
    token: CancellationToken,
) {
    let mut cursor = start;
    let mut failures: u32 = 0;

    loop {
        if token.is_cancelled() {
            break;
        }
        match store.changes_after(cursor, config.batch_limit) {
            Ok(entries) if !entries.is_empty() => {
                failures = 0;
                for entry in entries {
                    cursor = entry.seq;
                    let event = ChangeEvent::new(entry.seq, entry.record);
                    replay.push(event.clone());
                    // Receivers may not exist; the registry is the
                    // authoritative delivery path.
                    let _ = broadcast_tx.send(event.clone());
                    registry.broadcast(&event);
                    counter!(FEED_EVENTS_TOTAL).increment(1);
                }
                debug!(cursor, "feed batch dispatched");
                // Drain any backlog before sleeping again.
            }
            Ok(_) => {
                failures = 0;
                if sleep_or_cancel(&token, config.poll_interval).await {
                    break;
                }
            }
            Err(error) => {
                failures = failures.saturating_add(1);
                counter!(FEED_ERRORS_TOTAL).increment(1);
                let backoff = backoff_with_jitter(config.poll_interval, failures);
                let backoff_ms = backoff.as_millis() as u64;
                warn!(%error, failures, backoff_ms, "change log read failed, backing off");
                if sleep_or_cancel(&token, backoff).await {
                    break;
                }
                // Resume at the current head. Events that landed during
                // the outage are skipped, not redelivered.
                if let Ok(head) = store.head_seq() {
                    if head > cursor {
                        warn!(skipped = head - cursor, "skipping events missed during feed outage");
                        cursor = head;
                    }
                }
            }
        }
    }
}

/// Returns true when the token fired.
async fn sleep_or_cancel(token: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        () = token.cancelled() => true,
        () = tokio::time::sleep(duration) => false,
    }
}

fn backoff_with_jitter(base: Duration, failures: u32) -> Duration {
    use rand::Rng;
    let exp = base.saturating_mul(2u32.saturating_pow(failures.min(8)));
    let capped = exp.min(MAX_BACKOFF);
    let factor: f64 = rand::rng().random_range(0.75..=1.25);
    capped.mul_f64(factor)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
