//! Subscriber session registry.
//!
//! Tracks every connected transport session, fans events into their queues,
//! and backs the admin listing/disconnect surface. Session lifecycle is
//! `Connecting` (handshake and replay in flight, events already queueing)
//! → `Active` → `Closing` (drain) → `Closed` (removed).

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use metrics::gauge;
use parking_lot::{Mutex, RwLock};
use plank_core::errors::RelayError;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::event::ChangeEvent;
use crate::queue::SessionQueue;

/// Currently registered sessions.
pub const SESSIONS_ACTIVE: &str = "plank_sessions_active";

/// Which adapter carries a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    /// Long-lived NDJSON HTTP response.
    Stream,
    /// Resumable WebSocket.
    WebSocket,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stream => f.write_str("stream"),
            Self::WebSocket => f.write_str("web_socket"),
        }
    }
}

/// Lifecycle state of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Registered, handshake or replay still in flight.
    Connecting,
    /// Receiving live deliveries.
    Active,
    /// Disconnect requested, queue closed.
    Closing,
    /// Removed from the registry.
    Closed,
}

/// One registered subscriber.
pub struct Session {
    id: String,
    client_id: Option<String>,
    transport: Transport,
    connected_at: String,
    connected: Instant,
    queue: SessionQueue,
    state: Mutex<SessionState>,
    last_event_id: AtomicU64,
    delivered: AtomicU64,
}

impl Session {
    /// Registry-assigned session id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Client-supplied stable identity, if any.
    #[must_use]
    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    /// Carrying transport.
    #[must_use]
    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// The delivery queue feeding this session's transport task.
    #[must_use]
    pub fn queue(&self) -> &SessionQueue {
        &self.queue
    }

    /// Mark the handshake/replay phase finished.
    pub fn activate(&self) {
        let mut state = self.state.lock();
        if *state == SessionState::Connecting {
            *state = SessionState::Active;
        }
    }

    /// Record a successful delivery of `event_id` to the client. The high
    /// water mark never regresses, so late acks are harmless.
    pub fn mark_delivered(&self, event_id: u64) {
        let _ = self.last_event_id.fetch_max(event_id, Ordering::Relaxed);
        let _ = self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    /// Highest event id delivered so far (0 before the first delivery).
    #[must_use]
    pub fn last_event_id(&self) -> u64 {
        self.last_event_id.load(Ordering::Relaxed)
    }

    fn begin_close(&self) {
        let mut state = self.state.lock();
        if !matches!(*state, SessionState::Closed) {
            *state = SessionState::Closing;
        }
        self.queue.close();
    }

    fn info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.id.clone(),
            client_id: self.client_id.clone(),
            transport: self.transport,
            state: self.state(),
            connected_at: self.connected_at.clone(),
            duration_ms: self.connected.elapsed().as_millis() as u64,
            last_event_id: self.last_event_id(),
            delivered: self.delivered.load(Ordering::Relaxed),
            queued: self.queue.len(),
        }
    }
}

/// Snapshot of one session for the admin listing.
#[derive(Clone, Debug, Serialize)]
pub struct SessionInfo {
    /// Registry-assigned id.
    pub session_id: String,
    /// Client-supplied stable identity, if any.
    pub client_id: Option<String>,
    /// Carrying transport.
    pub transport: Transport,
    /// Lifecycle state.
    pub state: SessionState,
    /// RFC 3339 registration time.
    pub connected_at: String,
    /// Milliseconds the session has been connected.
    pub duration_ms: u64,
    /// Highest delivered event id.
    pub last_event_id: u64,
    /// Total events delivered.
    pub delivered: u64,
    /// Events currently awaiting delivery.
    pub queued: usize,
}

/// Registry of live subscriber sessions.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    queue_capacity: usize,
    count: AtomicUsize,
    shutting_down: AtomicBool,
}

impl SessionRegistry {
    /// Create a registry whose sessions buffer up to `queue_capacity`
    /// undelivered events each.
    #[must_use]
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            queue_capacity,
            count: AtomicUsize::new(0),
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Register a new session in the `Connecting` state.
    ///
    /// Events start queueing immediately, so nothing published between
    /// registration and activation is lost.
    pub fn register(
        &self,
        transport: Transport,
        client_id: Option<String>,
    ) -> Result<Arc<Session>, RelayError> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(RelayError::ShuttingDown);
        }
        let session = Arc::new(Session {
            id: Uuid::now_v7().to_string(),
            client_id,
            transport,
            connected_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            connected: Instant::now(),
            queue: SessionQueue::new(self.queue_capacity),
            state: Mutex::new(SessionState::Connecting),
            last_event_id: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
        });
        let _ = self
            .sessions
            .write()
            .insert(session.id.clone(), session.clone());
        let count = self.count.fetch_add(1, Ordering::SeqCst) + 1;
        gauge!(SESSIONS_ACTIVE).set(count as f64);

        debug!(
            session_id = %session.id,
            transport = %transport,
            client_id = session.client_id().unwrap_or("-"),
            "session registered"
        );
        Ok(session)
    }

    /// Push an event into every registered session's queue.
    pub fn broadcast(&self, event: &ChangeEvent) {
        let sessions = self.sessions.read();
        for session in sessions.values() {
            let _ = session.queue.push(event.clone());
        }
    }

    /// Remove a session. Idempotent; the transport task calls this exactly
    /// once on teardown, admins may race it harmlessly.
    pub fn unregister(&self, session_id: &str) {
        let removed = self.sessions.write().remove(session_id);
        if let Some(session) = removed {
            session.begin_close();
            *session.state.lock() = SessionState::Closed;
            let count = self.count.fetch_sub(1, Ordering::SeqCst) - 1;
            gauge!(SESSIONS_ACTIVE).set(count as f64);
            debug!(session_id, "session unregistered");
        }
    }

    /// Force-disconnect a session: close its queue so the transport task
    /// drains and tears down.
    pub fn disconnect(&self, session_id: &str) -> Result<(), RelayError> {
        let session = self
            .sessions
            .read()
            .get(session_id)
            .cloned()
            .ok_or_else(|| RelayError::SessionNotFound(session_id.to_owned()))?;
        session.begin_close();
        info!(session_id, "session disconnect requested");
        Ok(())
    }

    /// Look up a session by id.
    #[must_use]
    pub fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.read().get(session_id).cloned()
    }

    /// Snapshot all sessions, ordered by registration time.
    #[must_use]
    pub fn list(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> = self
            .sessions
            .read()
            .values()
            .map(|session| session.info())
            .collect();
        infos.sort_by(|a, b| a.connected_at.cmp(&b.connected_at));
        infos
    }

    /// Number of registered sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Whether no sessions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reject new registrations and close every session's queue. Transport
    /// tasks drain their queues and unregister themselves.
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        let sessions: Vec<Arc<Session>> = self.sessions.read().values().cloned().collect();
        info!(sessions = sessions.len(), "closing all sessions");
        for session in sessions {
            session.begin_close();
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
