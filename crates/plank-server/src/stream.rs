//! NDJSON change stream transport.
//!
//! `GET /changes` holds the response open and writes one envelope per line
//! as events arrive. When the session's queue overflowed, a
//! `missed_events` line precedes the next `change` line. The session
//! unregisters when the response body is dropped, however the connection
//! ends.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use futures::stream;
use metrics::counter;
use plank_relay::{SessionRegistry, Transport};
use serde::Deserialize;
use tracing::instrument;

use crate::error::ApiError;
use crate::metrics::EVENTS_DELIVERED_TOTAL;
use crate::protocol::ServerMessage;
use crate::state::AppState;

/// Query for `GET /changes`.
#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// Client-supplied stable identity, surfaced in the admin listing.
    pub client_id: Option<String>,
}

/// Unregisters its session exactly once, whenever it is dropped.
pub(crate) struct SessionGuard {
    registry: Arc<SessionRegistry>,
    session_id: String,
}

impl SessionGuard {
    pub(crate) fn new(registry: Arc<SessionRegistry>, session_id: String) -> Self {
        Self {
            registry,
            session_id,
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.unregister(&self.session_id);
    }
}

/// `GET /changes`
#[instrument(skip_all)]
pub async fn changes(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> Result<Response, ApiError> {
    let session = state.registry.register(Transport::Stream, query.client_id)?;
    session.activate();
    let guard = SessionGuard::new(state.registry.clone(), session.id().to_owned());

    let body = stream::unfold((session, guard), |(session, guard)| async move {
        let delivery = session.queue().recv().await?;
        let mut out = String::new();
        if delivery.missed {
            out.push_str(&ServerMessage::MissedEvents.to_json());
            out.push('\n');
        }
        out.push_str(
            &ServerMessage::Change {
                event_id: delivery.event.event_id,
                record: &delivery.event.record,
            }
            .to_json(),
        );
        out.push('\n');
        session.mark_delivered(delivery.event.event_id);
        counter!(EVENTS_DELIVERED_TOTAL).increment(1);
        Some((Ok::<_, Infallible>(Bytes::from(out)), (session, guard)))
    });

    Ok((
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(body),
    )
        .into_response())
}
