//! Resumable WebSocket transport.
//!
//! `GET /ws?client_id=...&resume_from=N` upgrades, replays retained events
//! after `N` (or reports an unrecoverable gap), then switches to live
//! delivery. Inbound frames carry [`ClientMessage`] acks, pings, and the
//! orderly disconnect.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use metrics::counter;
use plank_core::errors::RelayError;
use plank_relay::{Session, Transport};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::metrics::EVENTS_DELIVERED_TOTAL;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;
use crate::stream::SessionGuard;

/// Query for `GET /ws`.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Client-supplied stable identity.
    pub client_id: Option<String>,
    /// Last event id the client processed before reconnecting.
    pub resume_from: Option<u64>,
}

/// `GET /ws`
#[instrument(skip_all, fields(resume_from = query.resume_from))]
pub async fn upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(state, query, socket))
}

async fn handle_socket(state: AppState, query: WsQuery, mut socket: WebSocket) {
    let session = match state.registry.register(Transport::WebSocket, query.client_id) {
        Ok(session) => session,
        Err(error) => {
            debug!(%error, "rejecting websocket session");
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };
    let _guard = SessionGuard::new(state.registry.clone(), session.id().to_owned());

    // Replayed events and queued live events overlap; track the highest id
    // sent so the live loop skips what replay already covered.
    let mut last_sent = query.resume_from.unwrap_or(0);

    if let Some(marker) = query.resume_from {
        match state.replay.since(marker) {
            Ok(events) => {
                for event in events {
                    let envelope = ServerMessage::Change {
                        event_id: event.event_id,
                        record: &event.record,
                    };
                    if send(&mut socket, &envelope).await.is_err() {
                        return;
                    }
                    last_sent = event.event_id;
                    session.mark_delivered(event.event_id);
                    counter!(EVENTS_DELIVERED_TOTAL).increment(1);
                }
            }
            Err(RelayError::ResumeGapTooLarge {
                oldest_retained, ..
            }) => {
                warn!(
                    session_id = session.id(),
                    resume_from = marker,
                    oldest_retained,
                    "resume gap, client must refetch"
                );
                if send(&mut socket, &ServerMessage::ResumeGap { oldest_retained })
                    .await
                    .is_err()
                {
                    return;
                }
                // Live-only from here; the client refetches board state.
                last_sent = state.replay.head();
            }
            Err(error) => {
                debug!(%error, "resume failed");
                return;
            }
        }
    }
    session.activate();

    run_live(&session, &mut socket, last_sent).await;
    let _ = socket.send(Message::Close(None)).await;
}

async fn run_live(session: &Arc<Session>, socket: &mut WebSocket, mut last_sent: u64) {
    loop {
        tokio::select! {
            delivery = session.queue().recv() => {
                let Some(delivery) = delivery else { break };
                if delivery.event.event_id <= last_sent {
                    continue;
                }
                if delivery.missed
                    && send(socket, &ServerMessage::MissedEvents).await.is_err()
                {
                    break;
                }
                let envelope = ServerMessage::Change {
                    event_id: delivery.event.event_id,
                    record: &delivery.event.record,
                };
                if send(socket, &envelope).await.is_err() {
                    break;
                }
                last_sent = delivery.event.event_id;
                session.mark_delivered(delivery.event.event_id);
                counter!(EVENTS_DELIVERED_TOTAL).increment(1);
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::Ack { event_id }) => {
                                session.mark_delivered(event_id);
                            }
                            Ok(ClientMessage::Ping) => {
                                if send(socket, &ServerMessage::Pong).await.is_err() {
                                    break;
                                }
                            }
                            Ok(ClientMessage::Disconnect) => break,
                            Err(error) => {
                                debug!(session_id = session.id(), %error, "unparseable client frame");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

async fn send(socket: &mut WebSocket, message: &ServerMessage<'_>) -> Result<(), axum::Error> {
    socket.send(Message::Text(message.to_json().into())).await
}
