//! The streaming chat endpoint.
//!
//! `POST /chat/stream` runs one conversation turn and streams progress as
//! SSE events while the pipeline works:
//!
//! - `status` / `progress` / `tool` / `error` — events published on the
//!   request's bus, forwarded in order as they arrive
//! - synthetic `status` keepalives while nothing else is flowing, so idle
//!   proxies do not drop the connection
//! - one terminal `done` event with the reply text (direct-queue content
//!   prepended) and any artifacts queued for display
//!
//! If the client disconnects mid-stream the turn is cancelled; a cancelled
//! turn persists nothing.

use std::convert::Infallible;
use std::time::Duration;

use axum::Json;
use axum::extract::State;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};
use ulid::Ulid;

use crate::api::{ArtifactDisplay, ChatStreamRequest, DonePayload, MESSAGE_ID_PREFIX, StatusPayload};
use crate::bus::EventBus;
use crate::handlers::problem_details;
use crate::server::AppState;
use crate::session::SessionKey;
use crate::turn::TurnError;

/// Capacity of the channel between the pump task and the SSE stream.
const STREAM_BUFFER: usize = 32;

/// POST /chat/stream
pub async fn chat_stream(
    State(state): State<AppState>,
    Json(req): Json<ChatStreamRequest>,
) -> Response {
    let key = match SessionKey::new(req.user_id, req.session_id) {
        Ok(key) => key,
        Err(e) => return problem_details::bad_request(e.to_string()),
    };

    let (tx, rx) = mpsc::channel::<Event>(STREAM_BUFFER);
    tokio::spawn(pump_turn(state, key, req.query, tx));

    let stream = ReceiverStream::new(rx).map(Ok::<_, Infallible>);
    Sse::new(stream).into_response()
}

/// Drive one turn, forwarding bus events to the SSE channel.
async fn pump_turn(state: AppState, key: SessionKey, query: String, tx: mpsc::Sender<Event>) {
    let (bus, mut status, mut direct) = EventBus::new();
    let cancel = CancellationToken::new();

    let mut turn = {
        let coordinator = state.coordinator.clone();
        let pipeline = state.pipeline.clone();
        let key = key.clone();
        let bus = bus.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            coordinator
                .run_turn(&key, &query, &bus, pipeline.as_ref(), &cancel)
                .await
        })
    };
    // The pump's own handle is dropped so the status queue closes once the
    // turn (and every scoring worker it spawned) is done.
    drop(bus);

    let keepalive = Duration::from_secs(state.keep_alive_interval_seconds);
    let mut last_send = Instant::now();

    // Immediate acknowledgment.
    if send_json(&tx, "status", &StatusPayload::ACK).await {
        last_send = Instant::now();
    } else {
        cancel.cancel();
    }

    let join_result = loop {
        tokio::select! {
            result = &mut turn => break result,
            _ = tx.closed() => {
                debug!(session = %key, "client disconnected, cancelling turn");
                cancel.cancel();
                break (&mut turn).await;
            }
            maybe = status.recv() => {
                match maybe {
                    Some(event) => {
                        if send_json(&tx, event.kind.as_str(), &event).await {
                            last_send = Instant::now();
                        } else {
                            cancel.cancel();
                        }
                    }
                    // All producers gone; the turn result is imminent.
                    None => break (&mut turn).await,
                }
            }
            _ = tokio::time::sleep_until(last_send + keepalive) => {
                if send_json(&tx, "status", &StatusPayload::KEEPALIVE).await {
                    last_send = Instant::now();
                } else {
                    cancel.cancel();
                }
            }
        }
    };

    // Drain events that raced with turn completion.
    for event in status.drain() {
        send_json(&tx, event.kind.as_str(), &event).await;
    }

    match join_result {
        Ok(Ok(outcome)) => {
            let message = direct.prepend_to(outcome.reply);
            let done = DonePayload {
                kind: "done",
                message_id: format!("{MESSAGE_ID_PREFIX}{}", Ulid::new()),
                message,
                artifacts: outcome
                    .artifacts
                    .into_iter()
                    .map(ArtifactDisplay::from)
                    .collect(),
            };
            send_json(&tx, "done", &done).await;
        }
        Ok(Err(TurnError::Cancelled)) => {
            debug!(session = %key, "turn cancelled");
        }
        Ok(Err(e)) => {
            error!(session = %key, error = %e, "turn failed");
            send_json(
                &tx,
                "error",
                &serde_json::json!({"type": "error", "message": e.to_string()}),
            )
            .await;
        }
        Err(e) => {
            error!(session = %key, error = %e, "turn task panicked");
            send_json(
                &tx,
                "error",
                &serde_json::json!({"type": "error", "message": "internal error"}),
            )
            .await;
        }
    }
}

/// Send one SSE event; false when the client is gone.
async fn send_json<T: Serialize>(tx: &mpsc::Sender<Event>, name: &str, payload: &T) -> bool {
    let event = match Event::default().event(name).json_data(payload) {
        Ok(event) => event,
        Err(e) => {
            error!(error = %e, "failed to serialize SSE event");
            return true;
        }
    };
    tx.send(event).await.is_ok()
}
