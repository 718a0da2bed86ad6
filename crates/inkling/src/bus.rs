//! Per-request event bus.
//!
//! Decouples background producers (tool execution, scoring workers) from the
//! streaming consumer. Two independent bounded queues, both scoped to a
//! single request and torn down with it:
//!
//! - **status queue** — progress/status/tool/error events forwarded to the
//!   client as they happen. Publishing never blocks: on a full queue the
//!   event is dropped and a warning is logged.
//! - **direct-content queue** — tool output that *is* the final user-visible
//!   answer rather than something the coordinator should re-narrate. Drained
//!   in full at end of request and prepended, in FIFO order, to the
//!   coordinator's own response text.
//!
//! The bus handle is passed explicitly into the pipeline; there is no
//! ambient/global request context.

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{info, warn};

/// Default capacity of each queue.
pub const DEFAULT_CAPACITY: usize = 100;

/// Kind of a status event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Status,
    Progress,
    Tool,
    Error,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Status => "status",
            EventKind::Progress => "progress",
            EventKind::Tool => "tool",
            EventKind::Error => "error",
        }
    }
}

/// An event published while a turn is running. Never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct AgentEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

/// Producer handle, cheap to clone into tools and scoring workers.
#[derive(Clone)]
pub struct EventBus {
    status: mpsc::Sender<AgentEvent>,
    direct: mpsc::Sender<String>,
}

/// Consumer half of the status queue.
pub struct StatusEvents {
    rx: mpsc::Receiver<AgentEvent>,
}

/// Consumer half of the direct-content queue.
pub struct DirectContent {
    rx: mpsc::Receiver<String>,
}

impl EventBus {
    /// Create a bus with the default queue capacity.
    pub fn new() -> (Self, StatusEvents, DirectContent) {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a bus with an explicit per-queue capacity.
    pub fn with_capacity(capacity: usize) -> (Self, StatusEvents, DirectContent) {
        let (status_tx, status_rx) = mpsc::channel(capacity);
        let (direct_tx, direct_rx) = mpsc::channel(capacity);
        (
            Self {
                status: status_tx,
                direct: direct_tx,
            },
            StatusEvents { rx: status_rx },
            DirectContent { rx: direct_rx },
        )
    }

    /// Publish a status event.
    ///
    /// Logs the event and attempts a non-blocking enqueue; on a full or
    /// closed queue the event is dropped with a warning. Never blocks and
    /// never fails the producer.
    pub fn publish(&self, kind: EventKind, message: impl Into<String>) {
        self.publish_event(AgentEvent {
            kind,
            message: message.into(),
            payload: None,
        });
    }

    /// Publish a status event with a structured payload.
    pub fn publish_payload(
        &self,
        kind: EventKind,
        message: impl Into<String>,
        payload: serde_json::Value,
    ) {
        self.publish_event(AgentEvent {
            kind,
            message: message.into(),
            payload: Some(payload),
        });
    }

    fn publish_event(&self, event: AgentEvent) {
        // Always log, whether or not a consumer is keeping up.
        info!(kind = event.kind.as_str(), "{}", event.message);
        match self.status.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!(
                    kind = event.kind.as_str(),
                    "status queue full, dropping event"
                );
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }

    /// Publish content that goes straight to the user, bypassing the
    /// coordinator's narration. Same non-blocking semantics as `publish`.
    pub fn publish_direct(&self, content: impl Into<String>) {
        match self.direct.try_send(content.into()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("direct-content queue full, dropping content");
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

impl StatusEvents {
    /// Wait for the next event. `None` once all producers are gone and the
    /// queue is drained.
    pub async fn recv(&mut self) -> Option<AgentEvent> {
        self.rx.recv().await
    }

    /// Drain everything currently queued without waiting.
    pub fn drain(&mut self) -> Vec<AgentEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

impl DirectContent {
    /// Drain all queued content in FIFO order.
    pub fn drain(&mut self) -> Vec<String> {
        let mut contents = Vec::new();
        while let Ok(content) = self.rx.try_recv() {
            contents.push(content);
        }
        contents
    }

    /// Prepend drained content to `reply`, separated by blank lines.
    pub fn prepend_to(&mut self, reply: String) -> String {
        let mut parts = self.drain();
        if parts.is_empty() {
            return reply;
        }
        if !reply.is_empty() {
            parts.push(reply);
        }
        parts.join("\n\n")
    }
}
