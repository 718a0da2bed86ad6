//! Wire types for the HTTP API.

use serde::{Deserialize, Serialize};

use crate::session::{Artifact, ArtifactKind};

/// Prefix for message IDs in the terminal `done` event.
pub const MESSAGE_ID_PREFIX: &str = "msg_";

/// Request body for `POST /chat/stream`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatStreamRequest {
    pub user_id: String,
    pub session_id: String,
    pub query: String,
}

/// An artifact included in the `done` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactDisplay {
    pub id: u64,
    pub kind: ArtifactKind,
    pub summary: String,
    pub content: String,
}

impl From<Artifact> for ArtifactDisplay {
    fn from(artifact: Artifact) -> Self {
        Self {
            id: artifact.id,
            kind: artifact.meta.kind,
            summary: artifact.meta.summary,
            content: artifact.content,
        }
    }
}

/// Payload of the terminal `done` SSE event.
#[derive(Debug, Serialize)]
pub struct DonePayload {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub message_id: String,
    pub message: String,
    pub artifacts: Vec<ArtifactDisplay>,
}

/// Payload of a synthetic status event emitted by the transport itself
/// (acknowledgment, keepalive).
#[derive(Debug, Serialize)]
pub struct StatusPayload {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub message: &'static str,
}

impl StatusPayload {
    pub const ACK: Self = Self {
        kind: "status",
        message: "Working on it...",
    };

    pub const KEEPALIVE: Self = Self {
        kind: "status",
        message: "Still working...",
    };
}
