//! Session storage: conversation history, session state, artifact content.
//!
//! The [`SessionStore`] trait is the single seam between the turn
//! coordinator and durable storage. Two implementations are provided:
//!
//! - [`MemorySessionStore`] — in-process, for development and tests.
//! - [`FileSessionStore`] — JSONL history plus JSON state/artifact files
//!   under a per-session directory.
//!
//! History is bounded and expiring: every append is an atomic batch that is
//! followed by a trim to the most recent `history_limit` messages and a
//! refresh of the history TTL, so an idle session's history eventually
//! expires while an active one's never does.

mod error;
mod file;
mod memory;

use async_trait::async_trait;

use crate::message::ChatMessage;
use crate::session::{Artifact, SessionKey, SessionState};

pub use error::{StorageError, StorageResult};
pub use file::FileSessionStore;
pub use memory::MemorySessionStore;

/// Default bound on stored history length, in messages.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Default history TTL in hours.
pub const DEFAULT_HISTORY_TTL_HOURS: i64 = 24;

/// Storage interface for per-session data.
#[async_trait]
pub trait SessionStore: Send + Sync {
    // ========================================================================
    // Conversation history
    // ========================================================================

    /// Load the message history for a session, in append order.
    ///
    /// Unknown sessions and sessions whose history TTL has lapsed read as
    /// empty; only storage I/O failures are errors.
    async fn history(&self, key: &SessionKey) -> StorageResult<Vec<ChatMessage>>;

    /// Append a batch of messages atomically (all-or-nothing), then trim the
    /// stored sequence to the configured bound and refresh the history TTL.
    ///
    /// No-op when `messages` is empty.
    async fn append_history(
        &self,
        key: &SessionKey,
        messages: &[ChatMessage],
    ) -> StorageResult<()>;

    /// Delete all history for a session.
    async fn clear_history(&self, key: &SessionKey) -> StorageResult<()>;

    // ========================================================================
    // Session state
    // ========================================================================

    /// Load the session state; defaults for a session never seen before.
    async fn state(&self, key: &SessionKey) -> StorageResult<SessionState>;

    /// Save the session state. Must be atomic.
    async fn save_state(&self, key: &SessionKey, state: &SessionState) -> StorageResult<()>;

    // ========================================================================
    // Artifact content
    // ========================================================================

    /// Load an artifact's full content by handle.
    async fn artifact(&self, key: &SessionKey, id: u64) -> StorageResult<Option<Artifact>>;

    /// Save an artifact's full content under its handle.
    async fn save_artifact(&self, key: &SessionKey, artifact: &Artifact) -> StorageResult<()>;
}
