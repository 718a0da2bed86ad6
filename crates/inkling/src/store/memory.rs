//! In-memory session store for development and tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::message::ChatMessage;
use crate::session::{Artifact, SessionKey, SessionState};

use super::error::StorageResult;
use super::{DEFAULT_HISTORY_LIMIT, DEFAULT_HISTORY_TTL_HOURS, SessionStore};

#[derive(Default)]
struct SessionEntry {
    messages: Vec<ChatMessage>,
    /// Refreshed on every append; history older than the TTL reads as empty.
    history_touched_at: Option<DateTime<Utc>>,
    state: Option<SessionState>,
    artifacts: HashMap<u64, Artifact>,
}

/// Dict-backed implementation of [`SessionStore`].
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, SessionEntry>>,
    history_limit: usize,
    history_ttl: Duration,
}

impl MemorySessionStore {
    /// Create a store with the default history bound and TTL.
    pub fn new() -> Self {
        Self::with_limits(
            DEFAULT_HISTORY_LIMIT,
            Duration::hours(DEFAULT_HISTORY_TTL_HOURS),
        )
    }

    /// Create a store with explicit history bound and TTL.
    pub fn with_limits(history_limit: usize, history_ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            history_limit,
            history_ttl,
        }
    }

    fn expired(&self, touched_at: Option<DateTime<Utc>>) -> bool {
        match touched_at {
            Some(at) => Utc::now() - at > self.history_ttl,
            None => false,
        }
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn history(&self, key: &SessionKey) -> StorageResult<Vec<ChatMessage>> {
        let mut sessions = self.sessions.lock().expect("session map lock");
        let Some(entry) = sessions.get_mut(&key.storage_key()) else {
            return Ok(Vec::new());
        };
        if self.expired(entry.history_touched_at) {
            entry.messages.clear();
            entry.history_touched_at = None;
            return Ok(Vec::new());
        }
        Ok(entry.messages.clone())
    }

    async fn append_history(
        &self,
        key: &SessionKey,
        messages: &[ChatMessage],
    ) -> StorageResult<()> {
        if messages.is_empty() {
            return Ok(());
        }

        let mut sessions = self.sessions.lock().expect("session map lock");
        let entry = sessions.entry(key.storage_key()).or_default();
        if self.expired(entry.history_touched_at) {
            entry.messages.clear();
        }
        entry.messages.extend_from_slice(messages);
        if entry.messages.len() > self.history_limit {
            let excess = entry.messages.len() - self.history_limit;
            entry.messages.drain(..excess);
        }
        entry.history_touched_at = Some(Utc::now());
        Ok(())
    }

    async fn clear_history(&self, key: &SessionKey) -> StorageResult<()> {
        let mut sessions = self.sessions.lock().expect("session map lock");
        if let Some(entry) = sessions.get_mut(&key.storage_key()) {
            entry.messages.clear();
            entry.history_touched_at = None;
        }
        Ok(())
    }

    async fn state(&self, key: &SessionKey) -> StorageResult<SessionState> {
        let sessions = self.sessions.lock().expect("session map lock");
        Ok(sessions
            .get(&key.storage_key())
            .and_then(|e| e.state.clone())
            .unwrap_or_default())
    }

    async fn save_state(&self, key: &SessionKey, state: &SessionState) -> StorageResult<()> {
        let mut sessions = self.sessions.lock().expect("session map lock");
        sessions.entry(key.storage_key()).or_default().state = Some(state.clone());
        Ok(())
    }

    async fn artifact(&self, key: &SessionKey, id: u64) -> StorageResult<Option<Artifact>> {
        let sessions = self.sessions.lock().expect("session map lock");
        Ok(sessions
            .get(&key.storage_key())
            .and_then(|e| e.artifacts.get(&id).cloned()))
    }

    async fn save_artifact(&self, key: &SessionKey, artifact: &Artifact) -> StorageResult<()> {
        let mut sessions = self.sessions.lock().expect("session map lock");
        sessions
            .entry(key.storage_key())
            .or_default()
            .artifacts
            .insert(artifact.id, artifact.clone());
        Ok(())
    }
}
