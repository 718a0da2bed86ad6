//! File-based session storage implementation.
//!
//! Directory structure:
//! ```text
//! {sessions_dir}/
//!   {user_id}:{session_id}/
//!     history.jsonl      # Append-only message log, trimmed to the bound
//!     state.json         # Atomic session-state snapshot
//!     artifacts/
//!       {id}.json        # One file per artifact handle
//! ```
//!
//! Each history line wraps the message with the append timestamp; the last
//! line's timestamp is the session's TTL stamp, so appending refreshes the
//! TTL and an idle session's history eventually reads as empty.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::message::ChatMessage;
use crate::session::{Artifact, SessionKey, SessionState};

use super::error::{StorageError, StorageResult};
use super::{DEFAULT_HISTORY_LIMIT, DEFAULT_HISTORY_TTL_HOURS, SessionStore};

/// One line of `history.jsonl`.
#[derive(Debug, Serialize, Deserialize)]
struct HistoryRecord {
    at: DateTime<Utc>,
    message: ChatMessage,
}

/// File-based implementation of [`SessionStore`].
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    sessions_dir: PathBuf,
    history_limit: usize,
    history_ttl: Duration,
}

impl FileSessionStore {
    /// Create a store rooted at `sessions_dir` with default limits.
    ///
    /// The directory is created when the first session is stored.
    pub fn new(sessions_dir: impl Into<PathBuf>) -> Self {
        Self::with_limits(
            sessions_dir,
            DEFAULT_HISTORY_LIMIT,
            Duration::hours(DEFAULT_HISTORY_TTL_HOURS),
        )
    }

    /// Create a store with explicit history bound and TTL.
    pub fn with_limits(
        sessions_dir: impl Into<PathBuf>,
        history_limit: usize,
        history_ttl: Duration,
    ) -> Self {
        Self {
            sessions_dir: sessions_dir.into(),
            history_limit,
            history_ttl,
        }
    }

    fn session_dir(&self, key: &SessionKey) -> PathBuf {
        self.sessions_dir.join(key.storage_key())
    }

    fn history_path(&self, key: &SessionKey) -> PathBuf {
        self.session_dir(key).join("history.jsonl")
    }

    fn state_path(&self, key: &SessionKey) -> PathBuf {
        self.session_dir(key).join("state.json")
    }

    fn artifact_path(&self, key: &SessionKey, id: u64) -> PathBuf {
        self.session_dir(key)
            .join("artifacts")
            .join(format!("{id}.json"))
    }

    async fn ensure_session_dir(&self, key: &SessionKey) -> StorageResult<()> {
        let dir = self.session_dir(key);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageError::file_io(&dir, e))
    }

    /// Read all history records, skipping malformed lines (crash recovery).
    async fn read_records(&self, key: &SessionKey) -> StorageResult<Vec<HistoryRecord>> {
        let path = self.history_path(key);

        let contents = match fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::file_io(&path, e)),
        };

        let mut records = Vec::new();
        for line in contents.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let Ok(record) = serde_json::from_str::<HistoryRecord>(trimmed) else {
                continue;
            };
            records.push(record);
        }
        Ok(records)
    }

    fn live(&self, records: &[HistoryRecord]) -> bool {
        match records.last() {
            Some(last) => Utc::now() - last.at <= self.history_ttl,
            None => false,
        }
    }

    /// Rewrite the history file with the given records, via temp + rename.
    async fn rewrite_records(
        &self,
        key: &SessionKey,
        records: &[HistoryRecord],
    ) -> StorageResult<()> {
        let path = self.history_path(key);
        let temp_path = self.session_dir(key).join("history.jsonl.tmp");

        let mut buffer = String::new();
        for record in records {
            let line = serde_json::to_string(record)
                .map_err(|e| StorageError::serialization(e.to_string()))?;
            buffer.push_str(&line);
            buffer.push('\n');
        }

        fs::write(&temp_path, buffer.as_bytes())
            .await
            .map_err(|e| StorageError::file_io(&temp_path, e))?;
        fs::rename(&temp_path, &path)
            .await
            .map_err(|e| StorageError::file_io(&path, e))?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    // ========================================================================
    // Conversation history
    // ========================================================================

    async fn history(&self, key: &SessionKey) -> StorageResult<Vec<ChatMessage>> {
        let records = self.read_records(key).await?;
        if records.is_empty() {
            return Ok(Vec::new());
        }
        if !self.live(&records) {
            // Expired: sweep the stale log so it is not re-parsed forever.
            let path = self.history_path(key);
            if let Err(e) = fs::remove_file(&path).await
                && e.kind() != std::io::ErrorKind::NotFound
            {
                return Err(StorageError::file_io(&path, e));
            }
            return Ok(Vec::new());
        }
        Ok(records.into_iter().map(|r| r.message).collect())
    }

    async fn append_history(
        &self,
        key: &SessionKey,
        messages: &[ChatMessage],
    ) -> StorageResult<()> {
        if messages.is_empty() {
            return Ok(());
        }

        self.ensure_session_dir(key).await?;

        let mut records = self.read_records(key).await?;
        if !records.is_empty() && !self.live(&records) {
            records.clear();
        }

        let now = Utc::now();
        let total = records.len() + messages.len();
        if records.is_empty() || total > self.history_limit {
            // Trim path: rewrite the retained tail plus the new batch in one
            // atomic swap.
            records.extend(messages.iter().map(|m| HistoryRecord {
                at: now,
                message: m.clone(),
            }));
            let keep_from = records.len().saturating_sub(self.history_limit);
            return self.rewrite_records(key, &records[keep_from..]).await;
        }

        // Serialize the whole batch up front so a bad message leaves the
        // stored log untouched.
        let mut buffer = String::new();
        for message in messages {
            let line = serde_json::to_string(&HistoryRecord {
                at: now,
                message: message.clone(),
            })
            .map_err(|e| StorageError::serialization(e.to_string()))?;
            buffer.push_str(&line);
            buffer.push('\n');
        }

        let path = self.history_path(key);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| StorageError::file_io(&path, e))?;
        file.write_all(buffer.as_bytes())
            .await
            .map_err(|e| StorageError::file_io(&path, e))?;
        file.sync_all()
            .await
            .map_err(|e| StorageError::file_io(&path, e))?;
        Ok(())
    }

    async fn clear_history(&self, key: &SessionKey) -> StorageResult<()> {
        let path = self.history_path(key);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::file_io(&path, e)),
        }
    }

    // ========================================================================
    // Session state
    // ========================================================================

    async fn state(&self, key: &SessionKey) -> StorageResult<SessionState> {
        let path = self.state_path(key);

        let contents = match fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(SessionState::default());
            }
            Err(e) => return Err(StorageError::file_io(&path, e)),
        };

        serde_json::from_str(&contents)
            .map_err(|e| StorageError::file_deserialization(&path, e.to_string()))
    }

    async fn save_state(&self, key: &SessionKey, state: &SessionState) -> StorageResult<()> {
        self.ensure_session_dir(key).await?;

        let final_path = self.state_path(key);
        let temp_path = self.session_dir(key).join("state.json.tmp");

        let json = serde_json::to_string_pretty(state)
            .map_err(|e| StorageError::serialization(e.to_string()))?;

        fs::write(&temp_path, json.as_bytes())
            .await
            .map_err(|e| StorageError::file_io(&temp_path, e))?;
        fs::rename(&temp_path, &final_path)
            .await
            .map_err(|e| StorageError::file_io(&final_path, e))?;
        Ok(())
    }

    // ========================================================================
    // Artifact content
    // ========================================================================

    async fn artifact(&self, key: &SessionKey, id: u64) -> StorageResult<Option<Artifact>> {
        let path = self.artifact_path(key, id);

        let contents = match fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::file_io(&path, e)),
        };

        let artifact = serde_json::from_str(&contents)
            .map_err(|e| StorageError::file_deserialization(&path, e.to_string()))?;
        Ok(Some(artifact))
    }

    async fn save_artifact(&self, key: &SessionKey, artifact: &Artifact) -> StorageResult<()> {
        let dir = self.session_dir(key).join("artifacts");
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageError::file_io(&dir, e))?;

        let final_path = self.artifact_path(key, artifact.id);
        let temp_path = dir.join(format!("{}.json.tmp", artifact.id));

        let json = serde_json::to_string(artifact)
            .map_err(|e| StorageError::serialization(e.to_string()))?;

        fs::write(&temp_path, json.as_bytes())
            .await
            .map_err(|e| StorageError::file_io(&temp_path, e))?;
        fs::rename(&temp_path, &final_path)
            .await
            .map_err(|e| StorageError::file_io(&final_path, e))?;
        Ok(())
    }
}
