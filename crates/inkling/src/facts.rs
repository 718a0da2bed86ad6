//! Durable per-user facts.
//!
//! Facts are small free-text observations about a user ("prefers efficient
//! architectures", "works on agent systems") accumulated across sessions.
//! They feed profile synthesis and are injected into the routing prompt.
//! Keyed by user, not by session: facts survive conversation expiry.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::store::{StorageError, StorageResult};

/// One stored fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserFact {
    pub fact: String,
    pub created_at: DateTime<Utc>,
}

/// Storage interface for user facts.
#[async_trait]
pub trait UserFactStore: Send + Sync {
    /// Append one fact for a user.
    async fn add(&self, user_id: &str, fact: &str) -> StorageResult<()>;

    /// All facts for a user in chronological order; empty for unknown users.
    async fn facts(&self, user_id: &str) -> StorageResult<Vec<UserFact>>;

    /// Delete all facts for a user.
    async fn clear(&self, user_id: &str) -> StorageResult<()>;
}

/// Render facts as a prompt section; empty string when there are none.
pub fn facts_prompt_section(facts: &[UserFact]) -> String {
    if facts.is_empty() {
        return String::new();
    }
    let mut lines = vec![format!("Known facts about user ({} total):", facts.len())];
    for fact in facts {
        lines.push(format!("- {}", fact.fact));
    }
    lines.join("\n")
}

/// In-memory fact store for development and tests.
#[derive(Default)]
pub struct MemoryFactStore {
    facts: Mutex<HashMap<String, Vec<UserFact>>>,
}

impl MemoryFactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserFactStore for MemoryFactStore {
    async fn add(&self, user_id: &str, fact: &str) -> StorageResult<()> {
        let mut facts = self.facts.lock().expect("fact store lock");
        facts.entry(user_id.to_string()).or_default().push(UserFact {
            fact: fact.to_string(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn facts(&self, user_id: &str) -> StorageResult<Vec<UserFact>> {
        let facts = self.facts.lock().expect("fact store lock");
        Ok(facts.get(user_id).cloned().unwrap_or_default())
    }

    async fn clear(&self, user_id: &str) -> StorageResult<()> {
        let mut facts = self.facts.lock().expect("fact store lock");
        facts.remove(user_id);
        Ok(())
    }
}

/// File-backed fact store: one JSONL file per user.
#[derive(Debug, Clone)]
pub struct FileFactStore {
    facts_dir: PathBuf,
}

impl FileFactStore {
    pub fn new(facts_dir: impl Into<PathBuf>) -> Self {
        Self {
            facts_dir: facts_dir.into(),
        }
    }

    fn user_path(&self, user_id: &str) -> PathBuf {
        self.facts_dir.join(format!("{user_id}.jsonl"))
    }
}

#[async_trait]
impl UserFactStore for FileFactStore {
    async fn add(&self, user_id: &str, fact: &str) -> StorageResult<()> {
        fs::create_dir_all(&self.facts_dir)
            .await
            .map_err(|e| StorageError::file_io(&self.facts_dir, e))?;

        let record = UserFact {
            fact: fact.to_string(),
            created_at: Utc::now(),
        };
        let mut line = serde_json::to_string(&record)
            .map_err(|e| StorageError::serialization(e.to_string()))?;
        line.push('\n');

        let path = self.user_path(user_id);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| StorageError::file_io(&path, e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| StorageError::file_io(&path, e))?;
        file.sync_all()
            .await
            .map_err(|e| StorageError::file_io(&path, e))?;
        Ok(())
    }

    async fn facts(&self, user_id: &str) -> StorageResult<Vec<UserFact>> {
        let path = self.user_path(user_id);

        let contents = match fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::file_io(&path, e)),
        };

        let mut facts = Vec::new();
        for line in contents.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let Ok(fact) = serde_json::from_str::<UserFact>(trimmed) else {
                continue;
            };
            facts.push(fact);
        }
        Ok(facts)
    }

    async fn clear(&self, user_id: &str) -> StorageResult<()> {
        let path = self.user_path(user_id);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::file_io(&path, e)),
        }
    }
}
