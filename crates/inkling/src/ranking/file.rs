//! File-based ranking record storage.
//!
//! Records are stored as JSONL, one file per (user, batch):
//! ```text
//! {rankings_dir}/
//!   {user_id}/
//!     {batch_key}.jsonl
//! ```
//! Malformed lines are skipped at read time (treated as cache misses).

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::store::{StorageError, StorageResult};

use super::record::{Criteria, RankingRecord};
use super::store::{RankingStore, sort_by_score_desc};

/// File-based implementation of [`RankingStore`].
#[derive(Debug, Clone)]
pub struct FileRankingStore {
    rankings_dir: PathBuf,
}

impl FileRankingStore {
    /// Create a store rooted at `rankings_dir`; created on first insert.
    pub fn new(rankings_dir: impl Into<PathBuf>) -> Self {
        Self {
            rankings_dir: rankings_dir.into(),
        }
    }

    fn batch_path(&self, user_id: &str, batch_key: &str) -> PathBuf {
        self.rankings_dir
            .join(user_id)
            .join(format!("{batch_key}.jsonl"))
    }

    async fn read_batch(&self, user_id: &str, batch_key: &str) -> StorageResult<Vec<RankingRecord>> {
        let path = self.batch_path(user_id, batch_key);

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
            let Ok(record) = serde_json::from_str::<RankingRecord>(trimmed) else {
                continue;
            };
            records.push(record);
        }
        Ok(records)
    }

    async fn append_batch(
        &self,
        user_id: &str,
        batch_key: &str,
        records: &[RankingRecord],
    ) -> StorageResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let dir = self.rankings_dir.join(user_id);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageError::file_io(&dir, e))?;

        let mut buffer = String::new();
        for record in records {
            let line = serde_json::to_string(record)
                .map_err(|e| StorageError::serialization(e.to_string()))?;
            buffer.push_str(&line);
            buffer.push('\n');
        }

        let path = self.batch_path(user_id, batch_key);
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
}

#[async_trait]
impl RankingStore for FileRankingStore {
    async fn insert(&self, records: &[RankingRecord]) -> StorageResult<()> {
        // Group by (user, batch) so each file is read and appended once.
        let mut groups: Vec<(&str, &str, Vec<&RankingRecord>)> = Vec::new();
        for record in records {
            let position = groups
                .iter()
                .position(|(u, b, _)| *u == record.user_id && *b == record.batch_key);
            match position {
                Some(pos) => groups[pos].2.push(record),
                None => groups.push((&record.user_id, &record.batch_key, vec![record])),
            }
        }

        for (user_id, batch_key, group) in groups {
            let existing = self.read_batch(user_id, batch_key).await?;
            let fresh: Vec<RankingRecord> = group
                .into_iter()
                .filter(|record| {
                    let duplicate = matches!(record.criteria, Criteria::Profile { .. })
                        && existing.iter().any(|r| r.dedup_key() == record.dedup_key());
                    !duplicate
                })
                .cloned()
                .collect();
            self.append_batch(user_id, batch_key, &fresh).await?;
        }
        Ok(())
    }

    async fn profile_rows(
        &self,
        user_id: &str,
        batch_key: &str,
        hash: &str,
    ) -> StorageResult<Vec<RankingRecord>> {
        let mut rows: Vec<_> = self
            .read_batch(user_id, batch_key)
            .await?
            .into_iter()
            .filter(|r| r.criteria.hash() == Some(hash))
            .collect();
        sort_by_score_desc(&mut rows);
        Ok(rows)
    }

    async fn request_criteria(
        &self,
        user_id: &str,
        batch_key: &str,
    ) -> StorageResult<Vec<String>> {
        let records = self.read_batch(user_id, batch_key).await?;
        let mut seen = Vec::new();
        for record in records {
            if record.criteria == Criteria::Request && !seen.contains(&record.criteria_text) {
                seen.push(record.criteria_text);
            }
        }
        Ok(seen)
    }

    async fn request_rows(
        &self,
        user_id: &str,
        batch_key: &str,
        criteria_text: &str,
    ) -> StorageResult<Vec<RankingRecord>> {
        let mut rows: Vec<_> = self
            .read_batch(user_id, batch_key)
            .await?
            .into_iter()
            .filter(|r| r.criteria == Criteria::Request && r.criteria_text == criteria_text)
            .collect();
        sort_by_score_desc(&mut rows);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn record(item: &str, score: u8, criteria: Criteria, text: &str) -> RankingRecord {
        RankingRecord {
            user_id: "alice".to_string(),
            item_id: item.to_string(),
            batch_key: "2026-08-06".to_string(),
            criteria,
            criteria_text: text.to_string(),
            score,
            reason: "reason".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn insert_and_fetch_profile_rows() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileRankingStore::new(temp_dir.path().join("rankings"));

        let hash = "h1".to_string();
        store
            .insert(&[
                record("p1", 2, Criteria::Profile { hash: hash.clone() }, "profile"),
                record("p2", 5, Criteria::Profile { hash: hash.clone() }, "profile"),
            ])
            .await
            .unwrap();

        let rows = store.profile_rows("alice", "2026-08-06", "h1").await.unwrap();
        let items: Vec<_> = rows.iter().map(|r| (r.item_id.as_str(), r.score)).collect();
        assert_eq!(items, vec![("p2", 5), ("p1", 2)]);
    }

    #[tokio::test]
    async fn profile_double_insert_no_duplicates() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileRankingStore::new(temp_dir.path().join("rankings"));

        let row = record(
            "p1",
            5,
            Criteria::Profile {
                hash: "h1".to_string(),
            },
            "profile",
        );
        store.insert(std::slice::from_ref(&row)).await.unwrap();
        store.insert(&[row]).await.unwrap();

        let rows = store.profile_rows("alice", "2026-08-06", "h1").await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn request_rows_fetched_by_exact_criteria() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileRankingStore::new(temp_dir.path().join("rankings"));

        store
            .insert(&[
                record("p1", 4, Criteria::Request, "papers about diffusion models"),
                record("p2", 1, Criteria::Request, "agent benchmarks"),
            ])
            .await
            .unwrap();

        let criteria = store.request_criteria("alice", "2026-08-06").await.unwrap();
        assert_eq!(
            criteria,
            vec!["papers about diffusion models", "agent benchmarks"]
        );

        let rows = store
            .request_rows("alice", "2026-08-06", "papers about diffusion models")
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].item_id, "p1");
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileRankingStore::new(temp_dir.path().join("rankings"));

        store
            .insert(&[record("p1", 4, Criteria::Request, "topic")])
            .await
            .unwrap();

        let path = store.batch_path("alice", "2026-08-06");
        let mut contents = fs::read_to_string(&path).await.unwrap();
        contents.push_str("not json\n");
        fs::write(&path, contents).await.unwrap();

        let rows = store.request_rows("alice", "2026-08-06", "topic").await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn unknown_batch_reads_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileRankingStore::new(temp_dir.path().join("rankings"));
        assert!(
            store
                .profile_rows("alice", "2026-01-01", "h")
                .await
                .unwrap()
                .is_empty()
        );
    }
}
