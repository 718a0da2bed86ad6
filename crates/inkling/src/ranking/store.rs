//! Ranking record storage trait and the in-memory backend.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::store::StorageResult;

use super::record::{Criteria, RankingRecord};

/// Storage interface for ranking records.
///
/// Captures the three query shapes the cache needs; the backing layout
/// (relational table, JSONL files, in-process vector) is the implementer's
/// concern.
#[async_trait]
pub trait RankingStore: Send + Sync {
    /// Insert a batch of records.
    ///
    /// Profile records use insert-ignore semantics: a record whose
    /// (user, item, batch, hash) identity already exists is skipped, never
    /// overwritten. Request records are additive history with no dedup key.
    async fn insert(&self, records: &[RankingRecord]) -> StorageResult<()>;

    /// Fetch profile records for (user, batch, criteria hash), sorted by
    /// score descending.
    async fn profile_rows(
        &self,
        user_id: &str,
        batch_key: &str,
        hash: &str,
    ) -> StorageResult<Vec<RankingRecord>>;

    /// Distinct free-text criteria previously used for (user, batch), in
    /// first-use order.
    async fn request_criteria(&self, user_id: &str, batch_key: &str)
    -> StorageResult<Vec<String>>;

    /// Fetch request records for (user, batch) stored under exactly
    /// `criteria_text`, sorted by score descending.
    async fn request_rows(
        &self,
        user_id: &str,
        batch_key: &str,
        criteria_text: &str,
    ) -> StorageResult<Vec<RankingRecord>>;
}

/// Sort records by score descending, stable within equal scores.
pub(super) fn sort_by_score_desc(records: &mut [RankingRecord]) {
    records.sort_by(|a, b| b.score.cmp(&a.score));
}

/// In-process implementation of [`RankingStore`].
#[derive(Default)]
pub struct MemoryRankingStore {
    records: Mutex<Vec<RankingRecord>>,
}

impl MemoryRankingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored records (test introspection).
    pub fn len(&self) -> usize {
        self.records.lock().expect("ranking store lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RankingStore for MemoryRankingStore {
    async fn insert(&self, records: &[RankingRecord]) -> StorageResult<()> {
        let mut stored = self.records.lock().expect("ranking store lock");
        for record in records {
            let duplicate = matches!(record.criteria, Criteria::Profile { .. })
                && stored.iter().any(|r| r.dedup_key() == record.dedup_key());
            if !duplicate {
                stored.push(record.clone());
            }
        }
        Ok(())
    }

    async fn profile_rows(
        &self,
        user_id: &str,
        batch_key: &str,
        hash: &str,
    ) -> StorageResult<Vec<RankingRecord>> {
        let stored = self.records.lock().expect("ranking store lock");
        let mut rows: Vec<_> = stored
            .iter()
            .filter(|r| {
                r.user_id == user_id
                    && r.batch_key == batch_key
                    && r.criteria.hash() == Some(hash)
            })
            .cloned()
            .collect();
        sort_by_score_desc(&mut rows);
        Ok(rows)
    }

    async fn request_criteria(
        &self,
        user_id: &str,
        batch_key: &str,
    ) -> StorageResult<Vec<String>> {
        let stored = self.records.lock().expect("ranking store lock");
        let mut seen = Vec::new();
        for record in stored.iter() {
            if record.user_id == user_id
                && record.batch_key == batch_key
                && record.criteria == Criteria::Request
                && !seen.contains(&record.criteria_text)
            {
                seen.push(record.criteria_text.clone());
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
        let stored = self.records.lock().expect("ranking store lock");
        let mut rows: Vec<_> = stored
            .iter()
            .filter(|r| {
                r.user_id == user_id
                    && r.batch_key == batch_key
                    && r.criteria == Criteria::Request
                    && r.criteria_text == criteria_text
            })
            .cloned()
            .collect();
        sort_by_score_desc(&mut rows);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn profile_record(item: &str, score: u8, hash: &str) -> RankingRecord {
        RankingRecord {
            user_id: "alice".to_string(),
            item_id: item.to_string(),
            batch_key: "2026-08-06".to_string(),
            criteria: Criteria::Profile {
                hash: hash.to_string(),
            },
            criteria_text: "ML engineer".to_string(),
            score,
            reason: "relevant".to_string(),
            created_at: Utc::now(),
        }
    }

    fn request_record(item: &str, score: u8, text: &str) -> RankingRecord {
        RankingRecord {
            user_id: "alice".to_string(),
            item_id: item.to_string(),
            batch_key: "2026-08-06".to_string(),
            criteria: Criteria::Request,
            criteria_text: text.to_string(),
            score,
            reason: "matches topic".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn profile_insert_is_idempotent() {
        let store = MemoryRankingStore::new();
        let rows = vec![profile_record("p1", 5, "h1"), profile_record("p2", 3, "h1")];

        store.insert(&rows).await.unwrap();
        store.insert(&rows).await.unwrap();

        assert_eq!(store.len(), 2);
        let fetched = store.profile_rows("alice", "2026-08-06", "h1").await.unwrap();
        assert_eq!(fetched.len(), 2);
        assert_eq!(fetched[0].score, 5);
    }

    #[tokio::test]
    async fn duplicate_profile_row_does_not_change_stored_score() {
        let store = MemoryRankingStore::new();
        store
            .insert(&[profile_record("p1", 5, "h1")])
            .await
            .unwrap();

        // Same identity, different score: the original row wins.
        store
            .insert(&[profile_record("p1", 1, "h1")])
            .await
            .unwrap();

        let rows = store.profile_rows("alice", "2026-08-06", "h1").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].score, 5);
    }

    #[tokio::test]
    async fn request_inserts_are_additive() {
        let store = MemoryRankingStore::new();
        let row = request_record("p1", 4, "papers about diffusion models");
        store.insert(&[row.clone()]).await.unwrap();
        store.insert(&[row]).await.unwrap();

        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn rows_sorted_by_score_descending() {
        let store = MemoryRankingStore::new();
        store
            .insert(&[
                profile_record("p1", 2, "h1"),
                profile_record("p2", 5, "h1"),
                profile_record("p3", 4, "h1"),
            ])
            .await
            .unwrap();

        let rows = store.profile_rows("alice", "2026-08-06", "h1").await.unwrap();
        let scores: Vec<_> = rows.iter().map(|r| r.score).collect();
        assert_eq!(scores, vec![5, 4, 2]);
    }

    #[tokio::test]
    async fn request_criteria_distinct_in_first_use_order() {
        let store = MemoryRankingStore::new();
        store
            .insert(&[
                request_record("p1", 4, "papers about diffusion models"),
                request_record("p2", 3, "papers about diffusion models"),
                request_record("p1", 2, "agent benchmarks"),
            ])
            .await
            .unwrap();

        let criteria = store.request_criteria("alice", "2026-08-06").await.unwrap();
        assert_eq!(
            criteria,
            vec!["papers about diffusion models", "agent benchmarks"]
        );
    }

    #[tokio::test]
    async fn lookups_scoped_to_user_and_batch() {
        let store = MemoryRankingStore::new();
        let mut other_user = profile_record("p1", 5, "h1");
        other_user.user_id = "bob".to_string();
        let mut other_batch = profile_record("p1", 5, "h1");
        other_batch.batch_key = "2026-08-05".to_string();
        store.insert(&[other_user, other_batch]).await.unwrap();

        assert!(
            store
                .profile_rows("alice", "2026-08-06", "h1")
                .await
                .unwrap()
                .is_empty()
        );
    }
}
