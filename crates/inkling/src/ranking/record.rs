//! Ranking record model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which lookup strategy a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriteriaKind {
    Profile,
    Request,
}

/// Ranking criteria. Profile-based rankings carry a stable hash of the
/// normalized profile text for exact cache lookups; free-text requests carry
/// no hash and are matched fuzzily at read time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Criteria {
    Profile { hash: String },
    Request,
}

impl Criteria {
    pub fn kind(&self) -> CriteriaKind {
        match self {
            Criteria::Profile { .. } => CriteriaKind::Profile,
            Criteria::Request => CriteriaKind::Request,
        }
    }

    pub fn hash(&self) -> Option<&str> {
        match self {
            Criteria::Profile { hash } => Some(hash),
            Criteria::Request => None,
        }
    }
}

/// One cached per-item score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingRecord {
    pub user_id: String,
    pub item_id: String,
    /// Batch the item belongs to, e.g. a publication date.
    pub batch_key: String,
    pub criteria: Criteria,
    /// The criteria text as supplied (profile text or free-text request).
    pub criteria_text: String,
    /// 1..=5 from the scorer; 0 records a per-item scoring failure.
    pub score: u8,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl RankingRecord {
    /// Identity used for insert-ignore deduplication of profile records:
    /// (user, item, batch, criteria kind, criteria hash).
    pub fn dedup_key(&self) -> (String, String, String, CriteriaKind, Option<String>) {
        (
            self.user_id.clone(),
            self.item_id.clone(),
            self.batch_key.clone(),
            self.criteria.kind(),
            self.criteria.hash().map(str::to_string),
        )
    }
}
