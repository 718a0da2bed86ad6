//! Ranking records, storage, and the two-strategy cache.
//!
//! Per-item relevance scores are expensive to compute (one model call per
//! item), so results are cached in a [`RankingStore`] and reused through
//! [`RankingCache`] with two lookup strategies layered on one record shape:
//!
//! 1. **Exact** — profile-based rankings are keyed by a stable hash of the
//!    normalized profile text.
//! 2. **Fuzzy** — free-text requests are matched at read time against
//!    previously used criteria strings by token-set Jaccard similarity
//!    ("papers about X" and "show me X-related work" hit the same rows).
//!
//! The cache is an optimization, not a correctness dependency: store
//! failures are logged and the freshly computed results still flow to the
//! caller.

mod cache;
mod file;
mod record;
mod score;
mod store;

pub use cache::{RankingCache, SIMILARITY_THRESHOLD, criteria_hash, jaccard_similarity};
pub use file::FileRankingStore;
pub use record::{Criteria, CriteriaKind, RankingRecord};
pub use score::{ItemScore, ScoreError, Scorer, ScoredPaper, score_papers};
pub use store::{MemoryRankingStore, RankingStore};
