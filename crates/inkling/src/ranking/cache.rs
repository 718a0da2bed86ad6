//! Two-strategy ranking cache.
//!
//! Exact lookups hash the normalized profile text; fuzzy lookups match a
//! free-text request against previously used criteria strings by token-set
//! Jaccard similarity. Both paths degrade gracefully: storage failures and
//! malformed rows read as cache misses, never as turn failures.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::record::{Criteria, RankingRecord};
use super::score::ScoredPaper;
use super::store::RankingStore;

/// Minimum token-set Jaccard similarity for a fuzzy hit.
pub const SIMILARITY_THRESHOLD: f64 = 0.6;

/// Stable hex digest of normalized criteria text.
///
/// Normalization lowercases and collapses whitespace so trivial reformatting
/// of a profile does not miss the cache.
pub fn criteria_hash(text: &str) -> String {
    let normalized = text
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    let digest = Sha256::digest(normalized.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Token-set Jaccard similarity between two free-text criteria.
///
/// Tokens are lowercased alphanumeric runs with naive plural folding
/// (trailing `s` stripped from longer tokens) so "diffusion models" and
/// "diffusion model papers" overlap. Two empty token sets are identical.
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let set_a = token_set(a);
    let set_b = token_set(b);

    if set_a.is_empty() && set_b.is_empty() {
        return 1.0;
    }

    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        return 0.0;
    }
    intersection as f64 / union as f64
}

fn token_set(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| {
            let token = t.to_lowercase();
            match token.strip_suffix('s') {
                Some(stem) if stem.len() > 3 => stem.to_string(),
                _ => token,
            }
        })
        .collect()
}

/// Cache for expensive per-item ranking computations.
#[derive(Clone)]
pub struct RankingCache {
    store: Arc<dyn RankingStore>,
    threshold: f64,
}

impl RankingCache {
    pub fn new(store: Arc<dyn RankingStore>) -> Self {
        Self {
            store,
            threshold: SIMILARITY_THRESHOLD,
        }
    }

    /// Exact lookup for profile-based rankings.
    ///
    /// Returns cached rows sorted by score descending, or `None` on a miss.
    /// Storage failures are logged and read as misses.
    pub async fn lookup_profile(
        &self,
        user_id: &str,
        batch_key: &str,
        profile_text: &str,
    ) -> Option<Vec<RankingRecord>> {
        let hash = criteria_hash(profile_text);
        match self.store.profile_rows(user_id, batch_key, &hash).await {
            Ok(rows) if rows.is_empty() => None,
            Ok(rows) => {
                debug!(user_id, batch_key, rows = rows.len(), "profile cache hit");
                Some(rows)
            }
            Err(e) => {
                warn!(error = %e, "ranking cache lookup failed, recomputing");
                None
            }
        }
    }

    /// Fuzzy lookup for free-text request rankings.
    ///
    /// Fetches the distinct criteria previously used for (user, batch) and
    /// takes the highest-similarity match at or above the threshold; ties
    /// go to the earliest stored criteria. Returns the rows stored under
    /// that exact criteria string.
    pub async fn lookup_request(
        &self,
        user_id: &str,
        batch_key: &str,
        request: &str,
    ) -> Option<Vec<RankingRecord>> {
        let candidates = match self.store.request_criteria(user_id, batch_key).await {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "ranking cache lookup failed, recomputing");
                return None;
            }
        };

        let mut best: Option<(&str, f64)> = None;
        for candidate in &candidates {
            let similarity = jaccard_similarity(request, candidate);
            if similarity >= self.threshold
                && best.map(|(_, s)| similarity > s).unwrap_or(true)
            {
                best = Some((candidate, similarity));
            }
        }

        let (matched, similarity) = best?;
        debug!(
            user_id,
            batch_key,
            matched,
            similarity = format!("{similarity:.2}"),
            "fuzzy cache hit"
        );
        match self.store.request_rows(user_id, batch_key, matched).await {
            Ok(rows) if rows.is_empty() => None,
            Ok(rows) => Some(rows),
            Err(e) => {
                warn!(error = %e, "ranking cache lookup failed, recomputing");
                None
            }
        }
    }

    /// Cache freshly computed profile rankings.
    ///
    /// Insert-ignore semantics: rows whose identity already exists are left
    /// untouched. A store failure is logged and swallowed; the caller keeps
    /// the computed results either way.
    pub async fn store_profile(
        &self,
        user_id: &str,
        batch_key: &str,
        profile_text: &str,
        scored: &[ScoredPaper],
    ) {
        let hash = criteria_hash(profile_text);
        let records = to_records(
            user_id,
            batch_key,
            Criteria::Profile { hash },
            profile_text,
            scored,
        );
        if let Err(e) = self.store.insert(&records).await {
            warn!(error = %e, "failed to cache profile rankings");
        }
    }

    /// Cache freshly computed request rankings (additive, no dedup key).
    pub async fn store_request(
        &self,
        user_id: &str,
        batch_key: &str,
        request: &str,
        scored: &[ScoredPaper],
    ) {
        let records = to_records(user_id, batch_key, Criteria::Request, request, scored);
        if let Err(e) = self.store.insert(&records).await {
            warn!(error = %e, "failed to cache request rankings");
        }
    }
}

fn to_records(
    user_id: &str,
    batch_key: &str,
    criteria: Criteria,
    criteria_text: &str,
    scored: &[ScoredPaper],
) -> Vec<RankingRecord> {
    scored
        .iter()
        .map(|s| RankingRecord {
            user_id: user_id.to_string(),
            item_id: s.paper.id.clone(),
            batch_key: batch_key.to_string(),
            criteria: criteria.clone(),
            criteria_text: criteria_text.to_string(),
            score: s.score,
            reason: s.reason.clone(),
            created_at: Utc::now(),
        })
        .collect()
}
