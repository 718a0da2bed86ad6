//! Per-item relevance scoring with a bounded worker pool.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use thiserror::Error;
use tracing::warn;

use crate::bus::{EventBus, EventKind};
use crate::papers::Paper;

/// Result of scoring one item against the ranking criteria.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemScore {
    /// Relevance from 1 (ignore) to 5 (must read).
    pub score: u8,
    /// Short justification, at most ~100 chars.
    pub reason: String,
}

/// Errors from a scoring call.
#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("model request failed: {0}")]
    Request(String),

    #[error("unusable model response: {0}")]
    Malformed(String),
}

/// The opaque scoring function, backed by a language model in production.
#[async_trait]
pub trait Scorer: Send + Sync {
    /// Score one item given its context (criteria plus item metadata).
    async fn score(&self, context: &str) -> Result<ItemScore, ScoreError>;
}

/// A paper together with its relevance score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPaper {
    pub paper: Paper,
    pub score: u8,
    pub reason: String,
}

/// Score a batch of papers against `criteria_text`, at most `concurrency`
/// calls in flight.
///
/// Individual failures never abort the batch: the item is recorded with
/// score 0 and the error text as its reason, and a warning event is
/// published on the bus. Results are sorted by score descending.
pub async fn score_papers(
    scorer: Arc<dyn Scorer>,
    papers: Vec<Paper>,
    criteria_text: &str,
    bus: &EventBus,
    concurrency: usize,
) -> Vec<ScoredPaper> {
    let total = papers.len();
    let concurrency = concurrency.max(1);

    let mut scored: Vec<ScoredPaper> = stream::iter(papers.into_iter().enumerate())
        .map(|(index, paper)| {
            let scorer = scorer.clone();
            let bus = bus.clone();
            let context = score_context(criteria_text, &paper);
            async move {
                match scorer.score(&context).await {
                    Ok(result) => {
                        bus.publish(
                            EventKind::Progress,
                            format!("Scored {}/{}: {}", index + 1, total, paper.title),
                        );
                        ScoredPaper {
                            paper,
                            score: result.score.clamp(1, 5),
                            reason: result.reason,
                        }
                    }
                    Err(e) => {
                        warn!(item = %paper.id, error = %e, "scoring failed");
                        bus.publish(
                            EventKind::Error,
                            format!("Failed to score {}: {e}", paper.id),
                        );
                        ScoredPaper {
                            paper,
                            score: 0,
                            reason: format!("Error: {e}"),
                        }
                    }
                }
            }
        })
        .buffer_unordered(concurrency)
        .collect()
        .await;

    scored.sort_by(|a, b| b.score.cmp(&a.score));
    scored
}

fn score_context(criteria_text: &str, paper: &Paper) -> String {
    format!(
        "## Scoring Context\n{criteria_text}\n\n## Paper to Score\n**{}**\n\n{}",
        paper.title, paper.summary
    )
}
