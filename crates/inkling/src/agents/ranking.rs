//! Paper ranking sub-agent.
//!
//! Ranks one day's papers by community upvotes, by the user's profile, or by
//! a free-text request. Profile and request rankings go through the
//! [`RankingCache`] so repeated (or rephrased) asks skip the expensive
//! per-item model calls. Every ranking is registered as an artifact and
//! queued for display.

use std::sync::Arc;

use tracing::info;

use crate::bus::EventKind;
use crate::papers::{Paper, PaperSource};
use crate::ranking::{RankingCache, RankingRecord, ScoredPaper, Scorer, score_papers};
use crate::session::{Artifact, ArtifactKind};
use crate::store::SessionStore;

use super::{PipelineError, TurnContext};

/// How to rank a batch of papers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RankCriteria {
    /// Community upvotes; no model calls.
    Upvotes,
    /// Relevance to the user's synthesized profile (exact-cached).
    Profile,
    /// Relevance to a specific request (fuzzy-cached).
    Request(String),
}

/// Sub-agent that produces paper rankings.
pub struct RankingAgent {
    papers: Arc<dyn PaperSource>,
    scorer: Arc<dyn Scorer>,
    cache: RankingCache,
    store: Arc<dyn SessionStore>,
    concurrency: usize,
}

impl RankingAgent {
    pub fn new(
        papers: Arc<dyn PaperSource>,
        scorer: Arc<dyn Scorer>,
        cache: RankingCache,
        store: Arc<dyn SessionStore>,
        concurrency: usize,
    ) -> Self {
        Self {
            papers,
            scorer,
            cache,
            store,
            concurrency,
        }
    }

    /// Rank the papers of `date` and register the result as an artifact.
    ///
    /// Returns the formatted ranking text (also the artifact content), or a
    /// short explanation when there is nothing to rank.
    pub async fn rank(
        &self,
        ctx: &mut TurnContext<'_>,
        date: &str,
        criteria: RankCriteria,
    ) -> Result<String, PipelineError> {
        let papers = self.papers.papers_for_date(date).await?;
        if papers.is_empty() {
            return Ok(format!("No papers found for {date}."));
        }

        let user_id = ctx.key.user_id().to_string();
        let (body, summary) = match criteria {
            RankCriteria::Upvotes => {
                ctx.bus.publish(
                    EventKind::Tool,
                    format!("Ranking {} papers from {date} by upvotes", papers.len()),
                );
                (
                    format_by_upvotes(&papers),
                    format!("papers for {date} ranked by upvotes"),
                )
            }
            RankCriteria::Profile => {
                let Some(profile) = ctx.state.profile_text.clone() else {
                    return Ok("No user profile available. Cannot rank by profile.".to_string());
                };
                ctx.bus.publish(
                    EventKind::Tool,
                    format!("Ranking {} papers from {date} by your profile", papers.len()),
                );
                let body = match self.cache.lookup_profile(&user_id, date, &profile).await {
                    Some(rows) => {
                        ctx.bus
                            .publish(EventKind::Status, "Reusing cached profile rankings");
                        format_cached_rows(&rows, &papers)
                    }
                    None => {
                        let scored = score_papers(
                            self.scorer.clone(),
                            papers.clone(),
                            &format!("User Profile:\n{profile}"),
                            ctx.bus,
                            self.concurrency,
                        )
                        .await;
                        self.cache
                            .store_profile(&user_id, date, &profile, &scored)
                            .await;
                        format_scored(&scored)
                    }
                };
                (body, format!("papers for {date} ranked by user profile"))
            }
            RankCriteria::Request(request) => {
                ctx.bus.publish(
                    EventKind::Tool,
                    format!("Ranking {} papers from {date} for: {request}", papers.len()),
                );
                let body = match self.cache.lookup_request(&user_id, date, &request).await {
                    Some(rows) => {
                        ctx.bus.publish(
                            EventKind::Status,
                            "Reusing cached rankings for a similar request",
                        );
                        format_cached_rows(&rows, &papers)
                    }
                    None => {
                        let scored = score_papers(
                            self.scorer.clone(),
                            papers.clone(),
                            &format!("User is looking for:\n{request}"),
                            ctx.bus,
                            self.concurrency,
                        )
                        .await;
                        self.cache
                            .store_request(&user_id, date, &request, &scored)
                            .await;
                        format_scored(&scored)
                    }
                };
                (body, format!("papers for {date} ranked for \"{request}\""))
            }
        };

        let id = ctx.state.register_artifact(&summary, ArtifactKind::Rankings);
        self.store
            .save_artifact(
                ctx.key,
                &Artifact {
                    id,
                    content: body.clone(),
                    meta: ctx.state.artifacts[&id].clone(),
                },
            )
            .await?;
        ctx.state.queue_for_display(id);
        info!(artifact = id, %summary, "registered ranking artifact");

        Ok(body)
    }
}

fn format_by_upvotes(papers: &[Paper]) -> String {
    let mut lines = Vec::with_capacity(papers.len());
    for (i, p) in papers.iter().enumerate() {
        lines.push(format!("{}. [{} upvotes] {}", i + 1, p.upvotes, p.title));
    }
    lines.join("\n")
}

fn format_scored(scored: &[ScoredPaper]) -> String {
    let mut lines = Vec::with_capacity(scored.len() * 2);
    for (i, s) in scored.iter().enumerate() {
        lines.push(format!("{}. [{}/5] {}", i + 1, s.score, s.paper.title));
        lines.push(format!("   {}", s.reason));
    }
    lines.join("\n")
}

/// Format cached rows, joining back to the catalog for titles.
fn format_cached_rows(rows: &[RankingRecord], papers: &[Paper]) -> String {
    let mut lines = Vec::with_capacity(rows.len() * 2);
    for (i, row) in rows.iter().enumerate() {
        let title = papers
            .iter()
            .find(|p| p.id == row.item_id)
            .map(|p| p.title.as_str())
            .unwrap_or(row.item_id.as_str());
        lines.push(format!("{}. [{}/5] {title}", i + 1, row.score));
        lines.push(format!("   {}", row.reason));
    }
    lines.join("\n")
}
