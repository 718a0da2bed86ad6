//! The coordinating assistant.
//!
//! One model call routes each query to a tool directive or a direct reply;
//! tool results are narrated back through the model. The routing prompt
//! briefs the model with the user's profile and the registered artifacts so
//! it can reference prior work instead of recomputing it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tracing::debug;

use crate::bus::EventKind;
use crate::facts::{UserFactStore, facts_prompt_section};
use crate::llm::LanguageModel;
use crate::message::ChatMessage;
use crate::session::{Artifact, ArtifactKind};
use crate::store::SessionStore;

use super::{AgentPipeline, PipelineError, RankCriteria, RankingAgent, TurnContext, TurnOutput};

/// How the model asks for a ranking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum RankMode {
    #[default]
    Upvotes,
    Profile,
    Request,
}

/// Parsed routing decision.
#[derive(Debug, Deserialize)]
#[serde(tag = "tool", rename_all = "snake_case")]
enum Directive {
    /// Delegate to the ranking sub-agent.
    RankPapers {
        #[serde(default)]
        mode: RankMode,
        #[serde(default)]
        date: Option<String>,
        #[serde(default)]
        request: Option<String>,
    },
    /// Persist a synthesized user profile.
    SaveProfile { profile: String },
    /// Remember one fact about the user.
    RememberFact { fact: String },
    /// Answer directly.
    Reply { text: String },
}

/// The production [`AgentPipeline`].
pub struct PaperAssistant {
    model: Arc<dyn LanguageModel>,
    ranking: RankingAgent,
    store: Arc<dyn SessionStore>,
    facts: Arc<dyn UserFactStore>,
}

impl PaperAssistant {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        ranking: RankingAgent,
        store: Arc<dyn SessionStore>,
        facts: Arc<dyn UserFactStore>,
    ) -> Self {
        Self {
            model,
            ranking,
            store,
            facts,
        }
    }

    fn routing_prompt(&self, ctx: &TurnContext<'_>, facts_section: &str) -> String {
        let mut sections = vec![format!(
            "You are a research assistant. Today is {}.\n\
             Decide how to handle the user's message and answer with ONE JSON object:\n\
             {{\"tool\": \"rank_papers\", \"mode\": \"upvotes\"|\"profile\"|\"request\", \"date\": \"YYYY-MM-DD\", \"request\": \"...\"}}\n\
             {{\"tool\": \"save_profile\", \"profile\": \"...\"}}\n\
             {{\"tool\": \"remember_fact\", \"fact\": \"...\"}}\n\
             {{\"tool\": \"reply\", \"text\": \"...\"}}",
            Utc::now().format("%Y-%m-%d")
        )];

        if let Some(profile) = &ctx.state.profile_text {
            sections.push(format!("# User Profile\n{profile}"));
        }
        if !facts_section.is_empty() {
            sections.push(format!("# User Facts\n{facts_section}"));
        }
        let artifacts = ctx.state.artifact_prompt_section();
        if !artifacts.is_empty() {
            sections.push(artifacts);
        }
        if !ctx.history.is_empty() {
            let mut lines = vec!["# Conversation So Far".to_string()];
            for message in ctx.history {
                lines.push(format!("{}: {}", message.role, message.content_str()));
            }
            sections.push(lines.join("\n"));
        }
        sections.push(format!("# User Message\n{}", ctx.query));
        sections.join("\n\n")
    }

    fn narration_prompt(&self, query: &str, tool_result: &str) -> String {
        format!(
            "The user asked: {query}\n\n\
             A ranking tool produced this result (already shown to the user):\n{tool_result}\n\n\
             Write a short conversational summary pointing out the highlights. Plain text only."
        )
    }
}

#[async_trait]
impl AgentPipeline for PaperAssistant {
    async fn run(&self, mut ctx: TurnContext<'_>) -> Result<TurnOutput, PipelineError> {
        // Fact-store trouble should not take the turn down; the briefing is
        // just thinner without it.
        let facts_section = match self.facts.facts(ctx.key.user_id()).await {
            Ok(facts) => facts_prompt_section(&facts),
            Err(e) => {
                tracing::warn!(error = %e, "failed to load user facts");
                String::new()
            }
        };
        let prompt = self.routing_prompt(&ctx, &facts_section);
        let raw = self
            .model
            .generate(&prompt)
            .await
            .map_err(|e| PipelineError::Model(e.to_string()))?;

        let directive = parse_directive(&raw);
        debug!(?directive, "routing decision");

        let query = ctx.query.to_string();
        let mut messages = vec![ChatMessage::user(&query)];

        let reply = match directive {
            Directive::Reply { text } => {
                messages.push(ChatMessage::assistant(&text));
                text
            }
            Directive::SaveProfile { profile } => {
                ctx.bus.publish(EventKind::Tool, "Saving user profile");
                messages.push(ChatMessage::tool_call(
                    "save_profile",
                    serde_json::json!({ "profile": profile }),
                ));

                ctx.state.profile_text = Some(profile.clone());
                ctx.state.has_profile = true;
                let id = ctx
                    .state
                    .register_artifact("synthesized user profile", ArtifactKind::Profile);
                self.store
                    .save_artifact(
                        ctx.key,
                        &Artifact {
                            id,
                            content: profile,
                            meta: ctx.state.artifacts[&id].clone(),
                        },
                    )
                    .await?;

                messages.push(ChatMessage::tool_result("save_profile", "profile saved"));
                let text =
                    "Got it - I've saved your profile and will use it for future rankings."
                        .to_string();
                messages.push(ChatMessage::assistant(&text));
                text
            }
            Directive::RememberFact { fact } => {
                ctx.bus.publish(EventKind::Tool, "Remembering a fact about you");
                messages.push(ChatMessage::tool_call(
                    "remember_fact",
                    serde_json::json!({ "fact": fact }),
                ));
                self.facts.add(ctx.key.user_id(), &fact).await?;
                messages.push(ChatMessage::tool_result("remember_fact", "fact stored"));

                let text = format!("Noted: {fact}");
                messages.push(ChatMessage::assistant(&text));
                text
            }
            Directive::RankPapers {
                mode,
                date,
                request,
            } => {
                let date =
                    date.unwrap_or_else(|| Utc::now().format("%Y-%m-%d").to_string());
                let criteria = match mode {
                    RankMode::Upvotes => RankCriteria::Upvotes,
                    RankMode::Profile => RankCriteria::Profile,
                    RankMode::Request => {
                        RankCriteria::Request(request.unwrap_or_else(|| query.clone()))
                    }
                };
                messages.push(ChatMessage::tool_call(
                    "rank_papers",
                    serde_json::json!({ "mode": format!("{mode:?}").to_lowercase(), "date": date }),
                ));

                let result = self.ranking.rank(&mut ctx, &date, criteria).await?;
                messages.push(ChatMessage::tool_result("rank_papers", &result));

                let narration = self
                    .model
                    .generate(&self.narration_prompt(&query, &result))
                    .await
                    .map_err(|e| PipelineError::Model(e.to_string()))?;
                messages.push(ChatMessage::assistant(&narration));
                narration
            }
        };

        Ok(TurnOutput { reply, messages })
    }
}

/// Parse the model's routing decision.
///
/// Tolerates surrounding prose and code fences; anything that does not
/// contain a directive object is treated as a plain reply.
fn parse_directive(raw: &str) -> Directive {
    let trimmed = raw.trim();
    if let Ok(directive) = serde_json::from_str::<Directive>(trimmed) {
        return directive;
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && start < end
        && let Ok(directive) = serde_json::from_str::<Directive>(&trimmed[start..=end])
    {
        return directive;
    }

    Directive::Reply {
        text: trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rank_directive() {
        let raw = "{\"tool\": \"rank_papers\", \"mode\": \"profile\", \"date\": \"2026-08-06\"}";
        match parse_directive(raw) {
            Directive::RankPapers { mode, date, .. } => {
                assert_eq!(mode, RankMode::Profile);
                assert_eq!(date.as_deref(), Some("2026-08-06"));
            }
            other => panic!("unexpected directive: {other:?}"),
        }
    }

    #[test]
    fn parses_directive_inside_fences() {
        let raw = "```json\n{\"tool\": \"reply\", \"text\": \"Hello!\"}\n```";
        match parse_directive(raw) {
            Directive::Reply { text } => assert_eq!(text, "Hello!"),
            other => panic!("unexpected directive: {other:?}"),
        }
    }

    #[test]
    fn plain_text_becomes_reply() {
        match parse_directive("I can help with papers and profiles.") {
            Directive::Reply { text } => {
                assert_eq!(text, "I can help with papers and profiles.");
            }
            other => panic!("unexpected directive: {other:?}"),
        }
    }

    #[test]
    fn missing_mode_defaults_to_upvotes() {
        match parse_directive("{\"tool\": \"rank_papers\"}") {
            Directive::RankPapers { mode, .. } => assert_eq!(mode, RankMode::Upvotes),
            other => panic!("unexpected directive: {other:?}"),
        }
    }
}
