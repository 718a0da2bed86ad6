//! Language model access.
//!
//! [`ModelClient`] talks to any OpenAI-compatible chat-completions endpoint
//! and backs both opaque model functions the rest of the system depends on:
//! [`LanguageModel::generate`] for free-form text and
//! [`crate::ranking::Scorer::score`] for structured per-item relevance
//! scores.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::ranking::{ItemScore, ScoreError, Scorer};

/// Cap applied to scoring reasons, matching the score prompt contract.
const MAX_REASON_LEN: usize = 100;

/// Errors from model calls.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("model returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("model response missing content")]
    EmptyResponse,
}

/// Opaque text generation function.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError>;
}

/// Client for an OpenAI-compatible chat-completions API.
#[derive(Clone)]
pub struct ModelClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

impl ModelClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
            model: model.into(),
        }
    }

    async fn chat(&self, prompt: &str) -> Result<String, ModelError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
        });

        let mut request = self.http.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let completion: ChatCompletionResponse = response.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.is_empty())
            .ok_or(ModelError::EmptyResponse)
    }
}

#[async_trait]
impl LanguageModel for ModelClient {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        self.chat(prompt).await
    }
}

/// Expected scorer output shape.
#[derive(Deserialize)]
struct ScorePayload {
    score: u8,
    #[serde(default)]
    reason: String,
}

#[async_trait]
impl Scorer for ModelClient {
    async fn score(&self, context: &str) -> Result<ItemScore, ScoreError> {
        let prompt = format!(
            "{context}\n\n\
             Respond with a single JSON object: {{\"score\": <1-5>, \"reason\": \"<at most 100 chars>\"}}"
        );
        let raw = self
            .chat(&prompt)
            .await
            .map_err(|e| ScoreError::Request(e.to_string()))?;

        let payload = parse_score(&raw)?;
        let mut reason = payload.reason;
        reason.truncate(MAX_REASON_LEN);
        Ok(ItemScore {
            score: payload.score.clamp(1, 5),
            reason,
        })
    }
}

/// Parse a score object out of a model response, tolerating surrounding
/// prose and code fences.
fn parse_score(raw: &str) -> Result<ScorePayload, ScoreError> {
    if let Ok(payload) = serde_json::from_str::<ScorePayload>(raw.trim()) {
        return Ok(payload);
    }

    let start = raw.find('{');
    let end = raw.rfind('}');
    if let (Some(start), Some(end)) = (start, end)
        && start < end
        && let Ok(payload) = serde_json::from_str::<ScorePayload>(&raw[start..=end])
    {
        return Ok(payload);
    }

    Err(ScoreError::Malformed(format!(
        "expected JSON score object, got: {}",
        raw.chars().take(80).collect::<String>()
    )))
}
