//! The agent pipeline seam and the production assistant.
//!
//! The turn coordinator is agnostic about what runs inside a turn; it hands
//! the pipeline a [`TurnContext`] (mutable session state, read-only history,
//! the user query, and the event bus) and persists whatever comes back. The
//! production pipeline is [`PaperAssistant`]: a thin coordinating agent that
//! routes each query via the language model and delegates ranking work to
//! [`RankingAgent`].

mod assistant;
mod ranking;

use async_trait::async_trait;
use thiserror::Error;

use crate::bus::EventBus;
use crate::message::ChatMessage;
use crate::papers::PaperSourceError;
use crate::session::{SessionKey, SessionState};
use crate::store::StorageError;

pub use assistant::PaperAssistant;
pub use ranking::{RankCriteria, RankingAgent};

/// Everything a pipeline may touch during one turn.
///
/// Passed explicitly; there is no ambient request context.
pub struct TurnContext<'a> {
    pub key: &'a SessionKey,
    pub state: &'a mut SessionState,
    pub history: &'a [ChatMessage],
    pub query: &'a str,
    pub bus: &'a EventBus,
}

/// What a pipeline produced for one turn.
pub struct TurnOutput {
    /// The assistant's textual reply.
    pub reply: String,
    /// New messages to append to the conversation history, including the
    /// user's query and the assistant's reply.
    pub messages: Vec<ChatMessage>,
}

/// Errors surfaced by a pipeline. These fail the turn; recoverable
/// conditions (cache misses, per-item scoring failures) are handled inside.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("model call failed: {0}")]
    Model(String),

    #[error(transparent)]
    Papers(#[from] PaperSourceError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// The agent/tool pipeline invoked by the turn coordinator.
#[async_trait]
pub trait AgentPipeline: Send + Sync {
    async fn run(&self, ctx: TurnContext<'_>) -> Result<TurnOutput, PipelineError>;
}
