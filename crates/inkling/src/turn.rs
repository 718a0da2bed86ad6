//! The turn coordinator.
//!
//! Serializes each conversation's read-compute-write cycle behind a keyed
//! lock: load state and history, run the pipeline, persist the results.
//! Two concurrent requests for the same session are processed one after the
//! other in lock-acquisition order, so neither can clobber the other's
//! state (lost-update prevention). Requests for different sessions never
//! contend.

use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::agents::{AgentPipeline, PipelineError, TurnContext};
use crate::bus::EventBus;
use crate::session::{Artifact, SessionKey};
use crate::store::{SessionStore, StorageError};
use crate::sync::KeyedLocks;

/// Errors that fail a turn. Nothing is persisted when a turn fails.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("turn cancelled")]
    Cancelled,
}

/// What a completed turn hands back to the transport.
#[derive(Debug)]
pub struct TurnOutcome {
    /// The assistant's reply text.
    pub reply: String,
    /// Artifacts that were queued for display during this turn.
    pub artifacts: Vec<Artifact>,
}

/// Runs turns against a session store, one at a time per session.
pub struct SessionCoordinator {
    store: Arc<dyn SessionStore>,
    locks: KeyedLocks,
}

impl SessionCoordinator {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            locks: KeyedLocks::with_cleanup("sessions"),
        }
    }

    /// Store handle, for callers that need direct artifact access.
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Process one turn for `key`.
    ///
    /// The keyed lock spans the whole load-compute-save cycle, model calls
    /// included: a user's rapid-fire messages are applied in order against
    /// consistent state. If the pipeline fails or `cancel` fires, nothing
    /// is persisted and the lock is released on the way out.
    pub async fn run_turn(
        &self,
        key: &SessionKey,
        query: &str,
        bus: &EventBus,
        pipeline: &dyn AgentPipeline,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, TurnError> {
        let storage_key = key.storage_key();
        let guard = self.locks.acquire(&storage_key).await;

        let mut state = self.store.state(key).await?;
        let history = self.store.history(key).await?;
        debug!(session = %key, history = history.len(), "turn started");

        let ctx = TurnContext {
            key,
            state: &mut state,
            history: &history,
            query,
            bus,
        };
        let output = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(session = %key, "turn cancelled before persist");
                return Err(TurnError::Cancelled);
            }
            result = pipeline.run(ctx) => result?,
        };

        // Consume the pending-display list before the single state save.
        let pending = std::mem::take(&mut state.pending_display);
        self.store.append_history(key, &output.messages).await?;
        self.store.save_state(key, &state).await?;
        drop(guard);

        // Content reads are short self-contained operations; no need to
        // hold the session lock for them.
        let mut artifacts = Vec::with_capacity(pending.len());
        for id in pending {
            match self.store.artifact(key, id).await {
                Ok(Some(artifact)) => artifacts.push(artifact),
                Ok(None) => {
                    warn!(session = %key, artifact = id, "queued artifact has no content")
                }
                Err(e) => warn!(session = %key, artifact = id, error = %e, "artifact load failed"),
            }
        }

        Ok(TurnOutcome {
            reply: output.reply,
            artifacts,
        })
    }
}
