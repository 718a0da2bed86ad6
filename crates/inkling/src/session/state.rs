//! Mutable per-session state and the artifact registry.
//!
//! State is loaded at the start of every turn, mutated in place by the
//! pipeline, and persisted at most once at turn end. Artifact *metadata*
//! lives here so the model can be briefed about available artifacts without
//! loading their content; full content is stored separately under the same
//! handle (see [`crate::store::SessionStore`]).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of computation produced an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Rankings,
    RepoSummary,
    Profile,
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ArtifactKind::Rankings => "rankings",
            ArtifactKind::RepoSummary => "repo_summary",
            ArtifactKind::Profile => "profile",
        };
        f.write_str(s)
    }
}

/// Metadata kept in session state for prompt injection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    /// Human-readable, e.g. "rankings for 2026-08-06 based on user profile".
    pub summary: String,
    pub kind: ArtifactKind,
    pub created_at: DateTime<Utc>,
}

/// Full artifact with content, stored separately from session state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Handle assigned by [`SessionState::register_artifact`].
    pub id: u64,
    pub content: String,
    pub meta: ArtifactMeta,
}

/// Per-session mutable record.
///
/// All fields default to empty; a session that has never been seen before
/// starts from `SessionState::default()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionState {
    /// Whether a synthesized profile exists for this user.
    pub has_profile: bool,
    /// Whether a repository summary has been produced.
    pub has_repo_summary: bool,
    /// Inlined profile text, injected into every subsequent model call.
    pub profile_text: Option<String>,
    /// Handle to metadata for every registered artifact. A BTreeMap keeps
    /// the listing deterministically ordered by handle.
    pub artifacts: BTreeMap<u64, ArtifactMeta>,
    /// Next handle to assign; starts at 1 and never goes backwards.
    pub next_artifact_id: u64,
    /// Handles queued for display in the current turn's response.
    pub pending_display: Vec<u64>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            has_profile: false,
            has_repo_summary: false,
            profile_text: None,
            artifacts: BTreeMap::new(),
            next_artifact_id: 1,
            pending_display: Vec::new(),
        }
    }
}

impl SessionState {
    /// Register a new artifact, returning its handle.
    ///
    /// Handles are assigned from a per-session monotonic counter and are
    /// never reused, even after an artifact is superseded. The caller is
    /// responsible for storing the content under the returned handle.
    pub fn register_artifact(&mut self, summary: impl Into<String>, kind: ArtifactKind) -> u64 {
        let id = self.next_artifact_id;
        self.artifacts.insert(
            id,
            ArtifactMeta {
                summary: summary.into(),
                kind,
                created_at: Utc::now(),
            },
        );
        self.next_artifact_id += 1;
        id
    }

    /// Queue an artifact for display in this turn's response. Idempotent.
    pub fn queue_for_display(&mut self, id: u64) {
        if !self.pending_display.contains(&id) {
            self.pending_display.push(id);
        }
    }

    /// Render the "available artifacts" section for the model briefing.
    ///
    /// Deterministic, sorted by handle. Empty string when no artifacts
    /// exist.
    pub fn artifact_prompt_section(&self) -> String {
        if self.artifacts.is_empty() {
            return String::new();
        }

        let mut lines = vec![
            "# Available Artifacts".to_string(),
            "Use display_artifact(id) to show one to the user, read_artifact(id) to load it for discussion.".to_string(),
            String::new(),
        ];
        for (id, meta) in &self.artifacts {
            lines.push(format!("{id}: {}", meta.summary));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_strictly_increasing_and_unique() {
        let mut state = SessionState::default();
        let ids: Vec<u64> = (0..5)
            .map(|i| state.register_artifact(format!("artifact {i}"), ArtifactKind::Rankings))
            .collect();

        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(state.next_artifact_id, 6);
        // None were displayed; handles still advanced.
        assert!(state.pending_display.is_empty());
    }

    #[test]
    fn queue_for_display_is_idempotent() {
        let mut state = SessionState::default();
        let id = state.register_artifact("rankings", ArtifactKind::Rankings);

        state.queue_for_display(id);
        state.queue_for_display(id);
        assert_eq!(state.pending_display, vec![id]);
    }

    #[test]
    fn prompt_section_empty_without_artifacts() {
        assert_eq!(SessionState::default().artifact_prompt_section(), "");
    }

    #[test]
    fn prompt_section_sorted_by_handle() {
        let mut state = SessionState::default();
        state.register_artifact("first rankings", ArtifactKind::Rankings);
        state.register_artifact("profile summary", ArtifactKind::Profile);
        state.register_artifact("repo overview", ArtifactKind::RepoSummary);

        let section = state.artifact_prompt_section();
        let first = section.find("1: first rankings").unwrap();
        let second = section.find("2: profile summary").unwrap();
        let third = section.find("3: repo overview").unwrap();
        assert!(first < second && second < third);
    }

    #[test]
    fn default_state_deserializes_from_empty_object() {
        let state: SessionState = serde_json::from_str("{}").unwrap();
        assert_eq!(state, SessionState::default());
        assert_eq!(state.next_artifact_id, 1);
    }

    #[test]
    fn state_roundtrip_preserves_registry() {
        let mut state = SessionState::default();
        state.has_profile = true;
        state.profile_text = Some("ML engineer, efficiency focus".to_string());
        let id = state.register_artifact("rankings for 2026-08-06", ArtifactKind::Rankings);
        state.queue_for_display(id);

        let json = serde_json::to_string(&state).unwrap();
        let parsed: SessionState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, state);
    }
}
