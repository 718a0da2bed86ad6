//! Per-conversation identity and state.
//!
//! ```text
//!  ┌────────────┐      ┌──────────────────┐      ┌───────────────┐
//!  │ SessionKey │─────▶│   SessionState   │◀────▶│ SessionStore  │
//!  │ user+chat  │      │ profile, artifact │      │ (store::*)    │
//!  └────────────┘      │ registry, pending │      └───────────────┘
//!                      └──────────────────┘
//! ```
//!
//! - **SessionKey** — validated (user_id, session_id) pair; every piece of
//!   per-conversation data is addressed by its storage key.
//! - **SessionState** — the mutable record loaded at the start of each turn
//!   and saved at most once at turn end. Owns the artifact registry: handle
//!   assignment, metadata, and the pending-display list.

mod key;
mod state;

pub use key::{KeyError, SessionKey};
pub use state::{Artifact, ArtifactKind, ArtifactMeta, SessionState};
