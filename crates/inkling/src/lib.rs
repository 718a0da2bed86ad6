//! Inkling - a self-hosted multi-agent research assistant.
//!
//! A chat front end dispatches user queries to a coordinating agent, which
//! delegates specialized work (profile synthesis, paper relevance ranking)
//! to sub-agents backed by a language model. The crate's core is the
//! session layer that keeps many concurrent chat turns correct:
//!
//! - [`store`] — durable, bounded conversation history with atomic append
//!   and expiry, plus session state and artifact content
//! - [`session`] — per-conversation identity, state, and the artifact
//!   registry (stable handles, pending-display tracking)
//! - [`ranking`] — content-addressed and similarity-addressed caching for
//!   expensive per-item scoring
//! - [`sync`] — per-session mutual exclusion
//! - [`bus`] — per-request status and direct-content queues feeding the
//!   SSE stream
//! - [`turn`] — the coordinator tying the above together: lock, load, run
//!   the pipeline, save

pub mod agents;
pub mod api;
pub mod bus;
pub mod config;
pub mod facts;
pub mod handlers;
pub mod llm;
pub mod message;
pub mod papers;
pub mod ranking;
pub mod server;
pub mod session;
pub mod store;
pub mod sync;
pub mod turn;
