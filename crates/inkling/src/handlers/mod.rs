//! HTTP request handlers.

mod chat;
mod health;
pub(crate) mod problem_details;

pub use chat::chat_stream;
pub use health::{livez, readyz};
