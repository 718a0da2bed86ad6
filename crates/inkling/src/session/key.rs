//! Session identity.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum length accepted for user and session identifiers.
const MAX_ID_LEN: usize = 128;

/// Errors produced when validating identifiers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    #[error("{field} too long ({len} chars, max {MAX_ID_LEN})")]
    TooLong { field: &'static str, len: usize },

    #[error("{field} must contain only alphanumeric chars, underscores, or hyphens")]
    InvalidChars { field: &'static str },
}

/// Identity of one conversation: (user_id, session_id).
///
/// Identifiers are restricted to `[A-Za-z0-9_-]` so they are safe to embed
/// in filesystem paths and storage keys (no traversal, no separators).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    user_id: String,
    session_id: String,
}

impl SessionKey {
    /// Validate and build a session key.
    pub fn new(user_id: impl Into<String>, session_id: impl Into<String>) -> Result<Self, KeyError> {
        let user_id = user_id.into();
        let session_id = session_id.into();
        validate_id("user_id", &user_id)?;
        validate_id("session_id", &session_id)?;
        Ok(Self {
            user_id,
            session_id,
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Combined key used to address all per-conversation storage.
    pub fn storage_key(&self) -> String {
        format!("{}:{}", self.user_id, self.session_id)
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.user_id, self.session_id)
    }
}

fn validate_id(field: &'static str, value: &str) -> Result<(), KeyError> {
    if value.is_empty() {
        return Err(KeyError::Empty { field });
    }
    if value.len() > MAX_ID_LEN {
        return Err(KeyError::TooLong {
            field,
            len: value.len(),
        });
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(KeyError::InvalidChars { field });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_safe_ids() {
        let key = SessionKey::new("user-42", "chat_01").unwrap();
        assert_eq!(key.user_id(), "user-42");
        assert_eq!(key.session_id(), "chat_01");
        assert_eq!(key.storage_key(), "user-42:chat_01");
    }

    #[test]
    fn rejects_empty_ids() {
        assert_eq!(
            SessionKey::new("", "chat"),
            Err(KeyError::Empty { field: "user_id" })
        );
        assert_eq!(
            SessionKey::new("user", ""),
            Err(KeyError::Empty {
                field: "session_id"
            })
        );
    }

    #[test]
    fn rejects_path_traversal() {
        assert!(SessionKey::new("../../../etc", "chat").is_err());
        assert!(SessionKey::new("user", "a/b").is_err());
        assert!(SessionKey::new("user", "a:b").is_err());
    }

    #[test]
    fn rejects_overlong_ids() {
        let long = "x".repeat(129);
        assert!(matches!(
            SessionKey::new(long, "chat"),
            Err(KeyError::TooLong { len: 129, .. })
        ));
    }
}
