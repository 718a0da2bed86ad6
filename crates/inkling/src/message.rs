//! Conversation message types.
//!
//! A [`ChatMessage`] is one element of a session's turn history: plain user
//! or assistant text, or a structured tool invocation / tool result produced
//! while the pipeline was running. Messages are immutable once appended to
//! the conversation store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };
        f.write_str(s)
    }
}

/// A tool invocation recorded in the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub name: String,
    pub arguments: serde_json::Value,
}

/// One element of a conversation's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    /// Text content (absent for pure tool-call records).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Tool call issued by the assistant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolInvocation>,
    /// Name of the tool this message is a result of (role = tool).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// Create a plain text message.
    pub fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_call: None,
            tool_name: None,
            created_at: Utc::now(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(Role::Assistant, content)
    }

    /// Create an assistant tool-call record.
    pub fn tool_call(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            tool_call: Some(ToolInvocation {
                name: name.into(),
                arguments,
            }),
            tool_name: None,
            created_at: Utc::now(),
        }
    }

    /// Create a tool-result message.
    pub fn tool_result(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_call: None,
            tool_name: Some(name.into()),
            created_at: Utc::now(),
        }
    }

    /// Content as a string slice, empty when absent.
    pub fn content_str(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_message_roundtrip() {
        let msg = ChatMessage::user("Hello");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"role\":\"user\""));
        assert!(json.contains("\"content\":\"Hello\""));
        // Unset tool fields are omitted from the wire form.
        assert!(!json.contains("tool_call"));

        let parsed: ChatMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn tool_call_roundtrip() {
        let msg = ChatMessage::tool_call(
            "rank_papers",
            serde_json::json!({"mode": "profile", "date": "2026-08-06"}),
        );
        let json = serde_json::to_string(&msg).unwrap();
        let parsed: ChatMessage = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.role, Role::Assistant);
        assert!(parsed.content.is_none());
        let call = parsed.tool_call.unwrap();
        assert_eq!(call.name, "rank_papers");
        assert_eq!(call.arguments["mode"], "profile");
    }

    #[test]
    fn tool_result_carries_tool_name() {
        let msg = ChatMessage::tool_result("rank_papers", "1. [5/5] Some Paper");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_name.as_deref(), Some("rank_papers"));
        assert_eq!(msg.content_str(), "1. [5/5] Some Paper");
    }
}
