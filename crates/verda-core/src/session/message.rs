//! Conversation message types.
//!
//! This module contains types for representing messages in a conversation,
//! including roles and message content.

use serde::{Deserialize, Serialize};

/// Represents the role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Message from the user.
    User,
    /// Message from the AI assistant.
    Assistant,
    /// System-generated message.
    System,
}

/// A single message in a conversation history.
///
/// Each message has a role (user, assistant, or system), content, and a
/// timestamp indicating when it was created. Messages are immutable after
/// construction and are owned exclusively by the session they belong to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    /// The role of the message sender.
    pub role: MessageRole,
    /// The content of the message.
    pub content: String,
    /// Timestamp when the message was created (RFC 3339 format).
    pub timestamp: String,
    /// Whether the backend consulted long-term memory for this message.
    /// Only ever set on assistant messages; informational.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_used: Option<bool>,
}

impl ConversationMessage {
    /// Creates a user message stamped with the current instant.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            timestamp: now_rfc3339(),
            memory_used: None,
        }
    }

    /// Creates an assistant message with a backend-supplied timestamp.
    pub fn assistant(
        content: impl Into<String>,
        timestamp: impl Into<String>,
        memory_used: Option<bool>,
    ) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            timestamp: timestamp.into(),
            memory_used,
        }
    }

    /// Returns true if this message was sent by the user.
    pub fn is_user(&self) -> bool {
        self.role == MessageRole::User
    }
}

/// Returns the current instant as an RFC 3339 string.
///
/// UTC timestamps in this format sort lexicographically, which the store
/// relies on when ordering sessions by last activity.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
