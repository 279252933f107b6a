//! Session domain model.
//!
//! This module contains the core Session entity that represents a single
//! conversation thread in the engine's domain layer.

use super::message::{ConversationMessage, now_rfc3339};
use serde::{Deserialize, Serialize};

/// Default title for a session before one is derived from its first message.
pub const DEFAULT_SESSION_TITLE: &str = "New Chat";

/// Maximum title length derived from a first message, in characters.
const TITLE_MAX_CHARS: usize = 50;

/// Represents a conversation session in the engine's domain layer.
///
/// A session contains:
/// - An opaque identifier assigned by the backend (or synthesized locally
///   as a degraded fallback when remote creation fails)
/// - A human-readable title, derived from the first user message
/// - The ordered message history, which may legitimately be empty even when
///   `message_count` is positive (history is loaded lazily on selection)
/// - Creation and last-activity timestamps (RFC 3339 strings)
///
/// This is the "pure" domain model that the store and pipelines operate on,
/// independent of the wire format or the cache snapshot format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique session identifier (backend-assigned, opaque)
    pub id: String,
    /// Human-readable session title
    pub title: String,
    /// Ordered conversation history; empty until explicitly loaded
    #[serde(default)]
    pub messages: Vec<ConversationMessage>,
    /// Timestamp when the session was created (RFC 3339 format)
    pub created_at: String,
    /// Timestamp of the last message append or title update (RFC 3339)
    pub last_activity: String,
    /// Server-reported liveness flag; not "currently selected in the UI"
    #[serde(default = "default_is_active")]
    pub is_active: bool,
    /// Server-reported message count, authoritative over `messages.len()`
    /// for display when present (messages may be lazily unloaded)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_count: Option<u32>,
    /// Degraded client-only session created while the backend was
    /// unreachable; never reconciled with the backend
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_local: bool,
    /// Transient flag set for a bounded window after the backend signals a
    /// summarization event; never persisted
    #[serde(skip)]
    pub is_summarizing: bool,
}

fn default_is_active() -> bool {
    true
}

impl Session {
    /// Creates a new session shell with the given id and title.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = now_rfc3339();
        Self {
            id: id.into(),
            title: title.into(),
            messages: Vec::new(),
            created_at: now.clone(),
            last_activity: now,
            is_active: true,
            message_count: None,
            is_local: false,
            is_summarizing: false,
        }
    }

    /// Creates a degraded local-only session, used when remote creation
    /// fails. The id is synthesized from the current instant.
    pub fn new_local(now_millis: i64) -> Self {
        let mut session = Self::new(format!("local-{now_millis}"), DEFAULT_SESSION_TITLE);
        session.is_local = true;
        session
    }

    /// Bumps `last_activity` to the current instant, keeping it monotonic.
    pub fn touch(&mut self) {
        let now = now_rfc3339();
        if now > self.last_activity {
            self.last_activity = now;
        }
    }

    /// True when the session's history has been loaded into memory.
    ///
    /// `message_count` stays authoritative for display; this only answers
    /// whether a history fetch is needed on selection.
    pub fn has_loaded_history(&self) -> bool {
        !self.messages.is_empty()
    }

    /// The message count to display: server-reported when present, local
    /// length otherwise.
    pub fn display_message_count(&self) -> u32 {
        self.message_count.unwrap_or(self.messages.len() as u32)
    }
}

/// Derives a session title from its first user message.
///
/// Truncated to 50 characters plus an ellipsis when longer; char-boundary
/// safe.
pub fn title_from_message(content: &str) -> String {
    let trimmed = content.trim();
    if trimmed.chars().count() <= TITLE_MAX_CHARS {
        trimmed.to_string()
    } else {
        let head: String = trimmed.chars().take(TITLE_MAX_CHARS).collect();
        format!("{head}...")
    }
}
