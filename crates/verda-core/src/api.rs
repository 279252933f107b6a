//! Remote session API boundary.
//!
//! Defines the contract the engine consumes from the backend: session CRUD,
//! history retrieval, the message-send endpoint, and the health probe. The
//! engine never talks to the network directly; it only sees this trait.

use crate::error::Result;
use crate::session::{ConversationMessage, Session};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A session as reported by the backend's list/create endpoints.
///
/// Carries everything except the message history, which is loaded
/// separately via [`SessionApi::get_history`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDescriptor {
    pub session_id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub created_at: String,
    pub last_activity: String,
    #[serde(default)]
    pub message_count: Option<u32>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl From<SessionDescriptor> for Session {
    fn from(d: SessionDescriptor) -> Self {
        Session {
            id: d.session_id,
            title: d
                .title
                .unwrap_or_else(|| crate::session::DEFAULT_SESSION_TITLE.to_string()),
            messages: Vec::new(),
            created_at: d.created_at,
            last_activity: d.last_activity,
            is_active: d.is_active,
            message_count: d.message_count,
            is_local: false,
            is_summarizing: false,
        }
    }
}

/// The message history of a single session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionHistory {
    pub session_id: String,
    pub messages: Vec<ConversationMessage>,
}

/// Parameters for a message send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
    pub session_id: String,
    /// Ask the backend for a full answer instead of a progressive summary.
    pub request_detailed: bool,
}

/// Structured envelope of a successful message send.
///
/// Only the fields the engine depends on; the natural-language `content` is
/// opaque here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendOutcome {
    pub content: String,
    pub timestamp: String,
    pub session_id: String,
    #[serde(default)]
    pub message_count: Option<u32>,
    #[serde(default)]
    pub memory_used: Option<bool>,
    #[serde(default)]
    pub summarization_triggered: bool,
    #[serde(default)]
    pub can_request_detailed: bool,
    #[serde(default)]
    pub guardrail_triggered: bool,
    #[serde(default)]
    pub guardrail_reason: Option<String>,
}

/// Backend health probe result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub model_loaded: Option<bool>,
    #[serde(default)]
    pub guardrails_enabled: Option<bool>,
    #[serde(default)]
    pub memory_system_active: Option<bool>,
}

impl HealthStatus {
    /// True when the backend reports itself healthy.
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// An abstract client for the backend's session endpoints.
///
/// This trait decouples the engine from the transport. The HTTP
/// implementation lives in `verda-client`; tests substitute mocks.
///
/// # Error contract
///
/// A missing session surfaces as `VerdaError::NotFound` with entity type
/// `"session"` — the send pipeline keys its one-shot replacement retry on
/// that variant. Transport failures surface as `VerdaError::Network`,
/// non-404 backend rejections as `VerdaError::Api`.
#[async_trait]
pub trait SessionApi: Send + Sync {
    /// Lists the caller's sessions, newest first.
    async fn list_sessions(&self) -> Result<Vec<SessionDescriptor>>;

    /// Creates a new session with the given title.
    async fn create_session(&self, title: &str) -> Result<SessionDescriptor>;

    /// Fetches the full message history of a session.
    async fn get_history(&self, session_id: &str) -> Result<SessionHistory>;

    /// Deletes a session. Fails with `NotFound` if it does not exist.
    async fn delete_session(&self, session_id: &str) -> Result<()>;

    /// Sends a message into a session and returns the response envelope.
    ///
    /// Fails with `NotFound` when the referenced session no longer exists
    /// server-side.
    async fn send_message(&self, request: SendMessageRequest) -> Result<SendOutcome>;

    /// Probes backend health.
    async fn health(&self) -> Result<HealthStatus>;
}
