//! The message send pipeline.
//!
//! Orchestrates the optimistic local append, the remote dispatch, the
//! session-not-found recovery, and result reconciliation. The optimistic
//! user message is visible before any network round-trip completes and is
//! rolled back on any non-recoverable failure; the derived title is not
//! rolled back (harmless if slightly premature).

use crate::engine::{ChatEngine, no_current_session_error};
use verda_core::api::{SendMessageRequest, SendOutcome};
use verda_core::error::Result;
use verda_core::session::{ConversationMessage, DEFAULT_SESSION_TITLE, Session, SessionStore};

impl ChatEngine {
    /// Sends a user message into the current session.
    ///
    /// Fails fast with a validation error when nothing is selected; no
    /// state is mutated in that case. A first failure with the
    /// distinguished not-found condition transparently creates a
    /// replacement session and retries exactly once; any second failure is
    /// a hard error with the optimistic append rolled back.
    pub async fn send_message(&self, content: &str, request_detailed: bool) -> Result<()> {
        let Some(current) = self.store().current().await else {
            let err = no_current_session_error();
            self.notify_error(err.to_string()).await;
            return Err(err);
        };

        self.store().set_sending(true).await;
        let result = self.send_inner(current, content, request_detailed).await;
        self.store().set_sending(false).await;
        result
    }

    async fn send_inner(
        &self,
        current: Session,
        content: &str,
        request_detailed: bool,
    ) -> Result<()> {
        // Optimistic append, strictly before the dispatch.
        self.store()
            .push_current_message(ConversationMessage::user(content))
            .await?;
        self.store().apply_title_if_first_message(content).await?;

        let request = SendMessageRequest {
            content: content.to_string(),
            session_id: current.id.clone(),
            request_detailed,
        };

        match self.api().send_message(request.clone()).await {
            Ok(outcome) => self.apply_outcome(outcome).await,
            Err(e) if e.is_not_found() => {
                tracing::info!(
                    "[SendPipeline] Session {} gone server-side, retrying on a replacement",
                    current.id
                );
                self.retry_on_replacement(request).await
            }
            Err(e) => {
                self.store().rollback_last_message().await?;
                self.notify_error(format!("Failed to send message: {e}")).await;
                Err(e)
            }
        }
    }

    /// The one-shot recovery path: create a replacement session carrying
    /// the optimistic messages, re-send against it, and stop there.
    async fn retry_on_replacement(&self, request: SendMessageRequest) -> Result<()> {
        let replacement = match self.api().create_session(DEFAULT_SESSION_TITLE).await {
            Ok(descriptor) => Session::from(descriptor),
            Err(e) => {
                self.store().rollback_last_message().await?;
                self.notify_error(format!("Failed to recover session: {e}")).await;
                return Err(e);
            }
        };
        let replacement_id = replacement.id.clone();
        self.store().adopt_replacement_session(replacement).await?;

        let retry = SendMessageRequest {
            session_id: replacement_id,
            ..request
        };
        match self.api().send_message(retry).await {
            Ok(outcome) => self.apply_outcome(outcome).await,
            Err(e) => {
                self.store().rollback_last_message().await?;
                self.notify_error(format!("Failed to send message: {e}")).await;
                Err(e)
            }
        }
    }

    /// Applies a successful response envelope: assistant message append,
    /// count reconciliation, and the timed summarizing flag.
    async fn apply_outcome(&self, outcome: SendOutcome) -> Result<()> {
        if outcome.guardrail_triggered {
            tracing::info!(
                "[SendPipeline] Guardrail triggered: {}",
                outcome.guardrail_reason.as_deref().unwrap_or("unspecified")
            );
        }

        self.store()
            .push_current_message(ConversationMessage::assistant(
                outcome.content,
                outcome.timestamp,
                outcome.memory_used,
            ))
            .await?;
        self.store()
            .update_current_message_count(outcome.message_count)
            .await?;

        if outcome.summarization_triggered {
            if let Some(session_id) = self.store().current_id().await {
                self.mark_summarizing(session_id).await;
            }
        }
        Ok(())
    }

    /// Sets the transient summarizing flag and schedules its clear after
    /// the configured delay, independent of any further activity.
    async fn mark_summarizing(&self, session_id: String) {
        self.store().set_summarizing(&session_id, true).await;
        let store: std::sync::Arc<SessionStore> = self.store().clone();
        let delay = self.summarizing_reset;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            store.set_summarizing(&session_id, false).await;
        });
    }

    /// Replays the most recent user message asking for a full answer
    /// instead of a progressive summary. A no-op when the current session
    /// has no user messages.
    pub async fn request_detailed_explanation(&self) -> Result<()> {
        let Some(current) = self.store().current().await else {
            let err = no_current_session_error();
            self.notify_error(err.to_string()).await;
            return Err(err);
        };
        let Some(last_user) = current.messages.iter().rev().find(|m| m.is_user()) else {
            return Ok(());
        };
        let content = last_user.content.clone();
        self.send_message(&content, true).await
    }
}
