//! The authoritative in-memory session state.
//!
//! All session/message mutations go through [`SessionStore`] so every view
//! of the state stays consistent. The store owns the one-way mirror into
//! the persistent cache: each mutation is applied in memory first, then the
//! snapshot is written out. The cache is read back only through
//! [`SessionStore::restore_from_cache`]; it is never authoritative while
//! the backend is reachable.

use crate::api::SessionApi;
use crate::cache::{CURRENT_SESSION_KEY, CacheStore, SESSIONS_KEY};
use crate::error::{Result, VerdaError};
use crate::session::message::ConversationMessage;
use crate::session::model::{Session, title_from_message};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct StoreState {
    /// Ordered session list, newest-first by `last_activity`.
    sessions: Vec<Session>,
    /// Id of the currently selected session, if any.
    current_id: Option<String>,
    loading_sessions: bool,
    sending: bool,
    online: bool,
}

/// Single source of truth for sessions, the current selection, and the
/// loading/online flags.
///
/// The list and the current session cannot diverge: the current session is
/// a pointer into the list, not a second copy.
pub struct SessionStore {
    api: Arc<dyn SessionApi>,
    cache: Arc<dyn CacheStore>,
    state: RwLock<StoreState>,
}

impl SessionStore {
    /// Creates a new empty store over the given backend client and cache.
    pub fn new(api: Arc<dyn SessionApi>, cache: Arc<dyn CacheStore>) -> Self {
        Self {
            api,
            cache,
            state: RwLock::new(StoreState {
                online: true,
                ..StoreState::default()
            }),
        }
    }

    // ========================================================================
    // Read access
    // ========================================================================

    /// Returns a snapshot of the session list, newest-first.
    pub async fn sessions(&self) -> Vec<Session> {
        self.state.read().await.sessions.clone()
    }

    /// Returns the currently selected session, if any.
    pub async fn current(&self) -> Option<Session> {
        let state = self.state.read().await;
        let id = state.current_id.as_deref()?;
        state.sessions.iter().find(|s| s.id == id).cloned()
    }

    /// Returns the id of the currently selected session, if any.
    pub async fn current_id(&self) -> Option<String> {
        self.state.read().await.current_id.clone()
    }

    pub async fn is_loading_sessions(&self) -> bool {
        self.state.read().await.loading_sessions
    }

    pub async fn is_sending(&self) -> bool {
        self.state.read().await.sending
    }

    pub async fn is_online(&self) -> bool {
        self.state.read().await.online
    }

    // ========================================================================
    // Flags
    // ========================================================================

    pub async fn set_loading_sessions(&self, value: bool) {
        self.state.write().await.loading_sessions = value;
    }

    pub async fn set_sending(&self, value: bool) {
        self.state.write().await.sending = value;
    }

    pub async fn set_online(&self, value: bool) {
        self.state.write().await.online = value;
    }

    // ========================================================================
    // Mutations (each followed by a mirror write)
    // ========================================================================

    /// Replaces the whole session list, e.g. after a remote fetch or a
    /// cache restore. The list is reordered newest-first.
    pub async fn set_sessions(&self, mut sessions: Vec<Session>) {
        sessions.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        let snapshot = {
            let mut state = self.state.write().await;
            state.sessions = sessions;
            // Drop a current pointer that no longer resolves.
            if let Some(id) = &state.current_id {
                if !state.sessions.iter().any(|s| &s.id == id) {
                    state.current_id = None;
                }
            }
            Self::snapshot_json(&state.sessions)
        };
        self.mirror(snapshot).await;
    }

    /// Selects a session and loads its history when it has none in memory.
    ///
    /// A history fetch failure degrades to an empty message list rather
    /// than failing the selection: a session must always be selectable even
    /// if its history is unavailable. The selected id is persisted.
    pub async fn select_current(&self, session_id: &str) -> Result<()> {
        let needs_history = {
            let state = self.state.read().await;
            let session = state
                .sessions
                .iter()
                .find(|s| s.id == session_id)
                .ok_or_else(|| VerdaError::not_found("session", session_id))?;
            !session.has_loaded_history() && !session.is_local
        };

        if needs_history {
            match self.api.get_history(session_id).await {
                Ok(history) => {
                    let mut state = self.state.write().await;
                    if let Some(session) =
                        state.sessions.iter_mut().find(|s| s.id == session_id)
                    {
                        session.messages = history.messages;
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        "[SessionStore] History load failed for {}, selecting without messages: {}",
                        session_id,
                        e
                    );
                }
            }
        }

        self.state.write().await.current_id = Some(session_id.to_string());
        self.persist_current_id(session_id).await;
        Ok(())
    }

    /// Selects a session without attempting a history fetch.
    ///
    /// Used on the cache-fallback restore path, where the backend is known
    /// to be unreachable.
    pub async fn set_current(&self, session_id: &str) -> Result<()> {
        {
            let mut state = self.state.write().await;
            if !state.sessions.iter().any(|s| s.id == session_id) {
                return Err(VerdaError::not_found("session", session_id));
            }
            state.current_id = Some(session_id.to_string());
        }
        self.persist_current_id(session_id).await;
        Ok(())
    }

    /// Clears the current selection and its persisted id.
    pub async fn clear_current(&self) {
        self.state.write().await.current_id = None;
        if let Err(e) = self.cache.remove(CURRENT_SESSION_KEY).await {
            tracing::warn!("[SessionStore] Failed to clear persisted session id: {}", e);
        }
    }

    /// Replaces the current session's message list and bumps its activity
    /// timestamp.
    pub async fn upsert_current_messages(&self, messages: Vec<ConversationMessage>) -> Result<()> {
        let snapshot = {
            let mut state = self.state.write().await;
            let session = current_session_mut(&mut state)?;
            session.messages = messages;
            session.touch();
            Self::snapshot_json(&state.sessions)
        };
        self.mirror(snapshot).await;
        Ok(())
    }

    /// Appends a message to the current session (the optimistic half of a
    /// send).
    pub async fn push_current_message(&self, message: ConversationMessage) -> Result<()> {
        let snapshot = {
            let mut state = self.state.write().await;
            let session = current_session_mut(&mut state)?;
            session.messages.push(message);
            session.touch();
            Self::snapshot_json(&state.sessions)
        };
        self.mirror(snapshot).await;
        Ok(())
    }

    /// Removes the last message from the current session, undoing a failed
    /// optimistic append. `last_activity` is not rewound; it only has to be
    /// non-decreasing.
    pub async fn rollback_last_message(&self) -> Result<()> {
        let snapshot = {
            let mut state = self.state.write().await;
            let session = current_session_mut(&mut state)?;
            session.messages.pop();
            Self::snapshot_json(&state.sessions)
        };
        self.mirror(snapshot).await;
        Ok(())
    }

    /// Derives and applies the current session's title from its first
    /// message. Fires only when the freshly appended optimistic message is
    /// the only one the session has ever had; returns whether it fired.
    pub async fn apply_title_if_first_message(&self, content: &str) -> Result<bool> {
        let (applied, snapshot) = {
            let mut state = self.state.write().await;
            let session = current_session_mut(&mut state)?;
            let only_optimistic = session.messages.len() == 1
                && session.messages[0].is_user()
                && session.message_count.unwrap_or(0) == 0;
            if !only_optimistic {
                return Ok(false);
            }
            session.title = title_from_message(content);
            session.touch();
            (true, Self::snapshot_json(&state.sessions))
        };
        self.mirror(snapshot).await;
        Ok(applied)
    }

    /// Updates the current session's message count: the server-reported
    /// value when present, the local length otherwise.
    pub async fn update_current_message_count(&self, server_count: Option<u32>) -> Result<()> {
        let snapshot = {
            let mut state = self.state.write().await;
            let session = current_session_mut(&mut state)?;
            session.message_count = Some(server_count.unwrap_or(session.messages.len() as u32));
            Self::snapshot_json(&state.sessions)
        };
        self.mirror(snapshot).await;
        Ok(())
    }

    /// Sets or clears the transient summarizing flag on a session. The flag
    /// is never mirrored.
    pub async fn set_summarizing(&self, session_id: &str, value: bool) {
        let mut state = self.state.write().await;
        if let Some(session) = state.sessions.iter_mut().find(|s| s.id == session_id) {
            session.is_summarizing = value;
        }
    }

    /// Inserts a session at the front of the list and makes it current,
    /// persisting its id.
    pub async fn insert_session(&self, session: Session) {
        let session_id = session.id.clone();
        let snapshot = {
            let mut state = self.state.write().await;
            state.sessions.insert(0, session);
            state.current_id = Some(session_id.clone());
            Self::snapshot_json(&state.sessions)
        };
        self.persist_current_id(&session_id).await;
        self.mirror(snapshot).await;
    }

    /// Replaces the current session entry with a freshly created one,
    /// carrying over the message history and title. Used by the send
    /// pipeline when the backend reports the old session gone.
    pub async fn adopt_replacement_session(&self, mut replacement: Session) -> Result<()> {
        let replacement_id = replacement.id.clone();
        let snapshot = {
            let mut state = self.state.write().await;
            let session = current_session_mut(&mut state)?;
            replacement.messages = std::mem::take(&mut session.messages);
            replacement.title = session.title.clone();
            replacement.touch();
            *session = replacement;
            state.current_id = Some(replacement_id.clone());
            Self::snapshot_json(&state.sessions)
        };
        self.persist_current_id(&replacement_id).await;
        self.mirror(snapshot).await;
        Ok(())
    }

    /// Removes a session from the list. Returns whether it was the current
    /// one (in which case the selection is cleared).
    pub async fn remove_session(&self, session_id: &str) -> bool {
        let (was_current, snapshot) = {
            let mut state = self.state.write().await;
            state.sessions.retain(|s| s.id != session_id);
            let was_current = state.current_id.as_deref() == Some(session_id);
            if was_current {
                state.current_id = None;
            }
            (was_current, Self::snapshot_json(&state.sessions))
        };
        if was_current {
            if let Err(e) = self.cache.remove(CURRENT_SESSION_KEY).await {
                tracing::warn!("[SessionStore] Failed to clear persisted session id: {}", e);
            }
        }
        self.mirror(snapshot).await;
        was_current
    }

    /// Clears every session and the current selection, mirroring the empty
    /// list. The opt-out flag is not touched here.
    pub async fn clear_all(&self) {
        let snapshot = {
            let mut state = self.state.write().await;
            state.sessions.clear();
            state.current_id = None;
            Self::snapshot_json(&state.sessions)
        };
        if let Err(e) = self.cache.remove(CURRENT_SESSION_KEY).await {
            tracing::warn!("[SessionStore] Failed to clear persisted session id: {}", e);
        }
        self.mirror(snapshot).await;
    }

    // ========================================================================
    // Cache restoration
    // ========================================================================

    /// Restores the session list from the mirrored cache snapshot, without
    /// any history fetches, and re-selects the persisted current id when it
    /// still resolves. Returns the number of restored sessions.
    ///
    /// An unparseable snapshot is discarded and treated as empty.
    pub async fn restore_from_cache(&self) -> usize {
        let sessions = match self.cache.get(SESSIONS_KEY).await {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<Session>>(&raw) {
                Ok(sessions) => sessions,
                Err(e) => {
                    tracing::warn!("[SessionStore] Discarding corrupt cache snapshot: {}", e);
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!("[SessionStore] Cache read failed: {}", e);
                Vec::new()
            }
        };

        let count = sessions.len();
        self.set_sessions(sessions).await;

        if let Ok(Some(cached_id)) = self.cache.get(CURRENT_SESSION_KEY).await {
            if self.set_current(&cached_id).await.is_err() {
                tracing::debug!(
                    "[SessionStore] Cached session id {} not in restored list",
                    cached_id
                );
            }
        }
        count
    }

    // ========================================================================
    // Mirror internals
    // ========================================================================

    fn snapshot_json(sessions: &[Session]) -> String {
        let stripped: Vec<Session> = sessions
            .iter()
            .map(|s| Session {
                messages: Vec::new(),
                ..s.clone()
            })
            .collect();
        // Serialization of plain data cannot fail; fall back to an empty
        // list rather than poisoning the mirror.
        serde_json::to_string(&stripped).unwrap_or_else(|_| "[]".to_string())
    }

    /// Writes the session-list snapshot out. Mirror failures are logged and
    /// swallowed: the cache is a fallback, not a dependency.
    async fn mirror(&self, snapshot: String) {
        if let Err(e) = self.cache.set(SESSIONS_KEY, &snapshot).await {
            tracing::warn!("[SessionStore] Cache mirror write failed: {}", e);
        }
    }

    async fn persist_current_id(&self, session_id: &str) {
        if let Err(e) = self.cache.set(CURRENT_SESSION_KEY, session_id).await {
            tracing::warn!("[SessionStore] Failed to persist session id: {}", e);
        }
    }
}

fn current_session_mut<'a>(state: &'a mut StoreState) -> Result<&'a mut Session> {
    let id = state
        .current_id
        .clone()
        .ok_or_else(|| VerdaError::validation("No current session"))?;
    state
        .sessions
        .iter_mut()
        .find(|s| s.id == id)
        .ok_or_else(|| VerdaError::internal(format!("Current session {} not in list", id)))
}
