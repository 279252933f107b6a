//! The chat engine: synchronization controller and session lifecycle.
//!
//! `ChatEngine` wires the session store to the backend client and the
//! persistent cache, and reacts to the two external triggers — the
//! authentication signal and the mount event — with an explicit state
//! machine instead of implicit re-entrant effects. Overlapping triggers
//! collapse into a single fetch and at most one auto-created session.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use verda_core::api::SessionApi;
use verda_core::cache::{CURRENT_SESSION_KEY, CacheStore, NO_AUTO_SESSION_KEY};
use verda_core::config::EngineConfig;
use verda_core::error::{Result, VerdaError};
use verda_core::session::{DEFAULT_SESSION_TITLE, Session, SessionStore};

/// Callback invoked with a human-readable message when an operation fails
/// in a user-visible way (the toast boundary).
pub type ErrorNotifier = Arc<dyn Fn(String) + Send + Sync>;

/// Observable phase of the synchronization state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// No authenticated user; all session state is cleared.
    Unauthenticated,
    /// Authenticated, initial fetch not finished yet.
    LoadingAuthenticated,
    /// Sessions loaded, at least one present.
    Ready,
    /// Sessions loaded, none exist server-side.
    Empty,
}

#[derive(Default)]
struct SyncState {
    authenticated: bool,
    /// Guard preventing duplicate concurrent initial loads. Set before the
    /// first suspension point of a fetch; reset only on auth transitions.
    sessions_loaded: bool,
    /// One-shot latch for the auto-created initial session.
    initial_session_attempted: bool,
}

/// Client-resident session synchronization engine.
///
/// Owns the authoritative in-memory view of sessions and reconciles it
/// against the backend, degrading to the persistent cache when the backend
/// is unreachable. All public operations either succeed, degrade, or
/// return a recoverable error; none panic or corrupt state when re-entered
/// across suspension points.
pub struct ChatEngine {
    store: Arc<SessionStore>,
    api: Arc<dyn SessionApi>,
    cache: Arc<dyn CacheStore>,
    sync: Mutex<SyncState>,
    notifier: RwLock<Option<ErrorNotifier>>,
    pub(crate) summarizing_reset: Duration,
    pub(crate) health_handle: Mutex<Option<JoinHandle<()>>>,
}

impl ChatEngine {
    /// Creates an engine over the given backend client and cache.
    pub fn new(api: Arc<dyn SessionApi>, cache: Arc<dyn CacheStore>, config: &EngineConfig) -> Self {
        let store = Arc::new(SessionStore::new(api.clone(), cache.clone()));
        Self {
            store,
            api,
            cache,
            sync: Mutex::new(SyncState::default()),
            notifier: RwLock::new(None),
            summarizing_reset: Duration::from_secs(config.summarizing_reset_secs),
            health_handle: Mutex::new(None),
        }
    }

    /// Overrides the summarizing-flag reset delay (tests use a short one).
    pub fn with_summarizing_reset(mut self, delay: Duration) -> Self {
        self.summarizing_reset = delay;
        self
    }

    /// The authoritative session state. Views read through this.
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub(crate) fn api(&self) -> &Arc<dyn SessionApi> {
        &self.api
    }

    /// Installs the user-visible error callback (e.g. a toast trigger).
    pub async fn set_error_notifier(&self, notifier: ErrorNotifier) {
        *self.notifier.write().await = Some(notifier);
    }

    pub(crate) async fn notify_error(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!("[ChatEngine] {}", message);
        if let Some(notifier) = self.notifier.read().await.as_ref() {
            notifier(message);
        }
    }

    /// Returns the current phase of the synchronization state machine.
    pub async fn phase(&self) -> SyncPhase {
        let (authenticated, loaded) = {
            let sync = self.sync.lock().await;
            (sync.authenticated, sync.sessions_loaded)
        };
        if !authenticated {
            SyncPhase::Unauthenticated
        } else if !loaded || self.store.is_loading_sessions().await {
            SyncPhase::LoadingAuthenticated
        } else if self.store.sessions().await.is_empty() {
            SyncPhase::Empty
        } else {
            SyncPhase::Ready
        }
    }

    // ========================================================================
    // External triggers
    // ========================================================================

    /// Feeds the external authentication signal into the engine.
    ///
    /// A true→false transition clears all session state (the sticky
    /// auto-session opt-out survives); a false→true transition starts a
    /// fresh fetch cycle. Repeating the current value is not a transition
    /// and only re-arms the idempotent load.
    pub async fn set_authenticated(&self, authenticated: bool) {
        let transition = {
            let mut sync = self.sync.lock().await;
            let changed = sync.authenticated != authenticated;
            if changed {
                sync.authenticated = authenticated;
                sync.sessions_loaded = false;
                sync.initial_session_attempted = false;
            }
            changed
        };

        if !authenticated {
            if transition {
                tracing::info!("[ChatEngine] Signed out, clearing session state");
                self.store.clear_all().await;
            }
            return;
        }
        self.load_sessions().await;
    }

    /// Mount-time trigger; a no-op unless authenticated and not yet loaded.
    pub async fn ensure_initialized(&self) {
        let ready = {
            let sync = self.sync.lock().await;
            sync.authenticated
        };
        if ready {
            self.load_sessions().await;
        }
    }

    // ========================================================================
    // Fetch protocol
    // ========================================================================

    /// Fetches the remote session list and restores the selection.
    ///
    /// Idempotent: the `sessions_loaded` guard is check-and-set before the
    /// first suspension point, so overlapping triggers produce one fetch.
    /// Never propagates a failure; the cache fallback absorbs it.
    async fn load_sessions(&self) {
        {
            let mut sync = self.sync.lock().await;
            if !sync.authenticated || sync.sessions_loaded {
                return;
            }
            sync.sessions_loaded = true;
        }
        self.store.set_loading_sessions(true).await;

        match self.api.list_sessions().await {
            Ok(descriptors) => {
                let sessions: Vec<Session> =
                    descriptors.into_iter().map(Session::from).collect();
                tracing::info!("[ChatEngine] Loaded {} sessions", sessions.len());
                self.store.set_sessions(sessions).await;
                self.restore_selection().await;
            }
            Err(e) => {
                tracing::warn!(
                    "[ChatEngine] Session fetch failed, falling back to cache: {}",
                    e
                );
                let restored = self.store.restore_from_cache().await;
                tracing::info!("[ChatEngine] Restored {} sessions from cache", restored);
            }
        }

        self.store.set_loading_sessions(false).await;
    }

    /// Re-selects the persisted session when it still exists, otherwise the
    /// most recently active one; an empty list goes to the auto-create
    /// decision.
    async fn restore_selection(&self) {
        let sessions = self.store.sessions().await;
        if sessions.is_empty() {
            if let Err(e) = self.cache.remove(CURRENT_SESSION_KEY).await {
                tracing::warn!("[ChatEngine] Failed to clear persisted session id: {}", e);
            }
            self.maybe_create_initial_session().await;
            return;
        }

        let persisted = self.cache.get(CURRENT_SESSION_KEY).await.ok().flatten();
        let target = persisted
            .filter(|id| sessions.iter().any(|s| &s.id == id))
            // The list is ordered newest-first by last activity.
            .unwrap_or_else(|| sessions[0].id.clone());

        if let Err(e) = self.store.select_current(&target).await {
            tracing::warn!("[ChatEngine] Failed to restore selection {}: {}", target, e);
        }
    }

    /// Auto-creates the initial session exactly once per load cycle, unless
    /// the user opted out or something is already selected.
    async fn maybe_create_initial_session(&self) {
        if self.auto_session_opted_out().await || self.store.current().await.is_some() {
            return;
        }
        {
            let mut sync = self.sync.lock().await;
            if sync.initial_session_attempted {
                return;
            }
            sync.initial_session_attempted = true;
        }
        tracing::info!("[ChatEngine] No sessions exist, creating the initial one");
        self.create_session_inner().await;
    }

    async fn auto_session_opted_out(&self) -> bool {
        matches!(
            self.cache.get(NO_AUTO_SESSION_KEY).await,
            Ok(Some(flag)) if flag == "true"
        )
    }

    // ========================================================================
    // Session lifecycle
    // ========================================================================

    /// Explicit "start new chat" user action. Clears the sticky auto-session
    /// opt-out, then creates a session (degrading to a local-only one when
    /// the backend is unreachable).
    pub async fn new_session(&self) -> Session {
        if let Err(e) = self.cache.remove(NO_AUTO_SESSION_KEY).await {
            tracing::warn!("[ChatEngine] Failed to clear opt-out flag: {}", e);
        }
        self.create_session_inner().await
    }

    /// Records the user's choice not to have a session auto-created. Sticky
    /// across reloads until "start new chat" or the last deletion.
    pub async fn decline_auto_session(&self) {
        if let Err(e) = self.cache.set(NO_AUTO_SESSION_KEY, "true").await {
            tracing::warn!("[ChatEngine] Failed to persist opt-out flag: {}", e);
        }
    }

    /// Creates a session remotely, or synthesizes a degraded local one on
    /// failure. Either way the new session becomes current and its id is
    /// persisted. Local sessions carry `is_local = true` and never
    /// reconcile with the backend.
    pub(crate) async fn create_session_inner(&self) -> Session {
        let session = match self.api.create_session(DEFAULT_SESSION_TITLE).await {
            Ok(descriptor) => Session::from(descriptor),
            Err(e) => {
                tracing::warn!(
                    "[ChatEngine] Remote session creation failed, using local fallback: {}",
                    e
                );
                Session::new_local(chrono::Utc::now().timestamp_millis())
            }
        };
        self.store.insert_session(session.clone()).await;
        session
    }

    /// Selects a session, loading its history when needed.
    pub async fn select_session(&self, session_id: &str) -> Result<()> {
        self.store.select_current(session_id).await
    }

    /// Deletes a session remotely, then prunes it locally.
    ///
    /// The local list is only pruned after a successful remote delete, so
    /// repeated page loads cannot disagree with the backend. Deleting the
    /// last session clears the auto-session opt-out.
    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        if let Err(e) = self.api.delete_session(session_id).await {
            self.notify_error(format!("Failed to delete session: {e}")).await;
            return Err(e);
        }

        let was_current = self.store.remove_session(session_id).await;
        let remaining = self.store.sessions().await;

        if remaining.is_empty() {
            if let Err(e) = self.cache.remove(NO_AUTO_SESSION_KEY).await {
                tracing::warn!("[ChatEngine] Failed to clear opt-out flag: {}", e);
            }
        } else if was_current {
            let next = remaining[0].id.clone();
            if let Err(e) = self.store.select_current(&next).await {
                tracing::warn!("[ChatEngine] Failed to select {} after delete: {}", next, e);
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for ChatEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatEngine")
            .field("summarizing_reset", &self.summarizing_reset)
            .finish_non_exhaustive()
    }
}

// Referenced by the error message when a send is attempted with nothing
// selected; kept here so engine and pipeline agree on the wording.
pub(crate) fn no_current_session_error() -> VerdaError {
    VerdaError::validation("No session is selected")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockApi, MockCache, descriptor};
    use std::sync::atomic::Ordering;
    use verda_core::cache::SESSIONS_KEY;
    use verda_core::session::ConversationMessage;

    fn engine_with(api: MockApi) -> (ChatEngine, Arc<MockApi>, Arc<MockCache>) {
        let api = Arc::new(api);
        let cache = Arc::new(MockCache::new());
        let engine = ChatEngine::new(api.clone(), cache.clone(), &EngineConfig::default());
        (engine, api, cache)
    }

    #[tokio::test]
    async fn test_bootstrap_is_idempotent() {
        let (engine, api, _cache) = engine_with(MockApi::new().with_sessions(vec![descriptor(
            "s1",
            "2024-05-01T10:00:00+00:00",
        )]));

        engine.ensure_initialized().await; // mount before auth: no-op
        engine.set_authenticated(true).await;
        engine.set_authenticated(true).await; // repeated signal, not a transition
        engine.ensure_initialized().await; // late mount effect

        assert_eq!(api.list_calls.load(Ordering::SeqCst), 1);
        assert_eq!(engine.phase().await, SyncPhase::Ready);
    }

    #[tokio::test]
    async fn test_empty_remote_auto_creates_exactly_one_session() {
        let (engine, api, _cache) = engine_with(MockApi::new());

        engine.ensure_initialized().await;
        engine.set_authenticated(true).await;
        engine.set_authenticated(true).await;

        let sessions = engine.store().sessions().await;
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, "srv-1");
        assert_eq!(engine.store().current().await.unwrap().id, "srv-1");
        assert_eq!(api.create_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_opt_out_prevents_auto_create() {
        let api = MockApi::new();
        let cache = Arc::new(MockCache::new());
        cache.set(NO_AUTO_SESSION_KEY, "true").await.unwrap();
        let engine = ChatEngine::new(Arc::new(api), cache.clone(), &EngineConfig::default());

        engine.set_authenticated(true).await;

        assert!(engine.store().sessions().await.is_empty());
        assert!(engine.store().current().await.is_none());
        assert_eq!(engine.phase().await, SyncPhase::Empty);
    }

    #[tokio::test]
    async fn test_new_session_clears_opt_out() {
        let (engine, _api, cache) = engine_with(MockApi::new());
        engine.decline_auto_session().await;
        assert_eq!(cache.get_sync(NO_AUTO_SESSION_KEY).unwrap(), "true");

        let session = engine.new_session().await;

        assert!(cache.get_sync(NO_AUTO_SESSION_KEY).is_none());
        assert!(!session.is_local);
        assert_eq!(engine.store().current().await.unwrap().id, session.id);
    }

    #[tokio::test]
    async fn test_sign_out_clears_state_but_keeps_opt_out() {
        let (engine, _api, cache) = engine_with(MockApi::new().with_sessions(vec![descriptor(
            "s1",
            "2024-05-01T10:00:00+00:00",
        )]));
        engine.decline_auto_session().await;
        engine.set_authenticated(true).await;
        assert!(engine.store().current().await.is_some());

        engine.set_authenticated(false).await;

        assert!(engine.store().sessions().await.is_empty());
        assert!(engine.store().current().await.is_none());
        assert!(cache.get_sync(CURRENT_SESSION_KEY).is_none());
        assert_eq!(cache.get_sync(NO_AUTO_SESSION_KEY).unwrap(), "true");
        assert_eq!(engine.phase().await, SyncPhase::Unauthenticated);
    }

    #[tokio::test]
    async fn test_sign_in_restores_persisted_selection_with_history() {
        let api = MockApi::new()
            .with_sessions(vec![
                descriptor("s1", "2024-05-03T10:00:00+00:00"),
                descriptor("s2", "2024-05-02T10:00:00+00:00"),
                descriptor("s3", "2024-05-01T10:00:00+00:00"),
            ])
            .with_history(
                "s2",
                vec![
                    ConversationMessage::user("what is regenerative agriculture?"),
                    ConversationMessage::assistant("Farming that rebuilds soil.", "2024-05-02T10:00:01+00:00", Some(true)),
                ],
            );
        let cache = Arc::new(MockCache::new());
        cache.set(CURRENT_SESSION_KEY, "s2").await.unwrap();
        let engine = ChatEngine::new(Arc::new(api), cache.clone(), &EngineConfig::default());

        engine.set_authenticated(true).await;

        let current = engine.store().current().await.unwrap();
        assert_eq!(current.id, "s2");
        assert_eq!(current.messages.len(), 2);
    }

    #[tokio::test]
    async fn test_selection_falls_back_to_most_recently_active() {
        let (engine, _api, _cache) = engine_with(MockApi::new().with_sessions(vec![
            descriptor("older", "2024-05-01T10:00:00+00:00"),
            descriptor("newest", "2024-05-04T10:00:00+00:00"),
        ]));

        engine.set_authenticated(true).await;

        assert_eq!(engine.store().current().await.unwrap().id, "newest");
    }

    #[tokio::test]
    async fn test_stale_persisted_id_falls_back_to_most_recent() {
        let api = MockApi::new().with_sessions(vec![descriptor(
            "s1",
            "2024-05-01T10:00:00+00:00",
        )]);
        let cache = Arc::new(MockCache::new());
        cache.set(CURRENT_SESSION_KEY, "deleted-elsewhere").await.unwrap();
        let engine = ChatEngine::new(Arc::new(api), cache.clone(), &EngineConfig::default());

        engine.set_authenticated(true).await;

        assert_eq!(engine.store().current().await.unwrap().id, "s1");
    }

    #[tokio::test]
    async fn test_fetch_failure_falls_back_to_cached_snapshot() {
        let api = MockApi::new();
        api.fail_list.store(true, Ordering::SeqCst);
        let cache = Arc::new(MockCache::new());
        let cached = vec![
            Session::new("c1", "Rainwater harvesting"),
            Session::new("c2", "New Chat"),
        ];
        cache
            .set(SESSIONS_KEY, &serde_json::to_string(&cached).unwrap())
            .await
            .unwrap();
        cache.set(CURRENT_SESSION_KEY, "c1").await.unwrap();
        let engine = ChatEngine::new(Arc::new(api), cache.clone(), &EngineConfig::default());

        engine.set_authenticated(true).await;

        let sessions = engine.store().sessions().await;
        assert_eq!(sessions.len(), 2);
        let current = engine.store().current().await.unwrap();
        assert_eq!(current.id, "c1");
        assert!(current.messages.is_empty());
        // Degraded load still counts as loaded; no auto-create happened.
        assert_eq!(engine.phase().await, SyncPhase::Ready);
    }

    #[tokio::test]
    async fn test_delete_last_session_clears_current_and_opt_out() {
        let (engine, _api, cache) = engine_with(MockApi::new().with_sessions(vec![descriptor(
            "s1",
            "2024-05-01T10:00:00+00:00",
        )]));
        engine.set_authenticated(true).await;
        engine.decline_auto_session().await;

        engine.delete_session("s1").await.unwrap();

        assert!(engine.store().sessions().await.is_empty());
        assert!(engine.store().current().await.is_none());
        assert!(cache.get_sync(CURRENT_SESSION_KEY).is_none());
        assert!(cache.get_sync(NO_AUTO_SESSION_KEY).is_none());
    }

    #[tokio::test]
    async fn test_delete_current_selects_first_remaining() {
        let (engine, _api, _cache) = engine_with(MockApi::new().with_sessions(vec![
            descriptor("a", "2024-05-03T10:00:00+00:00"),
            descriptor("b", "2024-05-02T10:00:00+00:00"),
        ]));
        engine.set_authenticated(true).await;
        assert_eq!(engine.store().current().await.unwrap().id, "a");

        engine.delete_session("a").await.unwrap();

        assert_eq!(engine.store().current().await.unwrap().id, "b");
    }

    #[tokio::test]
    async fn test_delete_non_current_keeps_selection() {
        let (engine, _api, _cache) = engine_with(MockApi::new().with_sessions(vec![
            descriptor("a", "2024-05-03T10:00:00+00:00"),
            descriptor("b", "2024-05-02T10:00:00+00:00"),
        ]));
        engine.set_authenticated(true).await;

        engine.delete_session("b").await.unwrap();

        assert_eq!(engine.store().current().await.unwrap().id, "a");
        assert_eq!(engine.store().sessions().await.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_remote_failure_keeps_local_list() {
        let api = MockApi::new().with_sessions(vec![descriptor(
            "s1",
            "2024-05-01T10:00:00+00:00",
        )]);
        api.fail_delete.store(true, Ordering::SeqCst);
        let (engine, _api, _cache) = engine_with(api);
        engine.set_authenticated(true).await;

        let result = engine.delete_session("s1").await;

        assert!(result.is_err());
        assert_eq!(engine.store().sessions().await.len(), 1);
        assert_eq!(engine.store().current().await.unwrap().id, "s1");
    }

    #[tokio::test]
    async fn test_create_session_degrades_to_local_fallback() {
        let api = MockApi::new();
        api.fail_create.store(true, Ordering::SeqCst);
        let (engine, _api, _cache) = engine_with(api);

        let session = engine.new_session().await;

        assert!(session.is_local);
        assert!(session.id.starts_with("local-"));
        assert_eq!(engine.store().current().await.unwrap().id, session.id);
    }
}
