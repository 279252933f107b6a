//! Shared test doubles for the engine tests.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use verda_core::api::{
    HealthStatus, SendMessageRequest, SendOutcome, SessionApi, SessionDescriptor, SessionHistory,
};
use verda_core::cache::CacheStore;
use verda_core::error::{Result, VerdaError};
use verda_core::session::{ConversationMessage, now_rfc3339};

/// Scripted backend double. Sends consume the scripted results in order and
/// fall back to a canned success; every request is recorded for
/// assertions.
pub(crate) struct MockApi {
    pub sessions: Mutex<Vec<SessionDescriptor>>,
    pub histories: Mutex<HashMap<String, Vec<ConversationMessage>>>,
    pub send_script: Mutex<VecDeque<std::result::Result<SendOutcome, VerdaError>>>,
    pub sent: Mutex<Vec<SendMessageRequest>>,
    pub fail_list: AtomicBool,
    pub fail_create: AtomicBool,
    pub fail_delete: AtomicBool,
    pub healthy: AtomicBool,
    pub list_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
}

impl MockApi {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(Vec::new()),
            histories: Mutex::new(HashMap::new()),
            send_script: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            fail_list: AtomicBool::new(false),
            fail_create: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
            healthy: AtomicBool::new(true),
            list_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_sessions(self, descriptors: Vec<SessionDescriptor>) -> Self {
        *self.sessions.lock().unwrap() = descriptors;
        self
    }

    pub fn with_history(self, session_id: &str, messages: Vec<ConversationMessage>) -> Self {
        self.histories
            .lock()
            .unwrap()
            .insert(session_id.to_string(), messages);
        self
    }

    pub fn script_send(&self, result: std::result::Result<SendOutcome, VerdaError>) {
        self.send_script.lock().unwrap().push_back(result);
    }

    pub fn send_attempts(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn default_outcome(session_id: &str) -> SendOutcome {
        SendOutcome {
            content: "Understood.".to_string(),
            timestamp: now_rfc3339(),
            session_id: session_id.to_string(),
            message_count: None,
            memory_used: Some(false),
            summarization_triggered: false,
            can_request_detailed: false,
            guardrail_triggered: false,
            guardrail_reason: None,
        }
    }
}

pub(crate) fn descriptor(id: &str, last_activity: &str) -> SessionDescriptor {
    SessionDescriptor {
        session_id: id.to_string(),
        title: Some("New Chat".to_string()),
        created_at: last_activity.to_string(),
        last_activity: last_activity.to_string(),
        message_count: None,
        is_active: true,
    }
}

#[async_trait]
impl SessionApi for MockApi {
    async fn list_sessions(&self) -> Result<Vec<SessionDescriptor>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(VerdaError::network("connection refused"));
        }
        Ok(self.sessions.lock().unwrap().clone())
    }

    async fn create_session(&self, title: &str) -> Result<SessionDescriptor> {
        let n = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(VerdaError::network("connection refused"));
        }
        let descriptor = SessionDescriptor {
            session_id: format!("srv-{n}"),
            title: Some(title.to_string()),
            created_at: now_rfc3339(),
            last_activity: now_rfc3339(),
            message_count: Some(0),
            is_active: true,
        };
        self.sessions.lock().unwrap().push(descriptor.clone());
        Ok(descriptor)
    }

    async fn get_history(&self, session_id: &str) -> Result<SessionHistory> {
        Ok(SessionHistory {
            session_id: session_id.to_string(),
            messages: self
                .histories
                .lock()
                .unwrap()
                .get(session_id)
                .cloned()
                .unwrap_or_default(),
        })
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(VerdaError::network("connection refused"));
        }
        let mut sessions = self.sessions.lock().unwrap();
        let before = sessions.len();
        sessions.retain(|s| s.session_id != session_id);
        if sessions.len() == before {
            return Err(VerdaError::not_found("session", session_id));
        }
        Ok(())
    }

    async fn send_message(&self, request: SendMessageRequest) -> Result<SendOutcome> {
        let session_id = request.session_id.clone();
        self.sent.lock().unwrap().push(request);
        match self.send_script.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Ok(Self::default_outcome(&session_id)),
        }
    }

    async fn health(&self) -> Result<HealthStatus> {
        if !self.healthy.load(Ordering::SeqCst) {
            return Err(VerdaError::network("connection refused"));
        }
        Ok(HealthStatus {
            status: "healthy".to_string(),
            model_loaded: Some(true),
            guardrails_enabled: Some(true),
            memory_system_active: Some(true),
        })
    }
}

/// In-memory cache double with synchronous inspection helpers.
pub(crate) struct MockCache {
    entries: Mutex<HashMap<String, String>>,
}

impl MockCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get_sync(&self, key: &str) -> Option<String> {
        self.entries.lock().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl CacheStore for MockCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}
