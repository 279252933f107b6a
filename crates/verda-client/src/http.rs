//! HTTP implementation of the session API.
//!
//! Talks to the Verda backend's REST endpoints. Request/response DTOs live
//! here; the rest of the engine only sees the `SessionApi` contract and the
//! core envelope types.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::RwLock;
use verda_core::api::{
    HealthStatus, SendMessageRequest, SendOutcome, SessionApi, SessionDescriptor, SessionHistory,
};
use verda_core::config::EngineConfig;
use verda_core::error::{Result, VerdaError};
use verda_core::session::now_rfc3339;

/// HTTP client for the backend's session CRUD and chat endpoints.
///
/// The bearer token is swappable at runtime: present for the authenticated
/// variant, absent for anonymous probes (health). The auth subsystem pushes
/// tokens in; this client never reads credentials itself.
pub struct HttpSessionApi {
    client: Client,
    base_url: String,
    api_prefix: String,
    token: RwLock<Option<String>>,
    request_timeout: Duration,
    send_timeout: Duration,
    session_limit: Option<u32>,
}

// ============================================================================
// Wire DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
struct SessionInfoDto {
    // The list endpoint reports `session_id`, the create endpoint `id`.
    #[serde(alias = "id")]
    session_id: String,
    #[serde(default)]
    title: Option<String>,
    created_at: String,
    #[serde(default)]
    last_activity: Option<String>,
    #[serde(default)]
    message_count: Option<u32>,
    #[serde(default = "default_true")]
    is_active: bool,
}

fn default_true() -> bool {
    true
}

impl From<SessionInfoDto> for SessionDescriptor {
    fn from(dto: SessionInfoDto) -> Self {
        let last_activity = dto.last_activity.unwrap_or_else(|| dto.created_at.clone());
        SessionDescriptor {
            session_id: dto.session_id,
            title: dto.title,
            created_at: dto.created_at,
            last_activity,
            message_count: dto.message_count,
            is_active: dto.is_active,
        }
    }
}

#[derive(Debug, Serialize)]
struct CreateSessionRequest<'a> {
    title: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequestDto<'a> {
    message: &'a str,
    session_id: &'a str,
    request_detailed: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponseDto {
    response: String,
    session_id: String,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    message_count: Option<u32>,
    #[serde(default)]
    memory_used: Option<bool>,
    #[serde(default, alias = "is_summary")]
    summarization_triggered: bool,
    #[serde(default)]
    can_request_detailed: bool,
    #[serde(default)]
    guardrail_triggered: bool,
    #[serde(default)]
    guardrail_reason: Option<String>,
}

impl From<ChatResponseDto> for SendOutcome {
    fn from(dto: ChatResponseDto) -> Self {
        SendOutcome {
            content: dto.response,
            timestamp: dto.timestamp.unwrap_or_else(now_rfc3339),
            session_id: dto.session_id,
            message_count: dto.message_count,
            memory_used: dto.memory_used,
            summarization_triggered: dto.summarization_triggered,
            can_request_detailed: dto.can_request_detailed,
            guardrail_triggered: dto.guardrail_triggered,
            guardrail_reason: dto.guardrail_reason,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBodyDto {
    #[serde(default)]
    detail: Option<String>,
}

impl HttpSessionApi {
    /// Creates a client from the engine configuration, with no token.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_prefix: config.api_prefix.clone(),
            token: RwLock::new(None),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            send_timeout: Duration::from_secs(config.send_timeout_secs),
            session_limit: None,
        }
    }

    /// Caps the number of sessions requested from the list endpoint.
    pub fn with_session_limit(mut self, limit: u32) -> Self {
        self.session_limit = Some(limit);
        self
    }

    /// Installs the bearer token for authenticated requests.
    pub async fn set_token(&self, token: impl Into<String>) {
        *self.token.write().await = Some(token.into());
    }

    /// Drops the bearer token, reverting to the anonymous variant.
    pub async fn clear_token(&self) {
        *self.token.write().await = None;
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, self.api_prefix, path)
    }

    /// Attaches the bearer token to a request when one is installed.
    async fn auth_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(token) = self.token.read().await.as_deref() {
            request.header("Authorization", format!("Bearer {token}"))
        } else {
            request
        }
    }

    /// Maps a non-success response to the engine's error taxonomy. 404 is
    /// the distinguished not-found condition the send pipeline retries on.
    async fn error_from_response(
        entity_type: &'static str,
        id: &str,
        response: Response,
    ) -> VerdaError {
        let status = response.status();
        let detail = response
            .json::<ErrorBodyDto>()
            .await
            .ok()
            .and_then(|body| body.detail)
            .unwrap_or_else(|| status.to_string());
        if status == StatusCode::NOT_FOUND {
            VerdaError::not_found(entity_type, id)
        } else {
            VerdaError::api(status.as_u16(), detail)
        }
    }
}

#[async_trait]
impl SessionApi for HttpSessionApi {
    async fn list_sessions(&self) -> Result<Vec<SessionDescriptor>> {
        let mut request = self
            .client
            .get(self.url("/sessions"))
            .timeout(self.request_timeout);
        if let Some(limit) = self.session_limit {
            request = request.query(&[("limit", limit)]);
        }
        let response = self
            .auth_request(request)
            .await
            .send()
            .await
            .map_err(|e| VerdaError::network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::error_from_response("sessions", "list", response).await);
        }

        let dtos: Vec<SessionInfoDto> = response
            .json()
            .await
            .map_err(|e| VerdaError::network(e.to_string()))?;
        tracing::debug!("[HttpSessionApi] Listed {} sessions", dtos.len());
        Ok(dtos.into_iter().map(SessionDescriptor::from).collect())
    }

    async fn create_session(&self, title: &str) -> Result<SessionDescriptor> {
        let request = self
            .client
            .post(self.url("/sessions"))
            .json(&CreateSessionRequest { title })
            .timeout(self.request_timeout);
        let response = self
            .auth_request(request)
            .await
            .send()
            .await
            .map_err(|e| VerdaError::network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::error_from_response("session", title, response).await);
        }

        let dto: SessionInfoDto = response
            .json()
            .await
            .map_err(|e| VerdaError::network(e.to_string()))?;
        tracing::info!("[HttpSessionApi] Created session {}", dto.session_id);
        Ok(dto.into())
    }

    async fn get_history(&self, session_id: &str) -> Result<SessionHistory> {
        let request = self
            .client
            .get(self.url(&format!("/sessions/{session_id}/history")))
            .timeout(self.request_timeout);
        let response = self
            .auth_request(request)
            .await
            .send()
            .await
            .map_err(|e| VerdaError::network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::error_from_response("session", session_id, response).await);
        }

        response
            .json::<SessionHistory>()
            .await
            .map_err(|e| VerdaError::network(e.to_string()))
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        let request = self
            .client
            .delete(self.url(&format!("/sessions/{session_id}")))
            .timeout(self.request_timeout);
        let response = self
            .auth_request(request)
            .await
            .send()
            .await
            .map_err(|e| VerdaError::network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::error_from_response("session", session_id, response).await);
        }
        tracing::info!("[HttpSessionApi] Deleted session {}", session_id);
        Ok(())
    }

    async fn send_message(&self, send: SendMessageRequest) -> Result<SendOutcome> {
        let request = self
            .client
            .post(self.url("/chat"))
            .json(&ChatRequestDto {
                message: &send.content,
                session_id: &send.session_id,
                request_detailed: send.request_detailed,
            })
            .timeout(self.send_timeout);
        let response = self
            .auth_request(request)
            .await
            .send()
            .await
            .map_err(|e| VerdaError::network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::error_from_response("session", &send.session_id, response).await);
        }

        let dto: ChatResponseDto = response
            .json()
            .await
            .map_err(|e| VerdaError::network(e.to_string()))?;
        Ok(dto.into())
    }

    async fn health(&self) -> Result<HealthStatus> {
        let request = self
            .client
            .get(self.url("/health"))
            .timeout(self.request_timeout);
        let response = request
            .send()
            .await
            .map_err(|e| VerdaError::network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(VerdaError::api(
                response.status().as_u16(),
                "health check failed",
            ));
        }

        response
            .json::<HealthStatus>()
            .await
            .map_err(|e| VerdaError::network(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_dto_accepts_both_id_fields() {
        let from_list: SessionInfoDto = serde_json::from_str(
            r#"{"session_id": "s1", "title": "Soil health", "created_at": "2024-01-01T00:00:00+00:00",
                "last_activity": "2024-01-02T00:00:00+00:00", "message_count": 4, "is_active": true}"#,
        )
        .unwrap();
        assert_eq!(from_list.session_id, "s1");

        let from_create: SessionInfoDto = serde_json::from_str(
            r#"{"id": "s2", "title": "New Chat", "created_at": "2024-01-01T00:00:00+00:00"}"#,
        )
        .unwrap();
        let descriptor = SessionDescriptor::from(from_create);
        assert_eq!(descriptor.session_id, "s2");
        // Create responses carry no activity yet; creation instant stands in.
        assert_eq!(descriptor.last_activity, "2024-01-01T00:00:00+00:00");
        assert!(descriptor.is_active);
    }

    #[test]
    fn test_chat_response_maps_summary_alias() {
        let dto: ChatResponseDto = serde_json::from_str(
            r#"{"response": "Composting reduces methane.", "session_id": "s1",
                "is_summary": true, "can_request_detailed": true, "memory_used": false}"#,
        )
        .unwrap();
        let outcome = SendOutcome::from(dto);
        assert!(outcome.summarization_triggered);
        assert!(outcome.can_request_detailed);
        assert_eq!(outcome.memory_used, Some(false));
        assert!(!outcome.timestamp.is_empty());
    }

    #[test]
    fn test_chat_request_wire_shape() {
        let json = serde_json::to_value(ChatRequestDto {
            message: "hi",
            session_id: "s1",
            request_detailed: true,
        })
        .unwrap();
        assert_eq!(json["message"], "hi");
        assert_eq!(json["session_id"], "s1");
        assert_eq!(json["request_detailed"], true);
    }

    #[tokio::test]
    async fn test_unreachable_backend_maps_to_network_error() {
        let config = EngineConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            request_timeout_secs: 1,
            ..EngineConfig::default()
        };
        let api = HttpSessionApi::from_config(&config);
        let err = api.list_sessions().await.unwrap_err();
        assert!(err.is_network());
        assert!(err.is_transient_remote());
    }
}
