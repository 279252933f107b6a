//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the Verda engine and its HTTP client.
///
/// Loaded from `config.toml` under the platform config directory; every
/// field has a default so a missing file yields a working configuration
/// pointed at a local backend.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Backend base URL, without the API prefix.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// API route prefix.
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
    /// Per-request timeout for session CRUD and history calls, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Per-request timeout for message sends, in seconds. Sends wait on the
    /// backend's model round-trip and need more headroom.
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
    /// Interval between backend health probes, in seconds.
    #[serde(default = "default_health_poll_interval_secs")]
    pub health_poll_interval_secs: u64,
    /// How long the summarizing flag stays set after a summarization event,
    /// in seconds.
    #[serde(default = "default_summarizing_reset_secs")]
    pub summarizing_reset_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_api_prefix() -> String {
    "/api/v1".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_send_timeout_secs() -> u64 {
    120
}

fn default_health_poll_interval_secs() -> u64 {
    30
}

fn default_summarizing_reset_secs() -> u64 {
    3
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_prefix: default_api_prefix(),
            request_timeout_secs: default_request_timeout_secs(),
            send_timeout_secs: default_send_timeout_secs(),
            health_poll_interval_secs: default_health_poll_interval_secs(),
            summarizing_reset_secs: default_summarizing_reset_secs(),
        }
    }
}
