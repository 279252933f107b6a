//! Error types for the Verda engine.

use serde::Serialize;
use thiserror::Error;

/// A shared error type for the entire Verda engine.
///
/// This provides typed, structured error variants with automatic conversion
/// from common error types via the `From` trait. Every public engine
/// operation either succeeds, degrades, or returns one of these variants;
/// nothing else is allowed to escape the engine boundary.
#[derive(Error, Debug, Clone, Serialize)]
pub enum VerdaError {
    /// Entity not found error with type information.
    ///
    /// For sessions this is the distinguished condition the send pipeline
    /// keys its replacement-and-retry path on.
    #[error("Entity not found: {entity_type} '{id}'")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// The backend answered with a non-success status other than 404.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Transport-level failure (connection refused, timeout, DNS, ...).
    #[error("Network error: {0}")]
    Network(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization {
        format: String, // "TOML", "JSON", etc.
        message: String,
    },

    /// Persistent cache read/write error
    #[error("Cache error: {0}")]
    Cache(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rejected input, checked before any state mutation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl VerdaError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    /// Creates a NotFound error
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates an Api error
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Creates a Network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    /// Creates a Cache error
    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache(message.into())
    }

    /// Creates a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates a Validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    // ============================================================================
    // Type checking methods
    // ============================================================================

    /// Check if this is a NotFound error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is a transport-level failure
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    /// Check if this is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Check if the remote is likely unreachable or unhealthy.
    ///
    /// Returns true for network failures and 5xx responses. This is the
    /// condition under which reads degrade to the persistent cache.
    pub fn is_transient_remote(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<std::io::Error> for VerdaError {
    fn from(err: std::io::Error) -> Self {
        Self::Cache(format!("{} (kind: {:?})", err, err.kind()))
    }
}

impl From<serde_json::Error> for VerdaError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

/// A type alias for `Result<T, VerdaError>`.
pub type Result<T> = std::result::Result<T, VerdaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        let err = VerdaError::not_found("session", "abc");
        assert!(err.is_not_found());
        assert!(!err.is_transient_remote());
    }

    #[test]
    fn test_transient_classification() {
        assert!(VerdaError::network("connection refused").is_transient_remote());
        assert!(VerdaError::api(503, "unavailable").is_transient_remote());
        assert!(!VerdaError::api(403, "denied").is_transient_remote());
    }
}
