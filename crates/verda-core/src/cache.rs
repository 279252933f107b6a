//! Persistent cache boundary.
//!
//! A flat key/value store mirroring the in-memory session state, read back
//! only on startup restoration or when the backend is unreachable. The
//! store writes to it; nothing else does, so there is no two-way sync.

use crate::error::Result;
use async_trait::async_trait;

/// Cache key holding the serialized session-list snapshot (JSON).
pub const SESSIONS_KEY: &str = "verda.sessions";

/// Cache key holding the id of the currently selected session.
pub const CURRENT_SESSION_KEY: &str = "verda.current_session";

/// Cache key holding the sticky "do not auto-create a session" opt-out.
///
/// Set by an explicit user action, cleared by "start new chat" or by
/// deleting the last remaining session.
pub const NO_AUTO_SESSION_KEY: &str = "verda.no_auto_session";

/// An abstract persistent key/value store over string keys and values.
///
/// Implementations must treat an unparseable or missing backing file as an
/// empty store rather than an error; corruption is discarded, never
/// propagated.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Reads a value. `Ok(None)` when the key is absent.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Writes a value, replacing any existing one.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Removes a key. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;
}
