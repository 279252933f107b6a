//! Session domain module.
//!
//! This module contains all session-related domain models and the
//! authoritative in-memory store.
//!
//! # Module Structure
//!
//! - `model`: Core session domain model (`Session`)
//! - `message`: Conversation message types (`MessageRole`, `ConversationMessage`)
//! - `store`: The authoritative state (`SessionStore`)

mod message;
mod model;
mod store;

// Re-export public API
pub use message::{ConversationMessage, MessageRole, now_rfc3339};
pub use model::{DEFAULT_SESSION_TITLE, Session, title_from_message};
pub use store::SessionStore;
