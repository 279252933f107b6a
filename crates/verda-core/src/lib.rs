//! Verda core domain layer.
//!
//! Holds the domain models, the authoritative session store, the error
//! taxonomy, and the boundary traits consumed from the backend client and
//! the persistent cache. No I/O lives here; implementations are provided by
//! `verda-client` and `verda-infrastructure`.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod session;

// Re-export common error type
pub use error::{Result, VerdaError};
