//! Verda application layer: the synchronization engine.
//!
//! Composes the core session store with the backend client and the
//! persistent cache, and exposes the operations a conversational UI needs:
//! auth-driven synchronization, session lifecycle, the message send
//! pipeline, and health monitoring.

mod engine;
mod health;
mod send;

#[cfg(test)]
mod testing;

pub use engine::{ChatEngine, ErrorNotifier, SyncPhase};
