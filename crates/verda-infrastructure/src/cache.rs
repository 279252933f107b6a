//! File-backed persistent cache.
//!
//! A flat JSON key/value file standing in for the browser-style persistent
//! storage the engine mirrors its state into. Values are cached in memory
//! and written through on every mutation, so reads never touch the disk
//! after startup.

use crate::paths::VerdaPaths;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use verda_core::cache::CacheStore;
use verda_core::error::{Result, VerdaError};

/// Persistent key/value store backed by a single JSON file.
pub struct FileCacheStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileCacheStore {
    /// Opens the cache at the default location (`~/.config/verda/cache.json`).
    pub async fn default_location() -> Result<Self> {
        let path = VerdaPaths::cache_file()
            .map_err(|e| VerdaError::config(format!("Failed to resolve cache path: {e}")))?;
        Self::open(path).await
    }

    /// Opens (or initializes) the cache at the given path.
    ///
    /// An unreadable or unparseable backing file is discarded and replaced
    /// on the next write; corruption never propagates to the caller.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| VerdaError::cache(format!("Failed to create cache dir: {e}")))?;
        }

        let entries = match fs::read_to_string(&path).await {
            Ok(raw) => match serde_json::from_str::<HashMap<String, String>>(&raw) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(
                        "[FileCacheStore] Discarding corrupt cache at {}: {}",
                        path.display(),
                        e
                    );
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Serializes and writes the whole map while the lock is held, so file
    /// contents always reflect the latest mutation order.
    async fn persist(&self, entries: &HashMap<String, String>) -> Result<()> {
        let raw = serde_json::to_string_pretty(entries)?;
        fs::write(&self.path, raw)
            .await
            .map_err(|e| VerdaError::cache(format!("Failed to write cache: {e}")))
    }
}

#[async_trait]
impl CacheStore for FileCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().await;
        if entries.remove(key).is_some() {
            self.persist(&entries).await?;
        }
        Ok(())
    }
}
