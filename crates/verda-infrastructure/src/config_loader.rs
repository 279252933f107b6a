//! Engine configuration loading.

use crate::paths::VerdaPaths;
use tokio::fs;
use verda_core::config::EngineConfig;
use verda_core::error::{Result, VerdaError};

/// Loads the engine configuration from the default location.
///
/// A missing file yields the default configuration; an unreadable or
/// malformed file is a configuration error the caller must surface.
pub async fn load_engine_config() -> Result<EngineConfig> {
    let path = VerdaPaths::config_file()
        .map_err(|e| VerdaError::config(format!("Failed to resolve config path: {e}")))?;

    if !path.exists() {
        return Ok(EngineConfig::default());
    }

    let raw = fs::read_to_string(&path)
        .await
        .map_err(|e| VerdaError::config(format!("Failed to read {}: {}", path.display(), e)))?;
    toml::from_str(&raw).map_err(|e| VerdaError::Serialization {
        format: "TOML".to_string(),
        message: e.to_string(),
    })
}
