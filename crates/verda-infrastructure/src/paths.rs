//! Unified path management for Verda configuration and cache files.
//!
//! This ensures consistency across all platforms (Linux, macOS, Windows).

use std::path::PathBuf;

/// Errors that can occur during path resolution.
#[derive(Debug)]
pub enum PathError {
    /// Home directory could not be determined.
    HomeDirNotFound,
}

impl std::fmt::Display for PathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathError::HomeDirNotFound => write!(f, "Cannot find home directory"),
        }
    }
}

impl std::error::Error for PathError {}

/// Unified path management for Verda.
///
/// # Directory Structure
///
/// ```text
/// ~/.config/verda/             # Config directory
/// ├── config.toml              # Engine configuration
/// └── cache.json               # Persistent session cache (key/value)
/// ```
pub struct VerdaPaths;

impl VerdaPaths {
    /// Returns the Verda configuration directory.
    ///
    /// # Returns
    ///
    /// - `Ok(PathBuf)`: Path to config directory (e.g., `~/.config/verda/`)
    /// - `Err(PathError::HomeDirNotFound)`: Could not determine directory
    pub fn config_dir() -> Result<PathBuf, PathError> {
        dirs::config_dir()
            .map(|dir| dir.join("verda"))
            .ok_or(PathError::HomeDirNotFound)
    }

    /// Returns the path to the engine configuration file.
    pub fn config_file() -> Result<PathBuf, PathError> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Returns the path to the persistent cache file.
    pub fn cache_file() -> Result<PathBuf, PathError> {
        Ok(Self::config_dir()?.join("cache.json"))
    }
}
