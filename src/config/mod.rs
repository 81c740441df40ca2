use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::types::error::SettingsError;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Window in which an identical notification is suppressed
    pub debounce_window_ms: u64,

    /// Delay before the first convergence retry
    pub retry_base_delay_ms: u64,

    /// Upper bound for the exponential retry delay
    pub retry_max_delay_ms: u64,

    /// Retries attempted before giving up with an unresolved status
    pub max_retry_attempts: u32,

    /// How long the "converged" indicator stays visible
    pub indicator_display_ms: u64,

    /// SQLite file holding the settings document
    pub db_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce_window_ms: 1000,
            retry_base_delay_ms: 1500,
            retry_max_delay_ms: 30_000,
            max_retry_attempts: 6,
            indicator_display_ms: 2000,
            db_path: None,
        }
    }
}

impl EngineConfig {
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_window_ms)
    }

    pub fn indicator_display(&self) -> Duration {
        Duration::from_millis(self.indicator_display_ms)
    }

    /// Delay before retry number `attempt` (1-based): base * 2^(attempt-1), capped
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self
            .retry_base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.retry_max_delay_ms.max(self.retry_base_delay_ms));
        Duration::from_millis(delay)
    }

    /// Database path, falling back to the platform data directory
    pub fn resolved_db_path(&self) -> PathBuf {
        if let Some(path) = &self.db_path {
            return path.clone();
        }

        if cfg!(debug_assertions) {
            PathBuf::from(".sqlite/settings.db")
        } else {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("settings-sync")
                .join("settings.db")
        }
    }
}

/// Get default config paths
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // XDG config path
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("settings-sync").join("config.toml"));
    }

    // Home directory fallback
    if let Some(home_dir) = dirs::home_dir() {
        paths.push(
            home_dir
                .join(".config")
                .join("settings-sync")
                .join("config.toml"),
        );
    }

    paths
}

/// Load configuration from an explicit path, the default paths, or defaults
pub fn load_config(explicit: Option<&Path>) -> Result<EngineConfig, SettingsError> {
    if let Some(path) = explicit {
        return load_config_from_path(path);
    }

    for path in default_config_paths() {
        if path.exists() {
            info!("Found config at: {:?}", path);
            return load_config_from_path(&path);
        }
    }

    info!("No config file found, using defaults");
    Ok(EngineConfig::default())
}

/// Load configuration from a specific path
pub fn load_config_from_path(path: &Path) -> Result<EngineConfig, SettingsError> {
    info!("Loading configuration from: {:?}", path);

    let content = fs::read_to_string(path)
        .map_err(|e| SettingsError::Config(format!("Failed to read config: {}", e)))?;

    toml::from_str(&content)
        .map_err(|e| SettingsError::Config(format!("Failed to parse config: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "debounce_window_ms = 250\nmax_retry_attempts = 3\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.debounce_window_ms, 250);
        assert_eq!(config.max_retry_attempts, 3);
        assert_eq!(config.retry_base_delay_ms, 1500);
    }

    #[test]
    fn test_unparsable_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "debounce_window_ms = \"soon\"").unwrap();

        assert!(matches!(load_config(Some(&path)), Err(SettingsError::Config(_))));
    }

    #[test]
    fn test_retry_delay_backoff_is_capped() {
        let config = EngineConfig {
            retry_base_delay_ms: 1000,
            retry_max_delay_ms: 5000,
            ..EngineConfig::default()
        };

        assert_eq!(config.retry_delay(1), Duration::from_millis(1000));
        assert_eq!(config.retry_delay(2), Duration::from_millis(2000));
        assert_eq!(config.retry_delay(3), Duration::from_millis(4000));
        assert_eq!(config.retry_delay(4), Duration::from_millis(5000));
        assert_eq!(config.retry_delay(40), Duration::from_millis(5000));
    }
}
