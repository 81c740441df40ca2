//! Unified error type for the settings engine
//!
//! Only two kinds of failure are ever meant to reach a user:
//! - persistence failures (the durable write did not happen)
//! - malformed input (an imported document has the wrong shape)
//!
//! Everything else is handled inside the engine and logged.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum SettingsError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Failed to persist settings: {0}")]
    Persistence(String),

    #[error("Malformed settings: {0}")]
    MalformedInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Collaborator error: {0}")]
    Collaborator(String),

    #[error("{0}")]
    Other(String),
}

impl SettingsError {
    /// Whether this error should be shown to the user (toast / CLI message)
    pub fn is_user_visible(&self) -> bool {
        matches!(self, Self::Persistence(_) | Self::MalformedInput(_))
    }
}

// Serialize as a plain string so the error can be forwarded to any front-end.
impl Serialize for SettingsError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl From<r2d2::Error> for SettingsError {
    fn from(e: r2d2::Error) -> Self {
        SettingsError::Database(e.to_string())
    }
}

impl From<rusqlite::Error> for SettingsError {
    fn from(e: rusqlite::Error) -> Self {
        SettingsError::Database(e.to_string())
    }
}

impl From<std::io::Error> for SettingsError {
    fn from(err: std::io::Error) -> Self {
        SettingsError::Io(err.to_string())
    }
}

impl From<toml::de::Error> for SettingsError {
    fn from(err: toml::de::Error) -> Self {
        SettingsError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for SettingsError {
    fn from(err: serde_json::Error) -> Self {
        SettingsError::MalformedInput(err.to_string())
    }
}

impl From<String> for SettingsError {
    fn from(err: String) -> Self {
        SettingsError::Other(err)
    }
}

impl From<&str> for SettingsError {
    fn from(err: &str) -> Self {
        SettingsError::Other(err.to_string())
    }
}

/// Result type alias using SettingsError
pub type Result<T> = std::result::Result<T, SettingsError>;
