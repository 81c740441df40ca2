//! Settings Sync - settings convergence engine
//!
//! Keeps one canonical settings document and makes every collaborator that
//! caches a slice of it converge on the same values.
//!
//! ## Module Organization
//!
//! - `types/`: Settings document, typed events, error type
//! - `adapters/`: SQLite persistence
//! - `services/`: Change detection, debouncing, broadcasting, verification
//! - `state/`: Single-flight sync coordinator and status indicator
//! - `config/`: Configuration management

pub mod adapters;
pub mod config;
pub mod services;
pub mod state;
pub mod types;

use tracing_subscriber::EnvFilter;

pub use config::{load_config, EngineConfig};
pub use services::collaborators::{CollaboratorHandle, CollaboratorRegistry, CollaboratorRole};
pub use services::{ChangeOutcome, SettingsEngine};
pub use state::{ConvergenceStatus, RequestOutcome, SyncScope};
pub use types::error::{Result, SettingsError};
pub use types::events::{EventKind, SettingsEvent};
pub use types::{SettingsDocument, SettingsField, SettingsValue};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set. Calling this twice is harmless.
pub fn init_tracing() {
    // In debug builds, default to debug level for our crate
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            EnvFilter::new("settings_sync_lib=debug,info")
        } else {
            EnvFilter::new("info")
        }
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
