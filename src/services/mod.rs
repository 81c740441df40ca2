//! Settings services
//!
//! Runtime-agnostic building blocks of the engine plus the `SettingsEngine`
//! facade that wires them together. Nothing in here knows about a front-end;
//! collaborators are reached only through the registry.

pub mod broadcaster;
pub mod change_detector;
pub mod collaborators;
pub mod debounce;
pub mod event_bus;
pub mod settings_service;
pub mod settings_store;
pub mod verifier;

#[cfg(test)]
pub(crate) mod testing;

pub use settings_service::{ChangeOutcome, SettingsEngine};
pub use settings_store::{SettingsPersistence, SettingsStore, SqlitePersistence};
