//! Typed events published on the in-process settings channel

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{CategoryIds, CategoryExclusions, SettingsDocument, SettingsField, SettingsValue};

/// Event names listeners can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    SettingsChanged,
    ForceSynchronizationCompleted,
    CategorySettingsChanged,
    ItemsRecategorized,
    ScanCompleted,
    ConvergenceUnresolved,
    PersistenceFailed,
}

/// Event payloads
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum SettingsEvent {
    /// A user-driven change passed the debouncer
    SettingsChanged {
        field: SettingsField,
        value: SettingsValue,
        timestamp: DateTime<Utc>,
    },
    /// A synchronization pass finished broadcasting and verifying
    ForceSynchronizationCompleted {
        settings: SettingsDocument,
        timestamp: DateTime<Utc>,
    },
    /// Preselected categories or exclusions changed
    CategorySettingsChanged {
        preselected: CategoryIds,
        exclusions: CategoryExclusions,
    },
    /// Published by the categorizer after it re-ran over stored items
    ItemsRecategorized { count: usize },
    /// Published by the scanner after a mailbox scan
    ScanCompleted { scanned: usize },
    /// Retries were exhausted without every collaborator converging
    ConvergenceUnresolved {
        fields: Vec<SettingsField>,
        attempts: u32,
    },
    /// The durable write failed; the in-memory document stays authoritative
    PersistenceFailed { message: String },
}

impl SettingsEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::SettingsChanged { .. } => EventKind::SettingsChanged,
            Self::ForceSynchronizationCompleted { .. } => EventKind::ForceSynchronizationCompleted,
            Self::CategorySettingsChanged { .. } => EventKind::CategorySettingsChanged,
            Self::ItemsRecategorized { .. } => EventKind::ItemsRecategorized,
            Self::ScanCompleted { .. } => EventKind::ScanCompleted,
            Self::ConvergenceUnresolved { .. } => EventKind::ConvergenceUnresolved,
            Self::PersistenceFailed { .. } => EventKind::PersistenceFailed,
        }
    }
}
