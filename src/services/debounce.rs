//! Notification debouncing
//!
//! Redundant input events (change + blur + click on the same checkbox) tend
//! to produce the same notification several times in a row. Only an exact
//! repeat of the last notification for a field, inside the window, is dropped.

use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

use crate::types::{SettingsField, SettingsValue};

/// Identity of a notification: field name plus canonical value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NotificationKey {
    pub field: SettingsField,
    pub key: String,
}

impl NotificationKey {
    pub fn new(value: &SettingsValue) -> Self {
        let field = value.field();
        Self {
            field,
            key: format!("{}:{}", field.as_str(), value.canonical_json()),
        }
    }
}

/// Last emitted notification for one field
#[derive(Debug, Clone)]
struct NotificationRecord {
    key: String,
    timestamp: Instant,
}

pub struct NotificationDebouncer {
    window: Duration,
    last: HashMap<SettingsField, NotificationRecord>,
}

impl NotificationDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last: HashMap::new(),
        }
    }

    /// Returns false when `key` repeats the last notification for its field
    /// within the window; otherwise records it and returns true.
    pub fn should_emit(&mut self, key: &NotificationKey, now: Instant) -> bool {
        if let Some(record) = self.last.get(&key.field) {
            if record.key == key.key && now.saturating_duration_since(record.timestamp) < self.window
            {
                return false;
            }
        }

        self.last.insert(
            key.field,
            NotificationRecord {
                key: key.key.clone(),
                timestamp: now,
            },
        );
        true
    }
}
