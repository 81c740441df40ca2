//! Settings store
//!
//! Owns the in-memory settings document and writes it through to durable
//! storage. If a write fails the in-memory copy stays authoritative for the
//! rest of the session.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use std::sync::{Arc, RwLock};
use tracing::{error, info, warn};

use crate::adapters::sqlite::DbPool;
use crate::services::change_detector::ChangeDetector;
use crate::types::error::{Result, SettingsError};
use crate::types::{SettingsDocument, SettingsField, SettingsValue};

/// Key under which the document is stored
pub const SETTINGS_KEY: &str = "settings_document";

/// Durable storage for the serialized document
pub trait SettingsPersistence: Send + Sync {
    fn load(&self) -> Result<Option<String>>;
    fn save(&self, raw: &str) -> Result<()>;
}

/// SQLite-backed persistence: one row of the `settings` table holds the
/// whole document as JSON.
pub struct SqlitePersistence {
    pool: DbPool,
}

impl SqlitePersistence {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl SettingsPersistence for SqlitePersistence {
    fn load(&self) -> Result<Option<String>> {
        let conn = self.pool.get()?;
        let raw = conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![SETTINGS_KEY],
                |row| row.get(0),
            )
            .optional()?;
        Ok(raw)
    }

    fn save(&self, raw: &str) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![SETTINGS_KEY, raw, Utc::now().timestamp_millis()],
        )?;
        Ok(())
    }
}

pub struct SettingsStore {
    document: RwLock<SettingsDocument>,
    persistence: Arc<dyn SettingsPersistence>,
}

impl SettingsStore {
    /// Load the persisted document, falling back to defaults.
    ///
    /// Never fails: unreadable or malformed storage is logged and replaced
    /// by defaults on the next write.
    pub fn load(persistence: Arc<dyn SettingsPersistence>) -> Self {
        let document = match persistence.load() {
            Ok(Some(raw)) => match SettingsDocument::from_json(&raw) {
                Ok(doc) => {
                    info!("Loaded settings document (version {})", doc.version);
                    doc
                }
                Err(e) => {
                    warn!("Stored settings are unreadable, using defaults: {}", e);
                    SettingsDocument::default()
                }
            },
            Ok(None) => {
                info!("No stored settings found, using defaults");
                SettingsDocument::default()
            }
            Err(e) => {
                warn!("Failed to load settings, using defaults: {}", e);
                SettingsDocument::default()
            }
        };

        Self {
            document: RwLock::new(document),
            persistence,
        }
    }

    /// Copy of the whole document
    pub fn snapshot(&self) -> SettingsDocument {
        self.document
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Copy of one field
    pub fn get(&self, field: SettingsField) -> SettingsValue {
        self.document
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .value_of(field)
    }

    /// Update one field in memory, then persist.
    ///
    /// On `Err(Persistence)` the in-memory document already holds the new value.
    pub fn set(&self, value: SettingsValue) -> Result<()> {
        let mut doc = self.document.write().unwrap_or_else(|e| e.into_inner());
        doc.apply(value);
        self.persist(&doc)
    }

    /// Compare and write under one lock. `None` if `value` equals the stored
    /// value after canonicalization, otherwise the outcome of `set`.
    pub fn set_if_changed(&self, value: SettingsValue) -> Option<Result<()>> {
        let mut doc = self.document.write().unwrap_or_else(|e| e.into_inner());
        if !ChangeDetector::has_changed(&doc.value_of(value.field()), &value) {
            return None;
        }
        doc.apply(value);
        Some(self.persist(&doc))
    }

    /// Replace the document if any field differs, under one lock.
    /// Returns the changed fields (empty means nothing was written).
    pub fn replace_if_changed(
        &self,
        document: SettingsDocument,
    ) -> (Vec<SettingsField>, Result<()>) {
        let mut doc = self.document.write().unwrap_or_else(|e| e.into_inner());
        let changed: Vec<SettingsField> = SettingsField::ALL
            .into_iter()
            .filter(|field| {
                ChangeDetector::has_changed(&doc.value_of(*field), &document.value_of(*field))
            })
            .collect();

        if changed.is_empty() {
            return (changed, Ok(()));
        }

        *doc = document;
        let persisted = self.persist(&doc);
        (changed, persisted)
    }

    /// Write the current document again (e.g. after an earlier failure)
    pub fn save(&self) -> Result<()> {
        let doc = self.document.read().unwrap_or_else(|e| e.into_inner());
        self.persist(&doc)
    }

    fn persist(&self, doc: &SettingsDocument) -> Result<()> {
        let raw = serde_json::to_string(doc)
            .map_err(|e| SettingsError::Persistence(format!("Failed to serialize settings: {}", e)))?;

        self.persistence.save(&raw).map_err(|e| {
            error!("Failed to persist settings: {}", e);
            SettingsError::Persistence(e.to_string())
        })
    }
}
