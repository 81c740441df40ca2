//! Settings engine
//!
//! Entry point for everything that changes settings. A change is checked by
//! the change detector, written through the store, announced on the event
//! bus (debounced), and then handed to the sync coordinator so every
//! collaborator converges on it.

use chrono::Utc;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::adapters::sqlite::pool::create_pool;
use crate::config::EngineConfig;
use crate::services::collaborators::CollaboratorRegistry;
use crate::services::debounce::{NotificationDebouncer, NotificationKey};
use crate::services::event_bus::EventBus;
use crate::services::settings_store::{SettingsPersistence, SettingsStore, SqlitePersistence};
use crate::state::indicator::StatusIndicator;
use crate::state::sync_coordinator::{RequestOutcome, SyncCoordinator, SyncScope};
use crate::types::error::{Result, SettingsError};
use crate::types::events::{EventKind, SettingsEvent};
use crate::types::{
    AutomationSettings, CategoryExclusions, Preferences, ScanSettings, SettingsDocument,
    SettingsField, SettingsValue,
};

/// What `apply_change` did with a candidate value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOutcome {
    /// Equal to the stored value after canonicalization; nothing happened
    Unchanged,
    Applied {
        /// False if the durable write failed (in-memory value still updated)
        persisted: bool,
        /// False if the notification was suppressed by the debouncer
        notified: bool,
    },
}

pub struct SettingsEngine {
    store: Arc<SettingsStore>,
    registry: Arc<CollaboratorRegistry>,
    events: Arc<EventBus>,
    indicator: Arc<StatusIndicator>,
    coordinator: Arc<SyncCoordinator>,
    debouncer: Mutex<NotificationDebouncer>,
}

impl SettingsEngine {
    pub fn new(config: EngineConfig, persistence: Arc<dyn SettingsPersistence>) -> Self {
        let store = Arc::new(SettingsStore::load(persistence));
        let registry = Arc::new(CollaboratorRegistry::new());
        let events = Arc::new(EventBus::new());
        let indicator = Arc::new(StatusIndicator::new(config.indicator_display()));
        let debouncer = Mutex::new(NotificationDebouncer::new(config.debounce_window()));

        let coordinator = SyncCoordinator::new(
            store.clone(),
            registry.clone(),
            events.clone(),
            indicator.clone(),
            config,
        );

        Self {
            store,
            registry,
            events,
            indicator,
            coordinator,
            debouncer,
        }
    }

    /// Open the engine on the SQLite store named by the configuration
    pub fn open(config: EngineConfig) -> Result<Self> {
        let db_path = config.resolved_db_path();
        info!("Opening settings database at {:?}", db_path);
        let pool = create_pool(&db_path)?;
        Ok(Self::new(config, Arc::new(SqlitePersistence::new(pool))))
    }

    pub fn registry(&self) -> &Arc<CollaboratorRegistry> {
        &self.registry
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn indicator(&self) -> &Arc<StatusIndicator> {
        &self.indicator
    }

    pub fn coordinator(&self) -> &Arc<SyncCoordinator> {
        &self.coordinator
    }

    pub fn snapshot(&self) -> SettingsDocument {
        self.store.snapshot()
    }

    pub fn get(&self, field: SettingsField) -> SettingsValue {
        self.store.get(field)
    }

    /// Apply a user-driven change to one field.
    ///
    /// A failed durable write is not an error here: it is logged, published
    /// as `PersistenceFailed`, and the change still propagates.
    pub fn apply_change(&self, candidate: SettingsValue) -> ChangeOutcome {
        let candidate = self.sanitize(candidate);
        let field = candidate.field();

        let persisted = match self.store.set_if_changed(candidate.clone()) {
            None => {
                debug!("{} unchanged, nothing to do", field);
                return ChangeOutcome::Unchanged;
            }
            Some(Ok(())) => true,
            Some(Err(e)) => {
                self.report_persistence_failure(&e);
                false
            }
        };

        let notified = self.notify(&candidate);

        if field.is_category_field() {
            self.publish_category_change();
        }

        self.coordinator.request(SyncScope::field(field));

        ChangeOutcome::Applied {
            persisted,
            notified,
        }
    }

    pub fn set_preselected_categories<I, S>(&self, ids: I) -> ChangeOutcome
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.apply_change(SettingsValue::preselected(ids))
    }

    pub fn set_automation_settings(&self, settings: AutomationSettings) -> ChangeOutcome {
        self.apply_change(SettingsValue::AutomationSettings(settings))
    }

    pub fn set_scan_settings(&self, settings: ScanSettings) -> ChangeOutcome {
        self.apply_change(SettingsValue::ScanSettings(settings))
    }

    pub fn set_preferences(&self, prefs: Preferences) -> ChangeOutcome {
        self.apply_change(SettingsValue::Preferences(prefs))
    }

    pub fn set_category_exclusions(&self, exclusions: CategoryExclusions) -> ChangeOutcome {
        self.apply_change(SettingsValue::CategoryExclusions(exclusions))
    }

    /// Publish `settingsChanged` unless it repeats the last notification for
    /// this field inside the debounce window. Returns whether it was published.
    pub fn notify(&self, value: &SettingsValue) -> bool {
        let key = NotificationKey::new(value);
        let emit = self
            .debouncer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .should_emit(&key, Instant::now());

        if !emit {
            debug!("Suppressed repeated notification for {}", key.field);
            return false;
        }

        self.events.publish(SettingsEvent::SettingsChanged {
            field: value.field(),
            value: value.clone(),
            timestamp: Utc::now(),
        });
        true
    }

    /// Synchronize every field to every collaborator
    pub fn force_sync(&self) -> RequestOutcome {
        self.coordinator.force_sync()
    }

    /// Replace the document with an imported one.
    ///
    /// Malformed input is rejected before anything is touched. Returns the
    /// fields that actually changed.
    pub fn import_settings(&self, raw: &str) -> Result<Vec<SettingsField>> {
        let mut imported = SettingsDocument::from_json(raw)?;

        if let SettingsValue::TaskPreselectedCategories(ids) =
            self.sanitize(imported.value_of(SettingsField::TaskPreselectedCategories))
        {
            imported.task_preselected_categories = ids;
        }

        let (changed, persisted) = self.store.replace_if_changed(imported.clone());

        if changed.is_empty() {
            info!("Imported settings match the current document");
            return Ok(changed);
        }

        info!("Imported settings, changed fields: {:?}", changed);

        if let Err(e) = persisted {
            self.report_persistence_failure(&e);
        }

        for field in &changed {
            self.notify(&imported.value_of(*field));
        }
        if changed.iter().any(|f| f.is_category_field()) {
            self.publish_category_change();
        }

        self.coordinator
            .request(SyncScope::Fields(changed.iter().copied().collect()));

        Ok(changed)
    }

    pub fn export_settings(&self) -> Result<String> {
        self.store.snapshot().to_json_pretty()
    }

    /// Re-sync whenever a scan finishes or items get recategorized.
    ///
    /// Must be called from within a Tokio runtime. Abort the handle to stop.
    pub fn spawn_resync_listener(&self) -> JoinHandle<()> {
        let rx = self
            .events
            .subscribe_many(&[EventKind::ScanCompleted, EventKind::ItemsRecategorized]);
        let coordinator = self.coordinator.clone();

        tokio::spawn(async move {
            info!("Resync listener started");
            while let Ok(event) = rx.recv_async().await {
                debug!("Resync triggered by {:?}", event.kind());
                coordinator.force_sync();
            }
            info!("Resync listener stopped");
        })
    }

    /// Drop preselected ids the category registry does not know about.
    /// Without a registry, or with an empty catalog, ids pass through.
    fn sanitize(&self, value: SettingsValue) -> SettingsValue {
        let SettingsValue::TaskPreselectedCategories(ids) = value else {
            return value;
        };

        let Some(catalog) = self.registry.category_catalog() else {
            return SettingsValue::TaskPreselectedCategories(ids);
        };
        let known = catalog.categories();
        if known.is_empty() {
            return SettingsValue::TaskPreselectedCategories(ids);
        }

        let (kept, dropped): (Vec<String>, Vec<String>) =
            ids.into_iter().partition(|id| known.contains_key(id));
        if !dropped.is_empty() {
            warn!("Ignoring unknown categories: {:?}", dropped);
        }

        SettingsValue::preselected(kept)
    }

    fn publish_category_change(&self) {
        let doc = self.store.snapshot();
        self.events.publish(SettingsEvent::CategorySettingsChanged {
            preselected: doc.task_preselected_categories,
            exclusions: doc.category_exclusions,
        });
    }

    fn report_persistence_failure(&self, e: &SettingsError) {
        error!("Settings not saved, continuing with in-memory copy: {}", e);
        self.events.publish(SettingsEvent::PersistenceFailed {
            message: e.to_string(),
        });
    }
}
