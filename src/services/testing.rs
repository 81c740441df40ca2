//! Test doubles shared by the unit tests

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::services::collaborators::{
    AutomationSettingsSink, CategoryCatalog, CollaboratorHandle, PreferencesSink,
    PreselectedCategoriesSink, PreselectedCategoriesSource, ScanSettingsSink, SettingsReloader,
    ViewRefresher,
};
use crate::services::settings_store::SettingsPersistence;
use crate::types::error::{Result, SettingsError};
use crate::types::{
    AutomationSettings, CategoryDescriptor, CategoryIds, Preferences, ScanSettings, SettingsField,
};

/// Collaborator that records every call and caches what it is told.
///
/// With `accept_updates` off it counts updates but keeps its stale cache,
/// which is how a lagging collaborator looks to the verifier.
pub struct MockCollaborator {
    pub preselected_updates: AtomicUsize,
    pub automation_updates: AtomicUsize,
    pub scan_updates: AtomicUsize,
    pub preference_updates: AtomicUsize,
    pub reloads: AtomicUsize,
    pub refreshes: AtomicUsize,
    pub accept_updates: AtomicBool,
    pub fail_updates: AtomicBool,
    pub cached: Mutex<CategoryIds>,
    pub last_automation: Mutex<Option<AutomationSettings>>,
    pub view_fields: Mutex<Vec<SettingsField>>,
    catalog: BTreeMap<String, CategoryDescriptor>,
}

impl MockCollaborator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::build(BTreeMap::new()))
    }

    pub fn with_catalog<'a>(ids: impl IntoIterator<Item = &'a str>) -> Arc<Self> {
        let catalog = ids
            .into_iter()
            .map(|id| {
                let mut name = id.to_string();
                if let Some(first) = name.get_mut(0..1) {
                    first.make_ascii_uppercase();
                }
                (
                    id.to_string(),
                    CategoryDescriptor {
                        id: id.to_string(),
                        name,
                        keywords: Vec::new(),
                    },
                )
            })
            .collect();
        Arc::new(Self::build(catalog))
    }

    fn build(catalog: BTreeMap<String, CategoryDescriptor>) -> Self {
        Self {
            preselected_updates: AtomicUsize::new(0),
            automation_updates: AtomicUsize::new(0),
            scan_updates: AtomicUsize::new(0),
            preference_updates: AtomicUsize::new(0),
            reloads: AtomicUsize::new(0),
            refreshes: AtomicUsize::new(0),
            accept_updates: AtomicBool::new(true),
            fail_updates: AtomicBool::new(false),
            cached: Mutex::new(CategoryIds::new()),
            last_automation: Mutex::new(None),
            view_fields: Mutex::new(Vec::new()),
            catalog,
        }
    }

    /// Handle exposing every capability this mock implements
    pub fn full_handle(self: &Arc<Self>, name: &str) -> CollaboratorHandle {
        CollaboratorHandle::new(name)
            .with_preselected_sink(self.clone())
            .with_automation_sink(self.clone())
            .with_scan_sink(self.clone())
            .with_preferences_sink(self.clone())
            .with_preselected_source(self.clone())
            .with_reloader(self.clone())
            .with_catalog(self.clone())
            .with_view(self.clone())
    }

    pub fn set_cached<'a>(&self, ids: impl IntoIterator<Item = &'a str>) {
        *self.cached.lock().unwrap() = ids.into_iter().map(String::from).collect();
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn check_failure(&self) -> Result<()> {
        if self.fail_updates.load(Ordering::SeqCst) {
            Err(SettingsError::Collaborator("mock failure".to_string()))
        } else {
            Ok(())
        }
    }
}

impl PreselectedCategoriesSink for MockCollaborator {
    fn update_preselected_categories(&self, ids: &CategoryIds) -> Result<()> {
        self.preselected_updates.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        if self.accept_updates.load(Ordering::SeqCst) {
            *self.cached.lock().unwrap() = ids.clone();
        }
        Ok(())
    }
}

impl AutomationSettingsSink for MockCollaborator {
    fn update_automation_settings(&self, settings: &AutomationSettings) -> Result<()> {
        self.automation_updates.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        *self.last_automation.lock().unwrap() = Some(settings.clone());
        Ok(())
    }
}

impl ScanSettingsSink for MockCollaborator {
    fn apply_scan_settings(&self, _settings: &ScanSettings) -> Result<()> {
        self.scan_updates.fetch_add(1, Ordering::SeqCst);
        self.check_failure()
    }
}

impl PreferencesSink for MockCollaborator {
    fn update_preferences(&self, _prefs: &Preferences) -> Result<()> {
        self.preference_updates.fetch_add(1, Ordering::SeqCst);
        self.check_failure()
    }
}

impl PreselectedCategoriesSource for MockCollaborator {
    fn preselected_categories(&self) -> CategoryIds {
        self.cached.lock().unwrap().clone()
    }
}

impl SettingsReloader for MockCollaborator {
    fn force_settings_reload(&self) -> Result<()> {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl CategoryCatalog for MockCollaborator {
    fn categories(&self) -> BTreeMap<String, CategoryDescriptor> {
        self.catalog.clone()
    }
}

impl ViewRefresher for MockCollaborator {
    fn depends_on(&self, field: SettingsField) -> bool {
        self.view_fields.lock().unwrap().contains(&field)
    }

    fn refresh_view(&self) -> Result<()> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// In-memory persistence that records saves and can be told to fail
#[derive(Default)]
pub struct MemoryPersistence {
    pub stored: Mutex<Option<String>>,
    pub saves: Mutex<Vec<String>>,
    pub fail_saves: AtomicBool,
}

impl MemoryPersistence {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_stored(raw: &str) -> Arc<Self> {
        let persistence = Self::default();
        *persistence.stored.lock().unwrap() = Some(raw.to_string());
        Arc::new(persistence)
    }

    pub fn save_count(&self) -> usize {
        self.saves.lock().unwrap().len()
    }
}

impl SettingsPersistence for MemoryPersistence {
    fn load(&self) -> Result<Option<String>> {
        Ok(self.stored.lock().unwrap().clone())
    }

    fn save(&self, raw: &str) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(SettingsError::Database("disk I/O error".to_string()));
        }
        self.saves.lock().unwrap().push(raw.to_string());
        *self.stored.lock().unwrap() = Some(raw.to_string());
        Ok(())
    }
}
