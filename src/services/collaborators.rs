//! Collaborator registry and capability interfaces
//!
//! A collaborator is an external module that keeps a private copy of part of
//! the settings document. Each one is registered under a fixed role and
//! exposes any subset of the capabilities below. Absence of a role, or of a
//! capability on a registered role, is never an error: callers get `Absent`
//! or `None` and skip the call.

use std::collections::{BTreeMap, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, RwLock};
use tracing::{error, info};

use crate::types::error::{Result, SettingsError};
use crate::types::{
    AutomationSettings, CategoryDescriptor, CategoryIds, Preferences, ScanSettings, SettingsField,
};

/// Accepts new preselected category ids
pub trait PreselectedCategoriesSink: Send + Sync {
    fn update_preselected_categories(&self, ids: &CategoryIds) -> Result<()>;
}

/// Accepts new automation toggles
pub trait AutomationSettingsSink: Send + Sync {
    fn update_automation_settings(&self, settings: &AutomationSettings) -> Result<()>;
}

/// Accepts new scan preferences
pub trait ScanSettingsSink: Send + Sync {
    fn apply_scan_settings(&self, settings: &ScanSettings) -> Result<()>;
}

/// Accepts new display preferences
pub trait PreferencesSink: Send + Sync {
    fn update_preferences(&self, prefs: &Preferences) -> Result<()>;
}

/// Exposes the collaborator's cached preselected categories for verification
pub trait PreselectedCategoriesSource: Send + Sync {
    fn preselected_categories(&self) -> CategoryIds;
}

/// Re-reads settings from scratch
pub trait SettingsReloader: Send + Sync {
    fn force_settings_reload(&self) -> Result<()>;
}

/// Lists the categories known to the application
pub trait CategoryCatalog: Send + Sync {
    fn categories(&self) -> BTreeMap<String, CategoryDescriptor>;

    fn category(&self, id: &str) -> Option<CategoryDescriptor> {
        self.categories().remove(id)
    }
}

/// Re-renders the current view
pub trait ViewRefresher: Send + Sync {
    /// Whether the currently displayed view renders `field`
    fn depends_on(&self, field: SettingsField) -> bool;

    fn refresh_view(&self) -> Result<()>;
}

/// Run one collaborator call, turning a panic into `SettingsError::Collaborator`.
///
/// A panicking collaborator must not unwind through the engine.
pub fn call_guarded<T>(name: &str, call: impl FnOnce() -> T) -> Result<T> {
    panic::catch_unwind(AssertUnwindSafe(call)).map_err(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        error!("Collaborator '{}' panicked: {}", name, message);
        SettingsError::Collaborator(format!("{} panicked: {}", name, message))
    })
}

/// The fixed set of collaborator roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CollaboratorRole {
    EmailIndex,
    AutomationAnalyzer,
    CategoryRegistry,
    PageRenderer,
}

impl CollaboratorRole {
    pub const ALL: [CollaboratorRole; 4] = [
        CollaboratorRole::EmailIndex,
        CollaboratorRole::AutomationAnalyzer,
        CollaboratorRole::CategoryRegistry,
        CollaboratorRole::PageRenderer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmailIndex => "email_index",
            Self::AutomationAnalyzer => "automation_analyzer",
            Self::CategoryRegistry => "category_registry",
            Self::PageRenderer => "page_renderer",
        }
    }
}

impl std::fmt::Display for CollaboratorRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered collaborator and the capabilities it exposes
#[derive(Clone)]
pub struct CollaboratorHandle {
    name: String,
    preselected_sink: Option<Arc<dyn PreselectedCategoriesSink>>,
    automation_sink: Option<Arc<dyn AutomationSettingsSink>>,
    scan_sink: Option<Arc<dyn ScanSettingsSink>>,
    preferences_sink: Option<Arc<dyn PreferencesSink>>,
    preselected_source: Option<Arc<dyn PreselectedCategoriesSource>>,
    reloader: Option<Arc<dyn SettingsReloader>>,
    catalog: Option<Arc<dyn CategoryCatalog>>,
    view: Option<Arc<dyn ViewRefresher>>,
}

impl CollaboratorHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            preselected_sink: None,
            automation_sink: None,
            scan_sink: None,
            preferences_sink: None,
            preselected_source: None,
            reloader: None,
            catalog: None,
            view: None,
        }
    }

    pub fn with_preselected_sink(mut self, sink: Arc<dyn PreselectedCategoriesSink>) -> Self {
        self.preselected_sink = Some(sink);
        self
    }

    pub fn with_automation_sink(mut self, sink: Arc<dyn AutomationSettingsSink>) -> Self {
        self.automation_sink = Some(sink);
        self
    }

    pub fn with_scan_sink(mut self, sink: Arc<dyn ScanSettingsSink>) -> Self {
        self.scan_sink = Some(sink);
        self
    }

    pub fn with_preferences_sink(mut self, sink: Arc<dyn PreferencesSink>) -> Self {
        self.preferences_sink = Some(sink);
        self
    }

    pub fn with_preselected_source(mut self, source: Arc<dyn PreselectedCategoriesSource>) -> Self {
        self.preselected_source = Some(source);
        self
    }

    pub fn with_reloader(mut self, reloader: Arc<dyn SettingsReloader>) -> Self {
        self.reloader = Some(reloader);
        self
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn CategoryCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_view(mut self, view: Arc<dyn ViewRefresher>) -> Self {
        self.view = Some(view);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn preselected_sink(&self) -> Option<&Arc<dyn PreselectedCategoriesSink>> {
        self.preselected_sink.as_ref()
    }

    pub fn automation_sink(&self) -> Option<&Arc<dyn AutomationSettingsSink>> {
        self.automation_sink.as_ref()
    }

    pub fn scan_sink(&self) -> Option<&Arc<dyn ScanSettingsSink>> {
        self.scan_sink.as_ref()
    }

    pub fn preferences_sink(&self) -> Option<&Arc<dyn PreferencesSink>> {
        self.preferences_sink.as_ref()
    }

    pub fn preselected_source(&self) -> Option<&Arc<dyn PreselectedCategoriesSource>> {
        self.preselected_source.as_ref()
    }

    pub fn reloader(&self) -> Option<&Arc<dyn SettingsReloader>> {
        self.reloader.as_ref()
    }

    pub fn catalog(&self) -> Option<&Arc<dyn CategoryCatalog>> {
        self.catalog.as_ref()
    }

    pub fn view(&self) -> Option<&Arc<dyn ViewRefresher>> {
        self.view.as_ref()
    }
}

impl std::fmt::Debug for CollaboratorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollaboratorHandle")
            .field("name", &self.name)
            .field("preselected_sink", &self.preselected_sink.is_some())
            .field("automation_sink", &self.automation_sink.is_some())
            .field("scan_sink", &self.scan_sink.is_some())
            .field("preferences_sink", &self.preferences_sink.is_some())
            .field("preselected_source", &self.preselected_source.is_some())
            .field("reloader", &self.reloader.is_some())
            .field("catalog", &self.catalog.is_some())
            .field("view", &self.view.is_some())
            .finish()
    }
}

/// Result of looking up a role
#[derive(Debug, Clone)]
pub enum CollaboratorSlot {
    Present(CollaboratorHandle),
    Absent,
}

/// Role -> handle map, consulted on every call so late registrations are picked up
#[derive(Default)]
pub struct CollaboratorRegistry {
    slots: RwLock<HashMap<CollaboratorRole, CollaboratorHandle>>,
}

impl CollaboratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the collaborator for a role
    pub fn register(&self, role: CollaboratorRole, handle: CollaboratorHandle) {
        info!("Registering collaborator '{}' as {}", handle.name(), role);
        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        slots.insert(role, handle);
    }

    pub fn unregister(&self, role: CollaboratorRole) -> Option<CollaboratorHandle> {
        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        let removed = slots.remove(&role);
        if let Some(handle) = &removed {
            info!("Unregistered collaborator '{}' from {}", handle.name(), role);
        }
        removed
    }

    pub fn slot(&self, role: CollaboratorRole) -> CollaboratorSlot {
        let slots = self.slots.read().unwrap_or_else(|e| e.into_inner());
        match slots.get(&role) {
            Some(handle) => CollaboratorSlot::Present(handle.clone()),
            None => CollaboratorSlot::Absent,
        }
    }

    /// Every currently registered collaborator, in role order
    pub fn present(&self) -> Vec<(CollaboratorRole, CollaboratorHandle)> {
        CollaboratorRole::ALL
            .iter()
            .filter_map(|role| match self.slot(*role) {
                CollaboratorSlot::Present(handle) => Some((*role, handle)),
                CollaboratorSlot::Absent => None,
            })
            .collect()
    }

    /// Category catalog from the registry role, if it exposes one
    pub fn category_catalog(&self) -> Option<Arc<dyn CategoryCatalog>> {
        match self.slot(CollaboratorRole::CategoryRegistry) {
            CollaboratorSlot::Present(handle) => handle.catalog().cloned(),
            CollaboratorSlot::Absent => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::MockCollaborator;

    #[test]
    fn test_absent_until_registered() {
        let registry = CollaboratorRegistry::new();
        assert!(matches!(
            registry.slot(CollaboratorRole::EmailIndex),
            CollaboratorSlot::Absent
        ));

        let mock = MockCollaborator::new();
        registry.register(
            CollaboratorRole::EmailIndex,
            CollaboratorHandle::new("index").with_preselected_sink(mock.clone()),
        );

        match registry.slot(CollaboratorRole::EmailIndex) {
            CollaboratorSlot::Present(handle) => {
                assert_eq!(handle.name(), "index");
                assert!(handle.preselected_sink().is_some());
                assert!(handle.automation_sink().is_none());
            }
            CollaboratorSlot::Absent => panic!("Expected registered collaborator"),
        }
    }

    #[test]
    fn test_unregister_and_present_order() {
        let registry = CollaboratorRegistry::new();
        registry.register(CollaboratorRole::PageRenderer, CollaboratorHandle::new("page"));
        registry.register(CollaboratorRole::EmailIndex, CollaboratorHandle::new("index"));

        let roles: Vec<_> = registry.present().into_iter().map(|(r, _)| r).collect();
        assert_eq!(
            roles,
            vec![CollaboratorRole::EmailIndex, CollaboratorRole::PageRenderer]
        );

        assert!(registry.unregister(CollaboratorRole::EmailIndex).is_some());
        assert!(registry.unregister(CollaboratorRole::EmailIndex).is_none());
        assert_eq!(registry.present().len(), 1);
    }

    #[test]
    fn test_category_catalog_lookup() {
        let registry = CollaboratorRegistry::new();
        assert!(registry.category_catalog().is_none());

        let mock = MockCollaborator::with_catalog(["tasks", "finance"]);
        registry.register(
            CollaboratorRole::CategoryRegistry,
            CollaboratorHandle::new("categories").with_catalog(mock.clone()),
        );

        let catalog = registry.category_catalog().unwrap();
        assert_eq!(catalog.categories().len(), 2);
        assert_eq!(catalog.category("tasks").unwrap().name, "Tasks");
        assert!(catalog.category("travel").is_none());
    }

    #[test]
    fn test_call_guarded_contains_panics() {
        assert_eq!(call_guarded("ok", || 7).unwrap(), 7);

        let err = call_guarded("broken", || -> u32 { panic!("cache poisoned") }).unwrap_err();
        match err {
            SettingsError::Collaborator(message) => {
                assert!(message.contains("broken"));
                assert!(message.contains("cache poisoned"));
            }
            other => panic!("Expected Collaborator error, got {:?}", other),
        }
    }
}
