//! Read-back verification after a broadcast
//!
//! Every collaborator that exposes a read accessor for a field is asked for
//! its cached copy, which is compared to the canonical value with the same
//! rule the change detector uses.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::services::change_detector::ChangeDetector;
use crate::services::collaborators::{call_guarded, CollaboratorRegistry};
use crate::types::{SettingsDocument, SettingsField, SettingsValue};

/// Result of verifying one field
#[derive(Debug, Clone, PartialEq)]
pub struct ConvergenceReport {
    pub field: SettingsField,
    pub converged: bool,
    /// Collaborator name -> value it currently holds
    pub observed: BTreeMap<String, SettingsValue>,
    /// Collaborators whose read accessor failed; always stale
    pub unreadable: Vec<String>,
}

impl ConvergenceReport {
    /// Names of collaborators whose view disagrees with the expected value
    pub fn stale_collaborators(&self, expected: &SettingsValue) -> Vec<String> {
        self.observed
            .iter()
            .filter(|(_, value)| ChangeDetector::has_changed(expected, value))
            .map(|(name, _)| name.clone())
            .chain(self.unreadable.iter().cloned())
            .collect()
    }
}

pub struct ConvergenceVerifier {
    registry: Arc<CollaboratorRegistry>,
}

impl ConvergenceVerifier {
    pub fn new(registry: Arc<CollaboratorRegistry>) -> Self {
        Self { registry }
    }

    pub fn verify(&self, field: SettingsField, expected: &SettingsValue) -> ConvergenceReport {
        let (observed, unreadable) = self.observe(field);

        let converged = unreadable.is_empty()
            && observed
                .values()
                .all(|value| !ChangeDetector::has_changed(expected, value));

        let report = ConvergenceReport {
            field,
            converged,
            observed,
            unreadable,
        };

        if report.converged {
            debug!("{} converged across {} reader(s)", field, report.observed.len());
        } else {
            info!(
                "{} not converged, stale collaborators: {:?}",
                field,
                report.stale_collaborators(expected)
            );
        }

        report
    }

    /// Verify several fields against one document snapshot
    pub fn verify_all(
        &self,
        fields: &[SettingsField],
        doc: &SettingsDocument,
    ) -> Vec<ConvergenceReport> {
        fields
            .iter()
            .map(|field| self.verify(*field, &doc.value_of(*field)))
            .collect()
    }

    /// Read each collaborator's cached view of `field`
    fn observe(&self, field: SettingsField) -> (BTreeMap<String, SettingsValue>, Vec<String>) {
        let mut observed = BTreeMap::new();
        let mut unreadable = Vec::new();

        for (_, handle) in self.registry.present() {
            let source = match field {
                SettingsField::TaskPreselectedCategories => handle.preselected_source(),
                // No collaborator exposes a read accessor for the other fields
                SettingsField::Preferences
                | SettingsField::ScanSettings
                | SettingsField::AutomationSettings
                | SettingsField::CategoryExclusions => None,
            };
            let Some(source) = source else {
                continue;
            };

            match call_guarded(handle.name(), || source.preselected_categories()) {
                Ok(ids) => {
                    observed.insert(
                        handle.name().to_string(),
                        SettingsValue::TaskPreselectedCategories(ids),
                    );
                }
                Err(e) => {
                    warn!("Could not read {} back: {}", field, e);
                    unreadable.push(handle.name().to_string());
                }
            }
        }

        (observed, unreadable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::collaborators::{
        CollaboratorHandle, CollaboratorRole, PreselectedCategoriesSource,
    };
    use crate::services::testing::MockCollaborator;
    use crate::types::CategoryIds;

    struct PanickingSource;

    impl PreselectedCategoriesSource for PanickingSource {
        fn preselected_categories(&self) -> CategoryIds {
            panic!("index not loaded");
        }
    }

    #[test]
    fn test_panicking_reader_is_stale() {
        let registry = Arc::new(CollaboratorRegistry::new());
        let index = MockCollaborator::new();
        index.set_cached(["tasks"]);
        registry.register(CollaboratorRole::EmailIndex, index.full_handle("index"));
        registry.register(
            CollaboratorRole::CategoryRegistry,
            CollaboratorHandle::new("categories").with_preselected_source(Arc::new(PanickingSource)),
        );

        let verifier = ConvergenceVerifier::new(registry);
        let expected = SettingsValue::preselected(["tasks"]);
        let report = verifier.verify(SettingsField::TaskPreselectedCategories, &expected);

        assert!(!report.converged);
        assert_eq!(report.observed.len(), 1);
        assert_eq!(report.unreadable, vec!["categories".to_string()]);
        assert_eq!(report.stale_collaborators(&expected), vec!["categories".to_string()]);
    }

    #[test]
    fn test_converged_when_every_reader_matches() {
        let registry = Arc::new(CollaboratorRegistry::new());
        let index = MockCollaborator::new();
        let categories = MockCollaborator::new();
        index.set_cached(["tasks", "finance"]);
        categories.set_cached(["finance", "tasks"]);
        registry.register(CollaboratorRole::EmailIndex, index.full_handle("index"));
        registry.register(
            CollaboratorRole::CategoryRegistry,
            CollaboratorHandle::new("categories").with_preselected_source(categories.clone()),
        );

        let verifier = ConvergenceVerifier::new(registry);
        let report = verifier.verify(
            SettingsField::TaskPreselectedCategories,
            &SettingsValue::preselected(["finance", "tasks"]),
        );

        assert!(report.converged);
        assert_eq!(report.observed.len(), 2);
    }

    #[test]
    fn test_stale_reader_is_reported() {
        let registry = Arc::new(CollaboratorRegistry::new());
        let index = MockCollaborator::new();
        index.set_cached(["tasks"]);
        registry.register(CollaboratorRole::EmailIndex, index.full_handle("index"));

        let verifier = ConvergenceVerifier::new(registry);
        let expected = SettingsValue::preselected(["tasks", "meetings"]);
        let report = verifier.verify(SettingsField::TaskPreselectedCategories, &expected);

        assert!(!report.converged);
        assert_eq!(
            report.observed.get("index"),
            Some(&SettingsValue::preselected(["tasks"]))
        );
        assert_eq!(report.stale_collaborators(&expected), vec!["index".to_string()]);
    }

    #[test]
    fn test_fields_without_readers_trivially_converge() {
        let registry = Arc::new(CollaboratorRegistry::new());
        let index = MockCollaborator::new();
        registry.register(CollaboratorRole::EmailIndex, index.full_handle("index"));

        let verifier = ConvergenceVerifier::new(registry);
        let doc = SettingsDocument::default();
        let reports = verifier.verify_all(
            &[SettingsField::AutomationSettings, SettingsField::ScanSettings],
            &doc,
        );

        assert!(reports.iter().all(|r| r.converged && r.observed.is_empty()));
    }
}
