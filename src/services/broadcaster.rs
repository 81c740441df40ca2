//! Pushes settings slices to collaborators
//!
//! For every role the matching capability is invoked only if the role is
//! registered and exposes it. A missing role or capability is skipped, and a
//! failing collaborator never stops delivery to the others.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::services::collaborators::{
    call_guarded, CollaboratorHandle, CollaboratorRegistry, CollaboratorRole, CollaboratorSlot,
};
use crate::types::error::Result;
use crate::types::{SettingsDocument, SettingsField};

/// Outcome counts for one broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastSummary {
    pub delivered: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BroadcastSummary {
    pub fn merge(&mut self, other: BroadcastSummary) {
        self.delivered += other.delivered;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

pub struct CollaboratorBroadcaster {
    registry: Arc<CollaboratorRegistry>,
}

impl CollaboratorBroadcaster {
    pub fn new(registry: Arc<CollaboratorRegistry>) -> Self {
        Self { registry }
    }

    /// Push the current value of `field` to every collaborator that accepts it
    pub fn broadcast(&self, field: SettingsField, doc: &SettingsDocument) -> BroadcastSummary {
        let mut summary = BroadcastSummary::default();

        for role in CollaboratorRole::ALL {
            let handle = match self.registry.slot(role) {
                CollaboratorSlot::Present(handle) => handle,
                CollaboratorSlot::Absent => {
                    debug!("No {} registered, skipping {}", role, field);
                    summary.skipped += 1;
                    continue;
                }
            };

            match Self::deliver(&handle, field, doc) {
                None => {
                    debug!("{} ({}) does not accept {}", role, handle.name(), field);
                    summary.skipped += 1;
                }
                Some(Ok(())) => {
                    debug!("Delivered {} to {} ({})", field, role, handle.name());
                    summary.delivered += 1;
                }
                Some(Err(e)) => {
                    warn!("Failed to deliver {} to {} ({}): {}", field, role, handle.name(), e);
                    summary.failed += 1;
                }
            }
        }

        summary
    }

    /// Invoke the capability matching `field`, or `None` if the handle lacks it.
    /// A panic inside the collaborator comes back as an error.
    fn deliver(
        handle: &CollaboratorHandle,
        field: SettingsField,
        doc: &SettingsDocument,
    ) -> Option<Result<()>> {
        let name = handle.name();
        match field {
            SettingsField::TaskPreselectedCategories => handle.preselected_sink().map(|sink| {
                call_guarded(name, || {
                    sink.update_preselected_categories(&doc.task_preselected_categories)
                })?
            }),
            SettingsField::AutomationSettings => handle.automation_sink().map(|sink| {
                call_guarded(name, || {
                    sink.update_automation_settings(&doc.automation_settings)
                })?
            }),
            SettingsField::ScanSettings => handle
                .scan_sink()
                .map(|sink| call_guarded(name, || sink.apply_scan_settings(&doc.scan_settings))?),
            SettingsField::Preferences => handle
                .preferences_sink()
                .map(|sink| call_guarded(name, || sink.update_preferences(&doc.preferences))?),
            // Exclusions are read by the categorizer on demand; no push capability exists
            SettingsField::CategoryExclusions => None,
        }
    }

    /// Refresh the page renderer once if its view shows any of `fields`
    pub fn refresh_views(&self, fields: &[SettingsField]) -> bool {
        let CollaboratorSlot::Present(handle) = self.registry.slot(CollaboratorRole::PageRenderer)
        else {
            return false;
        };
        let Some(view) = handle.view() else {
            return false;
        };

        let result = call_guarded(handle.name(), || {
            if fields.iter().any(|f| view.depends_on(*f)) {
                view.refresh_view().map(|()| true)
            } else {
                Ok(false)
            }
        });

        match result {
            Ok(Ok(refreshed)) => refreshed,
            Ok(Err(e)) | Err(e) => {
                warn!("Failed to refresh view: {}", e);
                false
            }
        }
    }

    /// Ask the email index to reload its settings
    pub fn request_reload(&self) -> bool {
        let CollaboratorSlot::Present(handle) = self.registry.slot(CollaboratorRole::EmailIndex)
        else {
            return false;
        };
        let Some(reloader) = handle.reloader() else {
            return false;
        };

        match call_guarded(handle.name(), || reloader.force_settings_reload()) {
            Ok(Ok(())) => true,
            Ok(Err(e)) | Err(e) => {
                warn!("Email index failed to reload settings: {}", e);
                false
            }
        }
    }
}
