pub mod error;
pub mod events;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use self::error::SettingsError;

/// Schema version written with every persisted document.
/// Documents without a version use the legacy unversioned layout (0).
pub const SETTINGS_VERSION: u32 = 1;

/// Set of category identifiers. Ordered so serialization is canonical.
pub type CategoryIds = BTreeSet<String>;

/// Display options keyed by preference name
pub type Preferences = BTreeMap<String, PreferenceValue>;

/// Automation toggles keyed by automation name
pub type AutomationSettings = BTreeMap<String, bool>;

/// A single display preference: either an on/off flag or an enum choice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PreferenceValue {
    Flag(bool),
    Choice(String),
}

/// Mailbox scan preferences
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSettings {
    /// How far back a scan looks, in days
    #[serde(default = "default_scan_period")]
    pub period_days: u32,

    /// Folder to scan
    #[serde(default = "default_scan_folder")]
    pub folder: String,

    /// Analyze new mail automatically after a scan
    #[serde(default)]
    pub auto_analyze: bool,

    /// Categorize new mail automatically after a scan
    #[serde(default)]
    pub auto_categorize: bool,
}

fn default_scan_period() -> u32 {
    7
}

fn default_scan_folder() -> String {
    "INBOX".to_string()
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            period_days: default_scan_period(),
            folder: default_scan_folder(),
            auto_analyze: false,
            auto_categorize: false,
        }
    }
}

/// Senders that must never be categorized
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryExclusions {
    #[serde(default)]
    pub excluded_domains: BTreeSet<String>,
    #[serde(default)]
    pub excluded_emails: BTreeSet<String>,
}

/// The single logical settings document.
///
/// Owned by the settings store; everything else works on clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsDocument {
    /// Missing on documents written before versioning existed
    #[serde(default)]
    pub version: u32,

    #[serde(default)]
    pub preferences: Preferences,

    #[serde(default)]
    pub scan_settings: ScanSettings,

    #[serde(default)]
    pub automation_settings: AutomationSettings,

    #[serde(default)]
    pub task_preselected_categories: CategoryIds,

    #[serde(default)]
    pub category_exclusions: CategoryExclusions,
}

impl Default for SettingsDocument {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            preferences: Preferences::new(),
            scan_settings: ScanSettings::default(),
            automation_settings: AutomationSettings::new(),
            task_preselected_categories: CategoryIds::new(),
            category_exclusions: CategoryExclusions::default(),
        }
    }
}

impl SettingsDocument {
    /// Parse a persisted or imported document, migrating older layouts.
    ///
    /// Any shape problem is reported as `MalformedInput`; nothing is partially applied.
    pub fn from_json(raw: &str) -> Result<Self, SettingsError> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        Self::from_value(value)
    }

    pub fn from_value(mut value: serde_json::Value) -> Result<Self, SettingsError> {
        let object = value.as_object_mut().ok_or_else(|| {
            SettingsError::MalformedInput("settings must be a JSON object".to_string())
        })?;

        let version = match object.get("version") {
            None => 0,
            Some(v) => v
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| {
                    SettingsError::MalformedInput(format!("invalid settings version: {}", v))
                })?,
        };

        if version > SETTINGS_VERSION {
            return Err(SettingsError::MalformedInput(format!(
                "settings version {} is newer than supported version {}",
                version, SETTINGS_VERSION
            )));
        }

        if !SettingsField::ALL
            .iter()
            .any(|field| object.contains_key(field.as_str()))
        {
            return Err(SettingsError::MalformedInput(
                "no settings fields found".to_string(),
            ));
        }

        // v0 -> v1: same shape, the version field is simply stamped
        object.insert("version".to_string(), SETTINGS_VERSION.into());

        Ok(serde_json::from_value(value)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, SettingsError> {
        serde_json::to_string_pretty(self).map_err(|e| SettingsError::Other(e.to_string()))
    }

    /// Extract the current value of one field
    pub fn value_of(&self, field: SettingsField) -> SettingsValue {
        match field {
            SettingsField::Preferences => SettingsValue::Preferences(self.preferences.clone()),
            SettingsField::ScanSettings => SettingsValue::ScanSettings(self.scan_settings.clone()),
            SettingsField::AutomationSettings => {
                SettingsValue::AutomationSettings(self.automation_settings.clone())
            }
            SettingsField::TaskPreselectedCategories => {
                SettingsValue::TaskPreselectedCategories(self.task_preselected_categories.clone())
            }
            SettingsField::CategoryExclusions => {
                SettingsValue::CategoryExclusions(self.category_exclusions.clone())
            }
        }
    }

    /// Overwrite one field with a new value
    pub fn apply(&mut self, value: SettingsValue) {
        match value {
            SettingsValue::Preferences(v) => self.preferences = v,
            SettingsValue::ScanSettings(v) => self.scan_settings = v,
            SettingsValue::AutomationSettings(v) => self.automation_settings = v,
            SettingsValue::TaskPreselectedCategories(v) => self.task_preselected_categories = v,
            SettingsValue::CategoryExclusions(v) => self.category_exclusions = v,
        }
    }
}

/// Fields of the settings document that are synchronized to collaborators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SettingsField {
    Preferences,
    ScanSettings,
    AutomationSettings,
    TaskPreselectedCategories,
    CategoryExclusions,
}

impl SettingsField {
    pub const ALL: [SettingsField; 5] = [
        SettingsField::Preferences,
        SettingsField::ScanSettings,
        SettingsField::AutomationSettings,
        SettingsField::TaskPreselectedCategories,
        SettingsField::CategoryExclusions,
    ];

    /// Name used in the persisted layout and in notification keys
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preferences => "preferences",
            Self::ScanSettings => "scanSettings",
            Self::AutomationSettings => "automationSettings",
            Self::TaskPreselectedCategories => "taskPreselectedCategories",
            Self::CategoryExclusions => "categoryExclusions",
        }
    }

    /// Fields whose change affects categorization
    pub fn is_category_field(&self) -> bool {
        matches!(
            self,
            Self::TaskPreselectedCategories | Self::CategoryExclusions
        )
    }
}

impl std::fmt::Display for SettingsField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value for exactly one settings field.
///
/// Serializes as the bare payload, so the serialized form of a set-valued
/// field is already canonical (sorted, deduplicated).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SettingsValue {
    Preferences(Preferences),
    ScanSettings(ScanSettings),
    AutomationSettings(AutomationSettings),
    TaskPreselectedCategories(CategoryIds),
    CategoryExclusions(CategoryExclusions),
}

impl SettingsValue {
    /// Build a preselected-categories value from raw user input (any order, duplicates allowed)
    pub fn preselected<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::TaskPreselectedCategories(ids.into_iter().map(Into::into).collect())
    }

    pub fn field(&self) -> SettingsField {
        match self {
            Self::Preferences(_) => SettingsField::Preferences,
            Self::ScanSettings(_) => SettingsField::ScanSettings,
            Self::AutomationSettings(_) => SettingsField::AutomationSettings,
            Self::TaskPreselectedCategories(_) => SettingsField::TaskPreselectedCategories,
            Self::CategoryExclusions(_) => SettingsField::CategoryExclusions,
        }
    }

    /// Canonical serialization of the payload
    pub fn canonical_json(&self) -> String {
        // Every payload is built from ordered maps and sets, so this cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Descriptor published by the category registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryDescriptor {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unversioned_document_is_migrated() {
        let raw = r#"{
            "preferences": {"darkMode": true, "density": "compact"},
            "taskPreselectedCategories": ["tasks", "finance", "tasks"]
        }"#;

        let doc = SettingsDocument::from_json(raw).unwrap();
        assert_eq!(doc.version, SETTINGS_VERSION);
        assert_eq!(
            doc.preferences.get("darkMode"),
            Some(&PreferenceValue::Flag(true))
        );
        assert_eq!(
            doc.preferences.get("density"),
            Some(&PreferenceValue::Choice("compact".to_string()))
        );
        assert_eq!(
            doc.task_preselected_categories.iter().collect::<Vec<_>>(),
            vec!["finance", "tasks"]
        );
        assert_eq!(doc.scan_settings, ScanSettings::default());
    }

    #[test]
    fn test_newer_version_rejected() {
        let err = SettingsDocument::from_json(r#"{"version": 99}"#).unwrap_err();
        assert!(matches!(err, SettingsError::MalformedInput(_)));
    }

    #[test]
    fn test_wrong_shape_rejected() {
        assert!(matches!(
            SettingsDocument::from_json("[1, 2, 3]"),
            Err(SettingsError::MalformedInput(_))
        ));
        assert!(matches!(
            SettingsDocument::from_json(r#"{"taskPreselectedCategories": "tasks"}"#),
            Err(SettingsError::MalformedInput(_))
        ));
        assert!(matches!(
            SettingsDocument::from_json(r#"{"automationSettings": {"autoArchive": "yes"}}"#),
            Err(SettingsError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_document_without_known_fields_rejected() {
        for raw in ["{}", r#"{"version": 1}"#, r#"{"foo": 1, "darkMode": true}"#] {
            assert!(
                matches!(
                    SettingsDocument::from_json(raw),
                    Err(SettingsError::MalformedInput(_))
                ),
                "{} should be rejected",
                raw
            );
        }
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let doc = SettingsDocument::from_json(r#"{"scanSettings": {}}"#).unwrap();
        assert_eq!(doc.task_preselected_categories.len(), 0);
        assert_eq!(doc.scan_settings, ScanSettings::default());
    }

    #[test]
    fn test_document_roundtrip_uses_camel_case() {
        let mut doc = SettingsDocument::default();
        doc.task_preselected_categories.insert("tasks".to_string());

        let json = serde_json::to_value(&doc).unwrap();
        assert!(json.get("taskPreselectedCategories").is_some());
        assert!(json.get("categoryExclusions").unwrap().get("excludedDomains").is_some());
    }

    #[test]
    fn test_value_of_and_apply() {
        let mut doc = SettingsDocument::default();
        doc.apply(SettingsValue::preselected(["meetings", "tasks"]));

        assert_eq!(
            doc.value_of(SettingsField::TaskPreselectedCategories),
            SettingsValue::preselected(["tasks", "meetings"])
        );
    }

    #[test]
    fn test_canonical_json_ignores_input_order() {
        let a = SettingsValue::preselected(["finance", "tasks"]);
        let b = SettingsValue::preselected(["tasks", "finance", "finance"]);
        assert_eq!(a.canonical_json(), b.canonical_json());
        assert_eq!(a.canonical_json(), r#"["finance","tasks"]"#);
    }
}
