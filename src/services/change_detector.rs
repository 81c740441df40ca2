//! Change detection for settings fields
//!
//! Set-valued fields are compared after canonicalization (dedup + sort), so
//! the order in which a user's input lists category ids never registers as a
//! change. Everything else uses structural equality.

use crate::types::SettingsValue;

/// Sort and deduplicate a sequence of ids
pub fn canonicalize<I, S>(ids: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = ids.into_iter().map(|s| s.as_ref().to_string()).collect();
    out.sort();
    out.dedup();
    out
}

/// Compare two raw id sequences as sets
pub fn ids_changed<A, B, S, T>(old: A, new: B) -> bool
where
    A: IntoIterator<Item = S>,
    B: IntoIterator<Item = T>,
    S: AsRef<str>,
    T: AsRef<str>,
{
    canonicalize(old) != canonicalize(new)
}

pub struct ChangeDetector;

impl ChangeDetector {
    /// Whether `new` differs from `old`.
    ///
    /// Values for different fields always count as changed.
    pub fn has_changed(old: &SettingsValue, new: &SettingsValue) -> bool {
        match (old, new) {
            (
                SettingsValue::TaskPreselectedCategories(a),
                SettingsValue::TaskPreselectedCategories(b),
            ) => ids_changed(a, b),
            (SettingsValue::CategoryExclusions(a), SettingsValue::CategoryExclusions(b)) => {
                ids_changed(&a.excluded_domains, &b.excluded_domains)
                    || ids_changed(&a.excluded_emails, &b.excluded_emails)
            }
            (SettingsValue::Preferences(a), SettingsValue::Preferences(b)) => a != b,
            (SettingsValue::ScanSettings(a), SettingsValue::ScanSettings(b)) => a != b,
            (SettingsValue::AutomationSettings(a), SettingsValue::AutomationSettings(b)) => a != b,
            _ => true,
        }
    }
}
