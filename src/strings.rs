use std::collections::HashMap;

use strum::{EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

/// Symbolic keys for every display string the task row shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumString, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum StringKey {
    TooltipComplete,
    TooltipUncomplete,
    TooltipScheduled,
    TooltipStart,
    TooltipDue,
    TooltipTags,
    TooltipDelete,
    TapToSchedule,
    NoStartDate,
    NoDueDate,
    NoTags,
    DeferredBadge,
    StoreFailed,
}

impl StringKey {
    fn english(self) -> &'static str {
        match self {
            StringKey::TooltipComplete => "Mark as complete",
            StringKey::TooltipUncomplete => "Mark as not complete",
            StringKey::TooltipScheduled => "When to work on this",
            StringKey::TooltipStart => "Hide until this date",
            StringKey::TooltipDue => "Due date",
            StringKey::TooltipTags => "Tags",
            StringKey::TooltipDelete => "Delete task",
            StringKey::TapToSchedule => "tap to schedule",
            StringKey::NoStartDate => "no start date",
            StringKey::NoDueDate => "no due date",
            StringKey::NoTags => "no tags",
            StringKey::DeferredBadge => "deferred",
            StringKey::StoreFailed => "Could not save change",
        }
    }
}

/// Keyed lookup from [`StringKey`] to display text. Stateless after construction.
#[derive(Debug, Clone)]
pub struct Strings {
    table: HashMap<StringKey, String>,
}

impl Default for Strings {
    fn default() -> Self {
        let table = StringKey::iter()
            .map(|key| (key, key.english().to_string()))
            .collect();
        Self { table }
    }
}

impl Strings {
    /// English defaults with the given `KEY = "text"` overrides applied.
    /// Unknown keys are skipped with a warning.
    pub fn with_overrides(overrides: &HashMap<String, String>) -> Self {
        let mut strings = Self::default();
        for (name, text) in overrides {
            match name.parse::<StringKey>() {
                Ok(key) => {
                    strings.table.insert(key, text.clone());
                }
                Err(_) => tracing::warn!(key = %name, "ignoring unknown string override"),
            }
        }
        strings
    }

    pub fn get(&self, key: StringKey) -> &str {
        self.table
            .get(&key)
            .map(String::as_str)
            .unwrap_or_else(|| key.english())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_key_has_a_default() {
        let strings = Strings::default();
        for key in StringKey::iter() {
            assert!(!strings.get(key).is_empty(), "{key:?} has no text");
        }
    }

    #[test]
    fn overrides_replace_known_keys_only() {
        let overrides = HashMap::from([
            ("NO_DUE_DATE".to_string(), "sin fecha".to_string()),
            ("NOT_A_KEY".to_string(), "ignored".to_string()),
        ]);
        let strings = Strings::with_overrides(&overrides);
        assert_eq!(strings.get(StringKey::NoDueDate), "sin fecha");
        assert_eq!(strings.get(StringKey::NoStartDate), "no start date");
    }

    #[test]
    fn key_names_are_screaming_snake_case() {
        let name: &'static str = StringKey::TapToSchedule.into();
        assert_eq!(name, "TAP_TO_SCHEDULE");
    }
}
