//! Replacement of sensitive payload fields before they reach a span.

use std::borrow::Cow;

use crate::common::Value;

/// Marker written in place of blacklisted fields when no replacement is
/// configured.
pub const DEFAULT_REPLACEMENT: &str = "__MASKED__";

/// Field-masking rules applied to payload trees before tagging.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Deserialize),
    serde(default, rename_all = "camelCase")
)]
pub struct MaskConfig {
    /// Field names whose values are replaced wherever they appear.
    pub blacklist: Vec<String>,
    /// Match blacklist entries irrespective of ASCII case.
    pub ignore_case: bool,
    /// Text written in place of a masked value.
    pub replacement: String,
}

impl Default for MaskConfig {
    fn default() -> Self {
        MaskConfig {
            blacklist: Vec::new(),
            ignore_case: false,
            replacement: DEFAULT_REPLACEMENT.to_owned(),
        }
    }
}

impl MaskConfig {
    /// Masking rules for the given field names.
    pub fn new<S: Into<String>>(blacklist: impl IntoIterator<Item = S>) -> Self {
        MaskConfig {
            blacklist: blacklist.into_iter().map(Into::into).collect(),
            ..MaskConfig::default()
        }
    }

    /// Toggles case-insensitive matching.
    pub fn with_ignore_case(mut self, ignore_case: bool) -> Self {
        self.ignore_case = ignore_case;
        self
    }

    /// Overrides the replacement marker.
    pub fn with_replacement(mut self, replacement: impl Into<String>) -> Self {
        self.replacement = replacement.into();
        self
    }

    /// Whether any masking would take place.
    pub fn is_active(&self) -> bool {
        !self.blacklist.is_empty()
    }

    pub(crate) fn matches(&self, key: &str) -> bool {
        if self.ignore_case {
            self.blacklist
                .iter()
                .any(|entry| entry.eq_ignore_ascii_case(key))
        } else {
            self.blacklist.iter().any(|entry| entry == key)
        }
    }
}

/// Replaces every field whose key is blacklisted with the configured
/// replacement marker.
///
/// An empty blacklist is the identity: the input is handed back by reference
/// with no clone, and callers may rely on that. Otherwise the result is a
/// structural copy in which matching fields -- at any nesting depth, inside
/// arrays included -- hold the replacement string while every other leaf and
/// container shape is preserved. Timestamp and binary leaves are carried
/// as-is, never descended into. The input is never mutated.
///
/// Owned [`Value`] trees cannot be self-referential, so traversal always
/// terminates; cyclic inputs are a non-goal.
pub fn mask<'a>(value: &'a Value, config: &MaskConfig) -> Cow<'a, Value> {
    if !config.is_active() {
        return Cow::Borrowed(value);
    }

    Cow::Owned(mask_node(value, config))
}

fn mask_node(value: &Value, config: &MaskConfig) -> Value {
    match value {
        Value::Map(entries) => Value::Map(
            entries
                .iter()
                .map(|(key, child)| {
                    let masked = if config.matches(key) {
                        Value::String(config.replacement.clone())
                    } else {
                        mask_node(child, config)
                    };
                    (key.clone(), masked)
                })
                .collect(),
        ),
        Value::Array(items) => {
            Value::Array(items.iter().map(|item| mask_node(item, config)).collect())
        }
        leaf => leaf.clone(),
    }
}
