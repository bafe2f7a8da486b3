//! Shared types and constants for the Switchboard IVR platform.
//!
//! This crate provides the foundational domain types used across all
//! Switchboard crates: intents, audio segments, response templates,
//! variable formats, and cache namespaces.
//!
//! Every other workspace crate depends on this one, and this one depends
//! on no other workspace crate. This keeps the dependency graph clean and
//! prevents circular dependencies.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod audio;
pub mod intent;
pub mod segment;
pub mod template;

pub use audio::AudioStream;
pub use intent::{Classification, Intent, IntentAction, TriggerCriteria};
pub use segment::{Segment, SegmentKind};
pub use template::{Template, TemplateElement};

/// Identifier of one active call session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallId(pub Uuid);

impl CallId {
    /// Generates a fresh call identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Spoken-form canonicalization applied to a variable value before it is
/// turned into a cache key.
///
/// Two surface strings that sound identical under a given format must
/// normalize to the same canonical string, so they share one cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableFormat {
    /// A personal or company name, read naturally.
    Name,
    /// A digit string read digit by digit ("3" and "three" collide).
    SpellDigits,
    /// A monetary amount ("$1,234.5" and "1234.50" collide).
    Amount,
    /// A calendar date, canonicalized to ISO form.
    Date,
}

impl VariableFormat {
    /// Returns the string label used in cache-key namespacing.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::SpellDigits => "spell_digits",
            Self::Amount => "amount",
            Self::Date => "date",
        }
    }

    /// Attempts to parse a label produced by [`VariableFormat::as_str`].
    pub fn from_str_label(s: &str) -> Option<Self> {
        match s {
            "name" => Some(Self::Name),
            "spell_digits" => Some(Self::SpellDigits),
            "amount" => Some(Self::Amount),
            "date" => Some(Self::Date),
            _ => None,
        }
    }
}

/// Cache namespace, part of every cache key.
///
/// Whole-phrase entries and single-value entries share one storage
/// mechanism but must never collide, so the namespace is hashed into the
/// key alongside the agent ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheNamespace {
    /// A fully rendered response phrase.
    Response,
    /// A single synthesized variable value (a name, an amount, a date).
    Variable,
}

impl CacheNamespace {
    /// Returns the string label stored in the cache row.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Response => "response",
            Self::Variable => "variable",
        }
    }

    /// Attempts to parse a label produced by [`CacheNamespace::as_str`].
    pub fn from_str_label(s: &str) -> Option<Self> {
        match s {
            "response" => Some(Self::Response),
            "variable" => Some(Self::Variable),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variable_format_labels_round_trip() {
        for format in [
            VariableFormat::Name,
            VariableFormat::SpellDigits,
            VariableFormat::Amount,
            VariableFormat::Date,
        ] {
            assert_eq!(VariableFormat::from_str_label(format.as_str()), Some(format));
        }
        assert_eq!(VariableFormat::from_str_label("phone"), None);
    }

    #[test]
    fn cache_namespace_labels_round_trip() {
        for ns in [CacheNamespace::Response, CacheNamespace::Variable] {
            assert_eq!(CacheNamespace::from_str_label(ns.as_str()), Some(ns));
        }
        assert_eq!(CacheNamespace::from_str_label("segment"), None);
    }
}
