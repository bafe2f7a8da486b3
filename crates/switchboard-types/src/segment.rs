//! Reusable audio segment definitions.
//!
//! A segment is a pre-rendered atomic audio/text unit used inside
//! templates. Segments are immutable once published: an edit inserts a new
//! version row, so a call that resolved a segment at render start never
//! sees its content change mid-call.

use serde::{Deserialize, Serialize};

/// Position a segment is designed to occupy inside a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    /// Opens a response ("Your balance is").
    Prefix,
    /// Closes a response ("Is there anything else?").
    Suffix,
    /// Joins two slots ("due on").
    Connector,
    /// A complete phrase on its own.
    Standalone,
}

impl SegmentKind {
    /// Returns the string label stored in the segment row.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Prefix => "prefix",
            Self::Suffix => "suffix",
            Self::Connector => "connector",
            Self::Standalone => "standalone",
        }
    }

    /// Attempts to parse a label produced by [`SegmentKind::as_str`].
    pub fn from_str_label(s: &str) -> Option<Self> {
        match s {
            "prefix" => Some(Self::Prefix),
            "suffix" => Some(Self::Suffix),
            "connector" => Some(Self::Connector),
            "standalone" => Some(Self::Standalone),
            _ => None,
        }
    }
}

/// A language-tagged, versioned, pre-rendered audio unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Logical key shared by all language/version variants.
    pub key: String,
    /// Template position this segment is designed for.
    pub kind: SegmentKind,
    /// Source text of the rendered audio.
    pub text: String,
    /// BCP 47 language code (e.g. "en-US", "tr-TR").
    pub language: String,
    /// Path of the rendered audio blob, relative to the audio directory.
    pub audio_path: String,
    /// Playback duration in milliseconds.
    pub duration_ms: i64,
    /// Publication version; readers resolve the highest version.
    pub version: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_kind_labels_round_trip() {
        for kind in [
            SegmentKind::Prefix,
            SegmentKind::Suffix,
            SegmentKind::Connector,
            SegmentKind::Standalone,
        ] {
            assert_eq!(SegmentKind::from_str_label(kind.as_str()), Some(kind));
        }
        assert_eq!(SegmentKind::from_str_label("infix"), None);
    }
}
