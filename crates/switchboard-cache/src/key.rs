//! Cache key normalization and derivation.
//!
//! A cache key is `sha256(agent_id ‖ namespace ‖ normalized_value)` in
//! lowercase hex. Normalization is deterministic and format-aware: two
//! surface strings that sound identical under a given variable format must
//! produce the same canonical string, so they share one cache entry.
//! Variable keys additionally namespace the format itself, so unrelated
//! formats that normalize to the same literal never collide.

use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use switchboard_types::{CacheNamespace, VariableFormat};

/// Lowercases and collapses internal whitespace. The base normalization
/// for whole response phrases.
pub fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            pending_space = !out.is_empty();
        } else {
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            for lower in ch.to_lowercase() {
                out.push(lower);
            }
        }
    }
    out
}

/// Canonicalizes a variable value per its spoken format.
pub fn normalize(value: &str, format: VariableFormat) -> String {
    match format {
        VariableFormat::Name => normalize_name(value),
        VariableFormat::SpellDigits => normalize_spell_digits(value),
        VariableFormat::Amount => normalize_amount(value),
        VariableFormat::Date => normalize_date(value),
    }
}

fn normalize_name(value: &str) -> String {
    let stripped: String = value
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    normalize_text(&stripped)
}

/// English number words that read as single digits.
const DIGIT_WORDS: &[(&str, char)] = &[
    ("zero", '0'),
    ("oh", '0'),
    ("one", '1'),
    ("two", '2'),
    ("three", '3'),
    ("four", '4'),
    ("five", '5'),
    ("six", '6'),
    ("seven", '7'),
    ("eight", '8'),
    ("nine", '9'),
];

fn normalize_spell_digits(value: &str) -> String {
    let lowered = value.to_lowercase();
    let mut digits = String::new();
    for token in lowered.split(|c: char| !c.is_alphanumeric()) {
        if token.is_empty() {
            continue;
        }
        if token.chars().all(|c| c.is_ascii_digit()) {
            digits.push_str(token);
            continue;
        }
        if let Some(&(_, digit)) = DIGIT_WORDS.iter().find(|(word, _)| *word == token) {
            digits.push(digit);
        }
        // Other tokens carry no digit value and are dropped.
    }
    digits
}

fn normalize_amount(value: &str) -> String {
    // Strip currency markers and thousands separators, keep digits and at
    // most one decimal point.
    let mut units = String::new();
    let mut cents = String::new();
    let mut in_cents = false;
    for ch in value.chars() {
        match ch {
            '0'..='9' => {
                if in_cents {
                    cents.push(ch);
                } else {
                    units.push(ch);
                }
            }
            '.' if !in_cents => in_cents = true,
            _ => {}
        }
    }

    let units = units.trim_start_matches('0');
    let units = if units.is_empty() { "0" } else { units };
    cents.truncate(2);
    while cents.len() < 2 {
        cents.push('0');
    }
    format!("{units}.{cents}")
}

/// Date input formats accepted, tried in order. Output is always ISO.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d/%m/%Y",
    "%d.%m.%Y",
    "%d %B %Y",
    "%B %d %Y",
    "%B %d, %Y",
];

fn normalize_date(value: &str) -> String {
    let trimmed = normalize_text(value);
    for format in DATE_FORMATS {
        // Month names are matched case-insensitively by chrono only with
        // the exact case variants; title-case the tokens before parsing.
        if let Ok(date) = NaiveDate::parse_from_str(&title_case(&trimmed), format) {
            return date.format("%Y-%m-%d").to_string();
        }
    }
    // Unparsable dates fall back to plain text normalization, which is
    // still deterministic.
    trimmed
}

fn title_case(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// The text handed to the TTS provider for a variable value.
///
/// Derived from the canonical normalized form so every surface string that
/// shares a cache key also shares one spoken rendition. Spell-digits
/// values are spaced out so the voice reads them digit by digit.
pub fn spoken_form(value: &str, format: VariableFormat) -> String {
    let canonical = normalize(value, format);
    match format {
        VariableFormat::SpellDigits => {
            let mut spaced = String::with_capacity(canonical.len() * 2);
            for (i, ch) in canonical.chars().enumerate() {
                if i > 0 {
                    spaced.push(' ');
                }
                spaced.push(ch);
            }
            spaced
        }
        _ => canonical,
    }
}

fn hash_key(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    let digest = hasher.finalize();
    let mut key = String::with_capacity(64);
    for byte in digest {
        key.push_str(&format!("{byte:02x}"));
    }
    key
}

/// Derives the response-cache key for a whole phrase. The language code is
/// folded in because the same text renders to different audio per language.
pub fn response_key(agent_id: &str, language: &str, text: &str) -> String {
    hash_key(&[
        agent_id,
        CacheNamespace::Response.as_str(),
        language,
        &normalize_text(text),
    ])
}

/// Derives the variable-cache key for a single value under a format.
pub fn variable_key(agent_id: &str, format: VariableFormat, value: &str) -> String {
    hash_key(&[
        agent_id,
        CacheNamespace::Variable.as_str(),
        format.as_str(),
        &normalize(value, format),
    ])
}
