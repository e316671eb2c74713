//! Turns a raw model reply into a typed record, or a classified fallback.
//!
//! Extraction never fails: a reply that is not valid structured data degrades
//! to keyword classification so callers always get something to act on, with
//! the trust level carried in the outcome.

use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Terms whose presence in prose suggests damage.
const DAMAGE_VOCABULARY: &[&str] = &[
    "water", "crack", "hole", "dent", "scratch", "stain", "peel", "mold", "broken", "chip",
    "wear", "damage",
];

/// Overrides any vocabulary match.
const NEGATION_PHRASE: &str = "no damage";

/// Result of extracting one reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome<T> {
    Structured(T),
    Heuristic { damage_found: bool, message: String },
}

impl<T> ParseOutcome<T> {
    pub fn is_structured(&self) -> bool {
        matches!(self, Self::Structured(_))
    }

    pub fn structured(self) -> Option<T> {
        match self {
            Self::Structured(value) => Some(value),
            Self::Heuristic { .. } => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ParseOutcome<U> {
        match self {
            Self::Structured(value) => ParseOutcome::Structured(f(value)),
            Self::Heuristic {
                damage_found,
                message,
            } => ParseOutcome::Heuristic {
                damage_found,
                message,
            },
        }
    }
}

/// Extract a typed record from a model reply.
pub fn extract<T: DeserializeOwned>(raw_text: &str) -> ParseOutcome<T> {
    let body = strip_fence(raw_text);
    match serde_json::from_str::<T>(body) {
        Ok(record) => ParseOutcome::Structured(record),
        Err(e) => {
            tracing::debug!(error = %e, len = raw_text.len(), "reply not structured, classifying");
            ParseOutcome::Heuristic {
                damage_found: classify_damage(raw_text),
                message: raw_text.to_string(),
            }
        }
    }
}

/// Remove an optional fenced block wrapper and its format tag.
///
/// Only the first fenced block is kept; text around it is dropped.
pub fn strip_fence(raw_text: &str) -> &str {
    let trimmed = raw_text.trim();
    let Some(open) = trimmed.find("```") else {
        return trimmed;
    };
    let inner = &trimmed[open + 3..];
    let inner = match inner.find("```") {
        Some(close) => &inner[..close],
        None => inner,
    };

    // A format tag is a single word directly after the opening fence.
    let (first_line, rest) = match inner.find('\n') {
        Some(i) => (&inner[..i], &inner[i + 1..]),
        None => (inner, ""),
    };
    let tag = first_line.trim();
    if !tag.is_empty() && tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        rest.trim()
    } else {
        inner.trim()
    }
}

/// Keyword classification of free text.
pub fn classify_damage(text: &str) -> bool {
    let lower = text.to_lowercase();
    if lower.contains(NEGATION_PHRASE) {
        return false;
    }
    DAMAGE_VOCABULARY.iter().any(|term| lower.contains(term))
}

/// Deserialize each element independently, skipping the ones that fail.
pub fn parse_array_lenient<T: for<'de> Deserialize<'de>>(value: &serde_json::Value) -> Vec<T> {
    match value.as_array() {
        Some(arr) => arr
            .iter()
            .filter_map(|item| match serde_json::from_value(item.clone()) {
                Ok(v) => Some(v),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping malformed list item");
                    None
                }
            })
            .collect(),
        None => Vec::new(),
    }
}
