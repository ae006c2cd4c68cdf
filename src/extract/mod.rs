//! Best-guess equipment identifier extraction from decoded QR text.
//!
//! QR tags in the field are inconsistent: some encode a bare ID, others a
//! JSON blob, a deep link, or a `key=value` label. [`extract`] runs a fixed,
//! ordered list of heuristics and returns the first usable result. It is a
//! total function: every input, however malformed, yields a value.

pub mod fields;
pub mod heuristics;
pub mod types;

pub use types::{ExtractedIdentifier, IdentifierSource, RawScanPayload};

use heuristics::HEURISTICS;

/// Upper bound on any extracted identifier, in characters.
pub const MAX_IDENTIFIER_CHARS: usize = 100;

/// Extract an identifier from raw QR text.
///
/// A heuristic whose candidate is empty or longer than
/// [`MAX_IDENTIFIER_CHARS`] counts as non-matching and the next one is tried.
pub fn extract(raw_text: &str) -> ExtractedIdentifier {
    HEURISTICS
        .iter()
        .find_map(|heuristic| (heuristic.run)(raw_text).filter(within_bounds))
        .unwrap_or_else(ExtractedIdentifier::none)
}

/// Convenience wrapper for a full frame payload.
pub fn extract_payload(payload: &RawScanPayload) -> ExtractedIdentifier {
    extract(&payload.text)
}

/// Heuristic names in the order they are attempted.
pub fn heuristic_order() -> Vec<&'static str> {
    HEURISTICS.iter().map(|heuristic| heuristic.name).collect()
}

fn within_bounds(found: &ExtractedIdentifier) -> bool {
    found
        .value
        .as_deref()
        .map(|value| (1..=MAX_IDENTIFIER_CHARS).contains(&value.chars().count()))
        .unwrap_or(false)
}
