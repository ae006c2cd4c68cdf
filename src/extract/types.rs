use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Decoded text of a single QR frame, before interpretation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawScanPayload {
    pub text: String,
    pub received_at: DateTime<Utc>,
}

impl RawScanPayload {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            received_at: Utc::now(),
        }
    }
}

/// Which heuristic produced an identifier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdentifierSource {
    SimpleToken,
    JsonField,
    JsonArray,
    UrlParam,
    KeyValue,
    RawFallback,
    None,
}

impl Default for IdentifierSource {
    fn default() -> Self {
        IdentifierSource::None
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedIdentifier {
    pub value: Option<String>,
    pub source: IdentifierSource,
}

impl ExtractedIdentifier {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn found(value: String, source: IdentifierSource) -> Self {
        Self {
            value: Some(value),
            source,
        }
    }

    pub fn is_match(&self) -> bool {
        self.value.is_some()
    }
}
