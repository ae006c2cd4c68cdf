use std::sync::OnceLock;

use regex::Regex;
use reqwest::Url;
use serde_json::Value;

use super::fields::{first_id_field, URL_ID_PARAMS};
use super::types::{ExtractedIdentifier, IdentifierSource};

/// Host prepended to scheme-less payloads so they parse as URLs.
const URL_PLACEHOLDER_BASE: &str = "http://scan.local/";

const RAW_FALLBACK_MIN_CHARS: usize = 3;
const RAW_FALLBACK_MAX_CHARS: usize = 100;

/// One extraction strategy. `run` returns `None` when the strategy does not
/// apply or finds nothing usable.
pub struct Heuristic {
    pub name: &'static str,
    pub run: fn(&str) -> Option<ExtractedIdentifier>,
}

/// Strategies in priority order. The first one yielding an in-bounds value wins.
pub const HEURISTICS: &[Heuristic] = &[
    Heuristic {
        name: "simple_token",
        run: simple_token,
    },
    Heuristic {
        name: "json",
        run: json_payload,
    },
    Heuristic {
        name: "url_param",
        run: url_param,
    },
    Heuristic {
        name: "key_value",
        run: key_value,
    },
    Heuristic {
        name: "raw_fallback",
        run: raw_fallback,
    },
];

fn simple_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9\-_.]{3,50}$").expect("simple token regex"))
}

fn key_value_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(id|itemid|equipmentid|assetid|code)[=:]\s*([A-Za-z0-9\-_.]+)")
            .expect("key value regex")
    })
}

fn simple_token(text: &str) -> Option<ExtractedIdentifier> {
    let trimmed = text.trim();
    simple_token_re()
        .is_match(trimmed)
        .then(|| ExtractedIdentifier::found(trimmed.to_string(), IdentifierSource::SimpleToken))
}

fn json_payload(text: &str) -> Option<ExtractedIdentifier> {
    let trimmed = text.trim();
    let bracketed = (trimmed.starts_with('{') && trimmed.ends_with('}'))
        || (trimmed.starts_with('[') && trimmed.ends_with(']'));
    if !bracketed {
        return None;
    }

    let parsed: Value = serde_json::from_str(trimmed).ok()?;
    match parsed {
        Value::Object(object) => first_id_field(&object)
            .map(|value| ExtractedIdentifier::found(value, IdentifierSource::JsonField)),
        Value::Array(items) => {
            let value = match items.first()? {
                Value::String(s) => {
                    let s = s.trim();
                    (!s.is_empty()).then(|| s.to_string())
                }
                Value::Object(object) => first_id_field(object),
                _ => None,
            }?;
            Some(ExtractedIdentifier::found(value, IdentifierSource::JsonArray))
        }
        _ => None,
    }
}

fn url_param(text: &str) -> Option<ExtractedIdentifier> {
    let trimmed = text.trim();
    if !trimmed.contains('?') {
        return None;
    }

    let candidate = if trimmed.starts_with("http") {
        trimmed.to_string()
    } else {
        format!("{URL_PLACEHOLDER_BASE}{trimmed}")
    };
    let url = Url::parse(&candidate).ok()?;

    URL_ID_PARAMS.iter().find_map(|param| {
        url.query_pairs()
            .find(|(key, _)| key == param)
            .map(|(_, value)| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(|value| ExtractedIdentifier::found(value, IdentifierSource::UrlParam))
    })
}

fn key_value(text: &str) -> Option<ExtractedIdentifier> {
    let captures = key_value_re().captures(text)?;
    let value = captures.get(2)?.as_str();
    Some(ExtractedIdentifier::found(
        value.to_string(),
        IdentifierSource::KeyValue,
    ))
}

fn raw_fallback(text: &str) -> Option<ExtractedIdentifier> {
    let trimmed = text.trim();
    let len = trimmed.chars().count();
    if !(RAW_FALLBACK_MIN_CHARS..=RAW_FALLBACK_MAX_CHARS).contains(&len) {
        return None;
    }

    let allowed = trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') || c.is_whitespace());
    allowed.then(|| ExtractedIdentifier::found(trimmed.to_string(), IdentifierSource::RawFallback))
}
