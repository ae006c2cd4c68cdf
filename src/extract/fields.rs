use serde_json::{Map, Value};

/// JSON keys probed for an identifier, highest priority first.
pub const JSON_ID_FIELDS: &[&str] = &[
    "itemId",
    "id",
    "equipmentId",
    "assetId",
    "serialNumber",
    "code",
    "barcode",
];

/// URL query parameters probed for an identifier, highest priority first.
/// Matched case-sensitively.
pub const URL_ID_PARAMS: &[&str] = &["itemId", "id", "equipmentId", "assetId", "code"];

/// Scan `object` for the first candidate field holding a non-empty value.
///
/// Each candidate matches its exact key first, then any key equal to it
/// ignoring ASCII case and `_` separators (`item_id`, `ITEMID`).
pub fn first_id_field(object: &Map<String, Value>) -> Option<String> {
    JSON_ID_FIELDS.iter().find_map(|field| {
        let exact = object.get(*field).and_then(scalar_text);
        exact.or_else(|| {
            let wanted = normalize_key(field);
            object
                .iter()
                .filter(|(key, _)| key.as_str() != *field && normalize_key(key) == wanted)
                .find_map(|(_, value)| scalar_text(value))
        })
    })
}

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Trimmed text form of a scalar; `None` for null, containers, or blanks.
fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => return None,
    };

    (!text.is_empty()).then_some(text)
}
