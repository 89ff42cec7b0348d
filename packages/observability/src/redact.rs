//! Credential redaction applied to every log line before it is written.

use serde_json::{Map, Value};
#[cfg(test)]
use std::collections::HashMap;

const REDACTED: &str = "[REDACTED]";

/// Field names whose values are never written, matched as substrings.
const DENYLIST_KEYS: &[&str] = &[
    "token",
    "secret",
    "password",
    "authorization",
    "cookie",
];

#[cfg(test)]
pub(crate) fn sanitize_fields(fields: HashMap<String, Value>) -> HashMap<String, Value> {
    fields
        .into_iter()
        .map(|(k, v)| {
            let clean = sanitize_value(&k, &v);
            (k, clean)
        })
        .collect()
}

pub(crate) fn sanitize_message(raw: String) -> String {
    raw.split(' ')
        .map(|word| {
            if looks_like_signed_token(word) {
                REDACTED
            } else {
                word
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn sanitize_value(key: &str, value: &Value) -> Value {
    if is_sensitive_key(key) {
        return Value::String(REDACTED.to_string());
    }

    match value {
        Value::String(s) => sanitize_string(s),
        Value::Object(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                out.insert(k.clone(), sanitize_value(k, v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| sanitize_value(key, item))
                .collect::<Vec<_>>(),
        ),
        _ => value.clone(),
    }
}

fn sanitize_string(raw: &str) -> Value {
    if raw.to_ascii_lowercase().starts_with("bearer ") || looks_like_signed_token(raw) {
        return Value::String(REDACTED.to_string());
    }
    Value::String(raw.to_string())
}

/// Three dot-separated segments of reasonable length is how every access
/// token we handle looks.
fn looks_like_signed_token(raw: &str) -> bool {
    raw.len() > 40
        && raw.matches('.').count() == 2
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' || c == '=')
}

fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    DENYLIST_KEYS.iter().any(|entry| lower.contains(entry))
}
