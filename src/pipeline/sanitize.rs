//! Recursive value sanitizer
//!
//! Sanitization only narrows values and never fails; rejecting malformed
//! input is left to the validator.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Number, Value};
use url::Url;

use crate::schema::{FieldDefinition, FieldKind};

const ALLOWED_URL_SCHEMES: &[&str] = &["http", "https", "ftp", "ftps", "mailto", "tel"];

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[A-Za-z/!?][^>]*(?:>|$)").expect("valid regex"));

static OCTET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"%[A-Fa-f0-9]{2}").expect("valid regex"));

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\r\n\t ]+").expect("valid regex"));

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[A-Za-z0-9!#$%&'*+/=?^_`{|}~.-]+@[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?)+$",
    )
    .expect("valid regex")
});

/// Clean a single line of user text.
///
/// Markup is stripped, stray `<` is entity-encoded, percent-encoded octets
/// are removed, whitespace runs collapse to one space and the result is
/// trimmed. Applying it twice gives the same result as applying it once.
#[must_use]
pub fn clean_text(input: &str) -> String {
    let mut text: String = input
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'))
        .collect();
    if text.contains('<') {
        text = TAG_RE.replace_all(&text, "").replace('<', "&lt;");
    }
    while OCTET_RE.is_match(&text) {
        text = OCTET_RE.replace_all(&text, "").into_owned();
    }
    WHITESPACE_RE.replace_all(&text, " ").trim().to_string()
}

/// Reduce a key to lowercase alphanumerics, `_` and `-`.
#[must_use]
pub fn sanitize_key(input: &str) -> String {
    input
        .chars()
        .filter_map(|c| {
            let c = c.to_ascii_lowercase();
            (c.is_ascii_alphanumeric() || c == '_' || c == '-').then_some(c)
        })
        .collect()
}

/// Whether `input` is a plausible single email address.
#[must_use]
pub fn is_email(input: &str) -> bool {
    input.len() <= 254 && EMAIL_RE.is_match(input)
}

/// Keep only characters valid in an address; empty if the result is not an email.
#[must_use]
pub fn clean_email(input: &str) -> String {
    let cleaned: String = input
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || "!#$%&'*+/=?^_`{|}~.@-".contains(*c))
        .collect();
    if is_email(&cleaned) {
        cleaned
    } else {
        String::new()
    }
}

/// Clean a URL for storage; empty if it cannot be a safe link.
///
/// Relative references are kept as-is, scheme-less hosts get `http://`,
/// and anything with a scheme outside the allow-list is dropped.
#[must_use]
pub fn clean_url(input: &str) -> String {
    let trimmed: String = input
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control() && !matches!(c, '<' | '>' | '"' | '`'))
        .collect();
    if trimmed.is_empty() {
        return trimmed;
    }
    if trimmed.starts_with('/') || trimmed.starts_with('#') || trimmed.starts_with('?') {
        return trimmed;
    }
    match Url::parse(&trimmed) {
        Ok(url) if ALLOWED_URL_SCHEMES.contains(&url.scheme()) => trimmed,
        Ok(url) if url.cannot_be_a_base() || !url.has_host() => {
            // "example.com:8080/x" parses with scheme "example.com"
            if trimmed.contains('.') && !trimmed.contains("://") {
                with_http(&trimmed)
            } else {
                String::new()
            }
        }
        Ok(_) => String::new(),
        Err(url::ParseError::RelativeUrlWithoutBase) if trimmed.contains('.') => {
            with_http(&trimmed)
        }
        Err(_) => String::new(),
    }
}

fn with_http(host_and_path: &str) -> String {
    let candidate = format!("http://{host_and_path}");
    match Url::parse(&candidate) {
        Ok(url) if url.has_host() => candidate,
        _ => String::new(),
    }
}

/// Parse a PHP-style numeric value: numbers, or strings holding a number.
#[must_use]
pub fn as_number(value: &Value) -> Option<Number> {
    match value {
        Value::Number(n) => Some(n.clone()),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                return Some(Number::from(i));
            }
            s.parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .and_then(Number::from_f64)
        }
        _ => None,
    }
}

/// Sanitize one submitted value, using its field definition for type context.
#[must_use]
pub fn sanitize_value(value: &Value, field: Option<&FieldDefinition>) -> Value {
    match (value, field.map(|f| &f.kind)) {
        (Value::Array(_) | Value::Object(_), Some(FieldKind::ArrayOfObjects { fields })) => {
            sanitize_array_of_objects(value, fields)
        }
        (Value::Array(items), _) => {
            Value::Array(items.iter().map(|v| sanitize_value(v, None)).collect())
        }
        (Value::Object(map), _) => Value::Object(sanitize_map(map)),
        (Value::String(s), _) => Value::String(clean_text(s)),
        (Value::Number(_) | Value::Bool(_), _) => value.clone(),
        (Value::Null, _) => Value::String(String::new()),
    }
}

fn sanitize_map(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .map(|(k, v)| (sanitize_key(k), sanitize_value(v, None)))
        .collect()
}

/// Sanitize a repeatable group item by item.
///
/// Items that are not maps are skipped. With nested definitions only the
/// defined keys survive, each cleaned by its nested type; without them every
/// key is cleaned generically.
fn sanitize_array_of_objects(value: &Value, nested: &[FieldDefinition]) -> Value {
    let items: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => map.values().collect(),
        _ => Vec::new(),
    };
    let cleaned = items
        .into_iter()
        .filter_map(Value::as_object)
        .map(|item| {
            if nested.is_empty() {
                return Value::Object(sanitize_map(item));
            }
            let mut out = Map::new();
            for def in nested {
                if let Some(v) = item.get(&def.name) {
                    out.insert(def.name.clone(), sanitize_nested(v, def));
                }
            }
            Value::Object(out)
        })
        .collect();
    Value::Array(cleaned)
}

fn sanitize_nested(value: &Value, def: &FieldDefinition) -> Value {
    if value.is_array() || value.is_object() {
        return sanitize_value(value, None);
    }
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(true) => "1".to_string(),
        _ => String::new(),
    };
    match def.kind {
        FieldKind::Email => Value::String(clean_email(&text)),
        FieldKind::Url => Value::String(clean_url(&text)),
        FieldKind::Number { .. } => Value::Number(as_number(value).unwrap_or_else(|| 0.into())),
        _ => Value::String(clean_text(&text)),
    }
}
