//! Rendering of submissions for humans
//!
//! Shared helpers for the email body, the chat message and template
//! placeholders: label lookup, value display and the shape heuristics that
//! decide how a value is laid out.

use serde_json::{Map, Value};
use url::Url;

use crate::schema::FormSchema;

pub mod html;
pub mod telegram;
pub mod template;

/// Key under which the originating page is added to submitted data
pub const PAGE_URL_KEY: &str = "Page URL";

/// Notification label of a top-level key
#[must_use]
pub fn field_label(schema: &FormSchema, key: &str) -> String {
    schema
        .field(key)
        .map_or_else(|| key.to_string(), |f| f.notification_label().to_string())
}

/// Notification label of a key inside an `array_of_objects` item
#[must_use]
pub fn nested_label(schema: &FormSchema, parent: &str, key: &str) -> String {
    schema
        .field(parent)
        .and_then(|p| p.nested_fields().iter().find(|f| f.name == key))
        .map_or_else(|| key.to_string(), |f| f.notification_label().to_string())
}

/// Display text of a scalar; lists are comma-joined
#[must_use]
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "Yes".to_string(),
        Value::Bool(false) => "No".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(display_value)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(map) => map
            .values()
            .map(display_value)
            .collect::<Vec<_>>()
            .join(", "),
    }
}

/// Escape text for HTML and Telegram HTML
#[must_use]
pub fn escape(text: &str) -> String {
    html_escape::encode_quoted_attribute(text).into_owned()
}

/// A list whose first entry is a non-empty object
#[must_use]
pub fn is_array_of_objects(value: &Value) -> bool {
    match value {
        Value::Array(items) => items
            .first()
            .and_then(Value::as_object)
            .is_some_and(|m| !m.is_empty()),
        _ => false,
    }
}

/// Absolute http(s) URL
#[must_use]
pub fn is_http_url(text: &str) -> bool {
    Url::parse(text).is_ok_and(|u| matches!(u.scheme(), "http" | "https") && u.has_host())
}

/// A URL string, or a non-empty list made only of URL strings
#[must_use]
pub fn looks_like_urls(value: &Value) -> bool {
    match value {
        Value::String(s) => is_http_url(s),
        Value::Array(items) => {
            !items.is_empty() && items.iter().all(|v| v.as_str().is_some_and(is_http_url))
        }
        _ => false,
    }
}

/// Keys of all object items, first-seen order
#[must_use]
pub fn union_keys(items: &[Value]) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    for map in items.iter().filter_map(Value::as_object) {
        for key in map.keys() {
            if !keys.contains(key) {
                keys.push(key.clone());
            }
        }
    }
    keys
}

/// Object items of a list, skipping anything else
pub fn object_items(items: &[Value]) -> impl Iterator<Item = &Map<String, Value>> {
    items.iter().filter_map(Value::as_object)
}
