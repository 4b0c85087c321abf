//! Telegram message text (HTML parse mode)

use chrono::{DateTime, Local};
use serde_json::{Map, Value};
use std::fmt::Write;

use super::{PAGE_URL_KEY, display_value, escape, field_label, is_array_of_objects, nested_label, object_items};
use crate::schema::FormSchema;

/// Datetime layout shared by the message header and `{datetime}`
pub const DATETIME_FORMAT: &str = "%d.%m.%Y %H:%M:%S";

/// Indented, numbered rendering of an `array_of_objects` value
fn nested_items(schema: &FormSchema, parent: &str, items: &[Value]) -> String {
    let mut out = String::new();
    for (i, item) in object_items(items).enumerate() {
        let _ = writeln!(out, "  <i>Item #{}:</i>", i + 1);
        for (key, value) in item {
            let _ = writeln!(
                out,
                "    • <b>{}:</b> {}",
                escape(&nested_label(schema, parent, key)),
                escape(&display_value(value))
            );
        }
    }
    out
}

/// Escaped display of one submitted value.
///
/// Lists of objects become a numbered block starting on a new line.
#[must_use]
pub fn format_value(schema: &FormSchema, key: &str, value: &Value) -> String {
    match value {
        Value::Array(items) if is_array_of_objects(value) => {
            format!("\n{}", nested_items(schema, key, items))
        }
        _ => escape(&display_value(value)),
    }
}

/// The built-in message layout
#[must_use]
pub fn default_message(
    schema: &FormSchema,
    data: &Map<String, Value>,
    sent_at: &DateTime<Local>,
) -> String {
    let mut message = String::from("📝 <b>New Form Submission</b>\n\n");
    let _ = writeln!(message, "📋 <b>Form:</b> {}", escape(&schema.title));
    let _ = write!(message, "🕐 <b>Time:</b> {}\n\n", sent_at.format(DATETIME_FORMAT));
    message.push_str("<b>Form Data:</b>\n");

    for (key, value) in data {
        if key == PAGE_URL_KEY {
            continue;
        }
        let label = escape(&field_label(schema, key));
        match value {
            Value::Array(items) if is_array_of_objects(value) => {
                let _ = writeln!(message, "• <b>{label}:</b>");
                message.push_str(&nested_items(schema, key, items));
            }
            _ => {
                let _ = writeln!(message, "• <b>{label}:</b> {}", escape(&display_value(value)));
            }
        }
    }

    if let Some(url) = data.get(PAGE_URL_KEY).and_then(Value::as_str) {
        let _ = write!(message, "\n🔗 <b>Page URL:</b> {}", escape(url));
    }
    message
}
