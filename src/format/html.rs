//! HTML email body

use chrono::{DateTime, Local};
use serde_json::{Map, Value};
use std::fmt::Write;

use super::{
    display_value, escape, field_label, is_array_of_objects, looks_like_urls, nested_label,
    object_items, union_keys,
};
use crate::schema::FormSchema;

const CELL: &str = "padding: 10px; border: 1px solid #e9e9e9;";
const NESTED_CELL: &str = "padding: 8px; border: 1px solid #ddd;";

fn links(value: &Value) -> String {
    let urls: Vec<&str> = match value {
        Value::String(s) => vec![s.as_str()],
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    };
    urls.iter()
        .map(|u| {
            let u = escape(u);
            format!("<a href=\"{u}\">{u}</a>")
        })
        .collect::<Vec<_>>()
        .join("<br>")
}

fn nested_table(schema: &FormSchema, parent: &str, items: &[Value]) -> String {
    let keys = union_keys(items);
    if keys.is_empty() {
        return String::new();
    }

    let mut html =
        String::from("<table style=\"width: 100%; border-collapse: collapse; margin: 5px 0;\">");
    html.push_str("<thead><tr style=\"background-color: #f0f0f0;\">");
    for key in &keys {
        let _ = write!(
            html,
            "<th style=\"{NESTED_CELL} text-align: left;\">{}</th>",
            escape(&nested_label(schema, parent, key))
        );
    }
    html.push_str("</tr></thead><tbody>");
    for item in object_items(items) {
        html.push_str("<tr>");
        for key in &keys {
            let cell = item.get(key).map(display_value).unwrap_or_default();
            let _ = write!(html, "<td style=\"{NESTED_CELL}\">{}</td>", escape(&cell));
        }
        html.push_str("</tr>");
    }
    html.push_str("</tbody></table>");
    html
}

/// Field/value table of a submission with a "Sent" footer
#[must_use]
pub fn email_body(schema: &FormSchema, data: &Map<String, Value>, sent_at: &DateTime<Local>) -> String {
    let mut html = format!("<h2>Form Data: {}</h2>", escape(&schema.title));
    html.push_str("<table style='width: 100%; border-collapse: collapse;'>");
    let _ = write!(
        html,
        "<tr style=\"background-color: #f8f8f8;\"><th style=\"{CELL} text-align: left;\">Field</th>\
         <th style=\"{CELL} text-align: left;\">Value</th></tr>"
    );

    for (key, value) in data {
        let label = escape(&field_label(schema, key));
        let cell = if looks_like_urls(value) {
            links(value)
        } else if is_array_of_objects(value) {
            value
                .as_array()
                .map(|items| nested_table(schema, key, items))
                .unwrap_or_default()
        } else {
            escape(&display_value(value))
        };
        let _ = write!(
            html,
            "<tr><td style='{CELL}'><strong>{label}</strong></td><td style='{CELL}'>{cell}</td></tr>"
        );
    }

    html.push_str("</table>");
    let _ = write!(
        html,
        "<p><small>Sent: {}</small></p>",
        sent_at.format("%d.%m.%Y %H:%M:%S")
    );
    html
}
