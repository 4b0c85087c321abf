//! Field definitions
//!
//! Stored schemas are loose JSON: flags may arrive as `"1"`, numbers as
//! strings and options as `{value, label}` pairs. Everything is decoded once
//! into [`FieldDefinition`] through [`RawField`]; unknown attributes are kept
//! in `extra` so they can be echoed back to clients.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::pipeline::sanitize::sanitize_key;

const DEFAULT_MAX_SIZE_MB: f64 = 10.0;
const DEFAULT_MAX_FILES: usize = 5;

/// Constraints for a `file` field
#[derive(Debug, Clone, PartialEq)]
pub struct FileRules {
    pub multiple: bool,
    /// Lowercase extensions without the leading dot; empty allows any
    pub allowed_extensions: Vec<String>,
    pub max_size_mb: f64,
    pub max_files: usize,
}

impl Default for FileRules {
    fn default() -> Self {
        Self {
            multiple: false,
            allowed_extensions: Vec::new(),
            max_size_mb: DEFAULT_MAX_SIZE_MB,
            max_files: DEFAULT_MAX_FILES,
        }
    }
}

/// Type-specific part of a field definition
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Text { pattern: Option<String> },
    Textarea,
    Password,
    Email,
    Url,
    Tel { pattern: Option<String> },
    Number {
        min: Option<f64>,
        max: Option<f64>,
        step: Option<f64>,
    },
    Date,
    Time,
    Datetime,
    Checkbox,
    Select { options: Vec<String>, multiple: bool },
    Radio { options: Vec<String> },
    File(FileRules),
    ArrayOfObjects { fields: Vec<FieldDefinition> },
    /// Types without server-side rules (hidden, color, ...)
    Other(String),
}

impl FieldKind {
    /// Name of the type as it appears in stored schemas
    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            FieldKind::Text { .. } => "text",
            FieldKind::Textarea => "textarea",
            FieldKind::Password => "password",
            FieldKind::Email => "email",
            FieldKind::Url => "url",
            FieldKind::Tel { .. } => "tel",
            FieldKind::Number { .. } => "number",
            FieldKind::Date => "date",
            FieldKind::Time => "time",
            FieldKind::Datetime => "datetime",
            FieldKind::Checkbox => "checkbox",
            FieldKind::Select { .. } => "select",
            FieldKind::Radio { .. } => "radio",
            FieldKind::File(_) => "file",
            FieldKind::ArrayOfObjects { .. } => "array_of_objects",
            FieldKind::Other(name) => name,
        }
    }

    /// Types that must never carry a list or map value
    #[must_use]
    pub fn is_scalar_only(&self) -> bool {
        matches!(
            self,
            FieldKind::Text { .. }
                | FieldKind::Textarea
                | FieldKind::Password
                | FieldKind::Email
                | FieldKind::Url
                | FieldKind::Tel { .. }
                | FieldKind::Number { .. }
                | FieldKind::Date
                | FieldKind::Time
                | FieldKind::Datetime
        )
    }

    /// Admin-supplied regular expression, if any
    #[must_use]
    pub fn pattern(&self) -> Option<&str> {
        match self {
            FieldKind::Text { pattern } | FieldKind::Tel { pattern } => pattern.as_deref(),
            _ => None,
        }
    }
}

/// One expected input of a form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawField", into = "RawField")]
pub struct FieldDefinition {
    pub name: String,
    pub label: Option<String>,
    pub notification_label: Option<String>,
    pub required: bool,
    pub kind: FieldKind,
    /// Custom attributes without server-side meaning
    pub extra: Map<String, Value>,
}

impl FieldDefinition {
    /// Create a field of the given kind with no label or extra attributes
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            label: None,
            notification_label: None,
            required: false,
            kind,
            extra: Map::new(),
        }
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Label used in validation messages
    #[must_use]
    pub fn display_label(&self) -> &str {
        self.label
            .as_deref()
            .filter(|l| !l.is_empty())
            .unwrap_or(&self.name)
    }

    /// Label used in notifications: `notification_label`, then `label`, then `name`
    #[must_use]
    pub fn notification_label(&self) -> &str {
        self.notification_label
            .as_deref()
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| self.display_label())
    }

    /// Nested definitions of an `array_of_objects` field
    #[must_use]
    pub fn nested_fields(&self) -> &[FieldDefinition] {
        match &self.kind {
            FieldKind::ArrayOfObjects { fields } => fields,
            _ => &[],
        }
    }
}

/// Storage shape of a field definition
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawField {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_label: Option<String>,
    #[serde(rename = "type", default)]
    pub field_type: String,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub required: bool,
    #[serde(default, deserialize_with = "deserialize_flag", skip_serializing_if = "is_false")]
    pub multiple: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, deserialize_with = "deserialize_number", skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_number", skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_number", skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_options", skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_extensions", skip_serializing_if = "Vec::is_empty")]
    pub allowed_extensions: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_number", skip_serializing_if = "Option::is_none")]
    pub max_size_mb: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_number", skip_serializing_if = "Option::is_none")]
    pub max_files: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<RawField>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn is_false(v: &bool) -> bool {
    !*v
}

impl From<RawField> for FieldDefinition {
    fn from(raw: RawField) -> Self {
        let type_name = sanitize_key(&raw.field_type);
        let kind = match type_name.as_str() {
            "" | "text" => FieldKind::Text {
                pattern: raw.pattern,
            },
            "textarea" => FieldKind::Textarea,
            "password" => FieldKind::Password,
            "email" => FieldKind::Email,
            "url" => FieldKind::Url,
            "tel" => FieldKind::Tel {
                pattern: raw.pattern,
            },
            "number" => FieldKind::Number {
                min: raw.min,
                max: raw.max,
                step: raw.step,
            },
            "date" => FieldKind::Date,
            "time" => FieldKind::Time,
            "datetime" | "datetime-local" => FieldKind::Datetime,
            "checkbox" => FieldKind::Checkbox,
            "select" => FieldKind::Select {
                options: raw.options,
                multiple: raw.multiple,
            },
            "radio" => FieldKind::Radio {
                options: raw.options,
            },
            "file" => FieldKind::File(FileRules {
                multiple: raw.multiple,
                allowed_extensions: raw.allowed_extensions,
                max_size_mb: raw
                    .max_size_mb
                    .filter(|v| *v > 0.0)
                    .unwrap_or(DEFAULT_MAX_SIZE_MB),
                max_files: raw
                    .max_files
                    .filter(|v| *v >= 1.0)
                    .map_or(DEFAULT_MAX_FILES, |v| v as usize),
            }),
            "array_of_objects" => FieldKind::ArrayOfObjects {
                fields: decode_fields(raw.fields),
            },
            _ => FieldKind::Other(type_name),
        };
        Self {
            name: sanitize_key(&raw.name),
            label: raw.label,
            notification_label: raw.notification_label,
            required: raw.required,
            kind,
            extra: raw.extra,
        }
    }
}

impl From<FieldDefinition> for RawField {
    fn from(field: FieldDefinition) -> Self {
        let mut raw = RawField {
            name: field.name,
            label: field.label,
            notification_label: field.notification_label,
            field_type: field.kind.type_name().to_string(),
            required: field.required,
            extra: field.extra,
            ..RawField::default()
        };
        match field.kind {
            FieldKind::Text { pattern } | FieldKind::Tel { pattern } => raw.pattern = pattern,
            FieldKind::Number { min, max, step } => {
                raw.min = min;
                raw.max = max;
                raw.step = step;
            }
            FieldKind::Select { options, multiple } => {
                raw.options = options;
                raw.multiple = multiple;
            }
            FieldKind::Radio { options } => raw.options = options,
            FieldKind::File(rules) => {
                raw.multiple = rules.multiple;
                raw.allowed_extensions = rules.allowed_extensions;
                raw.max_size_mb = Some(rules.max_size_mb);
                raw.max_files = Some(rules.max_files as f64);
            }
            FieldKind::ArrayOfObjects { fields } => {
                raw.fields = fields.into_iter().map(RawField::from).collect();
            }
            _ => {}
        }
        raw
    }
}

/// Decode raw fields, dropping entries whose name sanitizes to nothing.
pub fn decode_fields(raw: Vec<RawField>) -> Vec<FieldDefinition> {
    raw.into_iter()
        .map(FieldDefinition::from)
        .filter(|f| !f.name.is_empty())
        .collect()
}

pub(crate) fn deserialize_fields<'de, D>(deserializer: D) -> Result<Vec<FieldDefinition>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<RawField>::deserialize(deserializer)?;
    Ok(decode_fields(raw))
}

/// Accept `true`, `1`, `"1"`, `"true"`, `"on"` and `"yes"` as set.
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => matches!(s.trim(), "1" | "true" | "on" | "yes"),
        _ => false,
    })
}

/// Accept numbers and numeric strings; empty strings mean unset.
fn deserialize_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(n.as_f64()),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("invalid number: {s}"))),
        other => Err(de::Error::custom(format!("invalid number: {other}"))),
    }
}

/// Options may be plain strings or `{value, label}` pairs; only values are kept,
/// deduplicated and non-empty, in first-seen order.
fn deserialize_options<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let items = match Value::deserialize(deserializer)? {
        Value::Array(items) => items,
        Value::String(s) => s
            .lines()
            .map(|l| Value::String(l.to_string()))
            .collect(),
        _ => Vec::new(),
    };
    let mut options: Vec<String> = Vec::new();
    for item in items {
        let value = match item {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            Value::Object(map) => match map.get("value") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => continue,
            },
            _ => continue,
        };
        let value = value.trim().to_string();
        if !value.is_empty() && !options.contains(&value) {
            options.push(value);
        }
    }
    Ok(options)
}

/// Extensions may be a list or a comma-separated string; stored lowercase
/// without a leading dot.
fn deserialize_extensions<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let items: Vec<String> = match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Value::String(s) => s.split(',').map(str::to_string).collect(),
        _ => Vec::new(),
    };
    Ok(items
        .iter()
        .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|e| !e.is_empty())
        .collect())
}
