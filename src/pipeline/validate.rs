//! Schema-driven validation
//!
//! Fields are checked in schema order and the first violation wins.

use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use serde_json::{Map, Value};

use super::sanitize::{as_number, clean_url, is_email};
use crate::error::FormError;
use crate::schema::{FieldDefinition, FieldKind, FormSchema};

/// Maximum characters per field, summed over list elements
pub const MAX_FIELD_CHARS: usize = 10_000;

/// The sentinel a required checkbox must carry
pub const CHECKBOX_ON: &str = "on";

const DEFAULT_TEL_PATTERN: &str = r"^\+?\d{7,15}$";
const STEP_EPSILON: f64 = 1e-9;

static DEFAULT_TEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(DEFAULT_TEL_PATTERN).expect("valid regex"));

fn fail(message: String) -> Result<(), FormError> {
    Err(FormError::Validation(message))
}

/// Validate sanitized data against a schema, returning the first violation.
///
/// # Errors
///
/// Returns [`FormError::Validation`] describing the first failing field.
pub fn validate(data: &Map<String, Value>, schema: &FormSchema) -> Result<(), FormError> {
    if schema.fields.is_empty() {
        return fail("No fields configured for this form".into());
    }
    if data.is_empty() {
        return fail("No form data provided".into());
    }
    for field in &schema.fields {
        validate_field(field, data.get(&field.name))?;
    }
    Ok(())
}

/// Empty means absent, null, an empty or blank string, or an empty list/map.
fn is_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::Object(map)) => map.is_empty(),
        Some(_) => false,
    }
}

/// Scalar rendered the way it was submitted
fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(true) => "1".into(),
        _ => String::new(),
    }
}

/// Format a bound without a trailing `.0`
pub(crate) fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn char_count(value: &Value) -> usize {
    match value {
        Value::String(s) => s.chars().count(),
        Value::Number(n) => n.to_string().len(),
        Value::Array(items) => items.iter().map(char_count).sum(),
        Value::Object(map) => map.values().map(char_count).sum(),
        _ => 0,
    }
}

fn tel_regex(pattern: Option<&str>) -> Option<Regex> {
    pattern
        .filter(|p| !p.is_empty())
        .and_then(|p| Regex::new(p).ok())
}

fn tel_matches(pattern: Option<&str>, value: &str) -> bool {
    match tel_regex(pattern) {
        Some(re) => re.is_match(value),
        None => DEFAULT_TEL_RE.is_match(value),
    }
}

fn round_trips(kind: &FieldKind, value: &str) -> bool {
    match kind {
        FieldKind::Date => NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .is_ok_and(|d| d.format("%Y-%m-%d").to_string() == value),
        FieldKind::Time => NaiveTime::parse_from_str(value, "%H:%M")
            .is_ok_and(|t| t.format("%H:%M").to_string() == value),
        FieldKind::Datetime => NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M")
            .is_ok_and(|dt| dt.format("%Y-%m-%dT%H:%M").to_string() == value),
        _ => true,
    }
}

fn follows_step(value: f64, step: f64) -> bool {
    if (step - 1.0).abs() < STEP_EPSILON {
        return true;
    }
    let remainder = (value % step).abs();
    remainder < STEP_EPSILON || (step - remainder).abs() < STEP_EPSILON
}

fn validate_field(field: &FieldDefinition, value: Option<&Value>) -> Result<(), FormError> {
    let label = field.display_label();

    if field.kind.is_scalar_only() && matches!(value, Some(Value::Array(_) | Value::Object(_))) {
        return fail(format!(
            "Field '{label}' must be a single value, not an array. Use 'array_of_objects' type for arrays."
        ));
    }

    if let FieldKind::ArrayOfObjects { fields } = &field.kind {
        return validate_array_of_objects(field, fields, value);
    }

    if field.required {
        if matches!(field.kind, FieldKind::Checkbox) {
            if value.and_then(Value::as_str) != Some(CHECKBOX_ON) {
                return fail(format!("Field '{label}' is required for agreement"));
            }
        } else if is_empty(value) {
            return fail(format!("Field '{label}' is required"));
        }
    }

    let Some(value) = value.filter(|v| !is_empty(Some(*v))) else {
        return Ok(());
    };

    match &field.kind {
        FieldKind::Email => {
            if !is_email(&scalar_text(value)) {
                return fail(format!("Field '{label}' must contain a valid email address"));
            }
        }
        FieldKind::File(_) => {
            let urls: Vec<&Value> = match value {
                Value::Array(items) => items.iter().collect(),
                other => vec![other],
            };
            if urls.iter().any(|u| clean_url(&scalar_text(u)).is_empty()) {
                return fail(format!("Field '{label}' contains invalid file URL"));
            }
        }
        FieldKind::Url => {
            if clean_url(&scalar_text(value)).is_empty() {
                return fail(format!("Field '{label}' must contain a valid URL"));
            }
        }
        FieldKind::Number { min, max, step } => {
            let Some(number) = as_number(value).and_then(|n| n.as_f64()) else {
                return fail(format!("Field '{label}' must be a number"));
            };
            if let Some(min) = min {
                if number < *min {
                    return fail(format!(
                        "Field '{label}' must be greater than or equal to {}",
                        format_number(*min)
                    ));
                }
            }
            if let Some(max) = max {
                if number > *max {
                    return fail(format!(
                        "Field '{label}' must be less than or equal to {}",
                        format_number(*max)
                    ));
                }
            }
            if let Some(step) = step.filter(|s| *s > 0.0) {
                if !follows_step(number, step) {
                    return fail(format!(
                        "Field '{label}' must follow step {}",
                        format_number(step)
                    ));
                }
            }
        }
        FieldKind::Tel { pattern } => {
            if !tel_matches(pattern.as_deref(), &scalar_text(value)) {
                return fail(format!("Field '{label}' must be a valid phone number"));
            }
        }
        FieldKind::Date => {
            if !round_trips(&field.kind, &scalar_text(value)) {
                return fail(format!("Field '{label}' must be a valid date (YYYY-MM-DD)"));
            }
        }
        FieldKind::Time => {
            if !round_trips(&field.kind, &scalar_text(value)) {
                return fail(format!("Field '{label}' must be a valid time (HH:MM)"));
            }
        }
        FieldKind::Datetime => {
            if !round_trips(&field.kind, &scalar_text(value)) {
                return fail(format!(
                    "Field '{label}' must be a valid datetime (YYYY-MM-DDTHH:MM)"
                ));
            }
        }
        FieldKind::Select { options, .. } | FieldKind::Radio { options } if !options.is_empty() => {
            let valid = match value {
                Value::Array(items) => items.iter().all(|v| options.contains(&scalar_text(v))),
                other => options.contains(&scalar_text(other)),
            };
            if !valid {
                return fail(format!("Field '{label}' contains an invalid value"));
            }
        }
        _ => {}
    }

    if !matches!(field.kind, FieldKind::Checkbox) && char_count(value) > MAX_FIELD_CHARS {
        return fail(format!(
            "Field '{label}' is too long (maximum 10,000 characters)"
        ));
    }

    Ok(())
}

fn validate_array_of_objects(
    field: &FieldDefinition,
    nested: &[FieldDefinition],
    value: Option<&Value>,
) -> Result<(), FormError> {
    let label = field.display_label();
    let items: Vec<&Value> = match value {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(Value::Object(map)) => map.values().collect(),
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(s)) if s.is_empty() => Vec::new(),
        Some(_) => return fail(format!("Field '{label}' must be a list of items")),
    };

    if items.is_empty() {
        if field.required {
            return fail(format!(
                "Field '{label}' is required and must contain at least one item"
            ));
        }
        return Ok(());
    }

    for (index, item) in items.iter().enumerate() {
        let position = index + 1;
        let Some(item) = item.as_object() else {
            return fail(format!("Field '{label}' item #{position} must be an object"));
        };
        for def in nested {
            validate_nested(def, item.get(&def.name), label, position)?;
        }
    }
    Ok(())
}

fn validate_nested(
    def: &FieldDefinition,
    value: Option<&Value>,
    parent: &str,
    position: usize,
) -> Result<(), FormError> {
    let label = def.display_label();
    let prefix = format!("Field '{label}' in '{parent}' item #{position}");

    if def.required && is_empty(value) {
        return fail(format!("{prefix} is required"));
    }
    let Some(value) = value.filter(|v| !is_empty(Some(*v))) else {
        return Ok(());
    };

    match &def.kind {
        FieldKind::Email => {
            if !is_email(&scalar_text(value)) {
                return fail(format!("{prefix} must be a valid email"));
            }
        }
        FieldKind::Number { min, max, .. } => {
            let Some(number) = as_number(value).and_then(|n| n.as_f64()) else {
                return fail(format!("{prefix} must be a number"));
            };
            if let Some(min) = min {
                if number < *min {
                    return fail(format!(
                        "{prefix} must be greater than or equal to {}",
                        format_number(*min)
                    ));
                }
            }
            if let Some(max) = max {
                if number > *max {
                    return fail(format!(
                        "{prefix} must be less than or equal to {}",
                        format_number(*max)
                    ));
                }
            }
        }
        FieldKind::Tel { pattern } => {
            if !tel_matches(pattern.as_deref(), &scalar_text(value)) {
                return fail(format!("{prefix} must be a valid phone number"));
            }
        }
        FieldKind::Url => {
            if clean_url(&scalar_text(value)).is_empty() {
                return fail(format!("{prefix} must be a valid URL"));
            }
        }
        _ => {}
    }
    Ok(())
}
