//! Field authorization
//!
//! A submission either passes with exactly the allowed subset of its keys,
//! or is rejected as a whole. Keys are never dropped silently.

use serde_json::{Map, Value};

use super::RequestMeta;
use super::sanitize::sanitize_value;
use crate::audit;
use crate::error::FormError;
use crate::schema::FormSchema;

/// Field name that accepts every submitted key
pub const WILDCARD: &str = "*";

/// Names a form accepts: its schema fields plus configured extras
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedFields {
    names: Vec<String>,
    wildcard: bool,
}

impl AllowedFields {
    #[must_use]
    pub fn for_schema(schema: &FormSchema, extra: &[String]) -> Self {
        let mut names = schema.field_names();
        let mut wildcard = false;
        for name in extra {
            if name == WILDCARD {
                wildcard = true;
            } else if !names.contains(name) {
                names.push(name.clone());
            }
        }
        Self { names, wildcard }
    }

    #[must_use]
    pub fn allows(&self, name: &str) -> bool {
        self.wildcard || self.names.iter().any(|n| n == name)
    }

    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.wildcard
    }
}

/// Keep authorized fields, sanitized with their definitions.
///
/// With the accept-any policy or a wildcard every non-blank key passes,
/// sanitized without type context.
///
/// # Errors
///
/// Returns [`FormError::UnauthorizedFields`] if any key is not allowed.
pub fn filter(
    raw: &Map<String, Value>,
    schema: &FormSchema,
    extra_allowed: &[String],
    meta: &RequestMeta,
) -> Result<Map<String, Value>, FormError> {
    let allowed = AllowedFields::for_schema(schema, extra_allowed);

    if schema.accept_any_fields || allowed.is_wildcard() {
        return Ok(raw
            .iter()
            .filter(|(k, _)| !k.trim().is_empty())
            .map(|(k, v)| (k.clone(), sanitize_value(v, None)))
            .collect());
    }

    let unauthorized: Vec<String> = raw
        .keys()
        .filter(|k| !allowed.allows(k))
        .cloned()
        .collect();

    if !unauthorized.is_empty() {
        audit::unauthorized_fields(
            &schema.slug,
            meta,
            &unauthorized,
            raw.len(),
            raw.len() - unauthorized.len(),
        );
        return Err(FormError::UnauthorizedFields {
            unauthorized,
            allowed: allowed.names().to_vec(),
        });
    }

    Ok(raw
        .iter()
        .map(|(k, v)| (k.clone(), sanitize_value(v, schema.field(k))))
        .collect())
}
