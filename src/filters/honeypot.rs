//! Honeypot filter
//!
//! Forms carry a hidden input that humans never fill in. Any non-empty
//! value marks the submission as automated.

use super::{GuardContext, SubmissionFilter};
use crate::error::FormError;
use serde_json::Value;

pub struct HoneypotFilter {
    field: String,
}

impl HoneypotFilter {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }

    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }
}

fn is_filled(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => false,
        Value::String(s) => !s.is_empty() && s != "0",
        Value::Number(n) => n.as_f64() != Some(0.0),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Bool(true) => true,
    }
}

#[async_trait::async_trait]
impl SubmissionFilter for HoneypotFilter {
    async fn check(&self, ctx: &GuardContext<'_>) -> Result<(), FormError> {
        if ctx.data.get(&self.field).is_some_and(is_filled) {
            tracing::info!(form = ctx.form, ip = %ctx.meta.ip, "honeypot field filled");
            return Err(FormError::Spam);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "HoneypotFilter"
    }
}
