//! Size validation filter
//!
//! Bounds the total size of submitted data: every key plus every value,
//! counted in bytes and walking nested lists and objects.

use super::{GuardContext, SubmissionFilter};
use crate::error::FormError;
use serde_json::{Map, Value};

pub struct SizeFilter {
    max_bytes: u64,
}

impl SizeFilter {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }
}

/// Byte size of a value as it was submitted
#[must_use]
pub fn value_size(value: &Value) -> u64 {
    match value {
        Value::Null | Value::Bool(false) => 0,
        Value::Bool(true) => 1,
        Value::Number(n) => n.to_string().len() as u64,
        Value::String(s) => s.len() as u64,
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| i.to_string().len() as u64 + value_size(v))
            .sum(),
        Value::Object(map) => data_size(map),
    }
}

/// Byte size of a whole submission
#[must_use]
pub fn data_size(data: &Map<String, Value>) -> u64 {
    data.iter()
        .map(|(k, v)| k.len() as u64 + value_size(v))
        .sum()
}

#[async_trait::async_trait]
impl SubmissionFilter for SizeFilter {
    async fn check(&self, ctx: &GuardContext<'_>) -> Result<(), FormError> {
        if data_size(ctx.data) > self.max_bytes {
            return Err(FormError::DataTooLarge);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "SizeFilter"
    }
}
