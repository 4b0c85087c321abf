//! Caps the number of top-level submitted fields
//!
//! The honeypot field is not counted: it is removed once the chain passes.

use super::{GuardContext, SubmissionFilter};
use crate::error::FormError;

pub struct FieldCountFilter {
    max_fields: usize,
    honeypot_field: String,
}

impl FieldCountFilter {
    pub fn new(max_fields: usize, honeypot_field: impl Into<String>) -> Self {
        Self {
            max_fields,
            honeypot_field: honeypot_field.into(),
        }
    }
}

#[async_trait::async_trait]
impl SubmissionFilter for FieldCountFilter {
    async fn check(&self, ctx: &GuardContext<'_>) -> Result<(), FormError> {
        let trap = usize::from(ctx.data.contains_key(&self.honeypot_field));
        if ctx.data.len() - trap > self.max_fields {
            return Err(FormError::TooManyFields);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "FieldCountFilter"
    }
}
