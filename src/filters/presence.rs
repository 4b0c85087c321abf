//! Rejects requests that carry neither fields nor files

use super::{GuardContext, SubmissionFilter};
use crate::error::FormError;

pub struct PresenceFilter;

#[async_trait::async_trait]
impl SubmissionFilter for PresenceFilter {
    async fn check(&self, ctx: &GuardContext<'_>) -> Result<(), FormError> {
        if ctx.data.is_empty() && ctx.file_count == 0 {
            return Err(FormError::InvalidData);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "PresenceFilter"
    }
}
