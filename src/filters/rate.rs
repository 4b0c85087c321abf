//! Per-form, per-requester cooldown

use super::{GuardContext, SubmissionFilter};
use crate::error::FormError;
use crate::limits::{DynRateLimiter, LimitCheckResult, marker_key};

pub struct RateLimitFilter {
    limiter: DynRateLimiter,
}

impl RateLimitFilter {
    pub fn new(limiter: DynRateLimiter) -> Self {
        Self { limiter }
    }
}

#[async_trait::async_trait]
impl SubmissionFilter for RateLimitFilter {
    async fn check(&self, ctx: &GuardContext<'_>) -> Result<(), FormError> {
        let key = marker_key(ctx.form, &ctx.meta.ip);
        match self.limiter.check_and_mark(&key) {
            LimitCheckResult::Allowed => Ok(()),
            LimitCheckResult::RateLimited { retry_after_secs } => {
                tracing::info!(form = ctx.form, ip = %ctx.meta.ip, retry_after_secs, "rate limited");
                Err(FormError::RateLimited)
            }
        }
    }

    fn name(&self) -> &'static str {
        "RateLimitFilter"
    }
}
