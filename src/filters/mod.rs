//! Pre-pipeline submission guards
//!
//! Guards run at the request boundary before a schema is resolved. Each one
//! implements [`SubmissionFilter`]; the chain stops at the first rejection
//! and nothing further is processed for that request.

use serde_json::{Map, Value};

use crate::error::FormError;
use crate::pipeline::RequestMeta;

pub mod factory;
pub mod fields;
pub mod honeypot;
pub mod presence;
pub mod rate;
pub mod size;

/// What a guard can see of an incoming submission
pub struct GuardContext<'a> {
    /// Form identifier as addressed by the client
    pub form: &'a str,
    pub data: &'a Map<String, Value>,
    /// Number of uploaded file parts
    pub file_count: usize,
    pub meta: &'a RequestMeta,
}

#[async_trait::async_trait]
pub trait SubmissionFilter: Send + Sync {
    /// Ok(()) lets the submission through; the error is returned to the client.
    async fn check(&self, ctx: &GuardContext<'_>) -> Result<(), FormError>;

    fn name(&self) -> &'static str;
}

/// Guards applied in order, all of which must pass
pub struct FilterChain {
    filters: Vec<Box<dyn SubmissionFilter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
        }
    }

    pub fn add_filter(mut self, filter: Box<dyn SubmissionFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    /// Run every guard, returning on first failure
    pub async fn validate(&self, ctx: &GuardContext<'_>) -> Result<(), FormError> {
        for filter in &self.filters {
            if let Err(e) = filter.check(ctx).await {
                tracing::debug!(guard = filter.name(), form = ctx.form, code = e.code(), "submission rejected");
                return Err(e);
            }
        }
        Ok(())
    }

    pub fn filter_names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }
}

impl Default for FilterChain {
    fn default() -> Self {
        Self::new()
    }
}
