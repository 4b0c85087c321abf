//! Submission rate limiting
//!
//! One submission per form and requester is accepted within a cooldown
//! window. Markers expire on their own after a short TTL.

mod tracker;

pub use tracker::MemoryRateLimiter;

use sha2::{Digest, Sha256};
use std::sync::Arc;

const KEY_PREFIX: &str = "form_rate_";

/// Marker key for a form and requester IP
#[must_use]
pub fn marker_key(form: &str, ip: &str) -> String {
    let digest = Sha256::digest(format!("{form}|{ip}").as_bytes());
    format!("{KEY_PREFIX}{}", hex::encode(digest))
}

/// Result of a limit check operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitCheckResult {
    /// Submission is allowed and the marker was set
    Allowed,

    /// A marker younger than the cooldown window exists
    RateLimited { retry_after_secs: u64 },
}

impl LimitCheckResult {
    /// Check if the result indicates the operation is allowed
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    /// Check if the result indicates the limit was hit
    #[must_use]
    pub fn is_denied(&self) -> bool {
        !self.is_allowed()
    }
}

/// Marker store used by the rate-limit guard
pub trait RateLimiter: Send + Sync {
    /// Check for a live marker and, if there is none, set one in the same step
    fn check_and_mark(&self, key: &str) -> LimitCheckResult;

    /// Forget a marker
    fn clear(&self, key: &str);
}

pub type DynRateLimiter = Arc<dyn RateLimiter>;
