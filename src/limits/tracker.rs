//! In-memory rate-limit markers.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::{LimitCheckResult, RateLimiter};

/// Sweep expired markers once the map grows past this size
const SWEEP_THRESHOLD: usize = 1024;

/// Marker store backed by a concurrent map.
///
/// The check and the marker write happen under the same shard lock, so two
/// simultaneous submissions from one requester cannot both pass.
pub struct MemoryRateLimiter {
    markers: DashMap<String, Instant>,
    window: Duration,
    ttl: Duration,
}

impl MemoryRateLimiter {
    /// Create a limiter rejecting repeats within `window`; markers live for `ttl`.
    pub fn new(window: Duration, ttl: Duration) -> Self {
        Self {
            markers: DashMap::new(),
            window,
            ttl: ttl.max(window),
        }
    }

    /// Drop markers older than the TTL.
    pub fn purge_expired(&self) {
        let ttl = self.ttl;
        self.markers.retain(|_, set_at| set_at.elapsed() < ttl);
    }

    /// Number of markers currently held
    #[must_use]
    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }
}

impl RateLimiter for MemoryRateLimiter {
    fn check_and_mark(&self, key: &str) -> LimitCheckResult {
        if self.markers.len() > SWEEP_THRESHOLD {
            self.purge_expired();
        }

        let now = Instant::now();
        match self.markers.entry(key.to_string()) {
            Entry::Occupied(mut marker) => {
                let age = now.saturating_duration_since(*marker.get());
                if age < self.window {
                    let remaining = self.window - age;
                    return LimitCheckResult::RateLimited {
                        retry_after_secs: remaining.as_secs().max(1),
                    };
                }
                marker.insert(now);
                LimitCheckResult::Allowed
            }
            Entry::Vacant(slot) => {
                slot.insert(now);
                LimitCheckResult::Allowed
            }
        }
    }

    fn clear(&self, key: &str) {
        self.markers.remove(key);
    }
}
