//! Process-wide schema cache
//!
//! Entries are keyed by a hash of the form identifier and expire after a
//! fixed TTL. Writes to a schema evict its entries explicitly.

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::schema::FormSchema;

const KEY_PREFIX: &str = "form_config_";

/// Cache key for a form identifier (slug or id)
#[must_use]
pub fn cache_key(identifier: &str) -> String {
    let digest = Sha256::digest(identifier.as_bytes());
    format!("{KEY_PREFIX}{}", hex::encode(digest))
}

/// Key-value store for resolved schemas
pub trait SchemaCache: Send + Sync {
    fn get(&self, key: &str) -> Option<Arc<FormSchema>>;

    fn put(&self, key: String, schema: Arc<FormSchema>);

    fn remove(&self, key: &str);
}

pub type DynSchemaCache = Arc<dyn SchemaCache>;

struct Entry {
    schema: Arc<FormSchema>,
    stored_at: Instant,
}

/// In-memory TTL cache
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
    ttl: Duration,
}

impl MemoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Number of live and expired entries currently held
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SchemaCache for MemoryCache {
    fn get(&self, key: &str) -> Option<Arc<FormSchema>> {
        {
            let entry = self.entries.get(key)?;
            if entry.stored_at.elapsed() < self.ttl {
                return Some(entry.schema.clone());
            }
        }
        // read guard must be dropped before removing from the same shard
        self.entries
            .remove_if(key, |_, e| e.stored_at.elapsed() >= self.ttl);
        None
    }

    fn put(&self, key: String, schema: Arc<FormSchema>) {
        self.entries.insert(
            key,
            Entry {
                schema,
                stored_at: Instant::now(),
            },
        );
    }

    fn remove(&self, key: &str) {
        self.entries.remove(key);
    }
}
