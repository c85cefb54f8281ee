use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::time::Instant;

/// In-process TTL cache for upstream documents.
///
/// An entry is logically absent the moment its deadline passes: `get`
/// checks the deadline on every read, so physical purging is a memory
/// concern and never a correctness one. Writes overwrite wholesale; a
/// racing pair of writers on the same key resolves by last write wins,
/// which is acceptable because both hold equally fresh documents.
#[derive(Debug, Default)]
pub struct TtlCache {
    entries: DashMap<String, CacheEntry>,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

impl TtlCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Returns the cached document iff an entry exists for `key` and is
    /// still live. The deadline is exclusive: a read at exactly
    /// `expires_at` already misses, and the dead entry is dropped on the
    /// way out.
    pub fn get(&self, key: &str) -> Option<Value> {
        if let Some(entry) = self.entries.get(key) {
            if Instant::now() < entry.expires_at {
                return Some(entry.value.clone());
            }
            drop(entry);
            self.entries.remove(key);
        }
        None
    }

    /// Stores `value` under `key` until `ttl` from now, unconditionally
    /// replacing any prior entry.
    pub fn put(&self, key: &str, value: Value, ttl: Duration) {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Physically drops expired entries. Optional housekeeping for
    /// long-running processes; readers never observe expired entries
    /// whether or not this runs.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| now < entry.expires_at);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
