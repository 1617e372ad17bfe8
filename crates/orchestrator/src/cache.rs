//! Best-effort snapshot cache
//!
//! In-memory TTL cache behind the `SnapshotCache` trait, plus a no-op
//! implementation for deployments that disable caching. Keys for cached
//! classifications are content hashes, so the same utterance text hits
//! the same entry regardless of which call produced it.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use leadline_core::SnapshotCache;

/// Namespaced content-hash key, e.g. `classify:3a7bd3…`.
pub fn content_key(namespace: &str, content: &str) -> String {
    let digest = Sha256::digest(content.trim().to_lowercase().as_bytes());
    format!("{namespace}:{digest:x}")
}

struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-memory TTL cache. Expired entries are dropped lazily on access.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotCache for MemoryCache {
    async fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) {
        self.entries.lock().insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }
}

/// Cache that stores nothing. Used when caching is disabled; the
/// pipeline behaves identically, just slower.
pub struct NoopCache;

#[async_trait]
impl SnapshotCache for NoopCache {
    async fn get(&self, _key: &str) -> Option<String> {
        None
    }

    async fn put(&self, _key: &str, _value: String, _ttl: Duration) {}
}
