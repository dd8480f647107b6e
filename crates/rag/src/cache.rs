//! Response cache keyed by query content.

use moka::sync::Cache;
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::config::CacheConfig;

/// Get/set store of prior answer texts.
pub trait ResponseCache: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: String, answer: String);
}

/// SHA-256 hex of the whitespace-normalised, lower-cased query.
pub fn cache_key(query: &str) -> String {
    let normalised = query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    format!("{:x}", Sha256::digest(normalised.as_bytes()))
}

/// In-process cache with per-entry TTL.
pub struct MemoryResponseCache {
    cache: Cache<String, String>,
}

impl MemoryResponseCache {
    pub fn new(config: &CacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_entries)
            .time_to_live(Duration::from_secs(config.ttl_secs))
            .build();

        Self { cache }
    }

    pub fn clear(&self) {
        self.cache.invalidate_all();
    }
}

impl ResponseCache for MemoryResponseCache {
    fn get(&self, key: &str) -> Option<String> {
        self.cache.get(key)
    }

    fn set(&self, key: String, answer: String) {
        self.cache.insert(key, answer);
    }
}
