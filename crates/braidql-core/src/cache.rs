//! Advisory key-value cache with TTL expiry and LRU eviction.
//!
//! Purely an optimization: every failure path (lock poisoning,
//! serialization, capacity) is logged at DEBUG and swallowed, so no caller
//! ever fails because the cache failed. Keys are
//! `prefix:sha256(stable-serialization(parts))` — object keys are sorted
//! before hashing so logically-equal inputs always collide on the same
//! entry.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

/// Default entry lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Default capacity.
const DEFAULT_MAX_ENTRIES: usize = 1024;

struct CacheEntry {
    value:      Value,
    expires_at: Instant,
}

/// TTL-bound LRU cache for advisory lookups (schemas, plans).
pub struct AdvisoryCache {
    inner:       Mutex<LruCache<String, CacheEntry>>,
    default_ttl: Duration,
}

impl Default for AdvisoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES, DEFAULT_TTL)
    }
}

impl AdvisoryCache {
    /// Cache holding up to `max_entries` values for `default_ttl` each.
    ///
    /// A zero capacity degrades to capacity 1 rather than panicking.
    #[must_use]
    pub fn new(max_entries: usize, default_ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(max_entries)
            .unwrap_or_else(|| NonZeroUsize::new(1).expect("1 is non-zero"));
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            default_ttl,
        }
    }

    /// Get a value if present and not expired.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        let Ok(mut cache) = self.inner.lock() else {
            debug!("advisory cache lock poisoned; treating as miss");
            return None;
        };

        match cache.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                cache.pop(key);
                None
            },
            None => None,
        }
    }

    /// Store a value under `key` for `ttl` (default TTL when `None`).
    ///
    /// Serialization failures are logged and dropped.
    pub fn set<V: Serialize>(&self, key: &str, value: &V, ttl: Option<Duration>) {
        let encoded = match serde_json::to_value(value) {
            Ok(encoded) => encoded,
            Err(e) => {
                debug!(key, error = %e, "advisory cache could not serialize value");
                return;
            },
        };

        let Ok(mut cache) = self.inner.lock() else {
            debug!("advisory cache lock poisoned; dropping set");
            return;
        };
        cache.put(
            key.to_string(),
            CacheEntry {
                value:      encoded,
                expires_at: Instant::now() + ttl.unwrap_or(self.default_ttl),
            },
        );
    }

    /// Drop every entry.
    pub fn clear(&self) {
        if let Ok(mut cache) = self.inner.lock() {
            cache.clear();
        }
    }

    /// Build a cache key from ordered parts: `prefix:<sha256 hex>`.
    ///
    /// Part order matters; `key_from(p, [a, b]) != key_from(p, [b, a])`.
    #[must_use]
    pub fn key_from(&self, prefix: &str, parts: &[Value]) -> String {
        let canonical = stable_string(&Value::Array(parts.to_vec()));
        format!("{prefix}:{}", hex::encode(Sha256::digest(canonical.as_bytes())))
    }
}

/// Deterministic serialization: object keys sorted recursively, arrays in
/// order. Used for cache keys and anything embedded in model prompts.
#[must_use]
pub fn stable_string(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|k| {
                    format!(
                        "{}:{}",
                        serde_json::to_string(k).unwrap_or_default(),
                        stable_string(&map[k])
                    )
                })
                .collect();
            format!("{{{}}}", fields.join(","))
        },
        Value::Array(items) => {
            let rendered: Vec<String> = items.iter().map(stable_string).collect();
            format!("[{}]", rendered.join(","))
        },
        scalar => serde_json::to_string(scalar).unwrap_or_default(),
    }
}
