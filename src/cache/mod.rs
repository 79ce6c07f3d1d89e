//! In-memory cache of origin responses.
//!
//! # Data Flow
//! ```text
//! proxy handler
//!     → get(target)            snapshot of the entry, lock released
//!     → is_valid(entry, now)   fresh? serve it
//!     → set(target, ...)       after every origin fetch
//! ```
//!
//! # Design Decisions
//! - Keyed by the literal request target; no URL normalization
//! - Expiry is a monotonic instant, the validator is an HTTP date string
//! - Stale entries are kept as revalidation candidates until overwritten;
//!   nothing is evicted
//! - Backed by `DashMap`, so concurrent handlers only contend per shard and no
//!   lock is ever held across an `.await`

use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::time::Instant;

use crate::http::response::http_date;
use crate::observability::metrics;

/// A cached origin response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// The full response as received from the origin.
    pub response: Bytes,
    /// Entry is fresh strictly before this instant.
    pub expires_at: Instant,
    /// Sent back to the origin as `If-Modified-Since`.
    pub validator: String,
}

/// Shared response cache. Cloning yields another handle to the same entries.
#[derive(Debug, Clone)]
pub struct ProxyCache {
    entries: Arc<DashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl ProxyCache {
    /// Create an empty cache whose entries stay fresh for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Snapshot of the entry for `target`.
    pub fn get(&self, target: &str) -> Option<CacheEntry> {
        self.entries.get(target).map(|entry| entry.value().clone())
    }

    /// Whether `entry` may still be served without asking the origin.
    pub fn is_valid(entry: &CacheEntry, now: Instant) -> bool {
        now < entry.expires_at
    }

    /// Insert or overwrite the entry for `target`, fresh for one TTL from now.
    ///
    /// Without a validator the current wall-clock time is recorded instead.
    pub fn set(&self, target: &str, response: Bytes, validator: Option<String>) {
        let validator = validator.unwrap_or_else(|| http_date(SystemTime::now()));
        let entry = CacheEntry {
            response,
            expires_at: Instant::now() + self.ttl,
            validator,
        };
        self.entries.insert(target.to_string(), entry);
        metrics::record_cache_size(self.entries.len());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(30);

    #[tokio::test(start_paused = true)]
    async fn entry_is_valid_for_exactly_one_ttl() {
        let cache = ProxyCache::new(TTL);
        let stored_at = Instant::now();
        cache.set("http://example.com/", Bytes::from_static(b"resp"), None);
        let entry = cache.get("http://example.com/").unwrap();

        assert!(ProxyCache::is_valid(&entry, stored_at));
        assert!(ProxyCache::is_valid(&entry, stored_at + Duration::from_millis(29_999)));
        assert!(!ProxyCache::is_valid(&entry, stored_at + TTL));
        assert!(!ProxyCache::is_valid(&entry, stored_at + Duration::from_secs(31)));
    }

    #[tokio::test(start_paused = true)]
    async fn set_refreshes_expiry_and_keeps_given_validator() {
        let cache = ProxyCache::new(TTL);
        cache.set("k", Bytes::from_static(b"old"), Some("v1".into()));
        tokio::time::advance(Duration::from_secs(40)).await;

        let stale = cache.get("k").unwrap();
        assert!(!ProxyCache::is_valid(&stale, Instant::now()));

        cache.set("k", stale.response.clone(), Some("v2".into()));
        let refreshed = cache.get("k").unwrap();
        assert!(ProxyCache::is_valid(&refreshed, Instant::now()));
        assert_eq!(refreshed.response, Bytes::from_static(b"old"));
        assert_eq!(refreshed.validator, "v2");
    }

    #[tokio::test]
    async fn missing_validator_is_stamped_with_current_date() {
        let cache = ProxyCache::new(TTL);
        cache.set("k", Bytes::new(), None);
        let entry = cache.get("k").unwrap();
        let stamped = httpdate::parse_http_date(&entry.validator).unwrap();
        let age = SystemTime::now().duration_since(stamped).unwrap_or_default();
        assert!(age < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn keys_are_not_normalized() {
        let cache = ProxyCache::new(TTL);
        cache.set("http://Example.com/", Bytes::from_static(b"a"), None);
        assert!(cache.get("http://example.com/").is_none());
        assert!(cache.get("http://Example.com:80/").is_none());
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn clones_share_entries() {
        let cache = ProxyCache::new(TTL);
        let other = cache.clone();
        assert!(other.is_empty());
        cache.set("k", Bytes::from_static(b"x"), None);
        assert_eq!(other.get("k").unwrap().response, Bytes::from_static(b"x"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_leave_a_consistent_map() {
        let cache = ProxyCache::new(TTL);
        let mut tasks = Vec::new();
        for i in 0..8 {
            let cache = cache.clone();
            tasks.push(tokio::spawn(async move {
                for j in 0..100 {
                    let key = format!("http://h/{}", j % 10);
                    cache.set(&key, Bytes::from(format!("{i}-{j}")), None);
                    assert!(cache.get(&key).is_some());
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(cache.len(), 10);
    }
}
