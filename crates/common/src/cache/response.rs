//! TTL response cache with in-flight request deduplication
//!
//! Two independent mechanisms share one type:
//!
//! - a TTL store: entries are readable only while `now < expires_at`; an
//!   expired entry is evicted by the read that finds it
//! - a pending registry: concurrent callers for the same key attach to one
//!   shared future instead of each starting their own request
//!
//! A pending entry is removed from the registry inside the shared future,
//! before any attached caller observes its result, so a request arriving
//! right after settlement starts fresh instead of joining a finished handle.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use super::stats::{CacheStats, MetricsCollector};
use crate::error::ClientError;
use crate::time::{Clock, SystemClock};

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
    expires_at: Instant,
}

type PendingRequest<V> = Shared<BoxFuture<'static, Result<V, ClientError>>>;
type PendingRegistry<V> = Arc<Mutex<HashMap<String, PendingRequest<V>>>>;

/// Keyed TTL cache plus in-flight request registry.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use routelink_common::cache::ResponseCache;
///
/// let cache: ResponseCache<String> = ResponseCache::new();
/// cache.write("GET http://api/x", "payload".to_string(), Duration::from_secs(60));
/// assert_eq!(cache.read("GET http://api/x").as_deref(), Some("payload"));
///
/// cache.invalidate(Some("/x"));
/// assert!(cache.read("GET http://api/x").is_none());
/// ```
pub struct ResponseCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
    pending: PendingRegistry<V>,
    metrics: MetricsCollector,
    clock: Arc<dyn Clock>,
}

impl<V> ResponseCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Empty cache on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Empty cache on an explicit clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            pending: Arc::new(Mutex::new(HashMap::new())),
            metrics: MetricsCollector::default(),
            clock,
        }
    }

    /// Return the cached value if it has not expired.
    ///
    /// An expired entry is removed and the read counts as a miss.
    pub fn read(&self, key: &str) -> Option<V> {
        let now = self.clock.now();

        {
            let entries = self.entries.read();
            match entries.get(key) {
                None => {
                    self.metrics.record_miss();
                    return None;
                }
                Some(entry) if now < entry.expires_at => {
                    self.metrics.record_hit();
                    return Some(entry.value.clone());
                }
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write();
        // Re-check under the write lock; a concurrent write may have refreshed it.
        match entries.get(key) {
            Some(entry) if now < entry.expires_at => {
                self.metrics.record_hit();
                Some(entry.value.clone())
            }
            Some(_) => {
                entries.remove(key);
                self.metrics.record_expirations(1);
                self.metrics.record_miss();
                trace!(key, "evicted expired cache entry");
                None
            }
            None => {
                self.metrics.record_miss();
                None
            }
        }
    }

    /// Store a value for `ttl`. A zero TTL stores nothing.
    pub fn write(&self, key: impl Into<String>, value: V, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }

        let stored_at = self.clock.now();
        let Some(expires_at) = stored_at.checked_add(ttl) else {
            debug!(?ttl, "cache TTL overflows the clock; entry not stored");
            return;
        };

        self.entries.write().insert(key.into(), CacheEntry { value, stored_at, expires_at });
        self.metrics.record_insert();
    }

    /// Remove every entry whose key contains `pattern`, or everything when
    /// no pattern is given. Returns the number of entries removed.
    ///
    /// In-flight requests are not affected.
    pub fn invalidate(&self, pattern: Option<&str>) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();

        match pattern {
            None => entries.clear(),
            Some(pattern) => entries.retain(|key, _| !key.contains(pattern)),
        }

        let removed = before - entries.len();
        self.metrics.record_invalidations(removed as u64);
        debug!(pattern = pattern.unwrap_or("*"), removed, "cache invalidated");
        removed
    }

    /// Drop every expired entry. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| now < entry.expires_at);
        let removed = before - entries.len();
        self.metrics.record_expirations(removed as u64);
        removed
    }

    /// How long ago the live entry for `key` was stored.
    pub fn age(&self, key: &str) -> Option<Duration> {
        let now = self.clock.now();
        self.entries
            .read()
            .get(key)
            .filter(|entry| now < entry.expires_at)
            .map(|entry| now.saturating_duration_since(entry.stored_at))
    }

    /// Whether `key` is physically present, expired or not.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Entries held, expired ones included until purged.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether no entries are held.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Number of requests currently registered as in flight.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Hit, miss and size counters.
    pub fn stats(&self) -> CacheStats {
        self.metrics.snapshot(self.len(), self.pending_count())
    }

    /// Join the in-flight request for `key`, or start one with `factory`.
    ///
    /// `factory` runs at most once per settlement; every caller attached in
    /// the meantime receives a clone of the same result, success or failure.
    pub async fn attach_or_create<F, Fut>(&self, key: &str, factory: F) -> Result<V, ClientError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, ClientError>> + Send + 'static,
    {
        let request = {
            let mut pending = self.pending.lock();
            if let Some(existing) = pending.get(key) {
                self.metrics.record_dedup_join();
                debug!(key, "attached to in-flight request");
                existing.clone()
            } else {
                let registry = Arc::clone(&self.pending);
                let owned_key = key.to_string();
                let work = factory();
                let request = async move {
                    let result = work.await;
                    registry.lock().remove(&owned_key);
                    result
                }
                .boxed()
                .shared();
                pending.insert(key.to_string(), request.clone());
                request
            }
        };

        request.await
    }
}

impl<V> Default for ResponseCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
