//! Metrics hooks for cache operations.
//!
//! Implement [`CacheMetrics`] to forward cache activity to a monitoring
//! system:
//!
//! ```ignore
//! use anime_cache::observability::CacheMetrics;
//! use std::time::Duration;
//!
//! struct PrometheusMetrics;
//!
//! impl CacheMetrics for PrometheusMetrics {
//!     fn record_hit(&self, _key: &str, _duration: Duration) {
//!         // counter!("cache_hits").inc();
//!     }
//!     // ... implement other methods
//! }
//!
//! // let store = CacheStore::default().with_metrics(Box::new(PrometheusMetrics));
//! ```
//!
//! The store uses [`NoOpMetrics`] unless told otherwise. [`LogMetrics`]
//! keeps the trait's default methods, which write through the `log` crate.
//!
//! Metrics are independent of [`CacheStatistics`](crate::statistics::CacheStatistics):
//! the counters behind statistics are always maintained by the store.

use crate::store::EvictionReason;
use std::time::Duration;

/// Trait for cache metrics collection.
pub trait CacheMetrics: Send + Sync {
    /// A lookup found a ready value.
    fn record_hit(&self, key: &str, duration: Duration) {
        debug!("Cache HIT: {} took {:?}", key, duration);
    }

    /// A lookup found no ready value.
    fn record_miss(&self, key: &str, duration: Duration) {
        debug!("Cache MISS: {} took {:?}", key, duration);
    }

    /// A factory result was stored.
    fn record_populate(&self, key: &str, size: u64, duration: Duration) {
        debug!("Cache POPULATE: {} ({} units) took {:?}", key, size, duration);
    }

    /// A stored entry left the cache.
    fn record_eviction(&self, key: &str, reason: EvictionReason) {
        debug!("Cache EVICT: {} ({})", key, reason);
    }

    /// A factory failed.
    fn record_error(&self, key: &str, error: &str) {
        warn!("Cache ERROR for {}: {}", key, error);
    }
}

/// Default metrics implementation (no-op).
#[derive(Clone, Default)]
pub struct NoOpMetrics;

impl CacheMetrics for NoOpMetrics {
    fn record_hit(&self, _key: &str, _duration: Duration) {}
    fn record_miss(&self, _key: &str, _duration: Duration) {}
    fn record_populate(&self, _key: &str, _size: u64, _duration: Duration) {}
    fn record_eviction(&self, _key: &str, _reason: EvictionReason) {}
    fn record_error(&self, _key: &str, _error: &str) {}
}

/// Metrics written to the log.
#[derive(Clone, Default)]
pub struct LogMetrics;

impl CacheMetrics for LogMetrics {}
