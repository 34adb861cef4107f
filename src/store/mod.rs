//! In-memory get-or-create store backed by `moka`.
//!
//! Each entry is weighed by its size in abstract units against the
//! configured ceiling and carries its own time to live. Concurrent misses
//! on one key are coalesced by moka's `try_get_with`: one factory runs and
//! every waiter observes its value. A failed or cancelled factory stores
//! nothing; waiters then run their own factory.
//!
//! Eviction and expiry are applied by moka's maintenance, which runs as
//! the cache is used, periodically from [`CacheStore::spawn_janitor`] or
//! on demand from [`CacheStore::run_pending_tasks`]. Entry count and size
//! in [`CacheStatistics`] reflect the maintenance performed so far.

mod entry;
mod eviction;

pub use eviction::{CapacityEvictionCounter, EvictionListener, EvictionReason};

use crate::config::CacheConfig;
use crate::error::Result;
use crate::observability::{CacheMetrics, NoOpMetrics};
use crate::statistics::{CacheStatistics, RawCounters};
use entry::{EntryExpiry, Stored};
use moka::future::Cache;
use moka::notification::RemovalCause;
use moka::policy::EvictionPolicy;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Per-population overrides of the configured defaults.
///
/// # Example
///
/// ```
/// use anime_cache::EntryOptions;
/// use std::time::Duration;
///
/// let options = EntryOptions::default()
///     .with_size(4)
///     .with_ttl(Duration::from_secs(30));
/// assert_eq!(options.size, Some(4));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryOptions {
    /// Size units; `None` uses `CacheConfig::default_item_size`.
    pub size: Option<u64>,
    /// Time to live; `None` uses `CacheConfig::default_expiration`.
    pub ttl: Option<Duration>,
}

impl EntryOptions {
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

// Leader's factory failed; its error stays with the leader.
#[derive(Debug)]
struct FactoryFailed;

/// Fans removals out to eviction listeners and metrics.
struct Notifier {
    listeners: Vec<Arc<dyn EvictionListener>>,
    metrics: Arc<dyn CacheMetrics>,
}

impl Notifier {
    fn on_removal(&self, key: &str, stored: &Stored, cause: RemovalCause) {
        let reason = match cause {
            RemovalCause::Size => EvictionReason::Capacity,
            RemovalCause::Expired => EvictionReason::Expired,
            RemovalCause::Explicit => EvictionReason::Removed,
            // replaced values never left the cache
            _ => return,
        };
        self.evicted(key, stored.size, reason);
    }

    fn evicted(&self, key: &str, size: u64, reason: EvictionReason) {
        debug!("✓ Cache EVICT {} ({} units, {})", key, size, reason);
        self.metrics.record_eviction(key, reason);
        for listener in &self.listeners {
            listener.on_evict(key, size, reason);
        }
    }
}

fn build_cache(config: &CacheConfig, notifier: Arc<Notifier>) -> Cache<String, Stored> {
    Cache::builder()
        .max_capacity(config.size_limit)
        .weigher(|_key: &String, stored: &Stored| stored.weight())
        .expire_after(EntryExpiry)
        .eviction_policy(EvictionPolicy::lru())
        .eviction_listener(move |key: Arc<String>, stored: Stored, cause| {
            notifier.on_removal(&key, &stored, cause)
        })
        .build()
}

/// Thread-safe get-or-create store keyed by normalized strings.
///
/// Values of any `Clone + Send + Sync + 'static` type can be stored; each key
/// holds one type at a time.
///
/// # Example
///
/// ```no_run
/// use anime_cache::{CacheStore, EntryOptions};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = CacheStore::default();
///
///     let title: String = store
///         .get_or_create(
///             "anime:1:title",
///             || async { Ok::<_, std::io::Error>("Cowboy Bebop".to_string()) },
///             EntryOptions::default(),
///         )
///         .await?;
///
///     assert_eq!(title, "Cowboy Bebop");
///     assert!(store.contains_key("anime:1:title"));
///     Ok(())
/// }
/// ```
pub struct CacheStore {
    cache: Cache<String, Stored>,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    capacity_evictions: Arc<CapacityEvictionCounter>,
    notifier: Arc<Notifier>,
}

impl CacheStore {
    /// Create a store after validating `config`.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigError` if the configuration is invalid.
    pub fn new(config: CacheConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: CacheConfig) -> Self {
        let capacity_evictions = Arc::new(CapacityEvictionCounter::new());
        let notifier = Arc::new(Notifier {
            listeners: vec![capacity_evictions.clone() as Arc<dyn EvictionListener>],
            metrics: Arc::new(NoOpMetrics),
        });
        CacheStore {
            cache: build_cache(&config, notifier.clone()),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            capacity_evictions,
            notifier,
        }
    }

    // The listener is fixed when moka builds the cache, so configuring
    // notifications rebuilds it. Only called from the `with_*` builders.
    fn rewire(mut self, notifier: Notifier) -> Self {
        let notifier = Arc::new(notifier);
        self.cache = build_cache(&self.config, notifier.clone());
        self.notifier = notifier;
        self
    }

    /// Set custom metrics handler. Configure before first use: entries
    /// already stored are dropped.
    pub fn with_metrics(self, metrics: Box<dyn CacheMetrics>) -> Self {
        let notifier = Notifier {
            listeners: self.notifier.listeners.clone(),
            metrics: Arc::from(metrics),
        };
        self.rewire(notifier)
    }

    /// Register an additional eviction listener. Configure before first
    /// use: entries already stored are dropped.
    pub fn with_listener(self, listener: Arc<dyn EvictionListener>) -> Self {
        let mut listeners = self.notifier.listeners.clone();
        listeners.push(listener);
        let notifier = Notifier {
            listeners,
            metrics: self.notifier.metrics.clone(),
        };
        self.rewire(notifier)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Return the value stored under `key`, or run `factory` and store its
    /// result.
    ///
    /// Only one factory runs per key at a time; concurrent callers wait for
    /// it and share its value. A hit never extends the entry's expiration.
    /// An entry larger than the whole size limit is returned but not kept.
    ///
    /// # Errors
    ///
    /// Returns the factory's own error unchanged. Nothing is stored for a
    /// failed or cancelled factory, so the next caller runs its factory.
    pub async fn get_or_create<T, E, F, Fut>(
        &self,
        key: &str,
        factory: F,
        options: EntryOptions,
    ) -> std::result::Result<T, E>
    where
        T: Clone + Send + Sync + 'static,
        E: fmt::Display,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let timer = Instant::now();
        let size = options.size.unwrap_or(self.config.default_item_size);
        let ttl = options.ttl.unwrap_or(self.config.default_expiration);

        if let Some(stored) = self.cache.get(key).await {
            let Some(value) = stored.downcast::<T>() else {
                return self.bypass(key, factory).await;
            };
            self.hits.fetch_add(1, Ordering::Relaxed);
            self.metrics().record_hit(key, timer.elapsed());
            debug!("✓ Cache GET {} -> HIT", key);
            return Ok(value);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        self.metrics().record_miss(key, timer.elapsed());
        debug!("✓ Cache GET {} -> MISS", key);

        if size > self.config.size_limit {
            return self.create_oversized(key, factory, size).await;
        }

        let mut factory = Some(factory);
        let mut failure: Option<E> = None;
        loop {
            let init = async {
                let Some(factory) = factory.take() else {
                    return Err(FactoryFailed);
                };
                match factory().await {
                    Ok(value) => Ok(Stored::new(value, size, ttl)),
                    Err(e) => {
                        failure = Some(e);
                        Err(FactoryFailed)
                    }
                }
            };

            match self.cache.try_get_with(key.to_owned(), init).await {
                Ok(stored) => {
                    if factory.is_none() {
                        debug!("✓ Cache SET {} ({} units, TTL: {:?})", key, size, ttl);
                        self.metrics().record_populate(key, size, timer.elapsed());
                    }
                    if let Some(value) = stored.downcast::<T>() {
                        return Ok(value);
                    }
                    // another caller populated a different type meanwhile
                    if let Some(factory) = factory.take() {
                        return self.bypass(key, factory).await;
                    }
                }
                Err(_) => match failure.take() {
                    Some(e) => {
                        self.metrics().record_error(key, &e.to_string());
                        return Err(e);
                    }
                    None => debug!("Cache population of {} failed elsewhere, retrying", key),
                },
            }
        }
    }

    async fn bypass<T, E, F, Fut>(&self, key: &str, factory: F) -> std::result::Result<T, E>
    where
        E: fmt::Display,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        warn!(
            "Cache key {} holds a value of another type than {}, bypassing cache",
            key,
            std::any::type_name::<T>()
        );
        factory().await
    }

    async fn create_oversized<T, E, F, Fut>(
        &self,
        key: &str,
        factory: F,
        size: u64,
    ) -> std::result::Result<T, E>
    where
        E: fmt::Display,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        match factory().await {
            Ok(value) => {
                warn!(
                    "Cache entry {} ({} units) exceeds size limit {}, not kept",
                    key, size, self.config.size_limit
                );
                self.notifier.evicted(key, size, EvictionReason::Capacity);
                Ok(value)
            }
            Err(e) => {
                self.metrics().record_error(key, &e.to_string());
                Err(e)
            }
        }
    }

    fn metrics(&self) -> &dyn CacheMetrics {
        self.notifier.metrics.as_ref()
    }

    /// Whether `key` holds a live entry. Does not count as a hit or miss.
    pub fn contains_key(&self, key: &str) -> bool {
        self.cache.contains_key(key)
    }

    /// Remove `key` unconditionally. Returns whether a live entry was present.
    pub async fn remove(&self, key: &str) -> bool {
        let removed = self.cache.remove(key).await.is_some();
        if removed {
            debug!("✓ Cache DELETE {}", key);
        }
        removed
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.cache.invalidate_all();
        warn!("⚠ Cache CLEAR executed - all entries removed!");
    }

    /// Apply pending evictions and drop expired entries now.
    pub async fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks().await;
    }

    /// Number of resident entries as of the last maintenance.
    pub fn len(&self) -> u64 {
        self.cache.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Point-in-time statistics, zeroed when tracking is disabled.
    pub fn statistics(&self) -> CacheStatistics {
        if !self.config.track_statistics {
            return CacheStatistics::zeroed(self.config.default_item_size, self.config.size_limit);
        }

        CacheStatistics::new(
            RawCounters {
                hits: self.hits.load(Ordering::Relaxed),
                misses: self.misses.load(Ordering::Relaxed),
                entries: self.cache.entry_count(),
                estimated_size: self.cache.weighted_size(),
                evictions: self.capacity_evictions.count(),
            },
            self.config.default_item_size,
            self.config.size_limit,
        )
    }

    /// Print store statistics to debug log.
    pub fn log_stats(&self) {
        let stats = self.statistics();
        debug!(
            "Cache Stats: {} entries, {}/{} units, {} hits, {} misses, {} evictions ({})",
            stats.entries_count,
            stats.estimated_unit_size,
            stats.max_unit_size,
            stats.hits,
            stats.misses,
            stats.eviction_count,
            stats.state
        );
    }

    /// Spawn a task that runs cache maintenance every `interval`.
    ///
    /// The task holds a weak reference and ends once the store is dropped.
    /// Must be called inside a tokio runtime.
    pub fn spawn_janitor(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let store: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            info!("Cache janitor started (every {:?})", interval);
            let mut ticker = tokio::time::interval(interval);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                store.run_pending_tasks().await;
            }
            info!("Cache janitor stopped");
        })
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::build(CacheConfig::default())
    }
}
