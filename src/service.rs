//! High-level cache service for the catalog's request handlers.
//!
//! Wraps a [`CacheStore`] and a [`KeyDeriver`] in `Arc`s so one instance can
//! be cloned into every handler.

use crate::config::CacheConfig;
use crate::error::Result;
use crate::expression::Expr;
use crate::health::HealthReport;
use crate::key::{KeyDeriver, KeyNormalizer};
use crate::statistics::CacheStatistics;
use crate::store::{CacheStore, EntryOptions};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Get-or-create cache shared across threads.
///
/// Keys are normalized before lookup, so `"Anime:1"` and `" anime:1 "`
/// address the same entry. The `_auto` variants derive the key from a
/// computation descriptor instead of taking one.
///
/// # Example
///
/// ```no_run
/// use anime_cache::{CacheService, Expr, Method};
///
/// #[derive(Clone)]
/// struct Anime {
///     id: u32,
///     title: String,
/// }
///
/// async fn fetch(id: u32) -> Result<Anime, std::io::Error> {
///     Ok(Anime { id, title: "Mushishi".to_string() })
/// }
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let cache = CacheService::default();
///
///     // explicit key
///     let anime = cache.get_or_create("anime:12", || fetch(12)).await?;
///
///     // key derived from `() => "anime_service".get_by_id({"id":12}.id)`
///     let descriptor = Expr::lambda(Expr::call(
///         Expr::constant("anime_service"),
///         Method::asynchronous("AnimeService", "get_by_id"),
///         vec![Expr::captured("id", 12)],
///     ));
///     let same = cache.get_or_create_auto(&descriptor, || fetch(12)).await?;
///
///     assert_eq!(anime.title, same.title);
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct CacheService {
    store: Arc<CacheStore>,
    keys: KeyDeriver,
}

impl CacheService {
    /// Create a service around an existing store.
    pub fn new(store: CacheStore) -> Self {
        CacheService {
            store: Arc::new(store),
            keys: KeyDeriver::default(),
        }
    }

    /// Create a service with a fresh store built from `config`.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigError` if the configuration is invalid.
    pub fn from_config(config: CacheConfig) -> Result<Self> {
        Ok(Self::new(CacheStore::new(config)?))
    }

    /// Create a service configured from `ANIME_CACHE_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigError` if a variable is malformed or the
    /// resulting configuration is invalid.
    pub fn from_env() -> Result<Self> {
        Self::from_config(CacheConfig::from_env()?)
    }

    /// Use a specific key deriver, e.g. one sharing compiled fragments with
    /// other services.
    pub fn with_key_deriver(mut self, keys: KeyDeriver) -> Self {
        self.keys = keys;
        self
    }

    /// Cached value for `key`, created by `factory` on a miss.
    ///
    /// # Errors
    ///
    /// Returns the factory's error unchanged; nothing is cached for it.
    pub async fn get_or_create<K, T, E, F, Fut>(&self, key: &K, factory: F) -> std::result::Result<T, E>
    where
        K: Serialize + ?Sized,
        T: Clone + Send + Sync + 'static,
        E: fmt::Display,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        self.get_or_create_with(key, factory, EntryOptions::default())
            .await
    }

    /// Like [`get_or_create`](Self::get_or_create), overriding size and/or
    /// time to live for a newly created entry.
    pub async fn get_or_create_with<K, T, E, F, Fut>(
        &self,
        key: &K,
        factory: F,
        options: EntryOptions,
    ) -> std::result::Result<T, E>
    where
        K: Serialize + ?Sized,
        T: Clone + Send + Sync + 'static,
        E: fmt::Display,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let key = KeyNormalizer::normalize(key);
        self.store.get_or_create(&key, factory, options).await
    }

    /// Cached value for the key derived from `descriptor`.
    ///
    /// Key derivation never fails; see [`derive_key`](Self::derive_key).
    pub async fn get_or_create_auto<T, E, F, Fut>(
        &self,
        descriptor: &Expr,
        factory: F,
    ) -> std::result::Result<T, E>
    where
        T: Clone + Send + Sync + 'static,
        E: fmt::Display,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        self.get_or_create_auto_with(descriptor, factory, EntryOptions::default())
            .await
    }

    pub async fn get_or_create_auto_with<T, E, F, Fut>(
        &self,
        descriptor: &Expr,
        factory: F,
        options: EntryOptions,
    ) -> std::result::Result<T, E>
    where
        T: Clone + Send + Sync + 'static,
        E: fmt::Display,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let key = self.keys.derive(descriptor);
        trace!("Derived cache key {} for {}", key, descriptor);
        self.store.get_or_create(&key, factory, options).await
    }

    /// Whether `key` holds a live entry. Does not count as a hit or miss.
    pub fn has_key<K: Serialize + ?Sized>(&self, key: &K) -> bool {
        self.store.contains_key(&KeyNormalizer::normalize(key))
    }

    /// Remove `key`. Never counted as a capacity eviction.
    pub async fn remove<K: Serialize + ?Sized>(&self, key: &K) -> bool {
        self.store.remove(&KeyNormalizer::normalize(key)).await
    }

    /// Apply pending evictions so statistics are exact.
    pub async fn run_pending_tasks(&self) {
        self.store.run_pending_tasks().await;
    }

    pub fn statistics(&self) -> CacheStatistics {
        self.store.statistics()
    }

    /// Health report for a readiness endpoint.
    pub fn health(&self) -> HealthReport {
        if !self.store.config().track_statistics {
            return HealthReport::unhealthy("Cache statistics are not tracked");
        }
        HealthReport::from_statistics(&self.store.statistics())
    }

    /// The normalized key the `_auto` variants use for `descriptor`.
    pub fn derive_key(&self, descriptor: &Expr) -> String {
        self.keys.derive(descriptor)
    }

    /// Get a reference to the underlying store.
    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    /// Start background cache maintenance. See [`CacheStore::spawn_janitor`].
    pub fn spawn_janitor(&self, interval: Duration) -> JoinHandle<()> {
        self.store.spawn_janitor(interval)
    }
}

impl Default for CacheService {
    fn default() -> Self {
        Self::new(CacheStore::default())
    }
}
