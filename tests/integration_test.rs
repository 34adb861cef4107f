//! Integration tests for anime-cache
//!
//! These tests drive the cache the way the catalog's handlers do: a
//! repository behind a `CacheService`, keyed explicitly or by descriptor.

use anime_cache::{
    CacheConfig, CacheService, CacheState, EntryOptions, EvictionListener, EvictionReason, Expr,
    HealthStatus, Method, StaticType,
};
use serde::Serialize;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Clone, Debug, PartialEq, Serialize)]
struct Anime {
    id: u32,
    title: String,
    genre: String,
}

/// Repository stand-in that counts round trips.
#[derive(Default)]
struct AnimeRepository {
    calls: AtomicUsize,
    failing: std::sync::atomic::AtomicBool,
}

impl AnimeRepository {
    async fn get_by_id(&self, id: u32) -> Result<Anime, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(format!("connection refused while loading anime {}", id));
        }
        Ok(Anime {
            id,
            title: format!("Anime #{}", id),
            genre: if id % 2 == 0 { "drama" } else { "action" }.to_string(),
        })
    }

    async fn by_genre(&self, genre: &str) -> Result<Vec<Anime>, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok((1..=3)
            .map(|id| Anime {
                id,
                title: format!("{} #{}", genre, id),
                genre: genre.to_string(),
            })
            .collect())
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn get_by_id(id: u32) -> Expr {
    Expr::lambda(Expr::call(
        Expr::constant("anime_service"),
        Method::asynchronous("AnimeService", "get_by_id"),
        vec![Expr::captured("id", id)],
    ))
}

fn by_genre(genre: &str) -> Expr {
    Expr::lambda(Expr::call(
        Expr::constant("anime_service"),
        Method::asynchronous("AnimeService", "by_genre"),
        vec![Expr::captured("genre", genre)],
    ))
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<(String, EvictionReason)>>,
}

impl EvictionListener for Recorder {
    fn on_evict(&self, key: &str, _size: u64, reason: EvictionReason) {
        self.events
            .lock()
            .expect("Failed to lock events")
            .push((key.to_string(), reason));
    }
}

/// Test 1: End-to-End Auto-Key Flow
///
/// - Cache miss → repository hit → cache populated
/// - Same descriptor over the same captured id hits the cache
/// - A different captured id is a different entry
#[tokio::test]
async fn test_auto_key_end_to_end() {
    init_logging();
    let cache = CacheService::default();
    let repo = AnimeRepository::default();

    let first = cache
        .get_or_create_auto(&get_by_id(1), || repo.get_by_id(1))
        .await
        .expect("Failed to load anime 1");
    let again = cache
        .get_or_create_auto(&get_by_id(1), || repo.get_by_id(1))
        .await
        .expect("Failed to load anime 1 again");
    assert_eq!(first, again);
    assert_eq!(repo.calls(), 1);

    let second = cache
        .get_or_create_auto(&get_by_id(2), || repo.get_by_id(2))
        .await
        .expect("Failed to load anime 2");
    assert_eq!(second.id, 2);
    assert_eq!(repo.calls(), 2);

    cache.run_pending_tasks().await;
    let stats = cache.statistics();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 2);
    assert_eq!(stats.entries_count, 2);
}

/// Test 2: Descriptors with equal values but different computations
#[tokio::test]
async fn test_rendering_separates_equal_values() {
    init_logging();
    let cache = CacheService::default();

    // both evaluate to {"genre": "action"} style arguments, but call
    // different methods
    let listing = by_genre("action");
    let featured = Expr::lambda(Expr::call(
        Expr::constant("anime_service"),
        Method::asynchronous("AnimeService", "featured"),
        vec![Expr::captured("genre", "action")],
    ));
    assert_ne!(cache.derive_key(&listing), cache.derive_key(&featured));

    // statics and conditionals resolve to their values
    let config = Arc::new(StaticType::new("CatalogDefaults").with_member("page_size", 20));
    let paged = |adult: bool| {
        Expr::lambda(Expr::conditional(
            Expr::captured("include_adult", adult),
            Expr::static_member(config.clone(), "page_size"),
            Expr::constant(10),
        ))
    };
    assert_eq!(cache.derive_key(&paged(true)), cache.derive_key(&paged(true)));
    assert_ne!(cache.derive_key(&paged(true)), cache.derive_key(&paged(false)));
}

/// Test 3: Explicit keys are normalized
#[tokio::test]
async fn test_explicit_key_flow() {
    init_logging();
    let cache = CacheService::default();
    let repo = AnimeRepository::default();

    let dramas = cache
        .get_or_create("Genre:Drama", || repo.by_genre("drama"))
        .await
        .expect("Failed to load genre");
    assert_eq!(dramas.len(), 3);

    let cached = cache
        .get_or_create("  genre:DRAMA", || repo.by_genre("drama"))
        .await
        .expect("Failed to load genre again");
    assert_eq!(dramas, cached);
    assert_eq!(repo.calls(), 1);

    #[derive(Serialize)]
    struct Search<'a> {
        query: &'a str,
        page: u32,
    }

    assert!(!cache.has_key(&Search { query: "mecha", page: 1 }));
    cache
        .get_or_create(&Search { query: "mecha", page: 1 }, || repo.by_genre("mecha"))
        .await
        .expect("Failed to search");
    assert!(cache.has_key(&json!({ "page": 1, "query": "MECHA" })));
}

/// Test 4: TTL Expiry
#[tokio::test]
async fn test_ttl_expiry() {
    init_logging();
    let cache = CacheService::default();
    let repo = AnimeRepository::default();
    let options = EntryOptions::default().with_ttl(Duration::from_millis(1));

    cache
        .get_or_create_with("anime:season", || repo.get_by_id(9), options)
        .await
        .expect("Failed to load");
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(!cache.has_key("anime:season"));
    cache
        .get_or_create_with("anime:season", || repo.get_by_id(9), options)
        .await
        .expect("Failed to reload");
    assert_eq!(repo.calls(), 2);
    cache.run_pending_tasks().await;
    assert_eq!(cache.statistics().eviction_count, 0);
}

/// Test 5: Factory failures propagate and are never cached
#[tokio::test]
async fn test_factory_failure_not_cached() {
    init_logging();
    let cache = CacheService::default();
    let repo = AnimeRepository::default();
    repo.failing.store(true, Ordering::SeqCst);

    let err = cache
        .get_or_create_auto(&get_by_id(5), || repo.get_by_id(5))
        .await
        .expect_err("Factory error should propagate");
    assert_eq!(err, "connection refused while loading anime 5");
    assert!(!cache.has_key(&cache.derive_key(&get_by_id(5))));

    repo.failing.store(false, Ordering::SeqCst);
    let anime = cache
        .get_or_create_auto(&get_by_id(5), || repo.get_by_id(5))
        .await
        .expect("Second attempt should succeed");
    assert_eq!(anime.id, 5);
    assert_eq!(repo.calls(), 2);
}

/// Test 6: Only capacity pressure counts as an eviction
#[tokio::test]
async fn test_eviction_accounting() {
    init_logging();
    let recorder = Arc::new(Recorder::default());
    let store = anime_cache::CacheStore::new(CacheConfig::default().with_size_limit(4))
        .expect("Failed to build store")
        .with_listener(recorder.clone());
    let cache = CacheService::new(store);
    let repo = AnimeRepository::default();
    let sized = EntryOptions::default().with_size(2);

    for id in 1..=2 {
        cache
            .get_or_create_with(&format!("anime:{}", id), || repo.get_by_id(id), sized)
            .await
            .expect("Failed to load");
    }
    assert!(cache.remove("anime:1").await);
    cache.run_pending_tasks().await;
    assert_eq!(cache.statistics().eviction_count, 0);

    for id in 3..=4 {
        cache
            .get_or_create_with(&format!("anime:{}", id), || repo.get_by_id(id), sized)
            .await
            .expect("Failed to load");
        cache.run_pending_tasks().await;
    }
    // 2 + 2 + 2 units against a ceiling of 4
    let stats = cache.statistics();
    assert_eq!(stats.eviction_count, 1);
    assert_eq!(stats.estimated_unit_size, 4);
    assert!(!cache.has_key("anime:2"));

    let events = recorder.events.lock().expect("Failed to lock events").clone();
    assert_eq!(
        events,
        vec![
            ("anime:1".to_string(), EvictionReason::Removed),
            ("anime:2".to_string(), EvictionReason::Capacity),
        ]
    );
}

/// Test 7: Health follows the statistics state
#[tokio::test]
async fn test_health_scenarios() {
    init_logging();
    let cache = CacheService::from_config(CacheConfig::default().with_size_limit(10))
        .expect("Failed to build service");
    let repo = AnimeRepository::default();

    assert_eq!(cache.statistics().state, CacheState::Empty);
    assert_eq!(cache.health().status, HealthStatus::Healthy);

    // one miss and no hits yet
    cache
        .get_or_create("anime:1", || repo.get_by_id(1))
        .await
        .expect("Failed to load");
    cache.run_pending_tasks().await;
    assert_eq!(cache.statistics().state, CacheState::Ineffective);
    assert_eq!(cache.health().status, HealthStatus::Degraded);

    for _ in 0..3 {
        cache
            .get_or_create("anime:1", || repo.get_by_id(1))
            .await
            .expect("Failed to hit");
    }
    cache.run_pending_tasks().await;
    assert_eq!(cache.statistics().state, CacheState::Healthy);
    assert_eq!(cache.health().status, HealthStatus::Healthy);

    cache
        .get_or_create_with(
            "anime:all",
            || repo.by_genre("all"),
            EntryOptions::default().with_size(8),
        )
        .await
        .expect("Failed to load");
    cache.run_pending_tasks().await;
    let report = cache.health();
    assert_eq!(report.status, HealthStatus::Degraded);
    assert_eq!(report.data["state"], "under_pressure");
}

/// Test 8: Unevaluable descriptors still key the cache
#[tokio::test]
async fn test_unevaluable_descriptor_falls_back() {
    init_logging();
    let cache = CacheService::default();
    let repo = AnimeRepository::default();
    let broken = Expr::lambda(Expr::member(Expr::constant(serde_json::Value::Null), "id"));

    let key = cache.derive_key(&broken);
    assert!(key.contains("null.id"));

    for _ in 0..2 {
        cache
            .get_or_create_auto(&broken, || repo.get_by_id(0))
            .await
            .expect("Failed to load");
    }
    assert_eq!(repo.calls(), 1);
}
