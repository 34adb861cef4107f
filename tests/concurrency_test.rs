//! Concurrency tests: single-flight population, failing leaders and
//! cancelled factories.

use anime_cache::CacheService;
use futures::future::join_all;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_population_under_contention() {
    init_logging();
    const TASKS: usize = 32;

    let cache = CacheService::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(TASKS));

    let handles: Vec<_> = (0..TASKS)
        .map(|_| {
            let cache = cache.clone();
            let calls = calls.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                cache
                    .get_or_create("anime:trending", || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok::<_, String>(vec!["Frieren".to_string(), "Dungeon Meshi".to_string()])
                    })
                    .await
            })
        })
        .collect();

    let results = join_all(handles).await;
    for result in results {
        let value = result
            .expect("Task failed")
            .expect("Factory should succeed");
        assert_eq!(value, vec!["Frieren".to_string(), "Dungeon Meshi".to_string()]);
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    cache.run_pending_tasks().await;
    let stats = cache.statistics();
    assert_eq!(stats.entries_count, 1);
    assert_eq!(stats.total_lookups(), TASKS as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_waiter_runs_its_own_factory_after_leader_fails() {
    init_logging();
    let cache = CacheService::default();
    let calls = Arc::new(AtomicUsize::new(0));

    let leader = {
        let cache = cache.clone();
        let calls = calls.clone();
        tokio::spawn(async move {
            cache
                .get_or_create("anime:42", || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Err::<u32, _>("upstream timeout".to_string())
                })
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(10)).await;

    let waiter = {
        let cache = cache.clone();
        let calls = calls.clone();
        tokio::spawn(async move {
            cache
                .get_or_create("anime:42", || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<u32, String>(42)
                })
                .await
        })
    };

    let leader = leader.await.expect("Leader task failed");
    let waiter = waiter.await.expect("Waiter task failed");

    assert_eq!(leader, Err("upstream timeout".to_string()));
    assert_eq!(waiter, Ok(42));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(cache.has_key("anime:42"));
}

#[tokio::test]
async fn test_cancelled_factory_leaves_no_entry() {
    init_logging();
    let cache = CacheService::default();

    let cancelled = tokio::time::timeout(
        Duration::from_millis(10),
        cache.get_or_create("anime:slow", || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<u32, String>(1)
        }),
    )
    .await;
    assert!(cancelled.is_err());
    assert!(!cache.has_key("anime:slow"));
    cache.run_pending_tasks().await;
    assert_eq!(cache.statistics().entries_count, 0);

    let value = cache
        .get_or_create("anime:slow", || async { Ok::<u32, String>(2) })
        .await
        .expect("Factory should succeed");
    assert_eq!(value, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_distinct_keys_populate_independently() {
    init_logging();
    let cache = CacheService::default();
    let calls = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8u32)
        .flat_map(|id| [id, id])
        .map(|id| {
            let cache = cache.clone();
            let calls = calls.clone();
            tokio::spawn(async move {
                cache
                    .get_or_create(&format!("anime:{}", id), || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok::<u32, String>(id)
                    })
                    .await
            })
        })
        .collect();

    for (handle, expected) in join_all(handles)
        .await
        .into_iter()
        .zip((0..8u32).flat_map(|id| [id, id]))
    {
        assert_eq!(handle.expect("Task failed"), Ok(expected));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 8);
    cache.run_pending_tasks().await;
    assert_eq!(cache.statistics().entries_count, 8);
}
