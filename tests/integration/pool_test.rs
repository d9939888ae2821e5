//! Browser Pool Integration Tests
//!
//! Concurrent checkouts against a small pool: exclusive leases, bounded
//! steady size, reuse of warm instances, and release on every exit path.

use std::time::Duration;

use webaudit::services::browser::{BrowserPool, PoolConfig};
use webaudit_core::CoreError;

use crate::support::CountingEngine;

fn config(max_size: usize, max_uses: u32) -> PoolConfig {
    PoolConfig {
        initial_size: max_size,
        min_size: 1,
        max_size,
        max_uses,
        max_idle: Duration::from_secs(300),
        maintenance_interval: Duration::from_secs(3600),
        session_timeout: Duration::from_secs(5),
    }
}

async fn settle() {
    // Lets detached close/replacement tasks run.
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

// ============================================================================
// Exclusivity
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_leases_never_share_an_instance() {
    let engine = CountingEngine::new();
    let pool = BrowserPool::start(engine.clone(), config(3, 1_000)).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..24 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            let lease = pool.checkout_default().await.unwrap();
            tokio::time::sleep(Duration::from_millis(2)).await;
            pool.release(lease).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(engine.overlaps(), 0);
    let stats = pool.stats();
    assert_eq!(stats.leased, 0);
    assert_eq!(stats.total_leases, 24);
    assert!(stats.size <= 3, "steady size {} above max", stats.size);
    assert_eq!(stats.overflow, 0);

    pool.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_overflow_lease_is_temporary() {
    let engine = CountingEngine::new();
    let pool = BrowserPool::start(engine.clone(), config(1, 1_000)).await.unwrap();

    let first = pool.checkout_default().await.unwrap();
    let second = pool.checkout_default().await.unwrap();
    assert!(!first.is_overflow());
    assert!(second.is_overflow());
    assert_ne!(first.entry_id(), second.entry_id());
    assert_eq!(pool.stats().overflow, 1);

    pool.release(second).await.unwrap();
    pool.release(first).await.unwrap();

    let stats = pool.stats();
    assert_eq!(stats.size, 1);
    assert_eq!(stats.overflow, 0);
    assert_eq!(engine.closed(), 1);

    pool.shutdown().await.unwrap();
}

// ============================================================================
// Reuse and retirement
// ============================================================================

#[tokio::test]
async fn test_sequential_checkouts_reuse_warm_instances() {
    let engine = CountingEngine::new();
    let pool = BrowserPool::start(engine.clone(), config(2, 1_000)).await.unwrap();
    assert_eq!(engine.opened(), 2);

    for _ in 0..10 {
        let lease = pool.checkout_default().await.unwrap();
        pool.release(lease).await.unwrap();
    }

    assert_eq!(engine.opened(), 2);
    assert_eq!(pool.stats().total_retired, 0);
    pool.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_exhausted_instances_are_retired_and_replaced() {
    let engine = CountingEngine::new();
    let pool = BrowserPool::start(engine.clone(), config(1, 2)).await.unwrap();

    for _ in 0..6 {
        let lease = pool.checkout_default().await.unwrap();
        pool.release(lease).await.unwrap();
    }

    let stats = pool.stats();
    assert_eq!(stats.total_retired, 3);
    assert_eq!(engine.closed(), 3);
    // One initial launch plus one replacement per retirement
    assert_eq!(engine.opened(), 4);
    assert_eq!(stats.size, 1);

    pool.shutdown().await.unwrap();
}

// ============================================================================
// Release on every exit path
// ============================================================================

#[tokio::test]
async fn test_dropped_lease_returns_to_pool() {
    let engine = CountingEngine::new();
    let pool = BrowserPool::start(engine.clone(), config(1, 1_000)).await.unwrap();

    {
        let _lease = pool.checkout_default().await.unwrap();
        assert_eq!(pool.stats().leased, 1);
    }
    settle().await;

    assert_eq!(pool.stats().leased, 0);
    assert_eq!(pool.stats().idle, 1);
    let again = pool.checkout_default().await.unwrap();
    assert!(!again.is_overflow());
    pool.release(again).await.unwrap();

    assert_eq!(engine.overlaps(), 0);
    pool.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_lease_released_when_holder_panics() {
    let engine = CountingEngine::new();
    let pool = BrowserPool::start(engine.clone(), config(1, 1_000)).await.unwrap();

    let task_pool = pool.clone();
    let joined = tokio::spawn(async move {
        let _lease = task_pool.checkout_default().await.unwrap();
        panic!("phase blew up while holding a lease");
    })
    .await;
    assert!(joined.is_err());
    settle().await;

    assert_eq!(pool.stats().leased, 0);
    assert_eq!(pool.stats().size, 1);
    pool.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_release_into_foreign_pool_is_rejected() {
    let pool_a = BrowserPool::start(CountingEngine::new(), config(1, 10)).await.unwrap();
    let pool_b = BrowserPool::start(CountingEngine::new(), config(1, 10)).await.unwrap();

    let lease = pool_a.checkout_default().await.unwrap();
    let err = pool_b.release(lease).await.unwrap_err();
    assert!(matches!(err, CoreError::LeaseNotHeld(_)));

    // The rejected lease was dropped and settled back into its own pool.
    settle().await;
    assert_eq!(pool_a.stats().leased, 0);

    pool_a.shutdown().await.unwrap();
    pool_b.shutdown().await.unwrap();
}

// ============================================================================
// Failure and shutdown
// ============================================================================

#[tokio::test]
async fn test_refusing_engine_fails_checkout_only() {
    let pool = BrowserPool::start(CountingEngine::refusing(), config(2, 10)).await.unwrap();
    assert!(!pool.health().ready);

    let err = pool.checkout_default().await.unwrap_err();
    assert!(matches!(err, CoreError::AcquisitionFailed(_)));
    assert_eq!(pool.stats().size, 0);

    pool.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_closes_leased_instances_and_rejects_checkouts() {
    let engine = CountingEngine::new();
    let pool = BrowserPool::start(engine.clone(), config(2, 10)).await.unwrap();

    let held = pool.checkout_default().await.unwrap();
    pool.shutdown().await.unwrap();
    assert_eq!(engine.closed(), 2);

    let err = pool.checkout_default().await.unwrap_err();
    assert!(matches!(err, CoreError::ShuttingDown));

    // Releasing after shutdown is a no-op
    held.release().await.unwrap();
    pool.shutdown().await.unwrap();
    assert_eq!(engine.closed(), 2);
}
