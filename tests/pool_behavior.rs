//! Connection pool behaviour under contention.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use backend_gateway::pool::{ConnectionPool, PoolConfig, PoolError};

mod common;

fn pool(max_size: usize, timeout_ms: u64) -> ConnectionPool {
    ConnectionPool::new(
        "test-db",
        PoolConfig {
            min_size: 0,
            max_size,
            connection_timeout: Duration::from_millis(timeout_ms),
            ..Default::default()
        },
    )
}

async fn wait_for_waiters(pool: &ConnectionPool, expected: usize) {
    while pool.info().waiting < expected {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_waiters_served_in_arrival_order() {
    let pool = pool(1, 5_000);
    let held = pool.acquire().await.unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));

    let mut tasks = Vec::new();
    for i in 0..3 {
        let task_pool = pool.clone();
        let order = order.clone();
        tasks.push(tokio::spawn(async move {
            let lease = task_pool.acquire().await.unwrap();
            order.lock().unwrap().push(i);
            drop(lease);
        }));
        wait_for_waiters(&pool, i + 1).await;
    }

    drop(held);
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    let info = pool.info();
    assert_eq!(info.total, 1);
    assert_eq!(info.waiting, 0);
    assert_eq!(info.handoffs, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_in_use_never_exceeds_max() {
    let pool = pool(3, 5_000);
    let in_use = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let tasks: Vec<_> = (0..30)
        .map(|_| {
            let pool = pool.clone();
            let in_use = in_use.clone();
            let peak = peak.clone();
            tokio::spawn(async move {
                let lease = pool.acquire().await.unwrap();
                let now = in_use.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_use.fetch_sub(1, Ordering::SeqCst);
                drop(lease);
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= 3);
    let info = pool.info();
    assert!(info.total <= 3);
    assert_eq!(info.active, 0);
    assert_eq!(info.total_requests, 30);
}

#[tokio::test(start_paused = true)]
async fn test_third_acquire_times_out() {
    let pool = pool(2, 50);
    let _a = pool.acquire().await.unwrap();
    let _b = pool.acquire().await.unwrap();

    let started = tokio::time::Instant::now();
    let err = pool.acquire().await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, PoolError::Timeout { .. }));
    assert!(elapsed >= Duration::from_millis(50));
    assert!(elapsed < Duration::from_millis(60));
    assert_eq!(pool.info().waiting, 0, "timed-out ticket is removed");
    assert_eq!(pool.info().timeouts, 1);
}

#[tokio::test]
async fn test_abandoned_acquire_is_skipped() {
    let pool = pool(1, 5_000);
    let held = pool.acquire().await.unwrap();

    let abandoned = {
        let pool = pool.clone();
        tokio::spawn(async move {
            let _ = pool.acquire().await;
        })
    };
    wait_for_waiters(&pool, 1).await;
    abandoned.abort();
    let _ = abandoned.await;

    let live = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire().await.map(|lease| lease.id()) })
    };
    // The abandoned ticket stays queued until skipped or purged.
    wait_for_waiters(&pool, 2).await;

    let held_id = held.id();
    drop(held);
    assert_eq!(live.await.unwrap().unwrap(), held_id);
}

#[tokio::test]
async fn test_acquire_dropped_after_hand_off_returns_connection() {
    let pool = pool(1, 100);
    let held = pool.acquire().await.unwrap();

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move {
            let _lease = pool.acquire().await;
            std::future::pending::<()>().await;
        })
    };
    wait_for_waiters(&pool, 1).await;

    // The hand-off lands in the waiter's channel before it is polled again.
    drop(held);
    waiter.abort();
    let _ = waiter.await;

    let info = pool.info();
    assert_eq!(info.total, 1);
    assert_eq!(info.idle, 1);
    assert_eq!(info.active, 0);
    assert!(pool.acquire().await.is_ok(), "capacity survives the abandoned acquire");
}

#[tokio::test]
async fn test_close_rejects_waiters() {
    let pool = pool(1, 5_000);
    let held = pool.acquire().await.unwrap();

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire().await })
    };
    wait_for_waiters(&pool, 1).await;

    pool.close();
    assert!(matches!(waiter.await.unwrap(), Err(PoolError::Closed(_))));
    drop(held);
    assert_eq!(pool.info().total, 0, "lease returned after close is discarded");
}
