//! Integration tests for acknowledgements that arrive from other threads
//! and for the tokio-backed idle timer.

use std::time::Duration;

use nebula_surface_pool::testing::{CountingAllocator, ManualTimer};
use nebula_surface_pool::{
    PoolConfig, PoolSet, RejectReason, SimpleSurfacePool, SurfaceDescriptor, SurfaceFormat,
    SurfacePool, SurfaceSize, SurfaceState, TokioIdleTimer,
};

fn tile() -> SurfaceDescriptor {
    SurfaceDescriptor::new(SurfaceFormat::B8G8R8X8, SurfaceSize::new(512, 512))
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

// ---------------------------------------------------------------------------
// Cross-thread acknowledgements
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn acknowledgements_from_other_threads_are_applied_by_owner() {
    init_tracing();
    let alloc = CountingAllocator::new();
    let config = PoolConfig::default().with_shrink_timeout(Duration::from_secs(60));
    let mut pool =
        SurfacePool::new(tile(), config, alloc.clone(), TokioIdleTimer::new().unwrap()).unwrap();

    let mut consumers = Vec::new();
    for _ in 0..4 {
        let surface = pool.acquire().unwrap();
        let hook = pool.auto_recycle(&surface).unwrap();
        consumers.push(std::thread::spawn(move || hook.acknowledge(surface)));
    }
    for consumer in consumers {
        consumer.join().unwrap().unwrap();
    }

    // Nothing touched the pool from the consumer threads.
    assert_eq!(pool.outstanding(), 4);
    assert_eq!(pool.idle_len(), 0);

    for _ in 0..4 {
        tokio::time::timeout(Duration::from_secs(1), pool.dispatch_next())
            .await
            .expect("acknowledgement queued");
    }
    assert_eq!(pool.outstanding(), 0);
    assert_eq!(pool.idle_len(), 4);
    assert_eq!(alloc.allocated(), 4);
}

#[tokio::test]
async fn pool_can_be_driven_from_an_owner_task() {
    let alloc = CountingAllocator::new();
    let mut pool = SurfacePool::new(
        tile(),
        PoolConfig::default(),
        alloc.clone(),
        ManualTimer::new(),
    )
    .unwrap();

    let surface = pool.acquire().unwrap();
    let id = surface.id();
    let hook = pool.auto_recycle(&surface).unwrap();

    let owner = tokio::spawn(async move {
        pool.dispatch_next().await;
        pool
    });
    tokio::task::spawn_blocking(move || hook.acknowledge_deferred(surface))
        .await
        .unwrap()
        .unwrap();

    let pool = tokio::time::timeout(Duration::from_secs(1), owner)
        .await
        .expect("owner task finished")
        .unwrap();
    assert_eq!(pool.state_of(id), Some(SurfaceState::Deferred));
    assert_eq!(pool.outstanding(), 1);
}

#[test]
fn hook_fired_after_pool_drop_hands_surface_back() {
    let alloc = CountingAllocator::new();
    let mut pool = SurfacePool::new(
        tile(),
        PoolConfig::default(),
        alloc.clone(),
        ManualTimer::new(),
    )
    .unwrap();
    let surface = pool.acquire().unwrap();
    let hook = pool.auto_recycle(&surface).unwrap();
    drop(pool);

    let rejected = std::thread::spawn(move || hook.acknowledge(surface))
        .join()
        .unwrap()
        .unwrap_err();
    assert_eq!(rejected.reason, RejectReason::PoolGone);
    assert_eq!(rejected.surface.descriptor(), tile());
}

#[test]
fn removed_pool_destroys_acknowledged_surfaces_on_drop() {
    let alloc = CountingAllocator::new();
    let mut set = PoolSet::new(PoolConfig::default(), alloc.clone(), ManualTimer::new).unwrap();
    let pool = set.pool(tile()).unwrap();
    let surface = pool.acquire().unwrap();
    let hook = pool.auto_recycle(&surface).unwrap();

    std::thread::spawn(move || hook.acknowledge(surface))
        .join()
        .unwrap()
        .unwrap();

    let removed = set.remove(&tile()).expect("pool existed");
    assert_eq!(removed.idle_len(), 0);
    drop(removed);
    assert_eq!(alloc.live(), 0);
}

#[test]
fn lost_surface_hook_stays_revoked_after_clear() {
    let alloc = CountingAllocator::new();
    let mut pool = SurfacePool::new(
        tile(),
        PoolConfig::default(),
        alloc.clone(),
        ManualTimer::new(),
    )
    .unwrap();
    let surface = pool.acquire().unwrap();
    let hook = pool.auto_recycle(&surface).unwrap();

    pool.report_lost(surface.id()).unwrap();
    pool.clear();

    let rejected = hook.acknowledge(surface).unwrap_err();
    assert_eq!(rejected.reason, RejectReason::Revoked);
    assert_eq!(pool.dispatch_pending(), 0);
    assert_eq!(pool.outstanding(), 0);
}

// ---------------------------------------------------------------------------
// Tokio idle timer
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn tokio_timer_shrinks_after_quiet_period() {
    init_tracing();
    let alloc = CountingAllocator::new();
    let mut pool = SurfacePool::new(
        tile(),
        PoolConfig::default().with_min_idle(1),
        alloc.clone(),
        TokioIdleTimer::new().unwrap(),
    )
    .unwrap();

    let surfaces: Vec<_> = (0..3).map(|_| pool.acquire().unwrap()).collect();
    for surface in surfaces {
        pool.release(surface).unwrap();
    }
    assert!(pool.is_shrink_pending());
    assert_eq!(pool.dispatch_pending(), 0);

    tokio::time::timeout(Duration::from_secs(2), pool.dispatch_next())
        .await
        .expect("shrink expiry delivered");

    assert_eq!(pool.idle_len(), 1);
    assert_eq!(alloc.destroyed(), 2);
    assert!(!pool.is_shrink_pending());
}

#[tokio::test(start_paused = true)]
async fn tokio_timer_is_cancelled_by_clear() {
    let alloc = CountingAllocator::new();
    let mut pool = SurfacePool::new(
        tile(),
        PoolConfig::default(),
        alloc.clone(),
        TokioIdleTimer::new().unwrap(),
    )
    .unwrap();

    let surface = pool.acquire().unwrap();
    pool.release(surface).unwrap();
    pool.clear();

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(pool.dispatch_pending(), 0);
    assert_eq!(pool.shrink_arms(), 1);
}

#[tokio::test(start_paused = true)]
async fn simple_pool_with_tokio_timer() {
    let alloc = CountingAllocator::new();
    let mut pool = SimpleSurfacePool::new(
        tile(),
        PoolConfig::default().with_max_total(2),
        alloc.clone(),
        TokioIdleTimer::new().unwrap(),
    )
    .unwrap();

    let (a, hook) = pool.acquire(true).unwrap();
    let hook = hook.expect("hook requested");
    let (b, _) = pool.acquire(false).unwrap();
    let (c, _) = pool.acquire(false).unwrap();

    std::thread::spawn(move || hook.acknowledge(a))
        .join()
        .unwrap()
        .unwrap();
    pool.release(b);
    pool.release(c);
    assert_eq!(pool.idle_len(), 2);
    assert_eq!(alloc.destroyed(), 0);

    // The acknowledgement lands once the cache is already full.
    pool.dispatch_next().await;
    assert_eq!(pool.idle_len(), 2);
    assert_eq!(alloc.destroyed(), 1);

    tokio::time::timeout(Duration::from_secs(2), pool.dispatch_next())
        .await
        .expect("shrink expiry delivered");
    assert_eq!(pool.idle_len(), 0);
    assert_eq!(alloc.live(), 0);
}
