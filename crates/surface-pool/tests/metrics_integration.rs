//! Metrics collector wired to a live pool.
#![cfg(feature = "metrics")]

use std::sync::Arc;
use std::time::Duration;

use nebula_surface_pool::testing::{CountingAllocator, ManualTimer};
use nebula_surface_pool::{
    EventBus, PoolConfig, PoolSet, SurfaceDescriptor, SurfaceFormat, SurfacePool, SurfaceSize,
    spawn_metrics_collector,
};
use tokio_util::sync::CancellationToken;

fn tile() -> SurfaceDescriptor {
    SurfaceDescriptor::new(SurfaceFormat::R5G6B5, SurfaceSize::new(64, 32))
}

#[tokio::test]
async fn collector_stops_when_pool_and_bus_are_dropped() {
    let events = Arc::new(EventBus::default());
    let handle = spawn_metrics_collector(&events, CancellationToken::new());

    let mut pool = SurfacePool::new(
        tile(),
        PoolConfig::default().with_max_total(1),
        CountingAllocator::new(),
        ManualTimer::new(),
    )
    .unwrap()
    .with_event_bus(Arc::clone(&events));

    let a = pool.acquire().unwrap();
    let b = pool.acquire().unwrap();
    pool.release(a).unwrap();
    pool.return_deferred(b).unwrap();
    pool.clear();

    tokio::time::sleep(Duration::from_millis(20)).await;
    drop(pool);
    drop(events);

    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("collector should stop once the bus is gone")
        .unwrap();
}

#[tokio::test]
async fn collector_follows_a_pool_set() {
    let cancel = CancellationToken::new();
    let mut set = PoolSet::new(
        PoolConfig::default(),
        CountingAllocator::new(),
        ManualTimer::new,
    )
    .unwrap();
    let handle = spawn_metrics_collector(set.event_bus(), cancel.clone());

    let surface = set.acquire(tile()).unwrap();
    set.release(surface).unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("collector should stop on cancel")
        .unwrap();
}
