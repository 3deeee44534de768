//! Metrics collection for pool events.
//!
//! Subscribes to the [`EventBus`] and translates events into counters via
//! the `metrics` crate. Every metric is labelled with the pool's
//! descriptor.
//!
//! Gated behind the `metrics` feature.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::events::{EventBus, EvictionReason, PoolEvent};

/// Background metrics collector that subscribes to an [`EventBus`].
///
/// # Usage
///
/// ```rust,ignore
/// let events = Arc::new(EventBus::default());
/// let pool = SurfacePool::new(descriptor, config, allocator, timer)?
///     .with_event_bus(Arc::clone(&events));
/// let cancel = CancellationToken::new();
/// tokio::spawn(MetricsCollector::new(&events).run(cancel));
/// ```
pub struct MetricsCollector {
    receiver: broadcast::Receiver<PoolEvent>,
}

impl MetricsCollector {
    /// Create a new collector subscribed to the given event bus.
    #[must_use]
    pub fn new(event_bus: &EventBus) -> Self {
        Self {
            receiver: event_bus.subscribe(),
        }
    }

    /// Run until the bus is dropped or `cancel` fires. Lagged events are
    /// skipped with a warning.
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                result = self.receiver.recv() => {
                    match result {
                        Ok(event) => Self::record_event(&event),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(skipped = n, "MetricsCollector lagged behind event bus");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                () = cancel.cancelled() => break,
            }
        }
    }

    fn record_event(event: &PoolEvent) {
        let pool = event.descriptor().to_string();
        match event {
            PoolEvent::Allocated { .. } => {
                metrics::counter!("surface_pool.allocate.total", "pool" => pool).increment(1);
            }
            PoolEvent::Reused { .. } => {
                metrics::counter!("surface_pool.reuse.total", "pool" => pool).increment(1);
            }
            PoolEvent::Returned { .. } => {
                metrics::counter!("surface_pool.return.total", "pool" => pool).increment(1);
            }
            PoolEvent::Deferred { .. } => {
                metrics::counter!("surface_pool.defer.total", "pool" => pool).increment(1);
            }
            PoolEvent::Evicted { reason, .. } => {
                metrics::counter!(
                    "surface_pool.evict.total",
                    "pool" => pool,
                    "reason" => reason_label(*reason)
                )
                .increment(1);
            }
            PoolEvent::Lost { .. } => {
                metrics::counter!("surface_pool.lost.total", "pool" => pool).increment(1);
            }
            PoolEvent::CapacityOverrun { total, .. } => {
                metrics::counter!("surface_pool.overrun.total", "pool" => pool.clone())
                    .increment(1);
                metrics::gauge!("surface_pool.overrun.size", "pool" => pool).set(*total as f64);
            }
            PoolEvent::Shrunk { removed, .. } => {
                metrics::counter!("surface_pool.shrink.removed", "pool" => pool)
                    .increment(*removed as u64);
            }
            // Clear shows up as one eviction per destroyed surface.
            PoolEvent::Cleared { .. } => {}
        }
    }
}

fn reason_label(reason: EvictionReason) -> &'static str {
    match reason {
        EvictionReason::OverCapacity => "over_capacity",
        EvictionReason::IdleShrink => "idle_shrink",
        EvictionReason::CacheFull => "cache_full",
        EvictionReason::Cleared => "cleared",
        EvictionReason::Rejected => "rejected",
    }
}

impl std::fmt::Debug for MetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsCollector").finish()
    }
}

/// Create a [`MetricsCollector`] and spawn it as a background task.
pub fn spawn_metrics_collector(
    event_bus: &Arc<EventBus>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let collector = MetricsCollector::new(event_bus);
    tokio::spawn(collector.run(cancel))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{SurfaceDescriptor, SurfaceFormat, SurfaceSize};
    use crate::surface::SurfaceId;
    use std::time::Duration;

    #[tokio::test]
    async fn collector_processes_events_without_panic() {
        let bus = Arc::new(EventBus::new(64));
        let cancel = CancellationToken::new();
        let handle = spawn_metrics_collector(&bus, cancel.clone());
        let descriptor = SurfaceDescriptor::new(SurfaceFormat::A8, SurfaceSize::new(8, 8));

        bus.emit(PoolEvent::Allocated {
            descriptor,
            surface_id: SurfaceId::from_raw(1),
        });
        bus.emit(PoolEvent::Evicted {
            descriptor,
            surface_id: SurfaceId::from_raw(1),
            reason: EvictionReason::OverCapacity,
        });
        bus.emit(PoolEvent::CapacityOverrun {
            descriptor,
            total: 4,
            max_total: 3,
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("collector stops on cancel")
            .unwrap();
    }
}
