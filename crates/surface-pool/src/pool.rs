//! Surface pool with outstanding-count accounting and deferred returns.
//!
//! One [`SurfacePool`] serves a single [`SurfaceDescriptor`]. It keeps two
//! LIFO stacks, `idle` and `deferred`, plus a count of surfaces checked out.
//! Deferred surfaces stay inside the outstanding count until they are
//! flushed or evicted, so the capacity total is always
//! `idle + outstanding`.
//!
//! The pool is driven from a single owner context and takes `&mut self`
//! everywhere. Anything that happens elsewhere (timer expiry, consumer
//! acknowledgements) arrives through the inbox and is applied by
//! [`SurfacePool::dispatch_pending`] or [`SurfacePool::dispatch_next`].

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::allocator::Allocator;
use crate::config::PoolConfig;
use crate::descriptor::SurfaceDescriptor;
use crate::error::{Error, Result};
use crate::events::{EventBus, EvictionReason, PoolEvent};
use crate::policy::{ShrinkSchedule, excess};
use crate::recycle::{Acknowledgement, Inbox, Message, RecycleHook, Subscription};
use crate::stats::PoolStats;
use crate::surface::{PooledSurface, SurfaceId, SurfaceState};
use crate::timer::IdleTimer;

#[derive(Debug, Default)]
struct Counters {
    created: u64,
    reused: u64,
    returned: u64,
    destroyed: u64,
    lost: u64,
    capacity_overruns: u64,
}

/// Bounded, recyclable pool of surfaces of one format and size.
pub struct SurfacePool<A: Allocator, T: IdleTimer> {
    descriptor: SurfaceDescriptor,
    config: PoolConfig,
    allocator: A,
    idle: Vec<PooledSurface<A::Surface>>,
    deferred: Vec<PooledSurface<A::Surface>>,
    outstanding: usize,
    /// Every surface the pool accounts for, except lost ones.
    states: HashMap<SurfaceId, SurfaceState>,
    subscriptions: HashMap<SurfaceId, Subscription>,
    schedule: ShrinkSchedule<T>,
    inbox: Inbox<A::Surface>,
    events: Arc<EventBus>,
    counters: Counters,
}

impl<A, T> SurfacePool<A, T>
where
    A: Allocator,
    A::Surface: Send + 'static,
    T: IdleTimer,
{
    /// Create an empty pool.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if `config` is invalid or the
    /// descriptor has a zero dimension.
    pub fn new(
        descriptor: SurfaceDescriptor,
        config: PoolConfig,
        allocator: A,
        timer: T,
    ) -> Result<Self> {
        config.validate()?;
        if descriptor.size.is_empty() {
            return Err(Error::configuration(format!(
                "surface size {} has a zero dimension",
                descriptor.size
            )));
        }
        Ok(Self {
            descriptor,
            config,
            allocator,
            idle: Vec::new(),
            deferred: Vec::new(),
            outstanding: 0,
            states: HashMap::new(),
            subscriptions: HashMap::new(),
            schedule: ShrinkSchedule::new(timer),
            inbox: Inbox::new(),
            events: Arc::new(EventBus::default()),
            counters: Counters::default(),
        })
    }

    /// Publish events on `events` instead of a private bus.
    #[must_use]
    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    /// Format and size of every surface in this pool.
    pub fn descriptor(&self) -> SurfaceDescriptor {
        self.descriptor
    }

    /// The pool's configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Subscribe to this pool's events.
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.events.subscribe()
    }

    /// Surfaces available for reuse.
    pub fn idle_len(&self) -> usize {
        self.idle.len()
    }

    /// Surfaces waiting on their consumer.
    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }

    /// Surfaces checked out, deferred ones included.
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Whether an idle shrink is scheduled.
    pub fn is_shrink_pending(&self) -> bool {
        self.schedule.is_pending()
    }

    /// Times the idle timer has been armed.
    pub fn shrink_arms(&self) -> u64 {
        self.schedule.arms()
    }

    /// Current state of a surface, or `None` if the pool does not account
    /// for it (never seen, destroyed, or reported lost).
    pub fn state_of(&self, id: SurfaceId) -> Option<SurfaceState> {
        self.states.get(&id).copied()
    }

    /// Snapshot of collections and counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            idle: self.idle.len(),
            deferred: self.deferred.len(),
            outstanding: self.outstanding,
            created: self.counters.created,
            reused: self.counters.reused,
            returned: self.counters.returned,
            destroyed: self.counters.destroyed,
            lost: self.counters.lost,
            capacity_overruns: self.counters.capacity_overruns,
            shrink_pending: self.schedule.is_pending(),
        }
    }

    /// Check a surface out, reusing the most recently returned one if any.
    ///
    /// # Errors
    /// Returns [`Error::AllocationFailed`] if a new surface was needed and
    /// the allocator could not provide one. The outstanding count is left
    /// unchanged.
    pub fn acquire(&mut self) -> Result<PooledSurface<A::Surface>> {
        if let Some(surface) = self.idle.pop() {
            let id = surface.id();
            self.states.insert(id, SurfaceState::Outstanding);
            self.outstanding += 1;
            self.counters.reused += 1;
            tracing::debug!(
                descriptor = %self.descriptor,
                surface_id = %id,
                idle = self.idle.len(),
                "Reusing idle surface"
            );
            self.events.emit(PoolEvent::Reused {
                descriptor: self.descriptor,
                surface_id: id,
            });
            return Ok(surface);
        }

        // Growing without reuse: make room by dropping deferred surfaces,
        // which cannot be handed out before their consumer lets go anyway.
        self.evict_down_to(self.config.max_total.saturating_sub(1));

        let raw = self.allocator.allocate(&self.descriptor)?;
        let surface = PooledSurface::new(self.descriptor, raw);
        let id = surface.id();
        self.states.insert(id, SurfaceState::Outstanding);
        self.outstanding += 1;
        self.counters.created += 1;
        tracing::debug!(
            descriptor = %self.descriptor,
            surface_id = %id,
            outstanding = self.outstanding,
            "Allocated new surface"
        );
        self.events.emit(PoolEvent::Allocated {
            descriptor: self.descriptor,
            surface_id: id,
        });

        self.shrink_to_maximum();
        Ok(surface)
    }

    /// Return a checked-out surface to the idle set.
    ///
    /// # Errors
    /// Returns [`Error::ProtocolViolation`] if the pool does not have the
    /// surface on record as outstanding. The surface is destroyed and the
    /// pool's accounting is left untouched.
    pub fn release(&mut self, surface: PooledSurface<A::Surface>) -> Result<()> {
        if let Err(err) = self.expect_state(surface.id(), SurfaceState::Outstanding) {
            self.destroy(surface, EvictionReason::Rejected);
            return Err(err);
        }
        self.reclaim(surface);
        Ok(())
    }

    /// Park a checked-out surface until its external consumer releases it.
    ///
    /// The surface stays in the outstanding count.
    ///
    /// # Errors
    /// Returns [`Error::ProtocolViolation`] if the surface is not
    /// outstanding; the surface is destroyed.
    pub fn return_deferred(&mut self, surface: PooledSurface<A::Surface>) -> Result<()> {
        if let Err(err) = self.expect_state(surface.id(), SurfaceState::Outstanding) {
            self.destroy(surface, EvictionReason::Rejected);
            return Err(err);
        }
        let id = surface.id();
        self.unsubscribe(id);
        self.states.insert(id, SurfaceState::Deferred);
        self.deferred.push(surface);
        tracing::debug!(
            descriptor = %self.descriptor,
            surface_id = %id,
            deferred = self.deferred.len(),
            "Deferred surface return"
        );
        self.events.emit(PoolEvent::Deferred {
            descriptor: self.descriptor,
            surface_id: id,
        });
        self.shrink_to_maximum();
        Ok(())
    }

    /// Reclaim every deferred surface through the normal return path,
    /// most recently deferred first.
    pub fn flush_deferred(&mut self) {
        while let Some(surface) = self.deferred.pop() {
            self.reclaim(surface);
        }
    }

    /// Stop accounting for a checked-out surface that will never return.
    ///
    /// Its allocation becomes the new owner's responsibility, and any
    /// recycle hook issued for it is revoked.
    ///
    /// # Errors
    /// Returns [`Error::ProtocolViolation`] if the surface is not
    /// outstanding (idle, deferred, already lost or unknown).
    pub fn report_lost(&mut self, id: SurfaceId) -> Result<()> {
        self.expect_state(id, SurfaceState::Outstanding)?;
        self.states.remove(&id);
        self.unsubscribe(id);
        self.outstanding -= 1;
        self.counters.lost += 1;
        tracing::debug!(
            descriptor = %self.descriptor,
            surface_id = %id,
            outstanding = self.outstanding,
            "Surface reported lost"
        );
        self.events.emit(PoolEvent::Lost {
            descriptor: self.descriptor,
            surface_id: id,
        });
        Ok(())
    }

    /// Issue a hook that returns `surface` to this pool once its external
    /// consumer acknowledges completion.
    ///
    /// A surface has at most one live hook; issuing another revokes the
    /// previous one.
    ///
    /// # Errors
    /// Returns [`Error::ProtocolViolation`] if the surface is not outstanding.
    pub fn auto_recycle(
        &mut self,
        surface: &PooledSurface<A::Surface>,
    ) -> Result<RecycleHook<A::Surface>> {
        let id = surface.id();
        self.expect_state(id, SurfaceState::Outstanding)?;
        let subscription = Subscription::default();
        if let Some(previous) = self.subscriptions.insert(id, subscription.clone()) {
            previous.revoke();
        }
        Ok(RecycleHook::new(id, subscription, self.inbox.sender()))
    }

    /// Revoke the hook issued for `id`. Returns whether one was live.
    pub fn cancel_auto_recycle(&mut self, id: SurfaceId) -> bool {
        self.unsubscribe(id)
    }

    /// Evict surfaces until `idle + outstanding <= max_total`, deferred
    /// ones first. Checked-out surfaces are never revoked; if nothing is
    /// left to evict the overrun is tolerated and reported.
    pub fn shrink_to_maximum(&mut self) {
        let remaining = self.evict_down_to(self.config.max_total);
        if remaining > 0 {
            let total = self.total();
            self.counters.capacity_overruns += 1;
            tracing::warn!(
                descriptor = %self.descriptor,
                total,
                max_total = self.config.max_total,
                "Pool over capacity with nothing left to evict"
            );
            self.events.emit(PoolEvent::CapacityOverrun {
                descriptor: self.descriptor,
                total,
                max_total: self.config.max_total,
            });
        }
    }

    /// Trim the idle set down to `min_idle` and clear any pending shrink.
    /// Deferred and outstanding surfaces are not touched.
    pub fn shrink_to_minimum(&mut self) {
        self.schedule.cancel();
        let mut removed = 0;
        while self.idle.len() > self.config.min_idle {
            let Some(surface) = self.idle.pop() else {
                break;
            };
            self.destroy(surface, EvictionReason::IdleShrink);
            removed += 1;
        }
        tracing::debug!(
            descriptor = %self.descriptor,
            removed,
            idle = self.idle.len(),
            "Shrunk idle surfaces to minimum"
        );
        self.events.emit(PoolEvent::Shrunk {
            descriptor: self.descriptor,
            removed,
        });
    }

    /// Destroy every idle and deferred surface and cancel the idle timer.
    ///
    /// Deferred surfaces leave the outstanding count. Surfaces still held
    /// by callers stay their responsibility, hooks included.
    pub fn clear(&mut self) {
        self.schedule.cancel();
        while let Some(surface) = self.idle.pop() {
            self.destroy(surface, EvictionReason::Cleared);
        }
        while let Some(surface) = self.deferred.pop() {
            self.outstanding -= 1;
            self.destroy(surface, EvictionReason::Cleared);
        }
        tracing::debug!(
            descriptor = %self.descriptor,
            outstanding = self.outstanding,
            "Cleared pool"
        );
        self.events.emit(PoolEvent::Cleared {
            descriptor: self.descriptor,
        });
    }

    /// Apply every message already waiting in the inbox. Returns how many
    /// were handled.
    pub fn dispatch_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Some(message) = self.inbox.try_recv() {
            self.handle(message);
            handled += 1;
        }
        handled
    }

    /// Wait for the next inbox message and apply it.
    pub async fn dispatch_next(&mut self) {
        if let Some(message) = self.inbox.recv().await {
            self.handle(message);
        }
    }

    fn handle(&mut self, message: Message<A::Surface>) {
        match message {
            Message::ShrinkExpired { generation } => {
                if self.schedule.is_current(generation) {
                    self.shrink_to_minimum();
                }
            }
            Message::Acknowledged { surface, ack } => {
                let id = surface.id();
                let subscribed = self.subscriptions.remove(&id).is_some();
                if !subscribed && self.state_of(id) != Some(SurfaceState::Outstanding) {
                    // Revoked and reported lost after the consumer fired:
                    // nobody else will take this allocation back.
                    tracing::error!(
                        descriptor = %self.descriptor,
                        surface_id = %id,
                        "Acknowledgement for a surface without a live hook"
                    );
                    self.destroy(surface, EvictionReason::Rejected);
                    return;
                }
                let outcome = match ack {
                    Acknowledgement::Released => self.release(surface),
                    Acknowledgement::AwaitingRemoteRelease => self.return_deferred(surface),
                };
                if let Err(err) = outcome {
                    tracing::error!(
                        descriptor = %self.descriptor,
                        surface_id = %id,
                        error = %err,
                        "Dropped acknowledgement"
                    );
                }
            }
        }
    }

    fn total(&self) -> usize {
        self.idle.len() + self.outstanding
    }

    /// Evict deferred, then idle, surfaces until the total fits `limit`.
    /// Returns how far over `limit` the pool still is.
    fn evict_down_to(&mut self, limit: usize) -> usize {
        let mut over = excess(self.total(), limit);
        while over > 0 {
            if let Some(surface) = self.deferred.pop() {
                self.outstanding -= 1;
                self.destroy(surface, EvictionReason::OverCapacity);
            } else if let Some(surface) = self.idle.pop() {
                self.destroy(surface, EvictionReason::OverCapacity);
            } else {
                break;
            }
            over -= 1;
        }
        over
    }

    /// The common tail of `release` and `flush_deferred`.
    fn reclaim(&mut self, surface: PooledSurface<A::Surface>) {
        let id = surface.id();
        self.unsubscribe(id);
        self.states.insert(id, SurfaceState::Idle);
        self.outstanding -= 1;
        self.idle.push(surface);
        self.counters.returned += 1;
        tracing::debug!(
            descriptor = %self.descriptor,
            surface_id = %id,
            idle = self.idle.len(),
            outstanding = self.outstanding,
            "Surface returned"
        );
        self.events.emit(PoolEvent::Returned {
            descriptor: self.descriptor,
            surface_id: id,
        });

        self.shrink_to_maximum();
        let expiries = self.inbox.expiry_sender();
        self.schedule.arm_if_needed(
            self.idle.len(),
            self.config.min_idle,
            self.config.shrink_timeout,
            &expiries,
        );
    }

    fn expect_state(&self, id: SurfaceId, expected: SurfaceState) -> Result<()> {
        match self.states.get(&id) {
            Some(state) if *state == expected => Ok(()),
            other => {
                let actual = other.map_or("unknown", |state| state.as_str());
                tracing::error!(
                    descriptor = %self.descriptor,
                    surface_id = %id,
                    expected = expected.as_str(),
                    actual,
                    "Surface handed back in unexpected state"
                );
                Err(Error::ProtocolViolation {
                    surface_id: id,
                    expected: expected.as_str(),
                    actual,
                })
            }
        }
    }

    fn unsubscribe(&mut self, id: SurfaceId) -> bool {
        match self.subscriptions.remove(&id) {
            Some(subscription) => {
                subscription.revoke();
                true
            }
            None => false,
        }
    }

    fn destroy(&mut self, surface: PooledSurface<A::Surface>, reason: EvictionReason) {
        let id = surface.id();
        if reason != EvictionReason::Rejected {
            self.states.remove(&id);
            self.counters.destroyed += 1;
        }
        tracing::debug!(
            descriptor = %self.descriptor,
            surface_id = %id,
            ?reason,
            "Destroying surface"
        );
        self.events.emit(PoolEvent::Evicted {
            descriptor: self.descriptor,
            surface_id: id,
            reason,
        });
        self.allocator.destroy(surface.into_inner());
    }
}

impl<A: Allocator, T: IdleTimer> Drop for SurfacePool<A, T> {
    fn drop(&mut self) {
        self.schedule.cancel();
        // Acknowledged surfaces still queued belong to the pool too.
        for surface in self.inbox.drain_returns() {
            self.allocator.destroy(surface.into_inner());
        }
        for surface in self.idle.drain(..).chain(self.deferred.drain(..)) {
            self.allocator.destroy(surface.into_inner());
        }
    }
}

impl<A: Allocator, T: IdleTimer> std::fmt::Debug for SurfacePool<A, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfacePool")
            .field("descriptor", &self.descriptor)
            .field("idle", &self.idle.len())
            .field("deferred", &self.deferred.len())
            .field("outstanding", &self.outstanding)
            .field("shrink_pending", &self.schedule.is_pending())
            .finish()
    }
}
