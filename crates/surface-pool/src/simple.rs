//! A lighter pool variant: a bounded idle cache with no checkout accounting.
//!
//! [`SimpleSurfacePool`] does not track what callers hold. Returned
//! surfaces are cached while the idle set is below `max_total` and
//! destroyed otherwise. Auto-recycle is chosen per acquisition.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::allocator::Allocator;
use crate::config::PoolConfig;
use crate::descriptor::SurfaceDescriptor;
use crate::error::{Error, Result};
use crate::events::{EventBus, EvictionReason, PoolEvent};
use crate::policy::ShrinkSchedule;
use crate::recycle::{Acknowledgement, Inbox, Message, RecycleHook, Subscription};
use crate::stats::PoolStats;
use crate::surface::{PooledSurface, SurfaceId};
use crate::timer::IdleTimer;

/// Idle cache of surfaces of one format and size.
pub struct SimpleSurfacePool<A: Allocator, T: IdleTimer> {
    descriptor: SurfaceDescriptor,
    config: PoolConfig,
    allocator: A,
    idle: Vec<PooledSurface<A::Surface>>,
    subscriptions: HashMap<SurfaceId, Subscription>,
    schedule: ShrinkSchedule<T>,
    inbox: Inbox<A::Surface>,
    events: Arc<EventBus>,
    stats: PoolStats,
}

impl<A, T> SimpleSurfacePool<A, T>
where
    A: Allocator,
    A::Surface: Send + 'static,
    T: IdleTimer,
{
    /// Create an empty cache.
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
            subscriptions: HashMap::new(),
            schedule: ShrinkSchedule::new(timer),
            inbox: Inbox::new(),
            events: Arc::new(EventBus::default()),
            stats: PoolStats::default(),
        })
    }

    /// Publish events on `events` instead of a private bus.
    #[must_use]
    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    /// Format and size of every surface in this cache.
    pub fn descriptor(&self) -> SurfaceDescriptor {
        self.descriptor
    }

    /// Subscribe to this cache's events.
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.events.subscribe()
    }

    /// Surfaces available for reuse.
    pub fn idle_len(&self) -> usize {
        self.idle.len()
    }

    /// Whether an idle shrink is scheduled.
    pub fn is_shrink_pending(&self) -> bool {
        self.schedule.is_pending()
    }

    /// Snapshot of counters. `outstanding`, `deferred` and `lost` stay
    /// zero: this variant does not account for checked-out surfaces.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            idle: self.idle.len(),
            shrink_pending: self.schedule.is_pending(),
            ..self.stats.clone()
        }
    }

    /// Hand out a surface, reusing the most recently cached one if any.
    ///
    /// With `auto_recycle` set, a hook is issued alongside the surface; the
    /// consumer fires it to send the surface back.
    ///
    /// # Errors
    /// Returns [`Error::AllocationFailed`] if the allocator fails.
    pub fn acquire(
        &mut self,
        auto_recycle: bool,
    ) -> Result<(PooledSurface<A::Surface>, Option<RecycleHook<A::Surface>>)> {
        let surface = match self.idle.pop() {
            Some(surface) => {
                self.stats.reused += 1;
                tracing::debug!(
                    descriptor = %self.descriptor,
                    surface_id = %surface.id(),
                    idle = self.idle.len(),
                    "Reusing cached surface"
                );
                self.events.emit(PoolEvent::Reused {
                    descriptor: self.descriptor,
                    surface_id: surface.id(),
                });
                surface
            }
            None => {
                let surface =
                    PooledSurface::new(self.descriptor, self.allocator.allocate(&self.descriptor)?);
                self.stats.created += 1;
                tracing::debug!(
                    descriptor = %self.descriptor,
                    surface_id = %surface.id(),
                    "Allocated new surface"
                );
                self.events.emit(PoolEvent::Allocated {
                    descriptor: self.descriptor,
                    surface_id: surface.id(),
                });
                surface
            }
        };

        let hook = auto_recycle.then(|| {
            let subscription = Subscription::default();
            self.subscriptions.insert(surface.id(), subscription.clone());
            RecycleHook::new(surface.id(), subscription, self.inbox.sender())
        });
        Ok((surface, hook))
    }

    /// Cache `surface`, or destroy it if the cache is already full.
    pub fn release(&mut self, surface: PooledSurface<A::Surface>) {
        let id = surface.id();
        if let Some(subscription) = self.subscriptions.remove(&id) {
            subscription.revoke();
        }

        if self.idle.len() < self.config.max_total {
            self.idle.push(surface);
            self.stats.returned += 1;
            tracing::debug!(
                descriptor = %self.descriptor,
                surface_id = %id,
                idle = self.idle.len(),
                "Cached surface"
            );
            self.events.emit(PoolEvent::Returned {
                descriptor: self.descriptor,
                surface_id: id,
            });
        } else {
            tracing::debug!(
                descriptor = %self.descriptor,
                surface_id = %id,
                idle = self.idle.len(),
                "Cache full, not recycling surface"
            );
            self.destroy(surface, EvictionReason::CacheFull);
        }

        let expiries = self.inbox.expiry_sender();
        self.schedule.arm_if_needed(
            self.idle.len(),
            self.config.min_idle,
            self.config.shrink_timeout,
            &expiries,
        );
    }

    /// Revoke the hook issued for `id`. Returns whether one was live.
    pub fn cancel_auto_recycle(&mut self, id: SurfaceId) -> bool {
        match self.subscriptions.remove(&id) {
            Some(subscription) => {
                subscription.revoke();
                true
            }
            None => false,
        }
    }

    /// Cancel any pending shrink and trim the cache down to `min_idle`.
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
            "Shrunk cached surfaces to minimum"
        );
        self.events.emit(PoolEvent::Shrunk {
            descriptor: self.descriptor,
            removed,
        });
    }

    /// Destroy every cached surface and cancel the idle timer.
    pub fn clear(&mut self) {
        self.schedule.cancel();
        while let Some(surface) = self.idle.pop() {
            self.destroy(surface, EvictionReason::Cleared);
        }
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
            Message::Acknowledged { surface, ack } => match ack {
                Acknowledgement::Released => self.release(surface),
                // Without a deferred stage the surface cannot be parked
                // until the remote reader lets go, so it is not reused.
                Acknowledgement::AwaitingRemoteRelease => {
                    self.subscriptions.remove(&surface.id());
                    self.destroy(surface, EvictionReason::Rejected);
                }
            },
        }
    }

    fn destroy(&mut self, surface: PooledSurface<A::Surface>, reason: EvictionReason) {
        self.stats.destroyed += 1;
        self.events.emit(PoolEvent::Evicted {
            descriptor: self.descriptor,
            surface_id: surface.id(),
            reason,
        });
        self.allocator.destroy(surface.into_inner());
    }
}

impl<A: Allocator, T: IdleTimer> Drop for SimpleSurfacePool<A, T> {
    fn drop(&mut self) {
        self.schedule.cancel();
        for surface in self.inbox.drain_returns().chain(self.idle.drain(..)) {
            self.allocator.destroy(surface.into_inner());
        }
    }
}

impl<A: Allocator, T: IdleTimer> std::fmt::Debug for SimpleSurfacePool<A, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimpleSurfacePool")
            .field("descriptor", &self.descriptor)
            .field("idle", &self.idle.len())
            .field("shrink_pending", &self.schedule.is_pending())
            .finish()
    }
}
