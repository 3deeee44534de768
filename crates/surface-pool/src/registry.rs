//! One pool per surface descriptor, created on first use.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::allocator::Allocator;
use crate::config::PoolConfig;
use crate::descriptor::SurfaceDescriptor;
use crate::error::{Error, Result};
use crate::events::{EventBus, PoolEvent};
use crate::pool::SurfacePool;
use crate::surface::PooledSurface;
use crate::timer::IdleTimer;

/// Pools keyed by [`SurfaceDescriptor`], sharing one allocator, one config
/// and one event bus.
///
/// Like the pools it holds, a set is owned by a single context. Each pool
/// gets its own timer from the factory passed to [`PoolSet::new`].
pub struct PoolSet<A: Allocator, T: IdleTimer> {
    config: PoolConfig,
    allocator: A,
    make_timer: Box<dyn FnMut() -> T + Send>,
    events: Arc<EventBus>,
    pools: HashMap<SurfaceDescriptor, SurfacePool<A, T>>,
}

impl<A, T> PoolSet<A, T>
where
    A: Allocator + Clone,
    A::Surface: Send + 'static,
    T: IdleTimer,
{
    /// Create an empty set.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if `config` is invalid.
    pub fn new<F>(config: PoolConfig, allocator: A, make_timer: F) -> Result<Self>
    where
        F: FnMut() -> T + Send + 'static,
    {
        config.validate()?;
        Ok(Self {
            config,
            allocator,
            make_timer: Box::new(make_timer),
            events: Arc::new(EventBus::default()),
            pools: HashMap::new(),
        })
    }

    /// Subscribe to events from every pool in the set.
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.events.subscribe()
    }

    /// The bus every pool in the set publishes on.
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Number of pools created so far.
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    /// Whether no pool has been created yet.
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Descriptors with a pool.
    pub fn descriptors(&self) -> impl Iterator<Item = SurfaceDescriptor> + '_ {
        self.pools.keys().copied()
    }

    /// The pool for `descriptor`, if one exists.
    pub fn get(&self, descriptor: &SurfaceDescriptor) -> Option<&SurfacePool<A, T>> {
        self.pools.get(descriptor)
    }

    /// The pool for `descriptor`, created if missing.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if a pool cannot be built for
    /// `descriptor` (e.g. a zero-sized surface).
    pub fn pool(&mut self, descriptor: SurfaceDescriptor) -> Result<&mut SurfacePool<A, T>> {
        match self.pools.entry(descriptor) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let pool = SurfacePool::new(
                    descriptor,
                    self.config.clone(),
                    self.allocator.clone(),
                    (self.make_timer)(),
                )?
                .with_event_bus(Arc::clone(&self.events));
                tracing::debug!(descriptor = %descriptor, "Created surface pool");
                Ok(entry.insert(pool))
            }
        }
    }

    /// Acquire from the pool for `descriptor`.
    pub fn acquire(&mut self, descriptor: SurfaceDescriptor) -> Result<PooledSurface<A::Surface>> {
        self.pool(descriptor)?.acquire()
    }

    /// Return `surface` to the pool it came from.
    ///
    /// # Errors
    /// Returns [`Error::ProtocolViolation`] if no pool exists for the
    /// surface's descriptor, or the pool's own error from
    /// [`SurfacePool::release`].
    pub fn release(&mut self, surface: PooledSurface<A::Surface>) -> Result<()> {
        match self.pools.get_mut(&surface.descriptor()) {
            Some(pool) => pool.release(surface),
            None => {
                let surface_id = surface.id();
                tracing::error!(
                    descriptor = %surface.descriptor(),
                    surface_id = %surface_id,
                    "Surface returned to a set without a matching pool"
                );
                self.allocator.destroy(surface.into_inner());
                Err(Error::ProtocolViolation {
                    surface_id,
                    expected: "outstanding",
                    actual: "unknown",
                })
            }
        }
    }

    /// Remove and return the pool for `descriptor`.
    pub fn remove(&mut self, descriptor: &SurfaceDescriptor) -> Option<SurfacePool<A, T>> {
        self.pools.remove(descriptor)
    }

    /// Flush deferred surfaces in every pool.
    pub fn flush_deferred_all(&mut self) {
        for pool in self.pools.values_mut() {
            pool.flush_deferred();
        }
    }

    /// Clear every pool.
    pub fn clear_all(&mut self) {
        for pool in self.pools.values_mut() {
            pool.clear();
        }
    }

    /// Dispatch pending inbox messages in every pool. Returns how many
    /// were handled in total.
    pub fn dispatch_pending_all(&mut self) -> usize {
        self.pools
            .values_mut()
            .map(SurfacePool::dispatch_pending)
            .sum()
    }
}

impl<A: Allocator, T: IdleTimer> std::fmt::Debug for PoolSet<A, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolSet")
            .field("config", &self.config)
            .field("pools", &self.pools.len())
            .finish_non_exhaustive()
    }
}
