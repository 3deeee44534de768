//! Event broadcasting for pool observability.
//!
//! Provides [`PoolEvent`] variants emitted as surfaces move through a pool
//! and an [`EventBus`] backed by `tokio::sync::broadcast`.

use tokio::sync::broadcast;

use crate::descriptor::SurfaceDescriptor;
use crate::surface::SurfaceId;

// ---------------------------------------------------------------------------
// PoolEvent
// ---------------------------------------------------------------------------

/// Events emitted by a pool.
///
/// Every variant carries the `descriptor` of the emitting pool, so one bus
/// can be shared by a whole [`crate::registry::PoolSet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolEvent {
    /// A new surface was allocated because the idle set was empty.
    Allocated {
        /// The emitting pool.
        descriptor: SurfaceDescriptor,
        /// The new surface.
        surface_id: SurfaceId,
    },
    /// An idle surface was handed out again.
    Reused {
        /// The emitting pool.
        descriptor: SurfaceDescriptor,
        /// The reused surface.
        surface_id: SurfaceId,
    },
    /// A surface came back and joined the idle set.
    Returned {
        /// The emitting pool.
        descriptor: SurfaceDescriptor,
        /// The returned surface.
        surface_id: SurfaceId,
    },
    /// A surface was parked until its consumer releases it.
    Deferred {
        /// The emitting pool.
        descriptor: SurfaceDescriptor,
        /// The deferred surface.
        surface_id: SurfaceId,
    },
    /// A pooled surface was destroyed.
    Evicted {
        /// The emitting pool.
        descriptor: SurfaceDescriptor,
        /// The destroyed surface.
        surface_id: SurfaceId,
        /// Why it was destroyed.
        reason: EvictionReason,
    },
    /// A checked-out surface will never come back.
    Lost {
        /// The emitting pool.
        descriptor: SurfaceDescriptor,
        /// The lost surface.
        surface_id: SurfaceId,
    },
    /// Usage exceeds the ceiling and nothing can be evicted.
    CapacityOverrun {
        /// The emitting pool.
        descriptor: SurfaceDescriptor,
        /// Surfaces currently accounted for.
        total: usize,
        /// The configured ceiling.
        max_total: usize,
    },
    /// The idle set was trimmed after the shrink timeout.
    Shrunk {
        /// The emitting pool.
        descriptor: SurfaceDescriptor,
        /// Surfaces destroyed by the shrink.
        removed: usize,
    },
    /// The pool dropped everything it held.
    Cleared {
        /// The emitting pool.
        descriptor: SurfaceDescriptor,
    },
}

impl PoolEvent {
    /// The descriptor of the pool that emitted the event.
    #[must_use]
    pub fn descriptor(&self) -> SurfaceDescriptor {
        match self {
            Self::Allocated { descriptor, .. }
            | Self::Reused { descriptor, .. }
            | Self::Returned { descriptor, .. }
            | Self::Deferred { descriptor, .. }
            | Self::Evicted { descriptor, .. }
            | Self::Lost { descriptor, .. }
            | Self::CapacityOverrun { descriptor, .. }
            | Self::Shrunk { descriptor, .. }
            | Self::Cleared { descriptor } => *descriptor,
        }
    }
}

// ---------------------------------------------------------------------------
// EvictionReason
// ---------------------------------------------------------------------------

/// Reason a pooled surface was destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    /// Destroyed to bring the pool back under `max_total`.
    OverCapacity,
    /// Destroyed by the idle shrink.
    IdleShrink,
    /// Destroyed because the idle cache was full on return.
    CacheFull,
    /// Destroyed by `clear`.
    Cleared,
    /// Destroyed because it came back in a state the pool did not expect.
    Rejected,
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Broadcast-based event bus for pool events.
///
/// Emission is fire-and-forget: if no subscribers are listening or the
/// channel is full, events are silently dropped.
pub struct EventBus {
    sender: broadcast::Sender<PoolEvent>,
}

impl EventBus {
    /// Create a new event bus with the given buffer size.
    #[must_use]
    pub fn new(buffer_size: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer_size);
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    pub fn emit(&self, event: PoolEvent) {
        // No receivers is not an error for us.
        let _ = self.sender.send(event);
    }

    /// Subscribe to events emitted after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.sender.receiver_count())
            .finish()
    }
}
