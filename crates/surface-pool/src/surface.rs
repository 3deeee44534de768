//! Pooled surface handles and their lifecycle states.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::descriptor::SurfaceDescriptor;

static NEXT_SURFACE_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identity of one live allocation.
///
/// Ids are unique across every pool in the process, so a surface handed to
/// the wrong pool is recognised as unknown rather than aliased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(u64);

impl SurfaceId {
    pub(crate) fn next() -> Self {
        Self(NEXT_SURFACE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Rebuild an id from its raw value, e.g. one received from a consumer.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw value, suitable for sending across a process boundary.
    #[must_use]
    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "surface#{}", self.0)
    }
}

/// Where a surface currently lives. Exactly one state applies at a time.
///
/// Once a surface is destroyed or reported lost the pool stops tracking it,
/// and [`crate::SurfacePool::state_of`] returns `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceState {
    /// Held by the pool, available for reuse.
    Idle,
    /// Checked out to a caller.
    Outstanding,
    /// Logically returned, still held by an external consumer.
    Deferred,
}

impl SurfaceState {
    /// Lowercase name used in logs and errors.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Outstanding => "outstanding",
            Self::Deferred => "deferred",
        }
    }
}

impl std::fmt::Display for SurfaceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A surface checked out of a pool.
///
/// The handle is not `Clone`: whoever holds it owns the surface until it is
/// released, deferred, reported lost or handed to a consumer together with
/// its recycle hook.
pub struct PooledSurface<S> {
    id: SurfaceId,
    descriptor: SurfaceDescriptor,
    surface: S,
}

impl<S> PooledSurface<S> {
    pub(crate) fn new(descriptor: SurfaceDescriptor, surface: S) -> Self {
        Self {
            id: SurfaceId::next(),
            descriptor,
            surface,
        }
    }

    /// The surface's identity.
    #[must_use]
    pub fn id(&self) -> SurfaceId {
        self.id
    }

    /// Format and size of the surface.
    #[must_use]
    pub fn descriptor(&self) -> SurfaceDescriptor {
        self.descriptor
    }

    /// Unwrap the underlying allocation.
    ///
    /// Meant for surfaces already reported lost: the pool will never see
    /// this allocation again.
    #[must_use]
    pub fn into_inner(self) -> S {
        self.surface
    }
}

impl<S> std::ops::Deref for PooledSurface<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.surface
    }
}

impl<S> std::ops::DerefMut for PooledSurface<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.surface
    }
}

impl<S> std::fmt::Debug for PooledSurface<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledSurface")
            .field("id", &self.id)
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}
