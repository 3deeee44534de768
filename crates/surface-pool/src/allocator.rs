//! The allocation seam between a pool and the driver that backs it.

use std::sync::Arc;

use crate::descriptor::SurfaceDescriptor;
use crate::error::Result;

/// Creates and destroys the surfaces a pool hands out.
///
/// Allocation is synchronous and bounded-cost; it is the only pool call
/// whose latency depends on the outside world. The pool never retries a
/// failed allocation.
pub trait Allocator {
    /// The allocation type handed out by this allocator.
    type Surface;

    /// Allocate a surface matching `descriptor`.
    ///
    /// Failures should be reported as [`crate::Error::AllocationFailed`].
    fn allocate(&self, descriptor: &SurfaceDescriptor) -> Result<Self::Surface>;

    /// Release the underlying allocation. Defaults to dropping it.
    fn destroy(&self, surface: Self::Surface) {
        drop(surface);
    }
}

impl<A: Allocator + ?Sized> Allocator for Arc<A> {
    type Surface = A::Surface;

    fn allocate(&self, descriptor: &SurfaceDescriptor) -> Result<Self::Surface> {
        (**self).allocate(descriptor)
    }

    fn destroy(&self, surface: Self::Surface) {
        (**self).destroy(surface);
    }
}

/// Allocator backed by a plain function, for callers that have no
/// teardown beyond `Drop`.
pub struct FnAllocator<F> {
    allocate: F,
}

impl<F> FnAllocator<F> {
    /// Wrap `allocate` as an allocator.
    pub fn new(allocate: F) -> Self {
        Self { allocate }
    }
}

impl<F, S> Allocator for FnAllocator<F>
where
    F: Fn(&SurfaceDescriptor) -> Result<S>,
{
    type Surface = S;

    fn allocate(&self, descriptor: &SurfaceDescriptor) -> Result<S> {
        (self.allocate)(descriptor)
    }
}

impl<F> std::fmt::Debug for FnAllocator<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnAllocator").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{SurfaceFormat, SurfaceSize};
    use crate::error::Error;

    #[test]
    fn fn_allocator_sizes_buffer_from_descriptor() {
        let alloc = FnAllocator::new(|d: &SurfaceDescriptor| Ok(vec![0u8; d.byte_len()]));
        let d = SurfaceDescriptor::new(SurfaceFormat::A8, SurfaceSize::new(8, 2));
        assert_eq!(alloc.allocate(&d).unwrap().len(), 16);
    }

    #[test]
    fn shared_allocator_forwards_failures() {
        let alloc = Arc::new(FnAllocator::new(|d: &SurfaceDescriptor| {
            Err::<(), _>(Error::allocation_failed(*d, "no memory"))
        }));
        let d = SurfaceDescriptor::new(SurfaceFormat::A8, SurfaceSize::new(1, 1));
        assert!(matches!(
            alloc.allocate(&d),
            Err(Error::AllocationFailed { .. })
        ));
    }
}
