//! Test doubles for the allocator and idle timer seams.
//!
//! Both doubles are cheap to clone; clones share state, so a test can keep
//! one copy for inspection while the pool owns the other.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::allocator::Allocator;
use crate::descriptor::SurfaceDescriptor;
use crate::error::{Error, Result};
use crate::timer::{IdleTimer, ShrinkTrigger};

/// Surface produced by [`CountingAllocator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestSurface {
    /// Allocation order, starting at 1.
    pub serial: u64,
    /// What it was allocated for.
    pub descriptor: SurfaceDescriptor,
}

#[derive(Debug, Default)]
struct AllocatorState {
    allocated: u64,
    destroyed: Vec<u64>,
    failures_pending: usize,
    always_fail: bool,
}

/// Allocator that records every allocation and destruction.
#[derive(Debug, Clone, Default)]
pub struct CountingAllocator {
    state: Arc<Mutex<AllocatorState>>,
}

impl CountingAllocator {
    /// Create an allocator that always succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` allocations fail.
    pub fn fail_next(&self, count: usize) {
        self.state.lock().failures_pending = count;
    }

    /// Make every allocation fail until switched back.
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().always_fail = failing;
    }

    /// Successful allocations so far.
    #[must_use]
    pub fn allocated(&self) -> u64 {
        self.state.lock().allocated
    }

    /// Destructions so far.
    #[must_use]
    pub fn destroyed(&self) -> usize {
        self.state.lock().destroyed.len()
    }

    /// Serials of destroyed surfaces, in destruction order.
    #[must_use]
    pub fn destroyed_serials(&self) -> Vec<u64> {
        self.state.lock().destroyed.clone()
    }

    /// Allocations not yet destroyed.
    #[must_use]
    pub fn live(&self) -> u64 {
        let state = self.state.lock();
        state.allocated - state.destroyed.len() as u64
    }
}

impl Allocator for CountingAllocator {
    type Surface = TestSurface;

    fn allocate(&self, descriptor: &SurfaceDescriptor) -> Result<TestSurface> {
        let mut state = self.state.lock();
        if state.always_fail {
            return Err(Error::allocation_failed(*descriptor, "allocator set to fail"));
        }
        if state.failures_pending > 0 {
            state.failures_pending -= 1;
            return Err(Error::allocation_failed(*descriptor, "injected failure"));
        }
        state.allocated += 1;
        Ok(TestSurface {
            serial: state.allocated,
            descriptor: *descriptor,
        })
    }

    fn destroy(&self, surface: TestSurface) {
        self.state.lock().destroyed.push(surface.serial);
    }
}

#[derive(Debug, Default)]
struct TimerState {
    armed: Option<(Duration, ShrinkTrigger)>,
    arms: usize,
    cancels: usize,
}

/// Idle timer that only fires when the test says so.
#[derive(Debug, Clone, Default)]
pub struct ManualTimer {
    state: Arc<Mutex<TimerState>>,
}

impl ManualTimer {
    /// Create an unarmed timer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an arm is waiting to fire.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.state.lock().armed.is_some()
    }

    /// Timeout of the pending arm.
    #[must_use]
    pub fn armed_timeout(&self) -> Option<Duration> {
        self.state.lock().armed.as_ref().map(|(timeout, _)| *timeout)
    }

    /// Times `arm` was called.
    #[must_use]
    pub fn arm_count(&self) -> usize {
        self.state.lock().arms
    }

    /// Times `cancel` was called.
    #[must_use]
    pub fn cancel_count(&self) -> usize {
        self.state.lock().cancels
    }

    /// Fire the pending arm as if its timeout elapsed. Returns `false` if
    /// nothing was armed.
    pub fn fire(&self) -> bool {
        let armed = self.state.lock().armed.take();
        match armed {
            Some((_, trigger)) => {
                trigger.fire();
                true
            }
            None => false,
        }
    }
}

impl IdleTimer for ManualTimer {
    fn arm(&mut self, timeout: Duration, trigger: ShrinkTrigger) {
        let mut state = self.state.lock();
        state.armed = Some((timeout, trigger));
        state.arms += 1;
    }

    fn cancel(&mut self) {
        let mut state = self.state.lock();
        state.armed = None;
        state.cancels += 1;
    }
}
