//! Shrink scheduling shared by both pool variants.
//!
//! At most one shrink is pending per pool. Every cancel bumps a generation
//! counter so that a trigger already in flight when the timer was cancelled
//! is recognised as stale when it reaches the inbox.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::timer::{IdleTimer, ShrinkTrigger};

pub(crate) struct ShrinkSchedule<T> {
    timer: T,
    pending: bool,
    generation: u64,
    arms: u64,
}

impl<T: IdleTimer> ShrinkSchedule<T> {
    pub(crate) fn new(timer: T) -> Self {
        Self {
            timer,
            pending: false,
            generation: 0,
            arms: 0,
        }
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.pending
    }

    pub(crate) fn arms(&self) -> u64 {
        self.arms
    }

    /// Arm the timer when the idle set sits above its floor and no shrink
    /// is pending yet. Returns whether a new arm was made.
    pub(crate) fn arm_if_needed(
        &mut self,
        idle: usize,
        min_idle: usize,
        timeout: Duration,
        expiries: &mpsc::UnboundedSender<u64>,
    ) -> bool {
        if idle <= min_idle || self.pending {
            return false;
        }
        let generation = self.generation;
        let sender = expiries.clone();
        self.timer.arm(
            timeout,
            ShrinkTrigger::new(move || {
                // The pool may be gone by the time the timer fires.
                let _ = sender.send(generation);
            }),
        );
        self.pending = true;
        self.arms += 1;
        true
    }

    /// Forget the pending shrink, if any. Triggers already fired for it
    /// become stale.
    pub(crate) fn cancel(&mut self) {
        if self.pending {
            self.timer.cancel();
            self.pending = false;
        }
        self.generation = self.generation.wrapping_add(1);
    }

    /// Whether a fired trigger belongs to the currently pending arm.
    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.pending && generation == self.generation
    }
}

/// How many surfaces must go for `total` to fit under `limit`.
pub(crate) fn excess(total: usize, limit: usize) -> usize {
    total.saturating_sub(limit)
}
