//! Idle timer seam used to schedule shrinking a pool's idle set.
//!
//! A pool never shrinks from inside the timer. Expiry only fires a
//! [`ShrinkTrigger`], which posts a message to the pool's inbox; the shrink
//! itself runs when the owner dispatches that message.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};

/// One-shot notification handed to an [`IdleTimer`] when it is armed.
///
/// Firing is safe from any thread.
pub struct ShrinkTrigger {
    fire: Box<dyn FnOnce() + Send>,
}

impl ShrinkTrigger {
    pub(crate) fn new<F>(fire: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            fire: Box::new(fire),
        }
    }

    /// Tell the owning pool its idle period elapsed.
    pub fn fire(self) {
        (self.fire)();
    }
}

impl std::fmt::Debug for ShrinkTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShrinkTrigger").finish_non_exhaustive()
    }
}

/// A one-shot timer owned by a single pool.
///
/// Arming an already armed timer replaces the previous arm. Pools only arm
/// while no shrink is pending, so in practice at most one arm is live.
pub trait IdleTimer {
    /// Fire `trigger` once `timeout` has elapsed.
    fn arm(&mut self, timeout: Duration, trigger: ShrinkTrigger);

    /// Drop the pending arm, if any, without firing it.
    fn cancel(&mut self);
}

impl<T: IdleTimer + ?Sized> IdleTimer for Box<T> {
    fn arm(&mut self, timeout: Duration, trigger: ShrinkTrigger) {
        (**self).arm(timeout, trigger);
    }

    fn cancel(&mut self) {
        (**self).cancel();
    }
}

/// Idle timer backed by a sleeping tokio task.
#[derive(Debug)]
pub struct TokioIdleTimer {
    handle: Handle,
    task: Option<JoinHandle<()>>,
}

impl TokioIdleTimer {
    /// Create a timer on the ambient tokio runtime.
    ///
    /// # Errors
    /// Returns [`Error::Runtime`] when called outside a runtime.
    pub fn new() -> Result<Self> {
        let handle = Handle::try_current().map_err(|e| Error::Runtime {
            message: e.to_string(),
        })?;
        Ok(Self::with_handle(handle))
    }

    /// Create a timer that spawns onto `handle`.
    #[must_use]
    pub fn with_handle(handle: Handle) -> Self {
        Self { handle, task: None }
    }

    /// Whether an arm is still waiting to fire.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl IdleTimer for TokioIdleTimer {
    fn arm(&mut self, timeout: Duration, trigger: ShrinkTrigger) {
        self.cancel();
        self.task = Some(self.handle.spawn(async move {
            tokio::time::sleep(timeout).await;
            trigger.fire();
        }));
    }

    fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for TokioIdleTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_trigger(count: &Arc<AtomicUsize>) -> ShrinkTrigger {
        let count = Arc::clone(count);
        ShrinkTrigger::new(move || {
            count.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn new_outside_runtime_fails() {
        let err = TokioIdleTimer::new().unwrap_err();
        assert!(matches!(err, Error::Runtime { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn fires_after_timeout() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut timer = TokioIdleTimer::new().unwrap();

        timer.arm(Duration::from_millis(1000), counting_trigger(&fired));
        assert!(timer.is_armed());

        tokio::time::sleep(Duration::from_millis(999)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        tokio::task::yield_now().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_fire() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut timer = TokioIdleTimer::new().unwrap();

        timer.arm(Duration::from_millis(10), counting_trigger(&fired));
        timer.cancel();
        assert!(!timer.is_armed());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rearm_replaces_previous_arm() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut timer = TokioIdleTimer::new().unwrap();

        timer.arm(Duration::from_millis(10), counting_trigger(&fired));
        timer.arm(Duration::from_millis(10), counting_trigger(&fired));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
