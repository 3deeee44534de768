//! Auto-recycle: returning surfaces once an external consumer is done.
//!
//! A consumer may finish with a surface on any thread, or in another
//! process entirely. Acknowledgements therefore never touch pool state
//! directly: a [`RecycleHook`] posts the surface to the owning pool's
//! inbox, and the pool applies it the next time its owner dispatches.
//!
//! ```text
//!  consumer thread                     owner context
//!  ───────────────                     ─────────────
//!  hook.acknowledge(surface) ──mpsc──▶ pool.dispatch_pending()
//!                                        └─ release(surface)
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::Poll;

use tokio::sync::mpsc;

use crate::surface::{PooledSurface, SurfaceId};

/// What the consumer reports when it fires a hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acknowledgement {
    /// The consumer is done; the surface can be reused immediately.
    Released,
    /// The consumer is done drawing but a remote party still reads the
    /// surface. It is parked as deferred until the next flush.
    AwaitingRemoteRelease,
}

/// Messages serialized onto a pool's owner context.
pub(crate) enum Message<S> {
    Acknowledged {
        surface: PooledSurface<S>,
        ack: Acknowledgement,
    },
    ShrinkExpired {
        generation: u64,
    },
}

/// A surface handed back by a fired hook.
pub(crate) struct Returned<S> {
    surface: PooledSurface<S>,
    ack: Acknowledgement,
}

/// The owner side of a pool's message channels.
///
/// Acknowledgements and shrink expiries travel on separate channels so a
/// refused send always hands back a surface. Waiting acknowledgements are
/// applied before expiries.
pub(crate) struct Inbox<S> {
    returns: mpsc::UnboundedSender<Returned<S>>,
    returns_rx: mpsc::UnboundedReceiver<Returned<S>>,
    expiries: mpsc::UnboundedSender<u64>,
    expiries_rx: mpsc::UnboundedReceiver<u64>,
}

impl<S> Inbox<S> {
    pub(crate) fn new() -> Self {
        let (returns, returns_rx) = mpsc::unbounded_channel();
        let (expiries, expiries_rx) = mpsc::unbounded_channel();
        Self {
            returns,
            returns_rx,
            expiries,
            expiries_rx,
        }
    }

    pub(crate) fn sender(&self) -> mpsc::UnboundedSender<Returned<S>> {
        self.returns.clone()
    }

    pub(crate) fn expiry_sender(&self) -> mpsc::UnboundedSender<u64> {
        self.expiries.clone()
    }

    pub(crate) fn try_recv(&mut self) -> Option<Message<S>> {
        if let Ok(returned) = self.returns_rx.try_recv() {
            return Some(Message::from(returned));
        }
        self.expiries_rx
            .try_recv()
            .ok()
            .map(|generation| Message::ShrinkExpired { generation })
    }

    /// Never yields `None`: the inbox keeps senders of its own.
    pub(crate) async fn recv(&mut self) -> Option<Message<S>> {
        std::future::poll_fn(|cx| {
            let returns_closed = match self.returns_rx.poll_recv(cx) {
                Poll::Ready(Some(returned)) => return Poll::Ready(Some(Message::from(returned))),
                Poll::Ready(None) => true,
                Poll::Pending => false,
            };
            match self.expiries_rx.poll_recv(cx) {
                Poll::Ready(Some(generation)) => {
                    Poll::Ready(Some(Message::ShrinkExpired { generation }))
                }
                Poll::Ready(None) if returns_closed => Poll::Ready(None),
                _ => Poll::Pending,
            }
        })
        .await
    }

    /// Take every surface still waiting to be acknowledged. Used on teardown.
    pub(crate) fn drain_returns(&mut self) -> impl Iterator<Item = PooledSurface<S>> + '_ {
        std::iter::from_fn(|| self.returns_rx.try_recv().ok()).map(|returned| returned.surface)
    }
}

impl<S> From<Returned<S>> for Message<S> {
    fn from(returned: Returned<S>) -> Self {
        Self::Acknowledged {
            surface: returned.surface,
            ack: returned.ack,
        }
    }
}

/// The pool's half of a hook: lets the pool revoke it.
#[derive(Debug, Clone, Default)]
pub(crate) struct Subscription {
    revoked: Arc<AtomicBool>,
}

impl Subscription {
    pub(crate) fn revoke(&self) {
        self.revoked.store(true, Ordering::Release);
    }
}

/// Why an acknowledgement was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The pool cancelled the subscription (e.g. the surface was reported lost).
    Revoked,
    /// The surface passed in is not the one the hook was issued for.
    WrongSurface,
    /// The pool no longer exists.
    PoolGone,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Revoked => f.write_str("hook was revoked"),
            Self::WrongSurface => f.write_str("surface does not match hook"),
            Self::PoolGone => f.write_str("pool has been dropped"),
        }
    }
}

/// An acknowledgement the pool refused; the surface goes back to the caller.
pub struct RecycleRejected<S> {
    /// The surface, still owned by whoever fired the hook.
    pub surface: PooledSurface<S>,
    /// Why it was refused.
    pub reason: RejectReason,
}

impl<S> std::fmt::Debug for RecycleRejected<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecycleRejected")
            .field("surface", &self.surface)
            .field("reason", &self.reason)
            .finish()
    }
}

impl<S> std::fmt::Display for RecycleRejected<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "recycle of {} rejected: {}", self.surface.id(), self.reason)
    }
}

impl<S> std::error::Error for RecycleRejected<S> {}

/// Capability to hand a surface back to its pool once, from any thread.
///
/// Firing consumes the hook, so it can fire at most once. The pool can
/// revoke it beforehand; a revoked hook hands the surface straight back.
pub struct RecycleHook<S> {
    surface_id: SurfaceId,
    subscription: Subscription,
    sender: mpsc::UnboundedSender<Returned<S>>,
}

impl<S> RecycleHook<S> {
    pub(crate) fn new(
        surface_id: SurfaceId,
        subscription: Subscription,
        sender: mpsc::UnboundedSender<Returned<S>>,
    ) -> Self {
        Self {
            surface_id,
            subscription,
            sender,
        }
    }

    /// The surface this hook was issued for.
    #[must_use]
    pub fn surface_id(&self) -> SurfaceId {
        self.surface_id
    }

    /// Whether firing now would be refused.
    #[must_use]
    pub fn is_revoked(&self) -> bool {
        self.subscription.revoked.load(Ordering::Acquire) || self.sender.is_closed()
    }

    /// The consumer is done with `surface`; return it to the pool.
    pub fn acknowledge(self, surface: PooledSurface<S>) -> Result<(), RecycleRejected<S>> {
        self.deliver(surface, Acknowledgement::Released)
    }

    /// The consumer is done but a remote reader still holds `surface`;
    /// park it as deferred.
    pub fn acknowledge_deferred(self, surface: PooledSurface<S>) -> Result<(), RecycleRejected<S>> {
        self.deliver(surface, Acknowledgement::AwaitingRemoteRelease)
    }

    fn deliver(
        self,
        surface: PooledSurface<S>,
        ack: Acknowledgement,
    ) -> Result<(), RecycleRejected<S>> {
        if surface.id() != self.surface_id {
            return Err(RecycleRejected {
                surface,
                reason: RejectReason::WrongSurface,
            });
        }
        if self.subscription.revoked.load(Ordering::Acquire) {
            return Err(RecycleRejected {
                surface,
                reason: RejectReason::Revoked,
            });
        }
        self.sender
            .send(Returned { surface, ack })
            .map_err(|mpsc::error::SendError(returned)| RecycleRejected {
                surface: returned.surface,
                reason: RejectReason::PoolGone,
            })
    }
}

impl<S> std::fmt::Debug for RecycleHook<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecycleHook")
            .field("surface_id", &self.surface_id)
            .field("revoked", &self.is_revoked())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{SurfaceDescriptor, SurfaceFormat, SurfaceSize};

    fn surface() -> PooledSurface<u32> {
        PooledSurface::new(
            SurfaceDescriptor::new(SurfaceFormat::A8, SurfaceSize::new(1, 1)),
            0,
        )
    }

    fn hook_for(inbox: &Inbox<u32>, s: &PooledSurface<u32>) -> (RecycleHook<u32>, Subscription) {
        let sub = Subscription::default();
        (RecycleHook::new(s.id(), sub.clone(), inbox.sender()), sub)
    }

    #[test]
    fn acknowledge_posts_to_inbox() {
        let mut inbox = Inbox::new();
        let s = surface();
        let id = s.id();
        let (hook, _sub) = hook_for(&inbox, &s);

        hook.acknowledge(s).unwrap();

        match inbox.try_recv() {
            Some(Message::Acknowledged { surface, ack }) => {
                assert_eq!(surface.id(), id);
                assert_eq!(ack, Acknowledgement::Released);
            }
            _ => panic!("expected an acknowledgement"),
        }
        assert!(inbox.try_recv().is_none());
    }

    #[test]
    fn revoked_hook_returns_surface() {
        let mut inbox = Inbox::new();
        let s = surface();
        let (hook, sub) = hook_for(&inbox, &s);

        sub.revoke();
        assert!(hook.is_revoked());
        let rejected = hook.acknowledge(s).unwrap_err();
        assert_eq!(rejected.reason, RejectReason::Revoked);
        assert!(inbox.try_recv().is_none());
    }

    #[test]
    fn wrong_surface_is_refused() {
        let inbox = Inbox::new();
        let s = surface();
        let (hook, _sub) = hook_for(&inbox, &s);

        let rejected = hook.acknowledge_deferred(surface()).unwrap_err();
        assert_eq!(rejected.reason, RejectReason::WrongSurface);
    }

    #[test]
    fn dropped_pool_returns_surface() {
        let inbox = Inbox::new();
        let s = surface();
        let (hook, _sub) = hook_for(&inbox, &s);
        drop(inbox);

        assert!(hook.is_revoked());
        let rejected = hook.acknowledge(s).unwrap_err();
        assert_eq!(rejected.reason, RejectReason::PoolGone);
    }

    #[test]
    fn dropped_pool_hands_back_the_same_surface() {
        let inbox = Inbox::new();
        let s = surface();
        let id = s.id();
        let (hook, _sub) = hook_for(&inbox, &s);
        drop(inbox);

        let rejected = hook.acknowledge_deferred(s).unwrap_err();
        assert_eq!(rejected.reason, RejectReason::PoolGone);
        assert_eq!(rejected.surface.id(), id);
    }

    #[test]
    fn acknowledgements_are_taken_before_expiries() {
        let mut inbox = Inbox::new();
        let s = surface();
        let (hook, _sub) = hook_for(&inbox, &s);

        inbox.expiry_sender().send(7).unwrap();
        hook.acknowledge(s).unwrap();

        assert!(matches!(
            inbox.try_recv(),
            Some(Message::Acknowledged { .. })
        ));
        assert!(matches!(
            inbox.try_recv(),
            Some(Message::ShrinkExpired { generation: 7 })
        ));
        assert!(inbox.try_recv().is_none());
    }

    #[test]
    fn drain_returns_yields_queued_surfaces_only() {
        let mut inbox = Inbox::new();
        let s = surface();
        let id = s.id();
        let (hook, _sub) = hook_for(&inbox, &s);

        hook.acknowledge(s).unwrap();
        inbox.expiry_sender().send(1).unwrap();

        let drained: Vec<_> = inbox.drain_returns().map(|s| s.id()).collect();
        assert_eq!(drained, vec![id]);
        assert!(matches!(
            inbox.try_recv(),
            Some(Message::ShrinkExpired { generation: 1 })
        ));
    }

    #[tokio::test]
    async fn recv_wakes_on_either_channel() {
        let mut inbox = Inbox::<u32>::new();
        let expiries = inbox.expiry_sender();
        tokio::spawn(async move {
            let _ = expiries.send(3);
        });

        let message = tokio::time::timeout(std::time::Duration::from_secs(1), inbox.recv())
            .await
            .expect("expiry delivered");
        assert!(matches!(
            message,
            Some(Message::ShrinkExpired { generation: 3 })
        ));
    }

    #[test]
    fn hook_can_fire_from_another_thread() {
        let mut inbox = Inbox::new();
        let s = surface();
        let (hook, _sub) = hook_for(&inbox, &s);

        std::thread::spawn(move || hook.acknowledge(s).unwrap())
            .join()
            .unwrap();

        assert!(matches!(
            inbox.try_recv(),
            Some(Message::Acknowledged { .. })
        ));
    }
}
