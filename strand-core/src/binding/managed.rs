//! Managed Subscriptions
//!
//! [`Managed<S>`] wraps any observable so that subscriptions made through it
//! end when the owner is destroyed.
//!
//! # How It Works
//!
//! 1. The wrapper keeps a handle to the owner's destroyed signal. Once that
//!    signal has fired, `subscribe` returns an already-closed subscription
//!    without touching the wrapped stream. This holds even after the owner
//!    itself has been dropped.
//!
//! 2. Every open subscription gets its own watcher on the destroyed signal.
//!    The watcher is a child of the subscription, so unsubscribing early
//!    detaches it again.
//!
//! 3. The wrapper's list of handed-out subscriptions is only referenced by
//!    the wrapper. Dropping a wrapper releases it; subscriptions that are
//!    still open keep closing on destroy through their own watchers.

use std::ops::Deref;
use std::sync::Arc;

use parking_lot::Mutex;

use super::lifecycle::{self, Lifecycle};
use crate::metadata::TargetId;
use crate::stream::{Deferred, Observable, Observer, Subscription};

/// An observable whose subscriptions are cancelled on owner destruction.
pub struct Managed<S> {
    inner: S,
    owner: TargetId,
    destroyed: Deferred<()>,
    tracked: Arc<Mutex<Vec<Subscription>>>,
}

impl<S> Managed<S> {
    /// Wrap `inner`, tying its subscriptions to `owner`.
    pub fn new<L>(inner: S, owner: &L) -> Self
    where
        L: Lifecycle + ?Sized,
    {
        lifecycle::watch_destroyed(owner);
        Self {
            inner,
            owner: owner.target_id(),
            destroyed: owner.destroyed(),
            tracked: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Whether the owner has been destroyed.
    pub fn is_owner_destroyed(&self) -> bool {
        self.destroyed.is_resolved()
    }

    /// The wrapped stream.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// ID of the owning lifecycle.
    pub fn owner(&self) -> TargetId {
        self.owner
    }

    /// Number of tracked subscriptions that are still open.
    pub fn open_count(&self) -> usize {
        self.tracked
            .lock()
            .iter()
            .filter(|subscription| !subscription.is_closed())
            .count()
    }
}

impl<T, S> Observable<T> for Managed<S>
where
    S: Observable<T>,
{
    fn subscribe_observer(&self, observer: Observer<T>) -> Subscription {
        if self.destroyed.is_resolved() {
            return Subscription::closed();
        }

        let subscription = self.inner.subscribe_observer(observer);
        if subscription.is_closed() {
            return subscription;
        }

        let target = subscription.clone();
        let owner = self.owner;
        let watcher = self.destroyed.subscribe(move |_: &()| {
            if !target.is_closed() {
                target.unsubscribe();
                tracing::trace!(owner = %owner, "closed managed subscription");
            }
        });
        subscription.add(watcher);

        let mut tracked = self.tracked.lock();
        tracked.retain(|existing| !existing.is_closed());
        if !subscription.is_closed() {
            tracked.push(subscription.clone());
        }
        subscription
    }
}

/// Pushing through the wrapper reaches the wrapped subject directly.
impl<S> Deref for Managed<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.inner
    }
}

impl<S: Clone> Clone for Managed<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            owner: self.owner,
            destroyed: self.destroyed.clone(),
            tracked: Arc::clone(&self.tracked),
        }
    }
}
