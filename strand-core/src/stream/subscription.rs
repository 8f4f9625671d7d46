//! Subscription handles.
//!
//! A [`Subscription`] is the unit of cancellation. Every call to `subscribe`
//! on a stream returns one, and calling [`Subscription::unsubscribe`] detaches
//! the observer. Unsubscribing is idempotent: the teardown logic runs exactly
//! once no matter how many clones of the handle call it.
//!
//! Dropping a handle does **not** unsubscribe. Subscriptions live until they
//! are explicitly cancelled or their source completes, which is what lets
//! [`Managed`](crate::binding::Managed) collect them and cancel in bulk.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Unique identifier for an observer registration.
///
/// Each `subscribe` call gets a fresh ID. Streams key their observer lists by
/// it so that removal is exact even when the same closure is registered twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Generate a new unique subscription ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

type Teardown = Box<dyn FnOnce() + Send>;

struct SubscriptionInner {
    id: SubscriptionId,
    closed: AtomicBool,
    teardowns: Mutex<Vec<Teardown>>,
}

/// Cancellable handle to a live subscription.
///
/// Cloning shares the same underlying state; closing any clone closes all.
#[derive(Clone)]
pub struct Subscription {
    inner: Arc<SubscriptionInner>,
}

impl Subscription {
    /// Create an open subscription with no teardown logic attached.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SubscriptionInner {
                id: SubscriptionId::new(),
                closed: AtomicBool::new(false),
                teardowns: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Create an open subscription that runs `teardown` when cancelled.
    pub fn with_teardown<F>(teardown: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let subscription = Self::new();
        subscription.inner.teardowns.lock().push(Box::new(teardown));
        subscription
    }

    /// A subscription that is already closed.
    ///
    /// Returned when subscribing to something that can no longer emit, such
    /// as a completed subject or a stream owned by a destroyed instance.
    pub fn closed() -> Self {
        let subscription = Self::new();
        subscription.inner.closed.store(true, Ordering::SeqCst);
        subscription
    }

    /// Get the subscription's unique ID.
    pub fn id(&self) -> SubscriptionId {
        self.inner.id
    }

    /// Check whether the subscription has been cancelled.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Attach additional teardown logic.
    ///
    /// If the subscription is already closed the teardown runs immediately.
    pub fn add_teardown<F>(&self, teardown: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_closed() {
            teardown();
            return;
        }
        self.inner.teardowns.lock().push(Box::new(teardown));
        // Lost a race with unsubscribe: drain whatever is left ourselves.
        if self.is_closed() {
            self.run_teardowns();
        }
    }

    /// Tie a child subscription to this one, so cancelling `self` also
    /// cancels `child`.
    pub fn add(&self, child: Subscription) {
        if child.ptr_eq(self) {
            return;
        }
        self.add_teardown(move || child.unsubscribe());
    }

    /// Cancel the subscription. Safe to call any number of times.
    pub fn unsubscribe(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.run_teardowns();
    }

    fn run_teardowns(&self) {
        let teardowns = std::mem::take(&mut *self.inner.teardowns.lock());
        for teardown in teardowns {
            teardown();
        }
    }

    /// Whether two handles refer to the same subscription.
    pub fn ptr_eq(&self, other: &Subscription) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for Subscription {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.inner.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn subscription_ids_are_unique() {
        let id1 = SubscriptionId::new();
        let id2 = SubscriptionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn teardown_runs_exactly_once() {
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();
        let subscription = Subscription::with_teardown(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });

        let other = subscription.clone();
        subscription.unsubscribe();
        other.unsubscribe();
        subscription.unsubscribe();

        assert!(other.is_closed());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn teardown_added_after_close_runs_immediately() {
        let subscription = Subscription::closed();
        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = ran.clone();
        subscription.add_teardown(move || ran_clone.store(true, Ordering::SeqCst));
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn child_closes_with_parent() {
        let parent = Subscription::new();
        let child = Subscription::new();
        parent.add(child.clone());

        assert!(!child.is_closed());
        parent.unsubscribe();
        assert!(child.is_closed());
    }
}
