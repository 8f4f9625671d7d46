//! One-shot deferred values.
//!
//! A [`Deferred`] starts pending and can be resolved exactly once. Observers
//! that subscribe while it is pending receive the value when it arrives;
//! observers that subscribe afterwards receive it immediately. Either way
//! each observer sees one value followed by completion.
//!
//! Staying pending forever is a valid state, not an error: subscribers are
//! simply never called. The same type backs an instance's destroyed signal
//! (`Deferred<()>`) and [`ComponentStateRef`](crate::state::ComponentStateRef).
//!
//! The resolved value is held in a `tokio::sync::watch` channel so async
//! callers can `wait()` for resolution as well.

use std::sync::Arc;

use tokio::sync::watch;

use super::observable::{Observable, Observer, Stream};
use super::subject::Subject;
use super::subscription::Subscription;

struct DeferredInner<T> {
    slot: watch::Sender<Option<T>>,
    subject: Subject<T>,
}

/// A value that is resolved at most once.
pub struct Deferred<T> {
    inner: Arc<DeferredInner<T>>,
}

impl<T> Deferred<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a pending deferred.
    pub fn new() -> Self {
        let (slot, _) = watch::channel(None);
        Self {
            inner: Arc::new(DeferredInner {
                slot,
                subject: Subject::new(),
            }),
        }
    }

    /// Resolve with `value`.
    ///
    /// Returns `true` if this call resolved the deferred, `false` if it had
    /// already been resolved (the new value is discarded).
    pub fn resolve(&self, value: T) -> bool {
        let mut first = false;
        self.inner.slot.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(value.clone());
            first = true;
            true
        });

        if first {
            self.inner.subject.next(value);
            self.inner.subject.complete();
        }
        first
    }

    /// Whether the deferred has been resolved.
    pub fn is_resolved(&self) -> bool {
        self.inner.slot.borrow().is_some()
    }

    /// The resolved value, if any.
    pub fn value(&self) -> Option<T> {
        self.inner.slot.borrow().clone()
    }

    /// Number of observers waiting for resolution.
    pub fn observer_count(&self) -> usize {
        self.inner.subject.observer_count()
    }

    /// Wait asynchronously for resolution.
    ///
    /// Never returns if the deferred is never resolved.
    pub async fn wait(&self) -> T {
        let mut receiver = self.inner.slot.subscribe();
        loop {
            let current = receiver.borrow_and_update().clone();
            if let Some(value) = current {
                return value;
            }
            if receiver.changed().await.is_err() {
                // The sender lives as long as `self`, so this cannot happen
                // while we are borrowed; treat it as "never resolves".
                std::future::pending::<()>().await;
            }
        }
    }

    /// Erase into a [`Stream`] that emits the value once.
    pub fn stream(&self) -> Stream<T> {
        Stream::new(self.clone())
    }
}

impl<T> Observable<T> for Deferred<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn subscribe_observer(&self, observer: Observer<T>) -> Subscription {
        if let Some(value) = self.value() {
            observer.next(&value);
            observer.complete();
            return Subscription::closed();
        }
        self.inner.subject.subscribe_observer(observer)
    }
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Deferred<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Deferred<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deferred")
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn resolves_exactly_once() {
        let deferred = Deferred::new();
        assert!(!deferred.is_resolved());
        assert!(deferred.resolve(1));
        assert!(!deferred.resolve(2));
        assert_eq!(deferred.value(), Some(1));
    }

    #[test]
    fn pending_subscriber_receives_value_then_completes() {
        let deferred = Deferred::new();
        let events = Arc::new(Mutex::new(Vec::new()));

        let on_next = events.clone();
        let on_complete = events.clone();
        let subscription = deferred.subscribe_observer(Observer::with_complete(
            move |v: &i32| on_next.lock().push(format!("next {v}")),
            move || on_complete.lock().push("complete".to_string()),
        ));
        assert!(events.lock().is_empty());

        deferred.resolve(7);
        assert_eq!(*events.lock(), vec!["next 7", "complete"]);
        assert_eq!(deferred.inner.subject.observer_count(), 0);
        drop(subscription);
    }

    #[test]
    fn late_subscriber_gets_value_immediately() {
        let deferred = Deferred::new();
        deferred.resolve("done");

        let calls = Arc::new(AtomicI32::new(0));
        let c = calls.clone();
        let subscription = deferred.subscribe(move |v: &&str| {
            assert_eq!(*v, "done");
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert!(subscription.is_closed());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn never_resolved_never_emits() {
        let deferred: Deferred<i32> = Deferred::new();
        assert!(deferred.stream().snapshot().is_empty());
    }

    #[tokio::test]
    async fn wait_returns_after_resolution() {
        let deferred = Deferred::new();
        let resolver = deferred.clone();
        let waiter = tokio::spawn(async move { resolver.wait().await });
        tokio::task::yield_now().await;

        deferred.resolve(99);
        assert_eq!(waiter.await.ok(), Some(99));
    }
}
