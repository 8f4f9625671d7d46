//! Subject Implementation
//!
//! A Subject is a hot, multicast push-stream: every value passed to
//! [`Subject::next`] is delivered synchronously to every current observer, in
//! the order the observers subscribed. Subjects back transient event channels
//! (hook invocations, manual triggers) where late subscribers should not see
//! earlier values.
//!
//! # Re-entrancy
//!
//! The observer list is snapshotted before delivery and no lock is held while
//! callbacks run, so an observer may call `next`, `subscribe` or
//! `unsubscribe` on the same subject from inside its callback.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;

use super::observable::{Observable, Observer, Stream};
use super::subscription::{Subscription, SubscriptionId};

/// Counter for generating unique stream IDs.
static STREAM_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a new unique stream ID.
pub(crate) fn next_stream_id() -> u64 {
    STREAM_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

struct SubjectInner<T> {
    id: u64,
    observers: Mutex<IndexMap<SubscriptionId, Observer<T>>>,
    completed: AtomicBool,
}

/// A plain multicast push-stream.
///
/// Cloning a subject yields another handle to the same stream.
pub struct Subject<T> {
    inner: Arc<SubjectInner<T>>,
}

impl<T> Subject<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new subject with no observers.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SubjectInner {
                id: next_stream_id(),
                observers: Mutex::new(IndexMap::new()),
                completed: AtomicBool::new(false),
            }),
        }
    }

    /// Get the subject's unique ID.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Push a value to every current observer.
    ///
    /// Ignored once the subject has completed.
    pub fn next(&self, value: T) {
        self.emit(&value);
    }

    pub(crate) fn emit(&self, value: &T) {
        if self.is_completed() {
            return;
        }
        let observers: Vec<Observer<T>> = self.inner.observers.lock().values().cloned().collect();
        for observer in observers {
            observer.next(value);
        }
    }

    /// Complete the subject. Observers receive completion and are dropped;
    /// later subscribers complete immediately.
    pub fn complete(&self) {
        if self.inner.completed.swap(true, Ordering::SeqCst) {
            return;
        }
        let observers = std::mem::take(&mut *self.inner.observers.lock());
        for (_, observer) in observers {
            observer.complete();
        }
    }

    /// Whether [`complete`](Self::complete) has been called.
    pub fn is_completed(&self) -> bool {
        self.inner.completed.load(Ordering::SeqCst)
    }

    /// Number of currently registered observers.
    pub fn observer_count(&self) -> usize {
        self.inner.observers.lock().len()
    }

    /// Erase into a read-only [`Stream`].
    pub fn stream(&self) -> Stream<T> {
        Stream::new(self.clone())
    }

    fn detach(inner: &Weak<SubjectInner<T>>, id: SubscriptionId) {
        if let Some(inner) = inner.upgrade() {
            inner.observers.lock().shift_remove(&id);
        }
    }
}

impl<T> Observable<T> for Subject<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn subscribe_observer(&self, observer: Observer<T>) -> Subscription {
        if self.is_completed() {
            observer.complete();
            return Subscription::closed();
        }

        let subscription = Subscription::new();
        let id = subscription.id();
        self.inner.observers.lock().insert(id, observer);

        let weak = Arc::downgrade(&self.inner);
        subscription.add_teardown(move || Self::detach(&weak, id));
        subscription
    }
}

impl<T> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Subject<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Subject<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subject")
            .field("id", &self.inner.id)
            .field("observer_count", &self.inner.observers.lock().len())
            .field("completed", &self.inner.completed.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn subject_notifies_in_subscription_order() {
        let subject: Subject<i32> = Subject::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = order.clone();
            subject.subscribe(move |v: &i32| order.lock().push((tag, *v)));
        }

        subject.next(1);
        assert_eq!(
            *order.lock(),
            vec![("first", 1), ("second", 1), ("third", 1)]
        );
    }

    #[test]
    fn late_subscriber_misses_earlier_values() {
        let subject: Subject<i32> = Subject::new();
        subject.next(1);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        subject.subscribe(move |v: &i32| sink.lock().push(*v));
        subject.next(2);

        assert_eq!(*seen.lock(), vec![2]);
    }

    #[test]
    fn unsubscribe_detaches_observer() {
        let subject: Subject<i32> = Subject::new();
        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();

        let subscription = subject.subscribe(move |_: &i32| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        subject.next(1);
        subscription.unsubscribe();
        subject.next(2);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(subject.observer_count(), 0);
    }

    #[test]
    fn completed_subject_rejects_new_subscribers() {
        let subject: Subject<i32> = Subject::new();
        let completions = Arc::new(AtomicI32::new(0));

        let c = completions.clone();
        subject.subscribe_observer(Observer::with_complete(
            |_| {},
            move || {
                c.fetch_add(1, Ordering::SeqCst);
            },
        ));
        subject.complete();
        subject.complete();

        let c = completions.clone();
        let late = subject.subscribe_observer(Observer::with_complete(
            |_| {},
            move || {
                c.fetch_add(1, Ordering::SeqCst);
            },
        ));

        assert!(late.is_closed());
        assert_eq!(completions.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn observer_can_push_reentrantly() {
        let subject: Subject<i32> = Subject::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let echo = subject.clone();
        subject.subscribe(move |v: &i32| {
            if *v < 3 {
                echo.next(v + 1);
            }
        });
        let sink = seen.clone();
        subject.subscribe(move |v: &i32| sink.lock().push(*v));

        subject.next(1);
        assert_eq!(*seen.lock(), vec![3, 2, 1]);
    }
}
