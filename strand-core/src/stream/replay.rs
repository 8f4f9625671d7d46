//! Replay Stream Implementation
//!
//! A [`ReplaySubject`] models a present-tense value. It remembers the last
//! value pushed into it and hands that value to every new subscriber
//! synchronously, before any later live emission.
//!
//! # How Replay Works
//!
//! 1. `next` stores the value, then notifies current observers.
//!
//! 2. `subscribe` registers the observer first and then delivers the stored
//!    value, so values pushed from inside that first callback are not lost.
//!
//! 3. A replay subject created with [`ReplaySubject::empty`] has nothing to
//!    replay until its first `next`.

use std::sync::Arc;

use parking_lot::RwLock;

use super::observable::{Observable, Observer, Stream};
use super::subject::Subject;
use super::subscription::Subscription;

/// A push-stream with replay-of-last-value semantics.
///
/// # Example
///
/// ```rust
/// use strand_core::stream::{Observable, ReplaySubject};
///
/// let count = ReplaySubject::new(0);
/// count.next(5);
///
/// // New subscribers immediately see the latest value.
/// count.subscribe(|v| assert_eq!(*v, 5));
/// assert_eq!(count.value(), Some(5));
/// ```
pub struct ReplaySubject<T> {
    subject: Subject<T>,

    /// Last pushed value. `None` until the first push for empty subjects.
    value: Arc<RwLock<Option<T>>>,
}

impl<T> ReplaySubject<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a replay subject seeded with `initial`.
    pub fn new(initial: T) -> Self {
        Self {
            subject: Subject::new(),
            value: Arc::new(RwLock::new(Some(initial))),
        }
    }

    /// Create a replay subject with nothing to replay yet.
    pub fn empty() -> Self {
        Self {
            subject: Subject::new(),
            value: Arc::new(RwLock::new(None)),
        }
    }

    /// Get the stream's unique ID.
    pub fn id(&self) -> u64 {
        self.subject.id()
    }

    /// Get the last pushed value.
    pub fn value(&self) -> Option<T> {
        self.value.read().clone()
    }

    /// Whether a value is available for replay.
    pub fn has_value(&self) -> bool {
        self.value.read().is_some()
    }

    /// Store `value` and push it to every observer.
    pub fn next(&self, value: T) {
        if self.subject.is_completed() {
            return;
        }
        *self.value.write() = Some(value.clone());
        self.subject.emit(&value);
    }

    /// Push a value computed from the current one.
    ///
    /// Does nothing while the subject has no value.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let next = {
            let guard = self.value.read();
            guard.as_ref().map(f)
        };
        if let Some(next) = next {
            self.next(next);
        }
    }

    /// Complete the stream.
    pub fn complete(&self) {
        self.subject.complete();
    }

    /// Whether the stream has completed.
    pub fn is_completed(&self) -> bool {
        self.subject.is_completed()
    }

    /// Number of currently registered observers.
    pub fn observer_count(&self) -> usize {
        self.subject.observer_count()
    }

    /// Erase into a read-only [`Stream`].
    pub fn stream(&self) -> Stream<T> {
        Stream::new(self.clone())
    }
}

impl<T> Observable<T> for ReplaySubject<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn subscribe_observer(&self, observer: Observer<T>) -> Subscription {
        let current = self.value();
        let subscription = self.subject.subscribe_observer(observer.clone());
        if subscription.is_closed() {
            return subscription;
        }
        if let Some(current) = current {
            observer.next(&current);
        }
        subscription
    }
}

impl<T> Clone for ReplaySubject<T> {
    fn clone(&self) -> Self {
        Self {
            subject: self.subject.clone(),
            value: Arc::clone(&self.value),
        }
    }
}

impl<T> std::fmt::Debug for ReplaySubject<T>
where
    T: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplaySubject")
            .field("subject", &self.subject)
            .field("value", &*self.value.read())
            .finish()
    }
}
