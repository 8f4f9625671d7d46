//! Observers, the `Observable` trait, and the type-erased [`Stream`] handle.
//!
//! Everything that can be subscribed to implements [`Observable`]. Concrete
//! sources ([`Subject`](super::Subject), [`ReplaySubject`](super::ReplaySubject),
//! [`Deferred`](super::Deferred)) and derived streams are all erased into a
//! cloneable [`Stream<T>`] so they can be stored in maps and passed through
//! combinators without naming their concrete type.
//!
//! Emission is synchronous: `next` on a source calls every observer before
//! returning. Operators defined here never introduce delay.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::subscription::Subscription;

type NextFn<T> = Arc<dyn Fn(&T) + Send + Sync>;
type CompleteFn = Arc<dyn Fn() + Send + Sync>;

/// Callbacks invoked by a stream.
pub struct Observer<T> {
    next: NextFn<T>,
    complete: Option<CompleteFn>,
}

impl<T> Observer<T> {
    /// Observer that only handles values.
    pub fn new<F>(next: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        Self {
            next: Arc::new(next),
            complete: None,
        }
    }

    /// Observer that also reacts to completion.
    pub fn with_complete<F, C>(next: F, complete: C) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
        C: Fn() + Send + Sync + 'static,
    {
        Self {
            next: Arc::new(next),
            complete: Some(Arc::new(complete)),
        }
    }

    /// Deliver a value.
    pub fn next(&self, value: &T) {
        (self.next)(value);
    }

    /// Deliver completion.
    pub fn complete(&self) {
        if let Some(complete) = &self.complete {
            complete();
        }
    }
}

impl<T> Clone for Observer<T> {
    fn clone(&self) -> Self {
        Self {
            next: Arc::clone(&self.next),
            complete: self.complete.clone(),
        }
    }
}

/// Anything that can be subscribed to.
pub trait Observable<T>: Send + Sync {
    /// Register an observer and return the handle that cancels it.
    fn subscribe_observer(&self, observer: Observer<T>) -> Subscription;

    /// Register a value callback.
    fn subscribe<F>(&self, next: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
        Self: Sized,
    {
        self.subscribe_observer(Observer::new(next))
    }
}

/// A cloneable, type-erased observable.
pub struct Stream<T> {
    source: Arc<dyn Observable<T>>,
}

impl<T> Clone for Stream<T> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
        }
    }
}

impl<T> Observable<T> for Stream<T>
where
    T: Send + Sync + 'static,
{
    fn subscribe_observer(&self, observer: Observer<T>) -> Subscription {
        self.source.subscribe_observer(observer)
    }
}

struct FnObservable<F>(F);

impl<T, F> Observable<T> for FnObservable<F>
where
    F: Fn(Observer<T>) -> Subscription + Send + Sync,
{
    fn subscribe_observer(&self, observer: Observer<T>) -> Subscription {
        (self.0)(observer)
    }
}

impl<T> Stream<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Erase a concrete observable.
    pub fn new<O>(source: O) -> Self
    where
        O: Observable<T> + 'static,
    {
        Self {
            source: Arc::new(source),
        }
    }

    /// Build a cold stream from a subscribe function.
    pub fn from_fn<F>(subscribe: F) -> Self
    where
        F: Fn(Observer<T>) -> Subscription + Send + Sync + 'static,
    {
        Self::new(FnObservable(subscribe))
    }

    /// A stream that never emits and never completes.
    pub fn never() -> Self {
        Self::from_fn(|_| Subscription::new())
    }

    /// A stream that emits `value` once and completes.
    pub fn of(value: T) -> Self {
        Self::from_fn(move |observer| {
            observer.next(&value);
            observer.complete();
            Subscription::closed()
        })
    }

    /// Transform every value.
    pub fn map<U, F>(&self, f: F) -> Stream<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        let source = self.clone();
        let f = Arc::new(f);
        Stream::from_fn(move |observer: Observer<U>| {
            let f = Arc::clone(&f);
            let downstream = observer.clone();
            source.subscribe_observer(Observer::with_complete(
                move |value: &T| downstream.next(&f(value)),
                move || observer.complete(),
            ))
        })
    }

    /// Forward only values matching `predicate`.
    pub fn filter<F>(&self, predicate: F) -> Stream<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let source = self.clone();
        let predicate = Arc::new(predicate);
        Stream::from_fn(move |observer: Observer<T>| {
            let predicate = Arc::clone(&predicate);
            let downstream = observer.clone();
            source.subscribe_observer(Observer::with_complete(
                move |value: &T| {
                    if predicate(value) {
                        downstream.next(value);
                    }
                },
                move || observer.complete(),
            ))
        })
    }

    /// Transform values, dropping those mapped to `None`.
    pub fn filter_map<U, F>(&self, f: F) -> Stream<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(&T) -> Option<U> + Send + Sync + 'static,
    {
        let source = self.clone();
        let f = Arc::new(f);
        Stream::from_fn(move |observer: Observer<U>| {
            let f = Arc::clone(&f);
            let downstream = observer.clone();
            source.subscribe_observer(Observer::with_complete(
                move |value: &T| {
                    if let Some(mapped) = f(value) {
                        downstream.next(&mapped);
                    }
                },
                move || observer.complete(),
            ))
        })
    }

    /// Drop the first `count` values of every subscription.
    ///
    /// Mostly used to ignore the synchronous replay of a replay stream.
    pub fn skip(&self, count: usize) -> Stream<T> {
        let source = self.clone();
        Stream::from_fn(move |observer: Observer<T>| {
            let seen = AtomicUsize::new(0);
            let downstream = observer.clone();
            source.subscribe_observer(Observer::with_complete(
                move |value: &T| {
                    if seen.fetch_add(1, Ordering::SeqCst) >= count {
                        downstream.next(value);
                    }
                },
                move || observer.complete(),
            ))
        })
    }

    /// Forward the first `count` values, then complete and detach.
    pub fn take(&self, count: usize) -> Stream<T> {
        let source = self.clone();
        Stream::from_fn(move |observer: Observer<T>| {
            let outer = Subscription::new();
            if count == 0 {
                observer.complete();
                outer.unsubscribe();
                return outer;
            }

            let seen = Arc::new(AtomicUsize::new(0));
            let downstream = observer.clone();
            let guard = outer.clone();
            let completer = observer.clone();
            let done = outer.clone();
            let upstream = source.subscribe_observer(Observer::with_complete(
                move |value: &T| {
                    if guard.is_closed() {
                        return;
                    }
                    let index = seen.fetch_add(1, Ordering::SeqCst);
                    if index < count {
                        downstream.next(value);
                    }
                    if index + 1 == count {
                        downstream.complete();
                        guard.unsubscribe();
                    }
                },
                move || {
                    if !done.is_closed() {
                        completer.complete();
                        done.unsubscribe();
                    }
                },
            ));
            outer.add(upstream);
            outer
        })
    }

    /// Subscribe and collect the values delivered synchronously.
    ///
    /// Useful for replay streams, whose current value arrives during
    /// `subscribe`.
    pub fn snapshot(&self) -> Vec<T> {
        let collected = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&collected);
        let subscription = self.subscribe_observer(Observer::new(move |value: &T| {
            sink.lock().push(value.clone());
        }));
        subscription.unsubscribe();
        let values = std::mem::take(&mut *collected.lock());
        values
    }
}

impl<T> Stream<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Suppress values equal to the previously forwarded one.
    pub fn distinct_until_changed(&self) -> Stream<T> {
        let source = self.clone();
        Stream::from_fn(move |observer: Observer<T>| {
            let last: Mutex<Option<T>> = Mutex::new(None);
            let downstream = observer.clone();
            source.subscribe_observer(Observer::with_complete(
                move |value: &T| {
                    {
                        let mut last = last.lock();
                        if last.as_ref() == Some(value) {
                            return;
                        }
                        *last = Some(value.clone());
                    }
                    downstream.next(value);
                },
                move || observer.complete(),
            ))
        })
    }
}

impl<T> std::fmt::Debug for Stream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{ReplaySubject, Subject};

    fn recorder<T: Clone + Send + 'static>() -> (Arc<Mutex<Vec<T>>>, impl Fn(&T) + Send + Sync)
    where
        T: Sync,
    {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |value: &T| sink.lock().push(value.clone()))
    }

    #[test]
    fn map_and_filter_compose() {
        let subject: Subject<i32> = Subject::new();
        let stream = subject.stream().map(|v: &i32| v * 10).filter(|v| *v > 10);

        let (seen, record) = recorder();
        stream.subscribe(record);

        subject.next(1);
        subject.next(2);
        subject.next(3);
        assert_eq!(*seen.lock(), vec![20, 30]);
    }

    #[test]
    fn filter_map_drops_none() {
        let subject: Subject<&'static str> = Subject::new();
        let (seen, record) = recorder();
        subject
            .stream()
            .filter_map(|v: &&'static str| v.parse::<i32>().ok())
            .subscribe(record);

        subject.next("1");
        subject.next("x");
        subject.next("3");
        assert_eq!(*seen.lock(), vec![1, 3]);
    }

    #[test]
    fn skip_ignores_replayed_value() {
        let replay = ReplaySubject::new(0);
        let (seen, record) = recorder();
        replay.stream().skip(1).subscribe(record);

        replay.next(7);
        assert_eq!(*seen.lock(), vec![7]);
    }

    #[test]
    fn take_completes_and_detaches() {
        let subject: Subject<i32> = Subject::new();
        let (seen, record) = recorder();
        let subscription = subject.stream().take(2).subscribe(record);

        subject.next(1);
        subject.next(2);
        subject.next(3);

        assert_eq!(*seen.lock(), vec![1, 2]);
        assert!(subscription.is_closed());
        assert_eq!(subject.observer_count(), 0);
    }

    #[test]
    fn take_one_from_replay_closes_during_subscribe() {
        let replay = ReplaySubject::new("a".to_string());
        let (seen, record) = recorder();
        let subscription = replay.stream().take(1).subscribe(record);

        replay.next("b".to_string());
        assert_eq!(*seen.lock(), vec!["a".to_string()]);
        assert!(subscription.is_closed());
        assert_eq!(replay.observer_count(), 0);
    }

    #[test]
    fn distinct_until_changed_drops_repeats() {
        let subject: Subject<i32> = Subject::new();
        let (seen, record) = recorder();
        subject.stream().distinct_until_changed().subscribe(record);

        for v in [1, 1, 2, 2, 1] {
            subject.next(v);
        }
        assert_eq!(*seen.lock(), vec![1, 2, 1]);
    }

    #[test]
    fn of_emits_once_and_snapshot_collects() {
        assert_eq!(Stream::of(5).snapshot(), vec![5]);
        assert!(Stream::<i32>::never().snapshot().is_empty());
    }
}
