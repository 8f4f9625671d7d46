//! Stream Combinators
//!
//! Derived streams whose emissions depend on the emission pattern of a set
//! of inputs:
//!
//! | combinator        | fires when                                          |
//! |-------------------|-----------------------------------------------------|
//! | [`on`] / [`merge`]| any input fires                                     |
//! | [`compose`]       | every input has fired since the last emission (zip) |
//! | [`wait_for`]      | the source fires, after the gate fired once          |
//! | [`synchronize_on`]| the trigger fires and every input has a value       |
//!
//! All combinators are cold: each subscription gets its own input
//! subscriptions and its own buffers, and cancelling the returned handle
//! cancels every input subscription.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;

use super::observable::{Observable, Observer, Stream};
use super::subscription::Subscription;

/// Input set of a combinator. Most call sites combine a handful of channels.
type Sources<T> = SmallVec<[Stream<T>; 4]>;

/// Emit whenever any input emits. Completes once every input completed,
/// so an empty input set completes immediately.
pub fn on<T, I>(sources: I) -> Stream<T>
where
    T: Clone + Send + Sync + 'static,
    I: IntoIterator<Item = Stream<T>>,
{
    let sources: Sources<T> = sources.into_iter().collect();
    Stream::from_fn(move |observer: Observer<T>| {
        if sources.is_empty() {
            observer.complete();
            return Subscription::closed();
        }
        let outer = Subscription::new();
        let remaining = Arc::new(AtomicUsize::new(sources.len()));

        for source in &sources {
            let downstream = observer.clone();
            let completer = observer.clone();
            let remaining = Arc::clone(&remaining);
            let subscription = source.subscribe_observer(Observer::with_complete(
                move |value: &T| downstream.next(value),
                move || {
                    if remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
                        completer.complete();
                    }
                },
            ));
            outer.add(subscription);
        }
        outer
    })
}

/// Alias of [`on`].
pub fn merge<T, I>(sources: I) -> Stream<T>
where
    T: Clone + Send + Sync + 'static,
    I: IntoIterator<Item = Stream<T>>,
{
    on(sources)
}

/// Zip the inputs: emit one value per input, in input order, once every
/// input has produced a value not yet consumed. An empty input set
/// completes immediately.
pub fn compose<T, I>(sources: I) -> Stream<Vec<T>>
where
    T: Clone + Send + Sync + 'static,
    I: IntoIterator<Item = Stream<T>>,
{
    let sources: Sources<T> = sources.into_iter().collect();
    Stream::from_fn(move |observer: Observer<Vec<T>>| {
        if sources.is_empty() {
            observer.complete();
            return Subscription::closed();
        }
        let outer = Subscription::new();

        let queues: Arc<Mutex<SmallVec<[VecDeque<T>; 4]>>> = Arc::new(Mutex::new(
            sources.iter().map(|_| VecDeque::new()).collect(),
        ));

        for (index, source) in sources.iter().enumerate() {
            let queues = Arc::clone(&queues);
            let downstream = observer.clone();
            let subscription = source.subscribe(move |value: &T| {
                let ready = {
                    let mut queues = queues.lock();
                    queues[index].push_back(value.clone());
                    if queues.iter().all(|queue| !queue.is_empty()) {
                        Some(queues.iter_mut().filter_map(|queue| queue.pop_front()).collect::<Vec<_>>())
                    } else {
                        None
                    }
                };
                if let Some(values) = ready {
                    downstream.next(&values);
                }
            });
            outer.add(subscription);
        }
        outer
    })
}

/// Subscribe to `source` only after `gate` fires for the first time, then
/// forward every value of `source`.
///
/// Replay sources deliver their current value at the moment the gate opens.
pub fn wait_for<G, T>(gate: Stream<G>, source: Stream<T>) -> Stream<T>
where
    G: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    Stream::from_fn(move |observer: Observer<T>| {
        let outer = Subscription::new();
        let source = source.clone();
        let opened = outer.clone();
        let gate_subscription = gate.take(1).subscribe(move |_: &G| {
            if opened.is_closed() {
                return;
            }
            let subscription = source.subscribe_observer(observer.clone());
            opened.add(subscription);
        });
        outer.add(gate_subscription);
        outer
    })
}

/// On every `trigger` emission, emit the latest value of every input, once
/// all inputs have produced at least one value.
pub fn synchronize_on<G, T, I>(trigger: Stream<G>, sources: I) -> Stream<Vec<T>>
where
    G: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    I: IntoIterator<Item = Stream<T>>,
{
    let sources: Sources<T> = sources.into_iter().collect();
    Stream::from_fn(move |observer: Observer<Vec<T>>| {
        let outer = Subscription::new();
        let latest: Arc<Mutex<SmallVec<[Option<T>; 4]>>> =
            Arc::new(Mutex::new(sources.iter().map(|_| None).collect()));

        for (index, source) in sources.iter().enumerate() {
            let latest = Arc::clone(&latest);
            let subscription = source.subscribe(move |value: &T| {
                latest.lock()[index] = Some(value.clone());
            });
            outer.add(subscription);
        }

        let downstream = observer.clone();
        let trigger_subscription = trigger.subscribe_observer(Observer::with_complete(
            move |_: &G| {
                let values: Option<Vec<T>> = latest.lock().iter().cloned().collect();
                if let Some(values) = values {
                    downstream.next(&values);
                }
            },
            move || observer.complete(),
        ));
        outer.add(trigger_subscription);
        outer
    })
}
