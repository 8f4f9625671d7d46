//! Writable ends of streams.

use super::{ReplaySubject, Subject};

/// Something values can be pushed into.
pub trait Sink<T>: Send + Sync {
    fn push(&self, value: T);
}

impl<T> Sink<T> for Subject<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn push(&self, value: T) {
        self.next(value);
    }
}

impl<T> Sink<T> for ReplaySubject<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn push(&self, value: T) {
        self.next(value);
    }
}
