//! Push-Stream Primitives
//!
//! The binding engine is built on a small synchronous reactive-stream layer:
//!
//! ## Subjects
//!
//! A [`Subject`] is a hot multicast stream. Values pushed with `next` reach
//! every current observer before `next` returns, in subscription order.
//!
//! ## Replay subjects
//!
//! A [`ReplaySubject`] additionally remembers its last value and replays it to
//! each new subscriber. Channels that model a present-tense property are
//! backed by replay subjects.
//!
//! ## Deferred values
//!
//! A [`Deferred`] resolves at most once. It backs the per-instance destroyed
//! signal and the component-state handle.
//!
//! ## Subscriptions
//!
//! Every `subscribe` returns a [`Subscription`]. Cancelling it is idempotent.
//!
//! # Implementation Notes
//!
//! State is shared through `Arc` and guarded by `parking_lot` locks. Locks are
//! released before any observer callback runs, so callbacks may freely push
//! into, subscribe to, or unsubscribe from the stream that is notifying them.

mod subscription;
mod observable;
mod subject;
mod replay;
mod deferred;
mod sink;
pub mod combinators;

pub use subscription::{Subscription, SubscriptionId};
pub use observable::{Observable, Observer, Stream};
pub use subject::Subject;
pub use replay::ReplaySubject;
pub use deferred::Deferred;
pub use sink::Sink;
pub use combinators::{compose, merge, on, synchronize_on, wait_for};
