//! Change notification for hosts with explicit change detection.
//!
//! An instance built with an injected [`ChangeDetector`] can opt in through
//! [`Instance::enable_auto_push`]. From then on every change of a writable
//! property calls [`ChangeDetector::mark_for_check`]. Panics raised by the
//! detector are not caught.

use std::sync::Arc;

use super::instance::Instance;
use super::live::LiveStream;
use super::managed::Managed;
use crate::stream::{Observable, Subscription};
use crate::Value;

/// Host hook notified after a writable property changed.
pub trait ChangeDetector: Send + Sync {
    fn mark_for_check(&self);
}

impl<F> ChangeDetector for F
where
    F: Fn() + Send + Sync,
{
    fn mark_for_check(&self) {
        self()
    }
}

/// Notify `detector` on every value `live` emits after the current one.
///
/// The subscription is managed by `instance` and ends on destroy.
pub(crate) fn watch(
    instance: &Instance,
    detector: &Arc<dyn ChangeDetector>,
    live: &LiveStream,
) -> Subscription {
    let detector = Arc::clone(detector);
    let changes = if live.replays() { live.stream().skip(1) } else { live.stream() };
    Managed::new(changes, instance).subscribe(move |_: &Value| detector.mark_for_check())
}
