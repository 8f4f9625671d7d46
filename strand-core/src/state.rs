//! Component State
//!
//! [`ComponentState`] is the per-instance snapshot of every state channel:
//! declared state channels plus, for classes built with
//! [`component_state()`](crate::metadata::ClassBuilder::component_state),
//! every configurable field. It is built once by the fields-initialized
//! bootstrap.
//!
//! [`ComponentStateRef`] is the handle an instance hands out before that
//! happens. It resolves exactly once; until then reads stay silent and writes
//! are queued. Channel names are validated against the class schema up
//! front, so a wrong name fails at the call site whether or not the ref has
//! resolved.
//!
//! # Example
//!
//! ```rust
//! use strand_core::binding::{Instance, LifecycleHook};
//! use strand_core::metadata::{ClassBuilder, FieldSpec};
//!
//! let class = ClassBuilder::new("Counter")
//!     .field(FieldSpec::data("count", 0))
//!     .component_state()
//!     .build();
//! let counter = Instance::new(&class);
//! let state = counter.state_ref();
//!
//! state.set("count", 5).unwrap();
//! assert!(state.current("count").unwrap().is_none());
//!
//! counter.hook(LifecycleHook::OnInit).unwrap();
//! assert_eq!(state.current("count").unwrap(), Some(5.into()));
//! assert_eq!(counter.get("count").unwrap(), 5);
//! ```

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::binding::{LifecycleHandle, LiveStream, Managed};
use crate::error::{BindError, ChannelAccess, Result};
use crate::stream::{Deferred, Observable, Observer, Sink, Stream, Subscription};
use crate::Value;

/// One channel of a resolved component state.
#[derive(Clone, Debug)]
pub struct StateChannel {
    live: LiveStream,
    writable: bool,
}

impl StateChannel {
    pub(crate) fn new(live: LiveStream, writable: bool) -> Self {
        Self { live, writable }
    }

    /// Replaying stream of the channel's values.
    pub fn stream(&self) -> Stream<Value> {
        self.live.stream()
    }

    /// Latest value, if any.
    pub fn value(&self) -> Option<Value> {
        self.live.current()
    }

    /// Whether `set` is accepted.
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Underlying live stream.
    pub fn live(&self) -> &LiveStream {
        &self.live
    }

    fn push(&self, value: Value) -> bool {
        self.writable && self.live.push(value)
    }
}

/// Resolved snapshot of an instance's state channels.
#[derive(Clone, Default)]
pub struct ComponentState {
    channels: Arc<IndexMap<String, StateChannel>>,
}

impl ComponentState {
    pub(crate) fn new(channels: IndexMap<String, StateChannel>) -> Self {
        Self {
            channels: Arc::new(channels),
        }
    }

    /// The replaying stream of `name`.
    pub fn get(&self, name: &str) -> Result<Stream<Value>> {
        self.channel(name)
            .map(StateChannel::stream)
            .ok_or_else(|| unknown(name, ChannelAccess::Read))
    }

    /// Push `value` into the writable channel `name`.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        match self.channel(name) {
            Some(channel) if channel.push(value.into()) => Ok(()),
            _ => Err(unknown(name, ChannelAccess::Write)),
        }
    }

    /// Channel called `name`.
    pub fn channel(&self, name: &str) -> Option<&StateChannel> {
        self.channels.get(name)
    }

    /// Current value of `name`.
    pub fn value(&self, name: &str) -> Option<Value> {
        self.channel(name).and_then(StateChannel::value)
    }

    /// Whether `name` exists and accepts writes.
    pub fn writable(&self, name: &str) -> bool {
        self.channel(name).is_some_and(StateChannel::is_writable)
    }

    /// Channel names in snapshot order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }

    /// Whether `name` is part of the snapshot.
    pub fn contains(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    /// Number of channels.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Whether the snapshot has no channels.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Current values as a JSON object.
    pub fn to_value(&self) -> Value {
        let map = self
            .channels
            .iter()
            .map(|(name, channel)| (name.clone(), channel.value().unwrap_or(Value::Null)))
            .collect();
        Value::Object(map)
    }
}

impl std::fmt::Debug for ComponentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentState")
            .field("channels", &self.channels.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn unknown(name: &str, access: ChannelAccess) -> BindError {
    BindError::UnknownChannel {
        name: name.to_string(),
        access,
    }
}

/// Deferred handle to an instance's [`ComponentState`].
#[derive(Clone)]
pub struct ComponentStateRef {
    deferred: Deferred<ComponentState>,
    /// Channel names and writability, known before resolution.
    plan: Arc<IndexMap<String, bool>>,
    lifecycle: LifecycleHandle,
}

impl ComponentStateRef {
    pub(crate) fn new(plan: IndexMap<String, bool>, lifecycle: LifecycleHandle) -> Self {
        Self {
            deferred: Deferred::new(),
            plan: Arc::new(plan),
            lifecycle,
        }
    }

    pub(crate) fn plan(&self) -> Arc<IndexMap<String, bool>> {
        Arc::clone(&self.plan)
    }

    pub(crate) fn resolve(&self, state: ComponentState) -> bool {
        self.deferred.resolve(state)
    }

    /// Emits the snapshot once it is resolved; silent otherwise.
    pub fn state(&self) -> Stream<ComponentState> {
        self.deferred.stream()
    }

    /// Wait for resolution.
    pub async fn resolved(&self) -> ComponentState {
        self.deferred.wait().await
    }

    /// Whether the snapshot has been produced.
    pub fn is_resolved(&self) -> bool {
        self.deferred.is_resolved()
    }

    /// The snapshot, if already resolved.
    pub fn snapshot(&self) -> Option<ComponentState> {
        self.deferred.value()
    }

    /// Channel names, in snapshot order.
    pub fn channel_names(&self) -> impl Iterator<Item = &str> {
        self.plan.keys().map(String::as_str)
    }

    fn check(&self, name: &str, access: ChannelAccess) -> Result<()> {
        let known = match access {
            ChannelAccess::Read => self.plan.contains_key(name),
            ChannelAccess::Write => self.plan.get(name).copied().unwrap_or(false),
        };
        if known {
            Ok(())
        } else {
            Err(unknown(name, access))
        }
    }

    /// The channel `name` once resolved, replaying its current value to every
    /// subscriber.
    pub fn get(&self, name: &str) -> Result<Stream<Value>> {
        self.check(name, ChannelAccess::Read)?;

        let deferred = self.deferred.clone();
        let name = name.to_string();
        Ok(Stream::from_fn(move |observer: Observer<Value>| {
            let outer = Subscription::new();
            let slot = outer.clone();
            let name = name.clone();
            let gate = deferred.subscribe(move |state: &ComponentState| {
                if slot.is_closed() {
                    return;
                }
                match state.channel(&name) {
                    Some(channel) => slot.add(channel.stream().subscribe_observer(observer.clone())),
                    None => tracing::warn!(channel = %name, "channel missing from resolved state"),
                }
            });
            outer.add(gate);
            outer
        }))
    }

    /// Typed view of [`get`](Self::get). Values that do not deserialize as
    /// `T` are logged and skipped.
    pub fn get_as<T>(&self, name: &str) -> Result<Stream<T>>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let channel = name.to_string();
        Ok(self.get(name)?.filter_map(move |value: &Value| {
            match serde_json::from_value(value.clone()) {
                Ok(typed) => Some(typed),
                Err(err) => {
                    tracing::warn!(channel = %channel, error = %err, "value skipped");
                    None
                }
            }
        }))
    }

    /// Current value of `name`, or `None` before resolution.
    pub fn current(&self, name: &str) -> Result<Option<Value>> {
        self.check(name, ChannelAccess::Read)?;
        Ok(self.snapshot().and_then(|state| state.value(name)))
    }

    /// [`get`](Self::get) for each name; fails on the first unknown one.
    pub fn get_all<S>(&self, names: &[S]) -> Result<Vec<Stream<Value>>>
    where
        S: AsRef<str>,
    {
        names.iter().map(|name| self.get(name.as_ref())).collect()
    }

    /// Push `value` into `name` once resolved.
    ///
    /// The returned deferred resolves after the push. Writes made before
    /// resolution are applied in call order when it happens.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<Deferred<()>> {
        self.check(name, ChannelAccess::Write)?;

        let done = Deferred::new();
        let applied = done.clone();
        let name = name.to_string();
        let value = value.into();
        self.deferred.subscribe(move |state: &ComponentState| {
            if let Err(err) = state.set(&name, value.clone()) {
                tracing::warn!(channel = %name, error = %err, "queued write dropped");
            }
            applied.resolve(());
        });
        Ok(done)
    }

    /// Serialize `value` and [`set`](Self::set) it.
    pub fn set_from<T>(&self, name: &str, value: &T) -> Result<Deferred<()>>
    where
        T: Serialize,
    {
        let value = serde_json::to_value(value).map_err(|err| BindError::Conversion {
            name: name.to_string(),
            message: err.to_string(),
        })?;
        self.set(name, value)
    }

    /// Forward every value of `source` into `name`, starting with whatever
    /// `source` delivers on subscribe. A managed bridge ends when the
    /// instance is destroyed.
    pub fn subscribe_to<S>(&self, name: &str, source: S, managed: bool) -> Result<Subscription>
    where
        S: Observable<Value> + 'static,
    {
        self.check(name, ChannelAccess::Write)?;

        let this = self.clone();
        let target = name.to_string();
        let bridge = move |value: &Value| {
            if let Err(err) = this.set(&target, value.clone()) {
                tracing::warn!(channel = %target, error = %err, "bridged write dropped");
            }
        };
        if managed {
            Ok(Managed::new(source, &self.lifecycle).subscribe(bridge))
        } else {
            Ok(source.subscribe(bridge))
        }
    }

    /// Mirror two writable channels. Both start from `a`'s value.
    ///
    /// A value is propagated only if it differs from the last value that
    /// crossed the bridge in either direction, which stops echoes.
    pub fn sync(&self, a: &str, b: &str) -> Result<Subscription> {
        self.check(a, ChannelAccess::Write)?;
        self.check(b, ChannelAccess::Write)?;

        let guard = MirrorGuard::default();
        let link = Subscription::new();
        link.add(self.subscribe_to(b, guard.gate(self.get(a)?), true)?);
        link.add(self.subscribe_to(a, guard.gate(self.get(b)?), true)?);
        tracing::debug!(a, b, "channels synchronized");
        Ok(link)
    }

    /// Mirror `name` with an external read/write stream. The external side
    /// starts from `name`'s value.
    pub fn sync_with<S>(&self, name: &str, external: S) -> Result<Subscription>
    where
        S: Observable<Value> + Sink<Value> + Clone + 'static,
    {
        self.check(name, ChannelAccess::Write)?;

        let guard = MirrorGuard::default();
        let link = Subscription::new();

        let sink = external.clone();
        let outbound = Managed::new(guard.gate(self.get(name)?), &self.lifecycle)
            .subscribe(move |value: &Value| sink.push(value.clone()));
        link.add(outbound);

        let inbound = guard.gate(Stream::new(external));
        link.add(self.subscribe_to(name, inbound, true)?);
        Ok(link)
    }
}

impl std::fmt::Debug for ComponentStateRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentStateRef")
            .field("resolved", &self.is_resolved())
            .field("channels", &self.plan.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Last value that crossed a bidirectional bridge.
#[derive(Clone, Default)]
struct MirrorGuard {
    last: Arc<Mutex<Option<Value>>>,
}

impl MirrorGuard {
    /// Pass only values that differ from the last one let through.
    fn gate(&self, source: Stream<Value>) -> Stream<Value> {
        let last = Arc::clone(&self.last);
        source.filter(move |value: &Value| {
            let mut last = last.lock();
            if last.as_ref() == Some(value) {
                return false;
            }
            *last = Some(value.clone());
            true
        })
    }
}
