//! Binding Bootstrap
//!
//! Wires an instance to its class's channels in two phases.
//!
//! # Construction
//!
//! Runs inside [`InstanceBuilder::build`](super::InstanceBuilder::build):
//!
//! 1. Resolve the merged event and state maps of the class (ancestor
//!    declarations folded in, memoized per class).
//! 2. Create a live stream for every descriptor: a subject for events, a
//!    replay subject for state.
//! 3. Rewire each state channel's property into an accessor over its stream.
//!    Proxy channels go last so their root streams exist.
//!
//! # Fields initialized
//!
//! Runs on the first `on_init` hook, only for classes with component state.
//! Every configurable field that is not already a channel becomes one:
//! writable data fields are rewired to a fresh replay stream, everything else
//! is captured once as a read-only snapshot. The resulting
//! [`ComponentState`] resolves the instance's [`ComponentStateRef`].
//!
//! A property that refuses rewiring is logged and left as it is; bootstrap
//! continues with the remaining properties.
//!
//! [`ComponentStateRef`]: crate::state::ComponentStateRef

use indexmap::IndexMap;

use super::instance::{Instance, Property};
use super::live::LiveStream;
use crate::metadata::{ChannelDescriptor, ClassToken, ProxyMode, EVENTS, STATES};
use crate::state::{ComponentState, StateChannel};
use crate::stream::ReplaySubject;

/// Channel names exposed through component state, with their writability.
///
/// State channels come first in declaration order, then configurable fields
/// of component-state classes.
pub(crate) fn state_plan(class: &ClassToken) -> IndexMap<String, bool> {
    let mut plan = IndexMap::new();
    for descriptor in STATES.resolve_merged(class).descriptors() {
        let writable = !descriptor.read_only && !matches!(descriptor.proxy, ProxyMode::From(_));
        *plan.entry(descriptor.channel.clone()).or_insert(false) |= writable;
    }

    if class.has_component_state() {
        for (name, field) in class.fields() {
            if field.is_configurable() && !plan.contains_key(&name) {
                plan.insert(name, field.is_writable());
            }
        }
    }
    plan
}

pub(crate) fn construct(instance: &Instance) {
    let class = instance.class();

    for descriptor in EVENTS.resolve_merged(class).descriptors() {
        if let Err(err) = instance.ensure_binding(descriptor) {
            tracing::warn!(
                class = %class.name(),
                instance = %instance.id(),
                channel = %descriptor.channel,
                error = %err,
                "event binding skipped"
            );
        }
    }

    let states = STATES.resolve_merged(class);
    let (plain, proxies): (Vec<&ChannelDescriptor>, Vec<&ChannelDescriptor>) =
        states.descriptors().partition(|descriptor| !descriptor.proxy.is_proxy());
    for descriptor in plain.into_iter().chain(proxies) {
        bind_state(instance, descriptor);
    }
}

fn bind_state(instance: &Instance, descriptor: &ChannelDescriptor) {
    let live = match instance.ensure_binding(descriptor) {
        Ok(live) => live,
        Err(err) => {
            tracing::warn!(
                class = %instance.class().name(),
                instance = %instance.id(),
                channel = %descriptor.channel,
                error = %err,
                "state binding skipped"
            );
            return;
        }
    };

    let readable = !descriptor.write_only;
    let writable = !descriptor.read_only && live.is_writable();
    if let Err(err) = instance.install_accessor(&descriptor.channel, live, readable, writable) {
        tracing::warn!(
            class = %instance.class().name(),
            instance = %instance.id(),
            property = %descriptor.channel,
            error = %err,
            "accessor install failed, property left un-reactive"
        );
    }
}

/// Build the component-state snapshot. Runs at most once per instance.
pub(crate) fn initialize_fields(instance: &Instance) {
    let class = instance.class();
    if !class.has_component_state() || !instance.mark_fields_initialized() {
        return;
    }

    let states = STATES.resolve_merged(class);
    let state_ref = instance.state_ref();
    let mut channels = IndexMap::new();
    for (name, writable) in state_ref.plan().iter() {
        let live = match states.get(name).first() {
            Some(descriptor) => instance.live_stream(&descriptor.property),
            None => field_stream(instance, name, *writable),
        };
        match live {
            Some(live) => {
                let writable = *writable && live.is_writable();
                channels.insert(name.clone(), StateChannel::new(live, writable));
            }
            None => tracing::trace!(instance = %instance.id(), channel = %name, "no stream for channel"),
        }
    }

    let count = channels.len();
    if state_ref.resolve(ComponentState::new(channels)) {
        tracing::debug!(class = %class.name(), instance = %instance.id(), channels = count, "component state resolved");
    }
}

fn field_stream(instance: &Instance, name: &str, writable: bool) -> Option<LiveStream> {
    match instance.property(name)? {
        Property::Reactive(accessor) => Some(accessor.live().clone()),
        Property::Data { value, .. } if writable => {
            let live = LiveStream::State(ReplaySubject::new(value.clone()));
            match instance.install_accessor(name, live.clone(), true, true) {
                Ok(()) => Some(live),
                Err(err) => {
                    tracing::warn!(
                        instance = %instance.id(),
                        property = name,
                        error = %err,
                        "accessor install failed, using snapshot"
                    );
                    Some(LiveStream::State(ReplaySubject::new(value)))
                }
            }
        }
        Property::Data { value, .. } => Some(LiveStream::State(ReplaySubject::new(value))),
        Property::Getter { .. } => {
            let value = instance.get(name).ok()?;
            Some(LiveStream::State(ReplaySubject::new(value)))
        }
    }
}
