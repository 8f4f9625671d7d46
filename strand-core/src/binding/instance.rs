//! Component instances.
//!
//! An [`Instance`] is a runtime object of a [`ClassToken`]: a property table
//! initialised from the class's field schema, the live streams bound to its
//! channels, and its lifecycle (destroyed signal plus component-state handle).
//!
//! Properties come in three shapes. Plain data and getter fields behave like
//! ordinary fields. Reactive properties have been rewired by bootstrap: reads
//! return a locally cached copy of the last pushed value and writes push into
//! the live stream.
//!
//! Locks on the property table are never held while user code (getters,
//! methods, observers) runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};

use super::auto_push::{self, ChangeDetector};
use super::bootstrap;
use super::lifecycle::{self, Lifecycle, LifecycleHandle, LifecycleHook};
use super::live::{split_path, LiveStream, ProxyStream};
use super::managed::Managed;
use crate::error::{BindError, Result};
use crate::metadata::{
    ChannelDescriptor, ChannelKind, ClassToken, FacadeKind, FieldKind, Getter,
    MetadataTarget, ProxyMode, TargetId, EVENTS, STATES,
};
use crate::state::ComponentStateRef;
use crate::stream::{Deferred, Observable, ReplaySubject, Stream, Subject, Subscription};
use crate::Value;

/// A property rewired to a live stream.
#[derive(Clone)]
pub(crate) struct Accessor {
    live: LiveStream,
    /// Further streams bound under the same channel name.
    fanout: Vec<LiveStream>,
    cache: Arc<RwLock<Value>>,
    readable: bool,
    writable: bool,
}

impl Accessor {
    pub(crate) fn live(&self) -> &LiveStream {
        &self.live
    }

    fn push(&self, value: Value) {
        for live in &self.fanout {
            live.push(value.clone());
        }
        self.live.push(value);
    }
}

#[derive(Clone)]
pub(crate) enum Property {
    Data { value: Value, writable: bool, configurable: bool },
    Getter { getter: Getter, configurable: bool },
    Reactive(Accessor),
}

struct InstanceInner {
    id: TargetId,
    class: ClassToken,
    properties: RwLock<IndexMap<String, Property>>,
    /// Live streams keyed by backing property.
    bindings: RwLock<IndexMap<String, LiveStream>>,
    lifecycle: LifecycleHandle,
    state: ComponentStateRef,
    detector: Option<Arc<dyn ChangeDetector>>,
    auto_push: AtomicBool,
    fields_initialized: AtomicBool,
    /// Cache updaters and proxy feeds, closed on drop.
    internal: Mutex<Vec<Subscription>>,
}

impl Drop for InstanceInner {
    fn drop(&mut self) {
        for subscription in self.internal.lock().drain(..) {
            subscription.unsubscribe();
        }
        lifecycle::release(self.id);
    }
}

/// A live object of a registered class. Cloning yields another handle to the
/// same object.
#[derive(Clone)]
pub struct Instance {
    inner: Arc<InstanceInner>,
}

/// Configures an [`Instance`] before construction bootstrap runs.
pub struct InstanceBuilder {
    class: ClassToken,
    detector: Option<Arc<dyn ChangeDetector>>,
    values: Vec<(String, Value)>,
}

impl InstanceBuilder {
    /// Inject the change-notification hook used by auto-push.
    pub fn detector(mut self, detector: Arc<dyn ChangeDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    /// Override a data field's initial value.
    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.push((name.into(), value.into()));
        self
    }

    /// Run construction bootstrap and return the instance.
    pub fn build(self) -> Instance {
        let class = self.class;
        let id = TargetId::new();

        let mut properties = IndexMap::new();
        for (name, field) in class.fields() {
            let property = match field.kind() {
                FieldKind::Data(default) => Property::Data {
                    value: default.clone(),
                    writable: field.is_writable(),
                    configurable: field.is_configurable(),
                },
                FieldKind::Getter(getter) => Property::Getter {
                    getter: Arc::clone(getter),
                    configurable: field.is_configurable(),
                },
            };
            properties.insert(name, property);
        }
        for (name, value) in self.values {
            if let Some(Property::Data { value: slot, .. }) = properties.get_mut(&name) {
                *slot = value;
            }
        }

        let lifecycle = LifecycleHandle::with_id(id);
        let state = ComponentStateRef::new(bootstrap::state_plan(&class), lifecycle.clone());

        let instance = Instance {
            inner: Arc::new(InstanceInner {
                id,
                class,
                properties: RwLock::new(properties),
                bindings: RwLock::new(IndexMap::new()),
                lifecycle,
                state,
                detector: self.detector,
                auto_push: AtomicBool::new(false),
                fields_initialized: AtomicBool::new(false),
                internal: Mutex::new(Vec::new()),
            }),
        };

        bootstrap::construct(&instance);
        tracing::debug!(
            class = %instance.class().name(),
            instance = %id,
            bindings = instance.inner.bindings.read().len(),
            "instance constructed"
        );
        instance
    }
}

impl Instance {
    /// Construct an instance with schema defaults and no injected detector.
    pub fn new(class: &ClassToken) -> Self {
        Self::builder(class).build()
    }

    /// Configure an instance before construction.
    pub fn builder(class: &ClassToken) -> InstanceBuilder {
        InstanceBuilder {
            class: class.clone(),
            detector: None,
            values: Vec::new(),
        }
    }

    /// Identity of this instance.
    pub fn id(&self) -> TargetId {
        self.inner.id
    }

    /// Class the instance was built from.
    pub fn class(&self) -> &ClassToken {
        &self.inner.class
    }

    fn unknown(&self, name: &str) -> BindError {
        BindError::UnknownProperty {
            class: self.class().name().to_string(),
            name: name.to_string(),
        }
    }

    /// Read a property.
    pub fn get(&self, name: &str) -> Result<Value> {
        let property = self.inner.properties.read().get(name).cloned();
        match property {
            Some(Property::Data { value, .. }) => Ok(value),
            Some(Property::Getter { getter, .. }) => Ok(getter(self)),
            Some(Property::Reactive(accessor)) => {
                if !accessor.readable {
                    return Err(BindError::WriteOnlyProperty { name: name.to_string() });
                }
                let value = accessor.cache.read().clone();
                Ok(value)
            }
            None => Err(self.unknown(name)),
        }
    }

    /// Write a property. Reactive properties push into their live stream.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let mut properties = self.inner.properties.write();
        match properties.get_mut(name) {
            Some(Property::Data { value: slot, writable: true, .. }) => {
                *slot = value;
                drop(properties);
                self.notify_changed();
                Ok(())
            }
            Some(Property::Data { .. }) | Some(Property::Getter { .. }) => {
                Err(BindError::ReadOnlyProperty { name: name.to_string() })
            }
            Some(Property::Reactive(accessor)) => {
                if !accessor.writable {
                    return Err(BindError::ReadOnlyProperty { name: name.to_string() });
                }
                let accessor = accessor.clone();
                drop(properties);
                accessor.push(value);
                Ok(())
            }
            None => Err(self.unknown(name)),
        }
    }

    /// Invoke a facade or hand-written method.
    ///
    /// Event facades run the hand-written method of the same name (if the
    /// channel was declared with `allow_existing`, or the method is
    /// inherited) and then push `arg` into every event stream bound under
    /// `name`. The method's return value is returned.
    pub fn call(&self, name: &str, arg: impl Into<Value>) -> Result<Value> {
        let arg = arg.into();
        let class = self.class().clone();

        match class.facade(name) {
            Some(FacadeKind::Event) => {
                let result = match class.method(name) {
                    Some(method) => method(self, &arg),
                    None => Value::Null,
                };
                let events = EVENTS.resolve_merged(&class);
                for descriptor in events.get(name) {
                    let live = self.ensure_binding(descriptor)?;
                    live.push(arg.clone());
                }
                tracing::trace!(instance = %self.id(), channel = name, "event emitted");
                Ok(result)
            }
            Some(FacadeKind::State) => Err(self.unknown(name)),
            None => match class.method(name) {
                Some(method) => Ok(method(self, &arg)),
                None => Err(self.unknown(name)),
            },
        }
    }

    /// Host entry point for lifecycle hooks.
    ///
    /// `OnInit` first runs the fields-initialized bootstrap. `OnDestroy`
    /// fires the destroyed signal after the hook channel has emitted.
    pub fn hook(&self, hook: LifecycleHook) -> Result<()> {
        if hook == LifecycleHook::OnInit {
            bootstrap::initialize_fields(self);
        }

        let name = hook.method_name();
        let class = self.class();
        let result = if class.facade(name).is_some() || class.method(name).is_some() {
            self.call(name, Value::Null).map(|_| ())
        } else {
            Ok(())
        };

        if hook == LifecycleHook::OnDestroy && self.inner.lifecycle.destroy() {
            tracing::debug!(class = %class.name(), instance = %self.id(), "instance destroyed");
        }
        result
    }

    /// The live stream bound at `property`, wrapped in [`Managed`] unless the
    /// channel was declared unmanaged.
    pub fn stream(&self, property: &str) -> Result<Stream<Value>> {
        let descriptor = self
            .descriptor(property)
            .ok_or_else(|| self.unknown(property))?;
        let live = self.ensure_binding(&descriptor)?;
        if descriptor.unmanaged {
            return Ok(live.stream());
        }
        Ok(Stream::new(Managed::new(live.stream(), self)))
    }

    /// The raw live stream at `property`, if bootstrap created one.
    pub fn live_stream(&self, property: &str) -> Option<LiveStream> {
        self.inner.bindings.read().get(property).cloned()
    }

    /// Handle to the component-state snapshot.
    pub fn state_ref(&self) -> ComponentStateRef {
        self.inner.state.clone()
    }

    /// A detached token sharing this instance's identity and destroyed signal.
    pub fn lifecycle(&self) -> LifecycleHandle {
        self.inner.lifecycle.clone()
    }

    /// Whether `on_destroy` has run.
    pub fn is_destroyed(&self) -> bool {
        self.inner.lifecycle.is_destroyed()
    }

    /// Whether `name` has been rewired to a live stream.
    pub fn is_reactive(&self, name: &str) -> bool {
        matches!(self.inner.properties.read().get(name), Some(Property::Reactive(_)))
    }

    /// Property names in schema order.
    pub fn property_names(&self) -> Vec<String> {
        self.inner.properties.read().keys().cloned().collect()
    }

    /// Call the injected [`ChangeDetector`] after every change of a writable
    /// property.
    ///
    /// Fails with [`BindError::MissingDependency`] if no detector was
    /// injected. Enabling twice is a no-op.
    pub fn enable_auto_push(&self) -> Result<()> {
        let detector = self
            .inner
            .detector
            .clone()
            .ok_or(BindError::MissingDependency { name: "ChangeDetector" })?;
        if self.inner.auto_push.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let watched: Vec<LiveStream> = self
            .inner
            .properties
            .read()
            .values()
            .filter_map(|property| match property {
                Property::Reactive(accessor) if accessor.writable => Some(accessor.live.clone()),
                _ => None,
            })
            .collect();
        for live in &watched {
            auto_push::watch(self, &detector, live);
        }
        tracing::debug!(instance = %self.id(), watched = watched.len(), "auto-push enabled");
        Ok(())
    }

    fn notify_changed(&self) {
        if !self.inner.auto_push.load(Ordering::SeqCst) || self.is_destroyed() {
            return;
        }
        if let Some(detector) = &self.inner.detector {
            detector.mark_for_check();
        }
    }

    fn descriptor(&self, property: &str) -> Option<ChannelDescriptor> {
        let class = self.class();
        EVENTS
            .resolve_merged(class)
            .by_property(property)
            .cloned()
            .or_else(|| STATES.resolve_merged(class).by_property(property).cloned())
    }

    pub(crate) fn property(&self, name: &str) -> Option<Property> {
        self.inner.properties.read().get(name).cloned()
    }

    pub(crate) fn mark_fields_initialized(&self) -> bool {
        !self.inner.fields_initialized.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn track_internal(&self, subscription: Subscription) {
        self.inner.internal.lock().push(subscription);
    }

    /// The live stream for `descriptor`, created on first use.
    pub(crate) fn ensure_binding(&self, descriptor: &ChannelDescriptor) -> Result<LiveStream> {
        if let Some(live) = self.live_stream(&descriptor.property) {
            return Ok(live);
        }

        let live = match (&descriptor.kind, &descriptor.proxy) {
            (ChannelKind::Event, _) => LiveStream::Event(Subject::new()),
            (ChannelKind::State, ProxyMode::None) => {
                LiveStream::State(ReplaySubject::new(self.seed_value(descriptor)))
            }
            (ChannelKind::State, mode) => self.proxy_binding(descriptor, mode)?,
        };

        let mut bindings = self.inner.bindings.write();
        let live = bindings
            .entry(descriptor.property.clone())
            .or_insert(live)
            .clone();
        drop(bindings);

        tracing::trace!(
            instance = %self.id(),
            channel = %descriptor.channel,
            property = %descriptor.property,
            kind = ?descriptor.kind,
            "live stream created"
        );
        Ok(live)
    }

    /// A state channel starts from its field's current value, then from its
    /// declared default.
    fn seed_value(&self, descriptor: &ChannelDescriptor) -> Value {
        match self.property(&descriptor.channel) {
            Some(Property::Data { value, .. }) if !value.is_null() => value,
            _ => descriptor.default.clone().unwrap_or(Value::Null),
        }
    }

    fn proxy_binding(&self, descriptor: &ChannelDescriptor, mode: &ProxyMode) -> Result<LiveStream> {
        let invalid = || BindError::InvalidProxyPath {
            channel: descriptor.channel.clone(),
            path: mode.path().unwrap_or_default().to_string(),
        };

        let (root_name, segments) = split_path(mode.path().ok_or_else(invalid)?);
        let states = STATES.resolve_merged(self.class());
        let root_descriptor = states
            .get(root_name)
            .iter()
            .find(|candidate| !candidate.proxy.is_proxy())
            .cloned()
            .ok_or_else(invalid)?;

        let LiveStream::State(root) = self.ensure_binding(&root_descriptor)? else {
            return Err(invalid());
        };
        let (proxy, feed) = ProxyStream::new(mode, root, segments).ok_or_else(invalid)?;
        if let Some(feed) = feed {
            self.track_internal(feed);
        }
        Ok(LiveStream::Proxy(proxy))
    }

    /// Rewire `name` to `live`.
    ///
    /// A property that is already reactive gains `live` as an extra fan-out
    /// target. Non-configurable properties are refused.
    pub(crate) fn install_accessor(
        &self,
        name: &str,
        live: LiveStream,
        readable: bool,
        writable: bool,
    ) -> Result<()> {
        let refused = |reason: &str| BindError::AccessorInstall {
            property: name.to_string(),
            reason: reason.to_string(),
        };

        match self.property(name) {
            Some(Property::Data { configurable: false, .. })
            | Some(Property::Getter { configurable: false, .. }) => {
                return Err(refused("property is not configurable"));
            }
            Some(Property::Reactive(_)) => {
                let mut properties = self.inner.properties.write();
                if let Some(Property::Reactive(existing)) = properties.get_mut(name) {
                    let known = existing.live.same_stream(&live)
                        || existing.fanout.iter().any(|other| other.same_stream(&live));
                    if !known {
                        existing.fanout.push(live);
                    }
                }
                return Ok(());
            }
            _ => {}
        }

        let cache = Arc::new(RwLock::new(live.current().unwrap_or(Value::Null)));
        let slot = Arc::clone(&cache);
        let updater = live.stream().subscribe(move |value: &Value| {
            *slot.write() = value.clone();
        });
        self.track_internal(updater);

        let accessor = Accessor {
            live: live.clone(),
            fanout: Vec::new(),
            cache,
            readable,
            writable,
        };
        self.inner
            .properties
            .write()
            .insert(name.to_string(), Property::Reactive(accessor));

        if writable && self.inner.auto_push.load(Ordering::SeqCst) {
            if let Some(detector) = &self.inner.detector {
                auto_push::watch(self, detector, &live);
            }
        }
        Ok(())
    }
}

impl MetadataTarget for Instance {
    fn target_id(&self) -> TargetId {
        self.inner.id
    }

    fn parent_target(&self) -> Option<&dyn MetadataTarget> {
        Some(&self.inner.class)
    }
}

impl Lifecycle for Instance {
    fn destroyed(&self) -> Deferred<()> {
        self.inner.lifecycle.destroyed()
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.inner.id)
            .field("class", &self.inner.class.name())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{declare_event, declare_state, ChannelOptions, ClassBuilder, FieldSpec};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn recorder() -> (Arc<Mutex<Vec<Value>>>, impl Fn(&Value) + Send + Sync + 'static) {
        let values = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&values);
        (values, move |value: &Value| sink.lock().push(value.clone()))
    }

    #[test]
    fn fields_start_from_schema_and_overrides() {
        let class = ClassBuilder::new("Card")
            .field(FieldSpec::data("title", "untitled"))
            .field(FieldSpec::data("width", 100))
            .field(FieldSpec::getter("kind", |_| json!("card")))
            .build();
        let card = Instance::builder(&class).with_value("width", 240).build();

        assert_eq!(card.get("title").unwrap(), json!("untitled"));
        assert_eq!(card.get("width").unwrap(), json!(240));
        assert_eq!(card.get("kind").unwrap(), json!("card"));
        assert!(matches!(card.set("kind", 1), Err(BindError::ReadOnlyProperty { .. })));
        assert!(matches!(card.get("missing"), Err(BindError::UnknownProperty { .. })));
    }

    #[test]
    fn state_property_round_trips_through_stream() {
        let class = ClassBuilder::new("Counter").field(FieldSpec::data("count", 3)).build();
        declare_state(&class, "count", "count$", ChannelOptions::default()).unwrap();
        let counter = Instance::new(&class);

        assert!(counter.is_reactive("count"));
        let (seen, sink) = recorder();
        counter.stream("count$").unwrap().subscribe(sink);

        counter.set("count", 4).unwrap();
        assert_eq!(counter.get("count").unwrap(), json!(4));
        assert_eq!(*seen.lock(), vec![json!(3), json!(4)]);
    }

    #[test]
    fn declared_default_seeds_missing_field() {
        let class = ClassBuilder::new("Toggle").build();
        declare_state(&class, "on", "on$", ChannelOptions::default().with_default(false)).unwrap();
        let toggle = Instance::new(&class);

        assert_eq!(toggle.get("on").unwrap(), json!(false));
        assert_eq!(toggle.live_stream("on$").unwrap().current(), Some(json!(false)));
    }

    #[test]
    fn read_only_and_write_only_channels() {
        let class = ClassBuilder::new("Gauge").build();
        declare_state(&class, "level", "level$", ChannelOptions::default().with_default(1).read_only())
            .unwrap();
        declare_state(&class, "input", "input$", ChannelOptions::default().write_only()).unwrap();
        let gauge = Instance::new(&class);

        assert!(matches!(gauge.set("level", 2), Err(BindError::ReadOnlyProperty { .. })));
        assert!(matches!(gauge.get("input"), Err(BindError::WriteOnlyProperty { .. })));
        gauge.set("input", "typed").unwrap();
        assert_eq!(gauge.live_stream("input$").unwrap().current(), Some(json!("typed")));
    }

    #[test]
    fn event_facade_fans_out_to_every_stream() {
        let class = ClassBuilder::new("Button").build();
        declare_event(&class, "click", "clicks$", ChannelOptions::default()).unwrap();
        declare_event(&class, "click", "audit$", ChannelOptions::default()).unwrap();
        let button = Instance::new(&class);

        let (clicks, sink) = recorder();
        button.stream("clicks$").unwrap().subscribe(sink);
        let (audit, sink) = recorder();
        button.stream("audit$").unwrap().subscribe(sink);

        button.call("click", json!({ "x": 1 })).unwrap();
        assert_eq!(*clicks.lock(), vec![json!({ "x": 1 })]);
        assert_eq!(*audit.lock(), vec![json!({ "x": 1 })]);
    }

    #[test]
    fn allow_existing_runs_method_before_emitting() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&order);
        let class = ClassBuilder::new("Form")
            .method("submit", move |_, arg| {
                log.lock().push(format!("method {arg}"));
                json!("ok")
            })
            .build();
        declare_event(&class, "submit", "submits$", ChannelOptions::default().allow_existing()).unwrap();
        let form = Instance::new(&class);

        let log = Arc::clone(&order);
        form.stream("submits$")
            .unwrap()
            .subscribe(move |value: &Value| log.lock().push(format!("stream {value}")));

        assert_eq!(form.call("submit", 7).unwrap(), json!("ok"));
        assert_eq!(*order.lock(), vec!["method 7".to_string(), "stream 7".to_string()]);
    }

    #[test]
    fn plain_methods_receive_the_instance() {
        let class = ClassBuilder::new("Doubler")
            .field(FieldSpec::data("factor", 2))
            .method("apply", |this, arg| {
                let factor = this.get("factor").unwrap_or_default().as_i64().unwrap_or(1);
                json!(arg.as_i64().unwrap_or(0) * factor)
            })
            .build();
        let doubler = Instance::new(&class);

        assert_eq!(doubler.call("apply", 21).unwrap(), json!(42));
        assert!(matches!(doubler.call("nope", 0), Err(BindError::UnknownProperty { .. })));
    }

    #[test]
    fn non_configurable_field_stays_raw() {
        let class = ClassBuilder::new("Pinned")
            .field(FieldSpec::data("fixed", 1).non_configurable())
            .build();
        declare_state(&class, "fixed", "fixed$", ChannelOptions::default()).unwrap();
        let pinned = Instance::new(&class);

        assert!(!pinned.is_reactive("fixed"));
        assert!(pinned.live_stream("fixed$").is_some());
        pinned.set("fixed", 2).unwrap();
        assert_eq!(pinned.live_stream("fixed$").unwrap().current(), Some(json!(1)));
    }

    #[test]
    fn proxies_resolve_against_root_channel() {
        let class = ClassBuilder::new("Settings").build();
        declare_state(
            &class,
            "config",
            "config$",
            ChannelOptions::default().with_default(json!({ "theme": { "dark": false }, "size": 12 })),
        )
        .unwrap();
        declare_state(&class, "dark", "dark$", ChannelOptions::default().proxy(ProxyMode::Alias("config.theme.dark".into())))
            .unwrap();
        declare_state(&class, "size", "size$", ChannelOptions::default().proxy(ProxyMode::From("config.size".into())))
            .unwrap();
        let settings = Instance::new(&class);

        assert_eq!(settings.get("dark").unwrap(), json!(false));
        settings.set("dark", true).unwrap();
        assert_eq!(settings.get("config").unwrap(), json!({ "theme": { "dark": true }, "size": 12 }));

        assert_eq!(settings.get("size").unwrap(), json!(12));
        assert!(matches!(settings.set("size", 14), Err(BindError::ReadOnlyProperty { .. })));
    }

    #[test]
    fn unresolvable_proxy_is_skipped() {
        let class = ClassBuilder::new("Broken").build();
        declare_state(&class, "ghost", "ghost$", ChannelOptions::default().proxy(ProxyMode::From("nowhere.x".into())))
            .unwrap();
        let broken = Instance::new(&class);

        assert!(broken.live_stream("ghost$").is_none());
        assert!(matches!(broken.stream("ghost$"), Err(BindError::InvalidProxyPath { .. })));
    }

    #[test]
    fn destroy_hook_emits_then_closes_managed_streams() {
        let class = ClassBuilder::new("Panel").build();
        declare_event(&class, "on_destroy", "destroy$", ChannelOptions::default()).unwrap();
        declare_state(&class, "open", "open$", ChannelOptions::default().with_default(true)).unwrap();
        let panel = Instance::new(&class);

        let destroyed = Arc::new(AtomicUsize::new(0));
        let d = Arc::clone(&destroyed);
        panel.stream("destroy$").unwrap().subscribe(move |_: &Value| {
            d.fetch_add(1, Ordering::SeqCst);
        });
        let open = panel.stream("open$").unwrap().subscribe(|_: &Value| {});

        panel.hook(LifecycleHook::OnDestroy).unwrap();
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
        assert!(panel.is_destroyed());
        assert!(open.is_closed());
        assert!(panel.stream("open$").unwrap().subscribe(|_: &Value| {}).is_closed());
    }

    #[test]
    fn unmanaged_streams_survive_destroy() {
        let class = ClassBuilder::new("Feed").build();
        declare_state(&class, "items", "items$", ChannelOptions::default().with_default(json!([])).unmanaged())
            .unwrap();
        let feed = Instance::new(&class);

        let subscription = feed.stream("items$").unwrap().subscribe(|_: &Value| {});
        feed.hook(LifecycleHook::OnDestroy).unwrap();
        assert!(!subscription.is_closed());
    }

    #[test]
    fn streams_stay_closed_after_destroyed_instance_drops() {
        let class = ClassBuilder::new("Gauge").build();
        declare_state(&class, "level", "level$", ChannelOptions::default().with_default(0)).unwrap();
        let gauge = Instance::new(&class);
        let level = gauge.stream("level$").unwrap();
        let live = gauge.live_stream("level$").unwrap();
        let id = gauge.id();
        let handle = gauge.lifecycle();

        gauge.hook(LifecycleHook::OnDestroy).unwrap();
        drop(gauge);

        let (seen, sink) = recorder();
        let late = level.subscribe(sink);
        live.push(json!(1));

        assert!(late.is_closed());
        assert!(seen.lock().is_empty());
        assert!(handle.is_destroyed());
        assert!(crate::binding::is_destroyed(&id));
    }

    struct Counting(AtomicUsize);

    impl ChangeDetector for Counting {
        fn mark_for_check(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn auto_push_requires_detector() {
        let class = ClassBuilder::new("Plain").build();
        let plain = Instance::new(&class);
        assert_eq!(
            plain.enable_auto_push(),
            Err(BindError::MissingDependency { name: "ChangeDetector" })
        );
    }

    #[test]
    fn auto_push_marks_on_writable_changes() {
        let class = ClassBuilder::new("Live").field(FieldSpec::data("note", "")).build();
        declare_state(&class, "count", "count$", ChannelOptions::default().with_default(0)).unwrap();
        declare_state(&class, "fixed", "fixed$", ChannelOptions::default().with_default(0).read_only())
            .unwrap();
        let detector = Arc::new(Counting(AtomicUsize::new(0)));
        let live = Instance::builder(&class).detector(detector.clone()).build();

        live.set("count", 1).unwrap();
        assert_eq!(detector.0.load(Ordering::SeqCst), 0);

        live.enable_auto_push().unwrap();
        live.enable_auto_push().unwrap();
        assert_eq!(detector.0.load(Ordering::SeqCst), 0);

        live.set("count", 2).unwrap();
        live.set("note", "hi").unwrap();
        assert_eq!(detector.0.load(Ordering::SeqCst), 2);

        live.hook(LifecycleHook::OnDestroy).unwrap();
        live.set("count", 3).unwrap();
        assert_eq!(detector.0.load(Ordering::SeqCst), 2);
    }
}
