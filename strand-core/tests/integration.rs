//! Integration Tests for the Binding Engine
//!
//! These tests drive whole instances through their lifecycle and check that
//! metadata, bootstrap, managed subscriptions and component state agree.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;

use strand_core::binding::{declare_hook, is_destroyed, Instance, Lifecycle, LifecycleHook};
use strand_core::metadata::{
    declare_event, declare_state, ChannelOptions, ClassBuilder, ClassToken, FieldSpec, STATES,
};
use strand_core::stream::{compose, wait_for, Observable, ReplaySubject};
use strand_core::{BindError, ChannelAccess, Value};

fn recorder() -> (Arc<Mutex<Vec<Value>>>, impl Fn(&Value) + Send + Sync + 'static) {
    let values = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&values);
    (values, move |value: &Value| sink.lock().push(value.clone()))
}

/// `Foo` with a writable `count` and a getter-backed `label`.
fn foo_class() -> ClassToken {
    let class = ClassBuilder::new("Foo")
        .field(FieldSpec::getter("label", |_| json!("x")))
        .component_state()
        .build();
    declare_state(&class, "count", "count$", ChannelOptions::default().with_default(0)).unwrap();
    declare_hook(&class, LifecycleHook::OnInit, "init$").unwrap();
    declare_hook(&class, LifecycleHook::OnDestroy, "destroy$").unwrap();
    class
}

/// Component state replays the latest values and rejects writes to getters.
#[test]
fn foo_component_state_scenario() {
    let foo = Instance::new(&foo_class());
    foo.hook(LifecycleHook::OnInit).unwrap();
    let state = foo.state_ref();

    let (counts, sink) = recorder();
    let first = state.get("count").unwrap().subscribe(sink);
    assert_eq!(*counts.lock(), vec![json!(0)]);
    first.unsubscribe();

    state.set("count", 5).unwrap();
    let (counts, sink) = recorder();
    state.get("count").unwrap().subscribe(sink);
    assert_eq!(*counts.lock(), vec![json!(5)]);

    let (labels, sink) = recorder();
    state.get("label").unwrap().subscribe(sink);
    assert_eq!(*labels.lock(), vec![json!("x")]);

    let err = state.set("label", "y").unwrap_err();
    assert_eq!(
        err,
        BindError::UnknownChannel { name: "label".into(), access: ChannelAccess::Write }
    );
}

/// Writing a bound property reaches its stream, and reads see the last write.
#[test]
fn writable_property_round_trip() {
    let foo = Instance::new(&foo_class());
    let (seen, sink) = recorder();
    foo.stream("count$").unwrap().subscribe(sink);

    for n in 1..=3 {
        foo.set("count", n).unwrap();
        assert_eq!(foo.get("count").unwrap(), json!(n));
    }
    assert_eq!(*seen.lock(), vec![json!(0), json!(1), json!(2), json!(3)]);
}

/// Sibling instances own separate streams and separate lifetimes.
#[test]
fn sibling_instances_are_isolated() {
    let class = foo_class();
    let first = Instance::new(&class);
    let second = Instance::new(&class);

    let a = first.live_stream("count$").unwrap();
    let b = second.live_stream("count$").unwrap();
    assert!(!a.same_stream(&b));

    let sub_first = first.stream("count$").unwrap().subscribe(|_: &Value| {});
    let sub_second = second.stream("count$").unwrap().subscribe(|_: &Value| {});

    first.hook(LifecycleHook::OnDestroy).unwrap();
    assert!(sub_first.is_closed());
    assert!(!sub_second.is_closed());

    second.set("count", 9).unwrap();
    assert_eq!(first.get("count").unwrap(), json!(0));
}

/// Destroy closes managed subscriptions once and refuses new ones.
#[test]
fn destroy_semantics() {
    let foo = Instance::new(&foo_class());
    let destroy_events = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&destroy_events);
    foo.stream("destroy$").unwrap().subscribe(move |_: &Value| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let open = foo.stream("count$").unwrap().subscribe(|_: &Value| {});

    foo.hook(LifecycleHook::OnDestroy).unwrap();
    assert!(foo.is_destroyed());
    assert!(open.is_closed());
    assert_eq!(destroy_events.load(Ordering::SeqCst), 1);

    let late = foo.stream("count$").unwrap().subscribe(|_: &Value| {});
    assert!(late.is_closed());

    // A second destroy emits nothing to closed subscribers and stays destroyed.
    foo.hook(LifecycleHook::OnDestroy).unwrap();
    assert_eq!(destroy_events.load(Ordering::SeqCst), 1);
    assert!(foo.is_destroyed());
}

/// A handed-out stream stays inert once its instance is destroyed and gone.
#[test]
fn destroyed_and_dropped_instance_stays_destroyed() {
    let foo = Instance::new(&foo_class());
    let count = foo.stream("count$").unwrap();
    let live = foo.live_stream("count$").unwrap();
    let id = foo.id();

    foo.hook(LifecycleHook::OnDestroy).unwrap();
    drop(foo);

    let (seen, sink) = recorder();
    let late = count.subscribe(sink);
    live.push(json!(1));
    assert!(late.is_closed());
    assert!(seen.lock().is_empty());
    assert!(is_destroyed(&id));
}

/// Asking for streams repeatedly does not pile up destroy watchers.
#[test]
fn repeated_stream_requests_do_not_accumulate() {
    let foo = Instance::new(&foo_class());
    let destroyed = foo.lifecycle().destroyed();
    let baseline = destroyed.observer_count();

    for _ in 0..100 {
        foo.stream("count$").unwrap();
    }
    assert_eq!(destroyed.observer_count(), baseline);

    let open = foo.stream("count$").unwrap().subscribe(|_: &Value| {});
    assert_eq!(destroyed.observer_count(), baseline + 1);
    open.unsubscribe();
    assert_eq!(destroyed.observer_count(), baseline);
}

/// Subclass declarations win over inherited ones and merging is idempotent.
#[test]
fn inheritance_merge() {
    let base = ClassBuilder::new("Base").build();
    declare_state(&base, "size", "size$", ChannelOptions::default().with_default(1)).unwrap();
    declare_state(&base, "color", "color$", ChannelOptions::default().with_default("red")).unwrap();

    let derived = ClassBuilder::new("Derived").extends(&base).build();
    declare_state(&derived, "size", "size$", ChannelOptions::default().with_default(2)).unwrap();
    declare_state(&derived, "weight", "weight$", ChannelOptions::default()).unwrap();

    STATES.merge_inherited(&derived);
    STATES.merge_inherited(&derived);
    let merged = STATES.resolve_merged(&derived);
    let channels: Vec<&str> = merged.channels().collect();
    assert_eq!(channels, vec!["size", "weight", "color"]);
    assert_eq!(merged.get("size").len(), 1);
    assert_eq!(merged.get("size")[0].default, Some(json!(2)));

    let instance = Instance::new(&derived);
    assert_eq!(instance.get("size").unwrap(), json!(2));
    assert_eq!(instance.get("color").unwrap(), json!("red"));

    let base_instance = Instance::new(&base);
    assert_eq!(base_instance.get("size").unwrap(), json!(1));
}

/// Declaring a channel over a hand-written method fails unless allowed.
#[test]
fn declaration_conflicts() {
    let class = ClassBuilder::new("Conflicted")
        .method("refresh", |_, _| Value::Null)
        .build();

    let err = declare_event(&class, "refresh", "refresh$", ChannelOptions::default()).unwrap_err();
    assert!(matches!(err, BindError::DeclarationConflict { .. }));
    declare_event(&class, "refresh", "refresh$", ChannelOptions::default().allow_existing()).unwrap();

    declare_state(&class, "mode", "mode$", ChannelOptions::default()).unwrap();
    let err = declare_event(&class, "mode", "mode_events$", ChannelOptions::default()).unwrap_err();
    assert!(matches!(err, BindError::DeclarationConflict { .. }));
}

/// `sync` mirrors two channels without feedback.
#[test]
fn sync_has_no_feedback_loop() {
    let class = ClassBuilder::new("Mirror")
        .field(FieldSpec::data("left", "a"))
        .field(FieldSpec::data("right", "b"))
        .component_state()
        .build();
    let mirror = Instance::new(&class);
    let state = mirror.state_ref();

    // Linked before resolution: takes effect once on_init runs.
    state.sync("left", "right").unwrap();
    mirror.hook(LifecycleHook::OnInit).unwrap();
    assert_eq!(mirror.get("right").unwrap(), json!("a"));

    let (rights, sink) = recorder();
    state.get("right").unwrap().subscribe(sink);
    mirror.set("left", "c").unwrap();
    mirror.set("right", "d").unwrap();

    assert_eq!(mirror.get("left").unwrap(), json!("d"));
    assert_eq!(*rights.lock(), vec![json!("a"), json!("c"), json!("d")]);
}

/// `get`, `get_all` and `set` wait for resolution; unknown names fail early.
#[test]
fn state_ref_before_and_after_resolution() {
    let foo = Instance::new(&foo_class());
    let state = foo.state_ref();

    assert!(matches!(state.get("nope"), Err(BindError::UnknownChannel { .. })));
    assert!(state.get_all(&["count", "nope"]).is_err());

    let streams = state.get_all(&["count", "label"]).unwrap();
    let (seen, sink) = recorder();
    let combined = compose(streams);
    combined.subscribe(move |values: &Vec<Value>| sink(&Value::Array(values.clone())));

    let pending = state.set("count", 2).unwrap();
    assert!(seen.lock().is_empty());
    assert!(!pending.is_resolved());

    foo.hook(LifecycleHook::OnInit).unwrap();
    assert!(pending.is_resolved());
    assert_eq!(seen.lock().first(), Some(&json!([0, "x"])));
    assert_eq!(state.current("count").unwrap(), Some(json!(2)));
}

/// A state ref that never resolves stays silent.
#[test]
fn unresolved_state_ref_is_silent() {
    let class = ClassBuilder::new("Plain").field(FieldSpec::data("n", 1)).build();
    declare_state(&class, "m", "m$", ChannelOptions::default()).unwrap();
    let plain = Instance::new(&class);
    let state = plain.state_ref();

    let (seen, sink) = recorder();
    state.get("m").unwrap().subscribe(sink);
    plain.hook(LifecycleHook::OnInit).unwrap();
    plain.set("m", 3).unwrap();

    assert!(!state.is_resolved());
    assert!(seen.lock().is_empty());
}

/// Lifecycle channels gate other streams.
#[test]
fn wait_for_init_gates_values() {
    let foo = Instance::new(&foo_class());
    let (seen, sink) = recorder();
    wait_for(foo.stream("init$").unwrap(), foo.stream("count$").unwrap()).subscribe(sink);

    foo.set("count", 4).unwrap();
    assert!(seen.lock().is_empty());

    foo.hook(LifecycleHook::OnInit).unwrap();
    foo.set("count", 6).unwrap();
    assert_eq!(*seen.lock(), vec![json!(4), json!(6)]);
}

/// External subjects can drive and follow a channel.
#[test]
fn sync_with_external_store() {
    let foo = Instance::new(&foo_class());
    foo.hook(LifecycleHook::OnInit).unwrap();
    let store = ReplaySubject::new(json!(0));

    foo.state_ref().sync_with("count", store.clone()).unwrap();
    store.next(json!(12));
    assert_eq!(foo.get("count").unwrap(), json!(12));

    foo.set("count", 13).unwrap();
    assert_eq!(store.value(), Some(json!(13)));

    foo.hook(LifecycleHook::OnDestroy).unwrap();
    store.next(json!(14));
    assert_eq!(foo.get("count").unwrap(), json!(13));
}
