//! Lifecycle hooks and the destroyed signal.
//!
//! The host framework drives an instance through a fixed sequence of hook
//! calls and eventually destroys it. The binding engine only relies on three
//! facts: an instance was constructed, a hook method was invoked, and the
//! instance was destroyed.
//!
//! Destruction is modelled by a one-shot [`Deferred<()>`] per owner. Anything
//! implementing [`Lifecycle`] can own managed subscriptions; [`Instance`]
//! does, and [`LifecycleHandle`] is a detached token for hosts that want
//! managed subscriptions without a full instance.
//!
//! [`Instance`]: super::Instance

use crate::error::Result;
use crate::metadata::{
    declare_event, ChannelOptions, ClassToken, MetadataKey, MetadataStore, MetadataTarget,
    TargetId,
};
use crate::stream::{Deferred, Observable};

/// Set on an owner once its destroyed signal has fired.
const DESTROYED: MetadataKey = MetadataKey::new("strand:lifecycle:destroyed");

/// Set on an owner once the destroyed-flag watcher is installed.
const DESTROY_WATCHED: MetadataKey = MetadataKey::new("strand:lifecycle:watched");

/// Hook methods the host calls, in lifecycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleHook {
    OnChanges,
    OnInit,
    DoCheck,
    AfterContentInit,
    AfterContentChecked,
    AfterViewInit,
    AfterViewChecked,
    OnDestroy,
}

impl LifecycleHook {
    /// Every hook, in the order the host invokes them.
    pub const ALL: [LifecycleHook; 8] = [
        LifecycleHook::OnChanges,
        LifecycleHook::OnInit,
        LifecycleHook::DoCheck,
        LifecycleHook::AfterContentInit,
        LifecycleHook::AfterContentChecked,
        LifecycleHook::AfterViewInit,
        LifecycleHook::AfterViewChecked,
        LifecycleHook::OnDestroy,
    ];

    /// Name of the trigger method (and event channel) for this hook.
    pub fn method_name(&self) -> &'static str {
        match self {
            LifecycleHook::OnChanges => "on_changes",
            LifecycleHook::OnInit => "on_init",
            LifecycleHook::DoCheck => "do_check",
            LifecycleHook::AfterContentInit => "after_content_init",
            LifecycleHook::AfterContentChecked => "after_content_checked",
            LifecycleHook::AfterViewInit => "after_view_init",
            LifecycleHook::AfterViewChecked => "after_view_checked",
            LifecycleHook::OnDestroy => "on_destroy",
        }
    }

    /// Inverse of [`method_name`](Self::method_name).
    pub fn from_method_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|hook| hook.method_name() == name)
    }
}

/// Bind `property` to the event channel of `hook` on `class`.
pub fn declare_hook(class: &ClassToken, hook: LifecycleHook, property: &str) -> Result<()> {
    declare_event(class, hook.method_name(), property, ChannelOptions::default())
}

/// An owner of managed subscriptions.
pub trait Lifecycle: MetadataTarget + Send + Sync {
    /// The owner's one-shot destroyed signal.
    fn destroyed(&self) -> Deferred<()>;
}

/// Whether `owner`'s destroyed signal has been observed.
pub fn is_destroyed(owner: &dyn MetadataTarget) -> bool {
    MetadataStore::get_own::<bool>(DESTROYED, owner).unwrap_or(false)
}

/// Install, once per owner, the watcher that flips the destroyed flag.
pub(crate) fn watch_destroyed<L>(owner: &L)
where
    L: Lifecycle + ?Sized,
{
    let id = owner.target_id();
    if MetadataStore::has_own(DESTROY_WATCHED, &id) {
        return;
    }
    MetadataStore::set(DESTROY_WATCHED, &id, true);

    owner.destroyed().subscribe(move |_| {
        if !is_destroyed(&id) {
            MetadataStore::set(DESTROYED, &id, true);
            tracing::debug!(owner = %id, "marked destroyed");
        }
    });
}

/// Remove every metadata entry of a departing owner except its destroyed mark.
pub(crate) fn release(id: TargetId) {
    let destroyed = is_destroyed(&id);
    MetadataStore::clear_target(id);
    if destroyed {
        MetadataStore::set(DESTROYED, &id, true);
    }
}

/// A detached lifecycle token: an identity plus a destroyed signal.
#[derive(Clone, Debug)]
pub struct LifecycleHandle {
    id: TargetId,
    destroyed: Deferred<()>,
}

impl LifecycleHandle {
    /// Fresh handle with its own identity.
    pub fn new() -> Self {
        Self::with_id(TargetId::new())
    }

    pub(crate) fn with_id(id: TargetId) -> Self {
        let handle = Self {
            id,
            destroyed: Deferred::new(),
        };
        watch_destroyed(&handle);
        handle
    }

    /// Identity of the owner.
    pub fn id(&self) -> TargetId {
        self.id
    }

    /// Fire the destroyed signal. Returns `false` if it had already fired.
    pub fn destroy(&self) -> bool {
        self.destroyed.resolve(())
    }

    /// Whether the destroyed signal has fired.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.is_resolved()
    }
}

impl Default for LifecycleHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataTarget for LifecycleHandle {
    fn target_id(&self) -> TargetId {
        self.id
    }

    fn parent_target(&self) -> Option<&dyn MetadataTarget> {
        None
    }
}

impl Lifecycle for LifecycleHandle {
    fn destroyed(&self) -> Deferred<()> {
        self.destroyed.clone()
    }
}
