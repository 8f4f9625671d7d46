//! Channel Registry
//!
//! Records, per class, which channels exist and how each is bound to an
//! instance property. There are two parallel registries with the same
//! shape:
//!
//! - [`EVENTS`]: channels fired by calling a trigger method (lifecycle hooks
//!   or arbitrary named triggers). Live streams are plain subjects.
//! - [`STATES`]: channels modelling a present-tense value with a default.
//!   Live streams are replay subjects and the facade is a property accessor.
//!
//! # Maps and inheritance
//!
//! Each class owns one [`ClassMetadataMap`] per registry, stored in the
//! metadata store. A map goes from channel name to the list of descriptors
//! bound under that name: one trigger may fan out to several backing
//! properties.
//!
//! [`ChannelRegistry::merge_inherited`] copies ancestor descriptors into a
//! class's own map. Ancestor entries only fill gaps: a descriptor the class
//! declared itself (same channel and backing property) is never replaced,
//! while copies inherited by an earlier merge are refreshed. Merging is
//! idempotent and never touches an ancestor's map.
//! [`ChannelRegistry::resolve_merged`] memoizes the merge per class against
//! a global declaration generation, so repeated resolution is cheap until
//! something new is declared.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::Serialize;

use super::class::{ClassToken, FacadeKind};
use super::store::{MetadataKey, MetadataStore, TargetId};
use crate::error::{BindError, Result};
use crate::Value;

/// Bumped on every declaration; merge memos compare against it.
static DECLARATION_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Which registry a channel belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Event,
    State,
}

/// Whether a channel owns its stream or derives it from another property.
///
/// Paths are dotted: the first segment names a state channel of the same
/// instance, the remaining segments index into its JSON value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "mode", content = "path", rename_all = "lowercase")]
pub enum ProxyMode {
    /// The channel owns its stream.
    #[default]
    None,
    /// Read-only view of the path.
    From(String),
    /// Read/write view of the path; writes update the root value.
    Alias(String),
    /// Own stream that also receives every value of the path.
    Merge(String),
}

impl ProxyMode {
    /// Dotted path of a proxy, `None` for a plain channel.
    pub fn path(&self) -> Option<&str> {
        match self {
            ProxyMode::None => None,
            ProxyMode::From(path) | ProxyMode::Alias(path) | ProxyMode::Merge(path) => {
                Some(path.as_str())
            }
        }
    }

    /// Whether this is a proxy mode.
    pub fn is_proxy(&self) -> bool {
        !matches!(self, ProxyMode::None)
    }
}

/// Declaration-time options of a channel.
#[derive(Debug, Clone, Default)]
pub struct ChannelOptions {
    pub default: Option<Value>,
    pub read_only: bool,
    pub write_only: bool,
    pub proxy: ProxyMode,
    /// Subscriptions to this channel are not tied to the destroyed signal.
    pub unmanaged: bool,
    /// Allow the channel name to shadow a hand-written method. The facade
    /// then calls the method before emitting.
    pub allow_existing: bool,
}

impl ChannelOptions {
    /// Seed value used when the backing field is unset.
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Disallow writes through the property.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Disallow reads through the property.
    pub fn write_only(mut self) -> Self {
        self.write_only = true;
        self
    }

    /// Derive the channel from another channel's path.
    pub fn proxy(mut self, proxy: ProxyMode) -> Self {
        self.proxy = proxy;
        self
    }

    /// Hand out the raw stream instead of a managed one.
    pub fn unmanaged(mut self) -> Self {
        self.unmanaged = true;
        self
    }

    /// Skip the conflict check against a hand-written member.
    pub fn allow_existing(mut self) -> Self {
        self.allow_existing = true;
        self
    }
}

/// Static description of one channel binding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelDescriptor {
    pub channel: String,
    /// Instance property holding the live stream.
    pub property: String,
    pub kind: ChannelKind,
    pub default: Option<Value>,
    pub read_only: bool,
    pub write_only: bool,
    pub proxy: ProxyMode,
    pub unmanaged: bool,
    pub allow_existing: bool,
    /// Class whose declaration produced this descriptor.
    #[serde(skip)]
    pub declared_by: TargetId,
}

impl ChannelDescriptor {
    fn new(
        kind: ChannelKind,
        channel: &str,
        property: &str,
        options: ChannelOptions,
        declared_by: TargetId,
    ) -> Self {
        Self {
            channel: channel.to_string(),
            property: property.to_string(),
            kind,
            default: options.default,
            read_only: options.read_only,
            write_only: options.write_only,
            proxy: options.proxy,
            unmanaged: options.unmanaged,
            allow_existing: options.allow_existing,
            declared_by,
        }
    }

    /// Whether the live stream replays its last value.
    pub fn replays(&self) -> bool {
        self.kind == ChannelKind::State
    }
}

/// Channel name to descriptors, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassMetadataMap {
    entries: IndexMap<String, Vec<ChannelDescriptor>>,
}

impl ClassMetadataMap {
    /// Descriptors bound under `channel`.
    pub fn get(&self, channel: &str) -> &[ChannelDescriptor] {
        self.entries.get(channel).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Channel names, in declaration order.
    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Every descriptor of every channel.
    pub fn descriptors(&self) -> impl Iterator<Item = &ChannelDescriptor> {
        self.entries.values().flatten()
    }

    /// The descriptor whose live stream lives at `property`.
    pub fn by_property(&self, property: &str) -> Option<&ChannelDescriptor> {
        self.descriptors().find(|descriptor| descriptor.property == property)
    }

    /// Whether `channel` has any descriptor.
    pub fn contains(&self, channel: &str) -> bool {
        self.entries.contains_key(channel)
    }

    /// Number of channel names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no channel is declared.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// JSON description of the map, for diagnostics.
    pub fn describe(&self) -> Value {
        serde_json::to_value(&self.entries).unwrap_or(Value::Null)
    }

    /// Insert or replace the descriptor for (channel, property).
    fn upsert(&mut self, descriptor: ChannelDescriptor) {
        let slot = self.entries.entry(descriptor.channel.clone()).or_default();
        match slot.iter_mut().find(|existing| existing.property == descriptor.property) {
            Some(existing) => *existing = descriptor,
            None => slot.push(descriptor),
        }
    }

    /// Fill gaps from an ancestor map. Returns how many descriptors changed.
    fn absorb(&mut self, ancestor: &ClassMetadataMap, owner: TargetId) -> usize {
        let mut changed = 0;
        for descriptor in ancestor.descriptors() {
            let slot = self.entries.entry(descriptor.channel.clone()).or_default();
            match slot.iter_mut().find(|existing| existing.property == descriptor.property) {
                Some(existing) if existing.declared_by == owner => {}
                Some(existing) => {
                    if *existing != *descriptor {
                        *existing = descriptor.clone();
                        changed += 1;
                    }
                }
                None => {
                    slot.push(descriptor.clone());
                    changed += 1;
                }
            }
        }
        changed
    }
}

type SharedMap = Arc<RwLock<ClassMetadataMap>>;

/// One of the two channel registries.
pub struct ChannelRegistry {
    kind: ChannelKind,
    map_key: MetadataKey,
    merged_key: MetadataKey,
}

/// Registry of event (trigger) channels.
pub const EVENTS: ChannelRegistry = ChannelRegistry {
    kind: ChannelKind::Event,
    map_key: MetadataKey::new("strand:channels:event"),
    merged_key: MetadataKey::new("strand:channels:event:merged"),
};

/// Registry of state (present-value) channels.
pub const STATES: ChannelRegistry = ChannelRegistry {
    kind: ChannelKind::State,
    map_key: MetadataKey::new("strand:channels:state"),
    merged_key: MetadataKey::new("strand:channels:state:merged"),
};

impl ChannelRegistry {
    /// Event or state.
    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    fn facade_kind(&self) -> FacadeKind {
        match self.kind {
            ChannelKind::Event => FacadeKind::Event,
            ChannelKind::State => FacadeKind::State,
        }
    }

    fn own_map(&self, class: &ClassToken) -> SharedMap {
        MetadataStore::get_own_or_init(self.map_key, class, SharedMap::default)
    }

    /// Register a channel on `class`.
    ///
    /// Fails with [`BindError::DeclarationConflict`] if `channel` names a
    /// hand-written method of `class` (unless `allow_existing` is set) or a
    /// facade of the other registry. The first declaration of a channel name
    /// on a class installs its facade.
    pub fn declare(
        &self,
        class: &ClassToken,
        channel: &str,
        property: &str,
        options: ChannelOptions,
    ) -> Result<()> {
        let conflict = || BindError::DeclarationConflict {
            class: class.name().to_string(),
            channel: channel.to_string(),
        };

        match class.own_facade(channel) {
            Some(kind) if kind != self.facade_kind() => return Err(conflict()),
            Some(_) => {}
            None => {
                if class.own_method(channel).is_some() && !options.allow_existing {
                    return Err(conflict());
                }
            }
        }

        let descriptor = ChannelDescriptor::new(self.kind, channel, property, options, class.id());
        self.own_map(class).write().upsert(descriptor);
        if class.install_facade(channel, self.facade_kind()) {
            tracing::trace!(class = %class.name(), channel, kind = ?self.kind, "facade installed");
        }
        DECLARATION_GENERATION.fetch_add(1, Ordering::SeqCst);

        tracing::debug!(class = %class.name(), channel, property, kind = ?self.kind, "channel declared");
        Ok(())
    }

    /// Copy ancestor descriptors into `class`'s own map, nearest ancestor
    /// winning. Safe to call repeatedly; ancestors' maps are only read.
    pub fn merge_inherited(&self, class: &ClassToken) {
        let Some(parent) = class.parent() else {
            return;
        };

        let inherited = self.merged_view(parent);
        let changed = self.own_map(class).write().absorb(&inherited, class.id());
        if changed > 0 {
            tracing::trace!(class = %class.name(), changed, kind = ?self.kind, "merged inherited channels");
        }
    }

    /// `class`'s own map with every ancestor folded in, computed without
    /// writing to any map.
    fn merged_view(&self, class: &ClassToken) -> ClassMetadataMap {
        let mut view = self.own_map(class).read().clone();
        if let Some(parent) = class.parent() {
            let inherited = self.merged_view(parent);
            view.absorb(&inherited, class.id());
        }
        view
    }

    /// The merged map of `class`, recomputed only after new declarations.
    pub fn resolve_merged(&self, class: &ClassToken) -> ClassMetadataMap {
        let generation = DECLARATION_GENERATION.load(Ordering::SeqCst);
        let merged_at = MetadataStore::get_own::<u64>(self.merged_key, class);
        if merged_at != Some(generation) {
            self.merge_inherited(class);
            MetadataStore::set(self.merged_key, class, generation);
        }
        self.own_map(class).read().clone()
    }

    /// Only the descriptors declared on `class` itself, without merging.
    pub fn own_snapshot(&self, class: &ClassToken) -> ClassMetadataMap {
        self.own_map(class).read().clone()
    }
}

/// Register an event channel. See [`ChannelRegistry::declare`].
pub fn declare_event(
    class: &ClassToken,
    channel: &str,
    property: &str,
    options: ChannelOptions,
) -> Result<()> {
    EVENTS.declare(class, channel, property, options)
}

/// Register a state channel. See [`ChannelRegistry::declare`].
pub fn declare_state(
    class: &ClassToken,
    channel: &str,
    property: &str,
    options: ChannelOptions,
) -> Result<()> {
    STATES.declare(class, channel, property, options)
}
