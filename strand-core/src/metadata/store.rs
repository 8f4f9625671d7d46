//! Metadata Store
//!
//! A process-wide key/value store that attaches typed metadata to targets
//! (classes and instances). It is the shared backbone for the channel
//! registries, the per-class merge memo and the per-instance destroyed flag.
//!
//! # Lookup
//!
//! - `get_own*` only looks at the exact target.
//! - `get*` walks the target's parent chain (instance → class → ancestor
//!   classes). The chain is supplied by the [`MetadataTarget`] itself; the
//!   store never discovers relationships on its own.
//!
//! The `*_or_init` variants memoize: on a miss the default is stored on the
//! exact target that was queried, never on an ancestor. Absent keys never
//! fail; they resolve to `None` or to the supplied default.
//!
//! # Storage
//!
//! Values are stored type-erased as `Arc<dyn Any + Send + Sync>` in a global
//! `DashMap`. Callers store cheap-to-clone handles (`Arc`s, flags, counters)
//! and read them back by type; a stored value of a different type than the
//! one requested is treated as absent.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;

/// Identity of a metadata target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u64);

impl TargetId {
    /// Generate a new unique target ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for TargetId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TargetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Something metadata can be attached to.
pub trait MetadataTarget {
    /// Stable identity of this target.
    fn target_id(&self) -> TargetId;

    /// Next target in the lookup chain, if any.
    fn parent_target(&self) -> Option<&dyn MetadataTarget>;
}

/// A bare ID is a target without parents.
impl MetadataTarget for TargetId {
    fn target_id(&self) -> TargetId {
        *self
    }

    fn parent_target(&self) -> Option<&dyn MetadataTarget> {
        None
    }
}

/// Name of a metadata slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MetadataKey(&'static str);

impl MetadataKey {
    /// Define a key. Keys compare by name, so each module should use a
    /// distinct prefix.
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// The key's name.
    pub fn name(&self) -> &'static str {
        self.0
    }
}

type Slot = Arc<dyn Any + Send + Sync>;

static STORE: OnceLock<DashMap<(TargetId, MetadataKey), Slot>> = OnceLock::new();

fn get_store() -> &'static DashMap<(TargetId, MetadataKey), Slot> {
    STORE.get_or_init(DashMap::new)
}

/// The global metadata store.
pub struct MetadataStore;

impl MetadataStore {
    /// Store `value` under `key` on exactly `target`.
    pub fn set<V>(key: MetadataKey, target: &dyn MetadataTarget, value: V)
    where
        V: Any + Send + Sync,
    {
        get_store().insert((target.target_id(), key), Arc::new(value));
    }

    /// Look up `key` on `target` only.
    pub fn get_own<V>(key: MetadataKey, target: &dyn MetadataTarget) -> Option<V>
    where
        V: Any + Clone + Send + Sync,
    {
        Self::read_slot(key, target.target_id())
    }

    /// Look up `key` on `target`, installing `default()` on `target` if it
    /// has no value of type `V`.
    pub fn get_own_or_init<V, F>(key: MetadataKey, target: &dyn MetadataTarget, default: F) -> V
    where
        V: Any + Clone + Send + Sync,
        F: FnOnce() -> V,
    {
        let id = target.target_id();
        if let Some(value) = Self::read_slot(key, id) {
            return value;
        }
        Self::install(key, id, default())
    }

    /// Look up `key` on `target`, then on each parent in turn.
    pub fn get<V>(key: MetadataKey, target: &dyn MetadataTarget) -> Option<V>
    where
        V: Any + Clone + Send + Sync,
    {
        let mut current = Some(target);
        while let Some(target) = current {
            if let Some(value) = Self::read_slot(key, target.target_id()) {
                return Some(value);
            }
            current = target.parent_target();
        }
        None
    }

    /// Chain lookup with memoization: on a miss anywhere in the chain,
    /// `default()` is stored on `target` itself.
    pub fn get_or_init<V, F>(key: MetadataKey, target: &dyn MetadataTarget, default: F) -> V
    where
        V: Any + Clone + Send + Sync,
        F: FnOnce() -> V,
    {
        if let Some(value) = Self::get(key, target) {
            return value;
        }
        Self::install(key, target.target_id(), default())
    }

    /// Whether `target` itself carries `key`.
    pub fn has_own(key: MetadataKey, target: &dyn MetadataTarget) -> bool {
        get_store().contains_key(&(target.target_id(), key))
    }

    /// Remove `key` from `target`.
    pub fn remove(key: MetadataKey, target: &dyn MetadataTarget) {
        get_store().remove(&(target.target_id(), key));
    }

    /// Remove every key attached to `target`.
    pub fn clear_target(target: TargetId) {
        get_store().retain(|(id, _), _| *id != target);
    }

    fn read_slot<V>(key: MetadataKey, id: TargetId) -> Option<V>
    where
        V: Any + Clone + Send + Sync,
    {
        let slot = get_store().get(&(id, key)).map(|entry| Arc::clone(entry.value()))?;
        slot.downcast_ref::<V>().cloned()
    }

    // The default is computed by the caller before the shard lock is taken,
    // so building it may itself use the store.
    fn install<V>(key: MetadataKey, id: TargetId, value: V) -> V
    where
        V: Any + Clone + Send + Sync,
    {
        let slot = {
            let entry = get_store()
                .entry((id, key))
                .or_insert_with(|| Arc::new(value.clone()));
            Arc::clone(entry.value())
        };
        match slot.downcast_ref::<V>() {
            Some(existing) => existing.clone(),
            None => {
                get_store().insert((id, key), Arc::new(value.clone()));
                value
            }
        }
    }
}
