//! Class tokens and field schemas.
//!
//! A [`ClassToken`] is the runtime identity of a component class. It carries
//! the class's explicit parent (if any), its hand-written methods and the
//! schema of the fields every instance starts with. Tokens are created once
//! through [`ClassBuilder`] and are cheap to clone.
//!
//! Channel declarations are not stored on the token itself; they live in the
//! [`MetadataStore`](super::MetadataStore) keyed by the token's
//! [`TargetId`]. The token only records which member names have a facade
//! installed, so that later declarations can be checked for conflicts.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use super::store::{MetadataTarget, TargetId};
use crate::binding::Instance;
use crate::Value;

/// A hand-written method: receives the instance and the call argument.
pub type Method = Arc<dyn Fn(&Instance, &Value) -> Value + Send + Sync>;

/// A computed, getter-only field.
pub type Getter = Arc<dyn Fn(&Instance) -> Value + Send + Sync>;

/// How a field gets its value.
#[derive(Clone)]
pub enum FieldKind {
    /// Plain stored value, initialised from the default.
    Data(Value),
    /// Accessor with no setter.
    Getter(Getter),
}

/// Declaration of one instance field.
#[derive(Clone)]
pub struct FieldSpec {
    name: String,
    kind: FieldKind,
    writable: bool,
    configurable: bool,
}

impl FieldSpec {
    /// A writable, configurable data field.
    pub fn data(name: impl Into<String>, default: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Data(default.into()),
            writable: true,
            configurable: true,
        }
    }

    /// A getter-only field.
    pub fn getter<F>(name: impl Into<String>, getter: F) -> Self
    where
        F: Fn(&Instance) -> Value + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            kind: FieldKind::Getter(Arc::new(getter)),
            writable: false,
            configurable: true,
        }
    }

    /// Reject writes to this field.
    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    /// Forbid replacing this field with a managed accessor.
    pub fn non_configurable(mut self) -> Self {
        self.configurable = false;
        self
    }

    /// Field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Data or getter.
    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    /// Whether plain writes are accepted.
    pub fn is_writable(&self) -> bool {
        self.writable && matches!(self.kind, FieldKind::Data(_))
    }

    /// Whether the property may be rewired to a stream.
    pub fn is_configurable(&self) -> bool {
        self.configurable
    }
}

impl std::fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.kind {
            FieldKind::Data(value) => format!("data({value})"),
            FieldKind::Getter(_) => "getter".to_string(),
        };
        f.debug_struct("FieldSpec")
            .field("name", &self.name)
            .field("kind", &kind)
            .field("writable", &self.writable)
            .field("configurable", &self.configurable)
            .finish()
    }
}

/// Facade installed for a channel name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacadeKind {
    /// A callable trigger that pushes its argument into event streams.
    Event,
    /// A property accessor backed by a state stream.
    State,
}

struct ClassInner {
    id: TargetId,
    name: String,
    parent: Option<ClassToken>,
    methods: IndexMap<String, Method>,
    fields: IndexMap<String, FieldSpec>,
    component_state: bool,
    facades: RwLock<IndexMap<String, FacadeKind>>,
}

/// Runtime identity of a class.
#[derive(Clone)]
pub struct ClassToken {
    inner: Arc<ClassInner>,
}

impl ClassToken {
    /// Identity used as the metadata key.
    pub fn id(&self) -> TargetId {
        self.inner.id
    }

    /// Class name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Direct superclass, if any.
    pub fn parent(&self) -> Option<&ClassToken> {
        self.inner.parent.as_ref()
    }

    /// This class followed by each ancestor, nearest first.
    pub fn lineage(&self) -> impl Iterator<Item = &ClassToken> {
        std::iter::successors(Some(self), |class| class.parent())
    }

    /// Whether `self` is `other` or derives from it.
    pub fn is_subclass_of(&self, other: &ClassToken) -> bool {
        self.lineage().any(|class| class.ptr_eq(other))
    }

    /// A method defined on this class itself.
    pub fn own_method(&self, name: &str) -> Option<Method> {
        self.inner.methods.get(name).cloned()
    }

    /// A method defined on this class or inherited.
    pub fn method(&self, name: &str) -> Option<Method> {
        self.lineage().find_map(|class| class.own_method(name))
    }

    /// Fields declared on this class itself.
    pub fn own_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.inner.fields.values()
    }

    /// Every field of the class, ancestors' first; a subclass redeclaring a
    /// field replaces the ancestor's definition in place.
    pub fn fields(&self) -> IndexMap<String, FieldSpec> {
        let lineage: Vec<&ClassToken> = self.lineage().collect();
        let mut fields = IndexMap::new();
        for class in lineage.into_iter().rev() {
            for field in class.own_fields() {
                fields.insert(field.name.clone(), field.clone());
            }
        }
        fields
    }

    /// Whether instances expose a component-state snapshot.
    pub fn has_component_state(&self) -> bool {
        self.lineage().any(|class| class.inner.component_state)
    }

    /// Facade installed on this class itself.
    pub fn own_facade(&self, name: &str) -> Option<FacadeKind> {
        self.inner.facades.read().get(name).copied()
    }

    /// Facade installed on this class or inherited.
    pub fn facade(&self, name: &str) -> Option<FacadeKind> {
        self.lineage().find_map(|class| class.own_facade(name))
    }

    /// Names of facades installed on this class itself.
    pub fn own_facades(&self) -> Vec<(String, FacadeKind)> {
        self.inner
            .facades
            .read()
            .iter()
            .map(|(name, kind)| (name.clone(), *kind))
            .collect()
    }

    pub(crate) fn install_facade(&self, name: &str, kind: FacadeKind) -> bool {
        let mut facades = self.inner.facades.write();
        if facades.contains_key(name) {
            return false;
        }
        facades.insert(name.to_string(), kind);
        true
    }

    /// Whether both tokens name the same class.
    pub fn ptr_eq(&self, other: &ClassToken) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl MetadataTarget for ClassToken {
    fn target_id(&self) -> TargetId {
        self.inner.id
    }

    fn parent_target(&self) -> Option<&dyn MetadataTarget> {
        self.parent().map(|parent| parent as &dyn MetadataTarget)
    }
}

impl PartialEq for ClassToken {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ClassToken {}

impl std::fmt::Debug for ClassToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassToken")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("parent", &self.parent().map(|p| p.name().to_string()))
            .finish()
    }
}

/// Describes a class before it is registered.
///
/// # Example
///
/// ```rust
/// use strand_core::metadata::{ClassBuilder, FieldSpec};
///
/// let base = ClassBuilder::new("Base").field(FieldSpec::data("count", 0)).build();
/// let derived = ClassBuilder::new("Derived")
///     .extends(&base)
///     .field(FieldSpec::getter("label", |_| "x".into()))
///     .component_state()
///     .build();
///
/// assert_eq!(derived.fields().len(), 2);
/// assert!(derived.is_subclass_of(&base));
/// ```
pub struct ClassBuilder {
    name: String,
    parent: Option<ClassToken>,
    methods: IndexMap<String, Method>,
    fields: IndexMap<String, FieldSpec>,
    component_state: bool,
}

impl ClassBuilder {
    /// Start a class called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            methods: IndexMap::new(),
            fields: IndexMap::new(),
            component_state: false,
        }
    }

    /// Set the parent class.
    pub fn extends(mut self, parent: &ClassToken) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    /// Add a hand-written method.
    pub fn method<F>(mut self, name: impl Into<String>, method: F) -> Self
    where
        F: Fn(&Instance, &Value) -> Value + Send + Sync + 'static,
    {
        self.methods.insert(name.into(), Arc::new(method));
        self
    }

    /// Add a field to the instance schema.
    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.insert(field.name.clone(), field);
        self
    }

    /// Expose a component-state snapshot for instances of this class.
    pub fn component_state(mut self) -> Self {
        self.component_state = true;
        self
    }

    /// Finish the class and return its token.
    pub fn build(self) -> ClassToken {
        let token = ClassToken {
            inner: Arc::new(ClassInner {
                id: TargetId::new(),
                name: self.name,
                parent: self.parent,
                methods: self.methods,
                fields: self.fields,
                component_state: self.component_state,
                facades: RwLock::new(IndexMap::new()),
            }),
        };
        tracing::debug!(class = %token.name(), id = %token.id(), "class registered");
        token
    }
}
