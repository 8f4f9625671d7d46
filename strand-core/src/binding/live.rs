//! Live streams behind channel properties.
//!
//! Every bound property of an instance owns exactly one [`LiveStream`]:
//!
//! - event channels get a plain [`Subject`],
//! - state channels get a [`ReplaySubject`] seeded with their initial value,
//! - proxy channels derive from another state channel through a dotted path.
//!
//! Proxies address a nested member of a root value (`"config.theme.dark"` is
//! the `theme.dark` member of the `config` channel). Objects are walked by
//! key and arrays by numeric index.

use std::sync::Arc;

use serde_json::Map;

use crate::metadata::ProxyMode;
use crate::stream::{Observable, ReplaySubject, Stream, Subject, Subscription};
use crate::Value;

/// Split `root.a.b` into the root name and the remaining segments.
pub(crate) fn split_path(path: &str) -> (&str, Vec<String>) {
    let mut segments = path.split('.');
    let root = segments.next().unwrap_or_default();
    (root, segments.map(str::to_string).collect())
}

/// The member of `value` at `path`, or `Null` if any segment is missing.
pub fn read_path(value: &Value, path: &[String]) -> Value {
    let mut current = value;
    for segment in path {
        let next = match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        match next {
            Some(next) => current = next,
            None => return Value::Null,
        }
    }
    current.clone()
}

/// Replace the member of `root` at `path` with `value`, creating objects for
/// missing or non-container intermediate segments.
pub fn write_path(root: &mut Value, path: &[String], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        *root = value;
        return;
    };

    let mut current = root;
    for segment in parents {
        current = child_mut(current, segment);
    }
    *child_mut(current, last) = value;
}

fn child_mut<'a>(value: &'a mut Value, segment: &str) -> &'a mut Value {
    let index = match &*value {
        Value::Array(items) => segment.parse::<usize>().ok().filter(|index| *index < items.len()),
        _ => None,
    };
    match (value, index) {
        (Value::Array(items), Some(index)) => &mut items[index],
        (value, _) => {
            if !value.is_object() {
                *value = Value::Object(Map::new());
            }
            match value {
                Value::Object(map) => map.entry(segment.to_string()).or_insert(Value::Null),
                other => other,
            }
        }
    }
}

/// How a proxy stream treats writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyAccess {
    /// Derived and read-only.
    From,
    /// Writes go into the root at the proxied path.
    Alias,
    /// Own stream seeded and fed by the root; writes stay local.
    Merge,
}

/// A state channel derived from a path inside another state channel.
#[derive(Clone)]
pub struct ProxyStream {
    access: ProxyAccess,
    root: ReplaySubject<Value>,
    path: Arc<[String]>,
    local: Option<ReplaySubject<Value>>,
}

impl ProxyStream {
    /// Build the proxy described by `mode` over `root`.
    ///
    /// Merge proxies also return the subscription feeding them from the root;
    /// the caller owns its teardown.
    pub(crate) fn new(
        mode: &ProxyMode,
        root: ReplaySubject<Value>,
        path: Vec<String>,
    ) -> Option<(Self, Option<Subscription>)> {
        let access = match mode {
            ProxyMode::None => return None,
            ProxyMode::From(_) => ProxyAccess::From,
            ProxyMode::Alias(_) => ProxyAccess::Alias,
            ProxyMode::Merge(_) => ProxyAccess::Merge,
        };
        let path: Arc<[String]> = path.into();

        if access != ProxyAccess::Merge {
            let proxy = Self { access, root, path, local: None };
            return Some((proxy, None));
        }

        let seed = root.value().map(|value| read_path(&value, &path)).unwrap_or(Value::Null);
        let local = ReplaySubject::new(seed);
        let target = local.clone();
        let feed_path = Arc::clone(&path);
        let feed = root.subscribe(move |value: &Value| {
            let projected = read_path(value, &feed_path);
            if target.value().as_ref() != Some(&projected) {
                target.next(projected);
            }
        });

        let proxy = Self { access, root, path, local: Some(local) };
        Some((proxy, Some(feed)))
    }

    /// Read/write mode of the proxy.
    pub fn access(&self) -> ProxyAccess {
        self.access
    }

    /// Dotted path below the root channel.
    pub fn path(&self) -> String {
        self.path.join(".")
    }

    fn projected(&self) -> Stream<Value> {
        let path = Arc::clone(&self.path);
        self.root
            .stream()
            .map(move |value: &Value| read_path(value, &path))
            .distinct_until_changed()
    }
}

impl std::fmt::Debug for ProxyStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyStream")
            .field("access", &self.access)
            .field("root", &self.root.id())
            .field("path", &self.path())
            .finish()
    }
}

/// The stream bound to one instance property.
#[derive(Clone, Debug)]
pub enum LiveStream {
    Event(Subject<Value>),
    State(ReplaySubject<Value>),
    Proxy(ProxyStream),
}

impl LiveStream {
    /// Identity of the underlying subject.
    pub fn id(&self) -> u64 {
        match self {
            LiveStream::Event(subject) => subject.id(),
            LiveStream::State(replay) => replay.id(),
            LiveStream::Proxy(proxy) => match &proxy.local {
                Some(local) => local.id(),
                None => proxy.root.id(),
            },
        }
    }

    /// Whether both handles refer to the same live stream.
    pub fn same_stream(&self, other: &LiveStream) -> bool {
        match (self, other) {
            (LiveStream::Event(a), LiveStream::Event(b)) => a.id() == b.id(),
            (LiveStream::State(a), LiveStream::State(b)) => a.id() == b.id(),
            (LiveStream::Proxy(a), LiveStream::Proxy(b)) => {
                a.access == b.access && self.id() == other.id() && a.path == b.path
            }
            _ => false,
        }
    }

    /// Read side of the stream. Everything but event channels replays.
    pub fn stream(&self) -> Stream<Value> {
        match self {
            LiveStream::Event(subject) => subject.stream(),
            LiveStream::State(replay) => replay.stream(),
            LiveStream::Proxy(proxy) => match &proxy.local {
                Some(local) => local.stream(),
                None => proxy.projected(),
            },
        }
    }

    /// Current value, if the stream replays one.
    pub fn current(&self) -> Option<Value> {
        match self {
            LiveStream::Event(_) => None,
            LiveStream::State(replay) => replay.value(),
            LiveStream::Proxy(proxy) => match &proxy.local {
                Some(local) => local.value(),
                None => proxy.root.value().map(|value| read_path(&value, &proxy.path)),
            },
        }
    }

    /// Whether subscribers receive the current value first.
    pub fn replays(&self) -> bool {
        !matches!(self, LiveStream::Event(_))
    }

    /// Whether `push` is accepted.
    pub fn is_writable(&self) -> bool {
        !matches!(self, LiveStream::Proxy(proxy) if proxy.access == ProxyAccess::From)
    }

    /// Push `value` into the stream. Returns `false` for read-only proxies.
    pub fn push(&self, value: Value) -> bool {
        match self {
            LiveStream::Event(subject) => subject.next(value),
            LiveStream::State(replay) => replay.next(value),
            LiveStream::Proxy(proxy) => match proxy.access {
                ProxyAccess::From => return false,
                ProxyAccess::Alias => {
                    let mut root = proxy.root.value().unwrap_or(Value::Null);
                    write_path(&mut root, &proxy.path, value);
                    proxy.root.next(root);
                }
                ProxyAccess::Merge => {
                    if let Some(local) = &proxy.local {
                        local.next(value);
                    }
                }
            },
        }
        true
    }
}
