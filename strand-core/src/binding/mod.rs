//! Instances and their wiring to channel streams.
//!
//! - [`Instance`]: the runtime object, with its property table and facades
//! - bootstrap: construction and fields-initialized wiring
//! - [`LiveStream`]: the stream behind each bound property, including proxies
//! - [`Managed`]: subscriptions that end when their owner is destroyed
//! - [`LifecycleHook`] / [`Lifecycle`]: the host-driven lifecycle
//! - [`ChangeDetector`]: opt-in change notification

mod auto_push;
mod bootstrap;
mod instance;
mod lifecycle;
mod live;
mod managed;

pub use auto_push::ChangeDetector;
pub use instance::{Instance, InstanceBuilder};
pub use lifecycle::{declare_hook, is_destroyed, Lifecycle, LifecycleHandle, LifecycleHook};
pub use live::{read_path, write_path, LiveStream, ProxyAccess, ProxyStream};
pub use managed::Managed;
