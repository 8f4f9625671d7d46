//! Strand Core
//!
//! This crate binds the properties and lifecycle of component objects to
//! reactive streams. It implements:
//!
//! - Push-stream primitives (subjects, replay subjects, deferred values)
//! - Per-class channel metadata with inheritance merging
//! - Instance bootstrap that rewires declared properties to live streams
//! - Subscriptions that end automatically when their instance is destroyed
//! - A deferred component-state snapshot with typed access and two-way sync
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `stream`: Synchronous push streams, subscriptions and combinators
//! - `metadata`: The global metadata store, class tokens and channel registries
//! - `binding`: Instances, bootstrap, managed subscriptions and auto-push
//! - `state`: `ComponentState` and `ComponentStateRef`
//!
//! Channel values are dynamically typed [`Value`]s. Everything is
//! synchronous; `ComponentStateRef::resolved` is the only async entry point.
//!
//! # Example
//!
//! ```rust
//! use strand_core::binding::{Instance, LifecycleHook};
//! use strand_core::metadata::{declare_event, declare_state, ChannelOptions, ClassBuilder};
//! use strand_core::stream::Observable;
//!
//! let class = ClassBuilder::new("Counter").build();
//! declare_state(&class, "count", "count$", ChannelOptions::default().with_default(0)).unwrap();
//! declare_event(&class, "on_destroy", "destroy$", ChannelOptions::default()).unwrap();
//!
//! let counter = Instance::new(&class);
//! let count = counter.stream("count$").unwrap();
//! let subscription = count.subscribe(|value| println!("count = {value}"));
//!
//! // Prints "count = 1"
//! counter.set("count", 1).unwrap();
//!
//! counter.hook(LifecycleHook::OnDestroy).unwrap();
//! assert!(subscription.is_closed());
//! ```

pub mod binding;
pub mod error;
pub mod metadata;
pub mod state;
pub mod stream;

/// Dynamically typed channel value.
pub type Value = serde_json::Value;

pub use binding::{ChangeDetector, Instance, LifecycleHook, Managed};
pub use error::{BindError, ChannelAccess, Result};
pub use metadata::{declare_event, declare_state, ChannelOptions, ClassBuilder, ClassToken, FieldSpec, ProxyMode};
pub use state::{ComponentState, ComponentStateRef};
pub use stream::{Deferred, Observable, ReplaySubject, Stream, Subject, Subscription};
