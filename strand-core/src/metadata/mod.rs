//! Class Metadata
//!
//! This module holds everything known about a class before any instance
//! exists:
//!
//! - [`MetadataStore`]: process-wide typed key/value storage attached to
//!   classes and instances, with own and parent-chain lookup.
//! - [`ClassToken`] / [`ClassBuilder`]: explicit class identity, parent link,
//!   hand-written methods and the field schema.
//! - [`ChannelRegistry`]: the event and state channel maps of each class,
//!   with inheritance-aware merging.
//!
//! # Design
//!
//! Class relationships are passed explicitly (`ClassBuilder::extends`) rather
//! than discovered at runtime, and merged registries are memoized per class.
//! Maps are shared read-mostly by every instance of a class; they are written
//! only by declarations and by merges, and merges only ever add or refresh
//! inherited entries.

mod store;
mod class;
mod registry;

pub use store::{MetadataKey, MetadataStore, MetadataTarget, TargetId};
pub use class::{ClassBuilder, ClassToken, FacadeKind, FieldKind, FieldSpec, Getter, Method};
pub use registry::{
    declare_event, declare_state, ChannelDescriptor, ChannelKind, ChannelOptions,
    ChannelRegistry, ClassMetadataMap, ProxyMode, EVENTS, STATES,
};
