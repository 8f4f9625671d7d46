//! Error Types
//!
//! Every fallible operation in the crate reports a [`BindError`]. The variants
//! fall into three groups:
//!
//! - Declaration errors (`DeclarationConflict`, `InvalidProxyPath`) surface
//!   while a class is being described and are never recovered.
//! - Call-site errors (`UnknownChannel`, `UnknownProperty`, `ReadOnlyProperty`,
//!   `MissingDependency`, `Conversion`) are returned to whoever used the
//!   wrong name or forgot to inject a collaborator.
//! - `AccessorInstall` is produced during bootstrap and is only ever logged;
//!   the affected property stays un-reactive.

use thiserror::Error;

/// Whether a channel lookup wanted to read or to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelAccess {
    Read,
    Write,
}

impl std::fmt::Display for ChannelAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelAccess::Read => f.write_str("readable"),
            ChannelAccess::Write => f.write_str("writable"),
        }
    }
}

/// Errors raised by the binding engine.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BindError {
    /// A channel name collides with a hand-written method on the same class.
    #[error("channel `{channel}` on class `{class}` conflicts with an existing method")]
    DeclarationConflict {
        /// Class that owns the conflicting method.
        class: String,
        /// Channel being declared.
        channel: String,
    },

    /// A component-state channel lookup used a name that is not declared
    /// (or not writable, for write access).
    #[error("no {access} channel named `{name}`")]
    UnknownChannel {
        /// Requested channel name.
        name: String,
        /// Kind of access that was requested.
        access: ChannelAccess,
    },

    /// A property or facade that does not exist on the instance.
    #[error("class `{class}` has no property or method named `{name}`")]
    UnknownProperty {
        /// Class of the instance.
        class: String,
        /// Requested name.
        name: String,
    },

    /// Write to a property that only exposes a getter.
    #[error("property `{name}` is read-only")]
    ReadOnlyProperty {
        /// Property name.
        name: String,
    },

    /// Read of a property declared write-only.
    #[error("property `{name}` is write-only")]
    WriteOnlyProperty {
        /// Property name.
        name: String,
    },

    /// Converting a raw property into a managed accessor failed.
    #[error("cannot install accessor on `{property}`: {reason}")]
    AccessorInstall {
        /// Property name.
        property: String,
        /// Why the install was refused.
        reason: String,
    },

    /// A required injected collaborator is absent.
    #[error("missing dependency: {name}")]
    MissingDependency {
        /// Name of the collaborator.
        name: &'static str,
    },

    /// A proxy channel points at a path whose root has no live stream.
    #[error("proxy path `{path}` for channel `{channel}` does not resolve")]
    InvalidProxyPath {
        /// Channel that declared the proxy.
        channel: String,
        /// Dotted path it proxies.
        path: String,
    },

    /// A typed value could not be converted to or from a channel value.
    #[error("cannot convert value of `{name}`: {message}")]
    Conversion {
        /// Channel name.
        name: String,
        /// serde error text.
        message: String,
    },
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, BindError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_channel_message_names_access() {
        let err = BindError::UnknownChannel {
            name: "label".into(),
            access: ChannelAccess::Write,
        };
        assert_eq!(err.to_string(), "no writable channel named `label`");
    }

    #[test]
    fn conflict_message_names_class_and_channel() {
        let err = BindError::DeclarationConflict {
            class: "Foo".into(),
            channel: "on_init".into(),
        };
        assert!(err.to_string().contains("`on_init`"));
        assert!(err.to_string().contains("`Foo`"));
    }
}
