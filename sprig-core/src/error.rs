//! Error types for the reactive core.
//!
//! Only usage errors that would otherwise corrupt runtime state are surfaced
//! as `Err`. Softer misuse (duplicate list keys, an unconfigured binding) is
//! reported through `tracing` warnings when development checks are enabled.

use thiserror::Error;

use crate::reactive::ScopeId;

/// Errors returned by the reactive core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A scope was exited while the scope stack was empty.
    #[error("no dependency scope is active")]
    NoActiveScope,

    /// A scope-dependent hook such as `on_cleanup` was called outside an effect body.
    #[error("`{hook}` must be called from inside an effect body")]
    NoActiveEffect {
        /// Name of the hook that was misused.
        hook: &'static str,
    },

    /// Scopes were exited out of stack order.
    #[error("dependency scope exited out of order: expected {expected:?}, found {found:?}")]
    ScopeMismatch {
        /// The scope the caller tried to exit.
        expected: ScopeId,
        /// The scope actually on top of the stack.
        found: ScopeId,
    },

    /// A computed signal read itself while evaluating.
    #[error("cyclic dependency: computed signal read itself during evaluation")]
    Cycle,

    /// A default comparator was registered twice for the same type.
    #[error("a default comparator for `{type_name}` is already registered")]
    ComparatorAlreadySet {
        /// `std::any::type_name` of the value type.
        type_name: &'static str,
    },

    /// The rendering binding was configured twice on this thread.
    #[error("the reactive binding is already configured")]
    BindingAlreadyConfigured,

    /// The runtime configuration was installed twice.
    #[error("runtime configuration is already initialized")]
    ConfigAlreadySet,
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
