//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, computeds and
//! effects. These primitives form the foundation of Sprig's fine-grained
//! reactivity.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A [`Signal`] is a container for mutable state. When a signal's value is
//! read within a tracking scope (a computed or effect body), the read is
//! recorded and the scope's owner subscribes to the signal. When the value
//! changes, every subscriber is notified in subscription order.
//!
//! ## Computeds
//!
//! A [`Computed`] is a derived value. Without subscribers it is evaluated on
//! every read; with subscribers it caches, and re-evaluates only when one of
//! its dependencies actually changed.
//!
//! ## Effects
//!
//! [`effect`] runs a side-effecting body now and whenever its dependencies
//! change. [`watch`] is the explicit-source variant: one reactive value, one
//! callback, called immediately and on every change.
//!
//! # Implementation Notes
//!
//! Dependency tracking is automatic. A thread-local [`ScopeStack`] records
//! reads into the innermost frame; when the body returns the owner attaches
//! itself to exactly the sources it read and detaches from the rest.
//!
//! Writes propagate in two phases (mark, then deliver) so that a dependent
//! reached along several paths evaluates once per write and never observes
//! a mix of old and new upstream values.

pub mod binding;
pub mod comparator;
mod computed;
mod effect;
mod runtime;
mod scope;
mod signal;
mod subscriber;

pub use comparator::{default_comparator, set_default_comparator, Comparator};
pub use computed::{Computed, ComputedState};
pub use effect::{effect, on_cleanup, untrack, watch, EffectOutput};
pub use runtime::Runtime;
pub use scope::{ReadSet, ScopeId, ScopeKind, ScopeOutput, ScopeStack, Teardown};
pub use signal::{Reactive, ReactiveKind, Signal};
pub use subscriber::{SourceId, SubscriberId, Unsubscribe};
