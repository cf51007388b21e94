//! Sprig Core
//!
//! This crate provides the core runtime for the Sprig reactive UI framework.
//! It implements:
//!
//! - Reactive primitives (signals, computeds, watches and effects)
//! - Automatic dependency tracking through a per-thread scope stack
//! - Keyed list reconciliation with minimal moves
//!
//! Rendering, templates and host bindings live outside this crate; they
//! plug in through [`reactive::binding`] and [`list::RenderedView`].
//!
//! # Architecture
//!
//! The crate is organized into a few modules:
//!
//! - `reactive`: signals, computeds, effects and the runtime that connects them
//! - `list`: keyed list reconciliation and the reactive `each` helper
//! - `config`: process-wide runtime switches
//!
//! # Example
//!
//! ```rust
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use sprig_core::reactive::{watch, Computed, Signal};
//!
//! // Create a signal
//! let count = Signal::new(0);
//!
//! // Create a derived value
//! let source = count.clone();
//! let doubled = Computed::new(move || source.get() * 2);
//!
//! // Watch it
//! let seen = Rc::new(Cell::new(0));
//! let sink = seen.clone();
//! let stop = watch(&doubled, move |value| sink.set(*value));
//!
//! // Update the signal
//! count.set(5);
//! assert_eq!(seen.get(), 10);
//! stop.unsubscribe();
//! ```

pub mod config;
pub mod list;
pub mod reactive;

mod error;

pub use error::{Error, Result};
