//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its callback immediately inside an
//!    effect scope to discover its dependencies.
//!
//! 2. When any dependency changes, the effect runs its retained teardowns,
//!    re-runs the callback in a fresh scope, subscribes to the new
//!    dependency set and releases the previous one.
//!
//! 3. Cancelling runs the final teardown and removes every subscription.
//!
//! # Differences from Computed
//!
//! - Computeds return a value; effects do not.
//! - Computeds are lazy (compute on access); effects are eager.
//! - An effect reached through several paths by a single write runs once.
//!
//! # Cleanup
//!
//! The callback may return a [`Teardown`], or register any number with
//! [`on_cleanup`]. Teardowns run before the next run and on cancellation.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use super::runtime::Runtime;
use super::scope::{ReadSet, ScopeKind, Teardown};
use super::signal::Reactive;
use super::subscriber::{release_all, Dependency, Observer, Unsubscribe};
use crate::error::Result;

/// Re-runs allowed when an effect keeps invalidating its own dependencies.
const MAX_SELF_RERUNS: usize = 100;

/// What an effect callback may return.
pub trait EffectOutput {
    /// Convert into an optional teardown.
    fn into_teardown(self) -> Option<Teardown>;
}

impl EffectOutput for () {
    fn into_teardown(self) -> Option<Teardown> {
        None
    }
}

impl EffectOutput for Teardown {
    fn into_teardown(self) -> Option<Teardown> {
        Some(self)
    }
}

impl EffectOutput for Option<Teardown> {
    fn into_teardown(self) -> Option<Teardown> {
        self
    }
}

struct EffectInner {
    this: Weak<EffectInner>,
    callback: Box<dyn Fn() -> Option<Teardown>>,
    teardowns: RefCell<Vec<Teardown>>,
    sources: RefCell<Vec<Dependency>>,
    stale: Cell<bool>,
    running: Cell<bool>,
    disposed: Cell<bool>,
    runs: Cell<usize>,
}

impl EffectInner {
    fn run(&self) {
        let mut reruns = 0;
        loop {
            self.run_once();
            if self.disposed.get() || !self.stale.get() {
                break;
            }
            reruns += 1;
            if reruns > MAX_SELF_RERUNS {
                tracing::warn!(
                    reruns,
                    "effect keeps invalidating its own dependencies; giving up"
                );
                self.stale.set(false);
                break;
            }
        }
    }

    fn run_once(&self) {
        self.stale.set(false);
        self.run_teardowns();

        let _running = RunningGuard::enter(&self.running);
        let (teardown, output) = Runtime::track(ScopeKind::Effect, || (self.callback)());
        self.runs.set(self.runs.get() + 1);

        let mut teardowns = output.cleanups;
        teardowns.extend(teardown);
        *self.teardowns.borrow_mut() = teardowns;

        if self.disposed.get() {
            // Cancelled from inside its own body.
            release_all(std::mem::take(&mut *self.sources.borrow_mut()));
            self.run_teardowns();
            return;
        }
        self.rewire(output.reads);
    }

    fn rewire(&self, reads: ReadSet) {
        let Some(this) = self.this.upgrade() else {
            return;
        };
        let observer: Rc<dyn Observer> = this;
        let fresh: Vec<Dependency> = reads
            .into_sources()
            .map(|source| Dependency::attach(source, Rc::clone(&observer)))
            .collect();
        let stale = std::mem::replace(&mut *self.sources.borrow_mut(), fresh);
        release_all(stale);
    }

    fn run_teardowns(&self) {
        let teardowns = std::mem::take(&mut *self.teardowns.borrow_mut());
        for teardown in teardowns {
            teardown();
        }
    }

    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        tracing::debug!(runs = self.runs.get(), "effect disposed");
        if self.running.get() {
            // `run_once` finishes the job when the body returns.
            return;
        }
        release_all(std::mem::take(&mut *self.sources.borrow_mut()));
        self.run_teardowns();
    }
}

impl Observer for EffectInner {
    fn mark(&self) {
        if !self.disposed.get() {
            self.stale.set(true);
        }
    }

    fn notify(&self, _value: &dyn Any) {
        if self.disposed.get() || self.running.get() || !self.stale.get() {
            return;
        }
        self.run();
    }
}

struct RunningGuard<'a>(&'a Cell<bool>);

impl<'a> RunningGuard<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Run `callback` now and again whenever a signal it read changes.
///
/// The callback may return `()`, a [`Teardown`], or `Option<Teardown>`.
/// A panic inside the callback propagates to whoever triggered the run:
/// the `effect` call itself, or the write that invalidated it.
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use sprig_core::reactive::{effect, Signal};
///
/// let name = Signal::new("world");
/// let greeted = Rc::new(Cell::new(0));
///
/// let reader = name.clone();
/// let counter = greeted.clone();
/// let stop = effect(move || {
///     let _ = format!("hello {}", reader.get());
///     counter.set(counter.get() + 1);
/// });
///
/// name.set("sprig");
/// assert_eq!(greeted.get(), 2);
/// stop.unsubscribe();
/// ```
pub fn effect<F, R>(callback: F) -> Unsubscribe
where
    F: Fn() -> R + 'static,
    R: EffectOutput,
{
    let inner = Rc::new_cyclic(|this| EffectInner {
        this: this.clone(),
        callback: Box::new(move || callback().into_teardown()),
        teardowns: RefCell::new(Vec::new()),
        sources: RefCell::new(Vec::new()),
        stale: Cell::new(false),
        running: Cell::new(false),
        disposed: Cell::new(false),
        runs: Cell::new(0),
    });

    inner.run();
    Unsubscribe::new(move || inner.dispose())
}

/// Call `subscriber` with the current value now, then on every change.
///
/// The initial call runs untracked, so watching from inside an effect does
/// not make the effect depend on `source`.
pub fn watch<T, S>(source: &S, subscriber: impl Fn(&T) + 'static) -> Unsubscribe
where
    T: Clone + 'static,
    S: Reactive<T> + ?Sized,
{
    let callback: Rc<dyn Fn(&T)> = Rc::new(subscriber);
    let value = source.get_untracked();
    untrack(|| callback(&value));
    source.subscribe_dyn(callback)
}

/// Evaluate `f` without recording any of its reads.
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
    Runtime::track(ScopeKind::Untracked, f).0
}

/// Register a teardown for the currently running effect.
///
/// Fails with [`Error::NoActiveEffect`](crate::Error::NoActiveEffect) when
/// called outside an effect body.
pub fn on_cleanup(teardown: impl FnOnce() + 'static) -> Result<()> {
    Runtime::push_cleanup(Box::new(teardown))
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
