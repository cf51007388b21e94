//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tells its subscribers when that value changes.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a dependency scope (computed/effect), the
//!    read is recorded and the body later subscribes to the signal.
//!
//! 2. `set` consults the signal's comparator; an equal value is a no-op and
//!    notifies nobody.
//!
//! 3. Otherwise the value is stored and every subscriber is notified
//!    synchronously, in subscription order, before `set` returns.
//!
//! `mutate` is the exception to rule 2: it edits the value in place and
//! always notifies, because the comparator cannot see a change made through
//! a `&mut`. Calling it on a plain number notifies even when nothing changed.

use std::cell::{Cell, RefCell};
use std::fmt::{self, Debug};
use std::rc::Rc;

use super::comparator::{default_comparator, Comparator};
use super::runtime::Runtime;
use super::subscriber::{CallbackObserver, Observer, Source, SourceId, SubscriberId, Unsubscribe};

/// Discriminates the reactive primitives behind the [`Reactive`] trait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReactiveKind {
    /// A [`Signal`] written directly by user code.
    Writable,
    /// A [`Computed`](super::Computed) derived from other signals.
    Computed,
}

/// The read side shared by every reactive primitive.
pub trait Reactive<T: Clone + 'static> {
    /// Which primitive this is.
    fn kind(&self) -> ReactiveKind;

    /// Current value, recorded as a dependency of the active scope.
    fn get(&self) -> T;

    /// Current value without recording a dependency.
    fn get_untracked(&self) -> T;

    /// Register `callback` for future changes.
    fn subscribe_dyn(&self, callback: Rc<dyn Fn(&T)>) -> Unsubscribe;
}

/// A writable reactive cell holding a value of type `T`.
///
/// Cloning a signal yields another handle to the same cell.
///
/// # Example
///
/// ```rust
/// use sprig_core::reactive::Signal;
///
/// let count = Signal::new(0);
/// count.set(5);
/// count.update(|n| n + 1);
/// assert_eq!(count.get(), 6);
/// ```
pub struct Signal<T: 'static> {
    inner: Rc<SignalInner<T>>,
}

struct SignalInner<T: 'static> {
    id: SourceId,
    value: RefCell<T>,
    version: Cell<u64>,
    comparator: Comparator<T>,
}

impl<T: Clone + 'static> Signal<T> {
    /// Create a signal compared with the default comparator for `T`.
    pub fn new(value: T) -> Self
    where
        T: PartialEq,
    {
        Self::from_parts(value, default_comparator())
    }

    /// Create a signal with an explicit comparator.
    pub fn with_comparator<F>(value: T, comparator: F) -> Self
    where
        F: Fn(&T, &T) -> bool + 'static,
    {
        Self::from_parts(value, Rc::new(comparator))
    }

    fn from_parts(value: T, comparator: Comparator<T>) -> Self {
        Self {
            inner: Rc::new(SignalInner {
                id: Runtime::allocate_source(),
                value: RefCell::new(value),
                version: Cell::new(0),
                comparator,
            }),
        }
    }

    /// The signal's channel id.
    pub fn id(&self) -> SourceId {
        self.inner.id
    }

    /// Get the current value.
    ///
    /// Inside a computed or effect body this also records the signal as a
    /// dependency.
    pub fn get(&self) -> T {
        self.track();
        self.get_untracked()
    }

    /// Get the current value without tracking.
    pub fn get_untracked(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Borrow the value for the duration of `f`, tracking the read.
    ///
    /// `f` must not write this signal.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.track();
        f(&self.inner.value.borrow())
    }

    /// Store `value` and notify subscribers, unless the comparator says it
    /// equals the current value.
    pub fn set(&self, value: T) {
        let unchanged = {
            let current = self.inner.value.borrow();
            (self.inner.comparator)(&current, &value)
        };
        if unchanged {
            tracing::trace!(source = %self.inner.id, "set skipped: value unchanged");
            return;
        }

        *self.inner.value.borrow_mut() = value;
        self.commit();
    }

    /// `set(f(&current))`.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = {
            let current = self.inner.value.borrow();
            f(&current)
        };
        self.set(next);
    }

    /// Edit the value in place, then notify unconditionally.
    pub fn mutate(&self, f: impl FnOnce(&mut T)) {
        {
            let mut current = self.inner.value.borrow_mut();
            f(&mut current);
        }
        self.commit();
    }

    /// Register `callback` for future changes. It is not called immediately.
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Unsubscribe {
        self.subscribe_dyn(Rc::new(callback))
    }

    /// Register a shared callback for future changes.
    pub fn subscribe_dyn(&self, callback: Rc<dyn Fn(&T)>) -> Unsubscribe {
        let id = self.inner.id;
        let edge = Runtime::add_observer(id, Rc::new(CallbackObserver::new(callback)));
        Unsubscribe::new(move || {
            Runtime::remove_observer(id, edge);
        })
    }

    /// Number of current subscribers, including dependent computeds and effects.
    pub fn subscriber_count(&self) -> usize {
        Runtime::observer_count(self.inner.id)
    }

    fn track(&self) {
        Runtime::record_read(self.inner.clone());
    }

    fn commit(&self) {
        let version = self.inner.version.get() + 1;
        self.inner.version.set(version);
        let snapshot = self.get_untracked();
        let inner = &self.inner;
        Runtime::notify_change(inner.id, &snapshot, &|| inner.version.get() == version);
    }
}

impl<T: Clone + 'static> Reactive<T> for Signal<T> {
    fn kind(&self) -> ReactiveKind {
        ReactiveKind::Writable
    }

    fn get(&self) -> T {
        Signal::get(self)
    }

    fn get_untracked(&self) -> T {
        Signal::get_untracked(self)
    }

    fn subscribe_dyn(&self, callback: Rc<dyn Fn(&T)>) -> Unsubscribe {
        Signal::subscribe_dyn(self, callback)
    }
}

impl<T: 'static> Source for SignalInner<T> {
    fn source_id(&self) -> SourceId {
        self.id
    }

    fn version(&self) -> u64 {
        self.version.get()
    }

    fn refresh(&self) {}

    fn attach(&self, observer: Rc<dyn Observer>) -> SubscriberId {
        Runtime::add_observer(self.id, observer)
    }

    fn detach(&self, edge: SubscriberId) {
        Runtime::remove_observer(self.id, edge);
    }
}

impl<T: 'static> Drop for SignalInner<T> {
    fn drop(&mut self) {
        Runtime::release_source(self.id);
    }
}

impl<T: 'static> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug + 'static> Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.borrow())
            .field("version", &self.inner.version.get())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
