//! Subscriber types for the reactive system.
//!
//! Every reactive value owns a notification channel in the runtime's
//! channel table. Anything that wants to hear about changes (a user
//! callback, a computed signal, an effect) is an [`Observer`] stored in that
//! channel under a [`SubscriberId`]. The subscribing side keeps an
//! [`Unsubscribe`] handle that removes the edge again.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for one subscription edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// Stable arena address of a reactive value's notification channel.
///
/// Slots are recycled once the owning signal is dropped; the generation
/// keeps ids of dropped signals from aliasing the slot's next tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl SourceId {
    /// Slot index inside the channel table.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Generation of the slot when this id was issued.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Receives change notifications from a channel.
///
/// Delivery is two-phase: every observer reachable from a write is first
/// `mark`ed, then `notify` runs in subscription order. Observers that
/// derive values use the mark to know they may be stale before any value
/// is delivered.
pub(crate) trait Observer {
    /// Phase one: an upstream value is about to change.
    fn mark(&self);

    /// Phase two: the upstream value changed to `value`.
    fn notify(&self, value: &dyn Any);
}

/// A reactive value that can be read inside a scope and depended upon.
pub(crate) trait Source {
    /// Channel address of this source.
    fn source_id(&self) -> SourceId;

    /// Monotonic counter bumped whenever the value observably changes.
    fn version(&self) -> u64;

    /// Bring the cached value up to date. A no-op for writable signals.
    fn refresh(&self);

    /// Attach an observer edge; computed sources count it as a live subscriber.
    fn attach(&self, observer: Rc<dyn Observer>) -> SubscriberId;

    /// Remove an edge previously returned by `attach`. Unknown ids are ignored.
    fn detach(&self, edge: SubscriberId);
}

/// An edge from a dependent to one of its sources, with the version seen
/// when the edge was made.
pub(crate) struct Dependency {
    pub(crate) source: Rc<dyn Source>,
    pub(crate) version: u64,
    pub(crate) edge: SubscriberId,
}

impl Dependency {
    /// Attach `observer` to `source` and record the source's version.
    pub(crate) fn attach(source: Rc<dyn Source>, observer: Rc<dyn Observer>) -> Self {
        let edge = source.attach(observer);
        Self {
            version: source.version(),
            edge,
            source,
        }
    }

    pub(crate) fn release(self) {
        self.source.detach(self.edge);
    }

    /// Refresh the source and report whether it moved past the recorded version.
    pub(crate) fn changed(&self) -> bool {
        self.source.refresh();
        self.source.version() != self.version
    }
}

/// Release a batch of dependency edges.
pub(crate) fn release_all(dependencies: Vec<Dependency>) {
    for dependency in dependencies {
        dependency.release();
    }
}

/// A plain `Fn(&T)` callback registered through `subscribe`.
///
/// Panics raised by the callback are caught and logged so that one failing
/// subscriber cannot stop the rest of a notification fan-out.
pub(crate) struct CallbackObserver<T> {
    callback: Rc<dyn Fn(&T)>,
}

impl<T: 'static> CallbackObserver<T> {
    pub(crate) fn new(callback: Rc<dyn Fn(&T)>) -> Self {
        Self { callback }
    }
}

impl<T: 'static> Observer for CallbackObserver<T> {
    fn mark(&self) {}

    fn notify(&self, value: &dyn Any) {
        let Some(value) = value.downcast_ref::<T>() else {
            tracing::error!(
                expected = std::any::type_name::<T>(),
                "subscriber received a value of the wrong type"
            );
            return;
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| (self.callback)(value)));
        if let Err(payload) = outcome {
            tracing::error!(
                panic = %panic_message(payload.as_ref()),
                "subscriber panicked; continuing notification"
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

/// Cancellation handle returned by every subscribing call.
///
/// Dropping the handle does not cancel; subscriptions end only through
/// [`Unsubscribe::unsubscribe`]. Calling it more than once is a no-op.
#[must_use = "dropping an Unsubscribe leaves the subscription active"]
pub struct Unsubscribe {
    teardown: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl Unsubscribe {
    /// Wrap a cancellation action.
    pub fn new<F>(teardown: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        Self {
            teardown: RefCell::new(Some(Box::new(teardown))),
        }
    }

    /// A handle that cancels nothing.
    pub fn noop() -> Self {
        Self {
            teardown: RefCell::new(None),
        }
    }

    /// Cancel the subscription. Subsequent calls do nothing.
    pub fn unsubscribe(&self) {
        let teardown = self.teardown.borrow_mut().take();
        if let Some(teardown) = teardown {
            teardown();
        }
    }

    /// Whether `unsubscribe` has not run yet.
    pub fn is_active(&self) -> bool {
        self.teardown.borrow().is_some()
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("active", &self.is_active())
            .finish()
    }
}
