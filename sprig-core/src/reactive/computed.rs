//! Computed Implementation
//!
//! A Computed is a cached derived value that re-evaluates only when its
//! dependencies change, and only while somebody is subscribed to it.
//!
//! # How Computeds Work
//!
//! 1. Without subscribers a computed holds no upstream subscriptions. Every
//!    `get` runs the evaluator once and returns the result.
//!
//! 2. The first subscriber brings it up to date: it evaluates (or adopts the
//!    read-set of an evaluation done in the same write epoch) and subscribes
//!    to every source it read.
//!
//! 3. When a source is about to change, the computed is marked
//!    `MaybeDirty`. It does not recompute yet.
//!
//! 4. On the next read or delivery it checks its sources in read order and
//!    recomputes only if one of them really changed. The new value is
//!    compared with the old one; subscribers hear about it only if the
//!    comparator says it differs.
//!
//! 5. When the last subscriber leaves, upstream subscriptions are released
//!    and the cache is dropped.
//!
//! The mark-then-refresh sequence is what keeps diamond-shaped graphs from
//! evaluating the join twice or exposing a half-updated intermediate value.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt::{self, Debug};
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use super::comparator::{default_comparator, Comparator};
use super::runtime::Runtime;
use super::scope::{ReadSet, ScopeKind};
use super::signal::{Reactive, ReactiveKind};
use super::subscriber::{
    release_all, CallbackObserver, Dependency, Observer, Source, SourceId, SubscriberId,
    Unsubscribe,
};
use crate::error::{Error, Result};

/// Dirty state for a computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputedState {
    /// The cached value is up-to-date.
    Clean,

    /// A dependency might have changed. Sources must be checked.
    MaybeDirty,

    /// No valid cache: never evaluated, unobserved, or reset.
    Dirty,
}

/// A cached derived value that recomputes only when dependencies change.
///
/// Cloning a computed yields another handle to the same node.
///
/// # Example
///
/// ```rust
/// use sprig_core::reactive::{Computed, Signal};
///
/// let count = Signal::new(2);
/// let source = count.clone();
/// let doubled = Computed::new(move || source.get() * 2);
///
/// assert_eq!(doubled.get(), 4);
/// count.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Computed<T: 'static> {
    inner: Rc<ComputedInner<T>>,
}

/// Result of an evaluation done without subscribers, kept so that a
/// subscriber arriving before the next write can adopt it.
struct Snapshot<T> {
    epoch: u64,
    value: T,
    reads: ReadSet,
}

struct ComputedInner<T: 'static> {
    id: SourceId,
    this: Weak<ComputedInner<T>>,
    evaluator: Box<dyn Fn() -> T>,
    comparator: Comparator<T>,
    state: Cell<ComputedState>,
    value: RefCell<Option<T>>,
    version: Cell<u64>,
    /// Version last forwarded to subscribers.
    delivered: Cell<u64>,
    subscribers: Cell<usize>,
    sources: RefCell<Vec<Dependency>>,
    evaluating: Cell<bool>,
    evaluations: Cell<u64>,
    snapshot: RefCell<Option<Snapshot<T>>>,
}

impl<T: Clone + 'static> Computed<T> {
    /// Create a computed compared with the default comparator for `T`.
    ///
    /// The evaluator is not run until the value is needed.
    pub fn new<F>(evaluator: F) -> Self
    where
        F: Fn() -> T + 'static,
        T: PartialEq,
    {
        Self::from_parts(Box::new(evaluator), default_comparator())
    }

    /// Create a computed with an explicit comparator.
    pub fn with_comparator<F, C>(evaluator: F, comparator: C) -> Self
    where
        F: Fn() -> T + 'static,
        C: Fn(&T, &T) -> bool + 'static,
    {
        Self::from_parts(Box::new(evaluator), Rc::new(comparator))
    }

    fn from_parts(evaluator: Box<dyn Fn() -> T>, comparator: Comparator<T>) -> Self {
        let inner = Rc::new_cyclic(|this| ComputedInner {
            id: Runtime::allocate_source(),
            this: this.clone(),
            evaluator,
            comparator,
            state: Cell::new(ComputedState::Dirty),
            value: RefCell::new(None),
            version: Cell::new(0),
            delivered: Cell::new(0),
            subscribers: Cell::new(0),
            sources: RefCell::new(Vec::new()),
            evaluating: Cell::new(false),
            evaluations: Cell::new(0),
            snapshot: RefCell::new(None),
        });
        Self { inner }
    }

    /// The computed's channel id.
    pub fn id(&self) -> SourceId {
        self.inner.id
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// # Panics
    ///
    /// Panics if the computed reads itself while evaluating.
    pub fn get(&self) -> T {
        self.try_get().unwrap_or_else(|err| panic!("{err}"))
    }

    /// Get the current value, reporting a dependency cycle as an error.
    pub fn try_get(&self) -> Result<T> {
        Runtime::record_read(self.inner.clone());
        self.inner.current()
    }

    /// Get the current value without recording a dependency.
    pub fn get_untracked(&self) -> T {
        self.inner.current().unwrap_or_else(|err| panic!("{err}"))
    }

    /// Register `callback` for changes of the computed value.
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Unsubscribe {
        self.subscribe_dyn(Rc::new(callback))
    }

    /// Register a shared callback for changes of the computed value.
    ///
    /// The first subscriber brings the computed up to date, which runs the
    /// evaluator unless a fresh unobserved result can be adopted.
    pub fn subscribe_dyn(&self, callback: Rc<dyn Fn(&T)>) -> Unsubscribe {
        let edge = self.inner.attach(Rc::new(CallbackObserver::new(callback)));
        let inner = Rc::clone(&self.inner);
        Unsubscribe::new(move || inner.detach(edge))
    }

    /// Current dirty state.
    pub fn state(&self) -> ComputedState {
        self.inner.state.get()
    }

    /// Number of live subscribers (user callbacks and dependents).
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.get()
    }

    /// Whether a cached value is held.
    pub fn has_value(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    /// How many times the evaluator has run.
    pub fn evaluations(&self) -> u64 {
        self.inner.evaluations.get()
    }
}

impl<T: Clone + 'static> ComputedInner<T> {
    fn current(&self) -> Result<T> {
        if self.evaluating.get() {
            return Err(Error::Cycle);
        }
        if self.subscribers.get() == 0 {
            return Ok(self.evaluate_unobserved());
        }

        self.refresh_observed();
        let cached = self.value.borrow().clone();
        match cached {
            Some(value) => Ok(value),
            None => Ok(self.evaluate_unobserved()),
        }
    }

    /// Run the evaluator inside a computed scope.
    fn evaluate(&self) -> (T, ReadSet) {
        let _evaluating = EvaluatingGuard::enter(&self.evaluating);
        self.evaluations.set(self.evaluations.get() + 1);
        tracing::trace!(source = %self.id, "evaluating computed");
        let (value, output) = Runtime::track(ScopeKind::Computed, || (self.evaluator)());
        (value, output.reads)
    }

    fn evaluate_unobserved(&self) -> T {
        let (value, reads) = self.evaluate();
        self.version.set(self.version.get() + 1);
        *self.snapshot.borrow_mut() = Some(Snapshot {
            epoch: Runtime::epoch(),
            value: value.clone(),
            reads,
        });
        value
    }

    fn refresh_observed(&self) {
        match self.state.get() {
            ComputedState::Clean => {}
            ComputedState::Dirty => self.recompute(),
            ComputedState::MaybeDirty => {
                let deps: SmallVec<[(Rc<dyn Source>, u64); 4]> = self
                    .sources
                    .borrow()
                    .iter()
                    .map(|dep| (Rc::clone(&dep.source), dep.version))
                    .collect();
                for (source, seen) in deps {
                    source.refresh();
                    if source.version() != seen {
                        self.recompute();
                        return;
                    }
                }
                self.state.set(ComputedState::Clean);
            }
        }
    }

    fn recompute(&self) {
        let (next, reads) = self.evaluate();
        let changed = match &*self.value.borrow() {
            Some(previous) => !(self.comparator)(previous, &next),
            None => true,
        };
        if changed {
            self.version.set(self.version.get() + 1);
        }
        *self.value.borrow_mut() = Some(next);
        self.state.set(ComputedState::Clean);
        self.rewire(reads);
    }

    /// Subscribe to the fresh read-set, then release the previous one.
    ///
    /// Attaching first keeps upstream computeds that are read on both sides
    /// observed across the swap.
    fn rewire(&self, reads: ReadSet) {
        let Some(this) = self.this.upgrade() else {
            return;
        };
        let observer: Rc<dyn Observer> = this;
        let fresh: Vec<Dependency> = reads
            .into_sources()
            .filter(|source| source.source_id() != self.id)
            .map(|source| Dependency::attach(source, Rc::clone(&observer)))
            .collect();
        let stale = std::mem::replace(&mut *self.sources.borrow_mut(), fresh);
        release_all(stale);
    }

    /// 0 → 1 subscribers: bring the cache up to date and subscribe upstream.
    fn activate(&self) {
        let snapshot = self.snapshot.borrow_mut().take();
        match snapshot {
            Some(snapshot) if snapshot.epoch == Runtime::epoch() => {
                tracing::trace!(source = %self.id, "adopting unobserved evaluation");
                *self.value.borrow_mut() = Some(snapshot.value);
                self.state.set(ComputedState::Clean);
                self.rewire(snapshot.reads);
            }
            _ => {
                self.state.set(ComputedState::Dirty);
                self.recompute();
            }
        }
        self.delivered.set(self.version.get());
    }

    /// 1 → 0 subscribers: drop the cache and every upstream subscription.
    fn deactivate(&self) {
        let stale = std::mem::take(&mut *self.sources.borrow_mut());
        release_all(stale);
        let cached = self.value.borrow_mut().take();
        drop(cached);
        self.snapshot.borrow_mut().take();
        self.state.set(ComputedState::Dirty);
        tracing::debug!(source = %self.id, "computed reset after last unsubscribe");
    }
}

impl<T: Clone + 'static> Source for ComputedInner<T> {
    fn source_id(&self) -> SourceId {
        self.id
    }

    fn version(&self) -> u64 {
        self.version.get()
    }

    fn refresh(&self) {
        if self.subscribers.get() > 0 && !self.evaluating.get() {
            self.refresh_observed();
        }
    }

    fn attach(&self, observer: Rc<dyn Observer>) -> SubscriberId {
        let edge = Runtime::add_observer(self.id, observer);
        let count = self.subscribers.get() + 1;
        self.subscribers.set(count);
        if count == 1 {
            let rollback = ActivationRollback {
                inner: self,
                edge,
                armed: true,
            };
            self.activate();
            rollback.disarm();
        }
        edge
    }

    fn detach(&self, edge: SubscriberId) {
        if !Runtime::remove_observer(self.id, edge) {
            return;
        }
        let count = self.subscribers.get().saturating_sub(1);
        self.subscribers.set(count);
        if count == 0 {
            self.deactivate();
        }
    }
}

impl<T: Clone + 'static> Observer for ComputedInner<T> {
    fn mark(&self) {
        if self.state.get() == ComputedState::Clean {
            self.state.set(ComputedState::MaybeDirty);
            Runtime::mark_observers(self.id);
        }
    }

    fn notify(&self, _value: &dyn Any) {
        if self.subscribers.get() == 0 {
            return;
        }
        self.refresh_observed();
        if self.version.get() == self.delivered.get() {
            return;
        }
        let version = self.version.get();
        self.delivered.set(version);
        let value = self.value.borrow().clone();
        if let Some(value) = value {
            Runtime::deliver(self.id, &value, &|| self.version.get() == version);
        }
    }
}

impl<T: 'static> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        Runtime::release_source(self.id);
    }
}

/// Detaches the first subscriber again if activation unwinds.
struct ActivationRollback<'a, T: Clone + 'static> {
    inner: &'a ComputedInner<T>,
    edge: SubscriberId,
    armed: bool,
}

impl<T: Clone + 'static> ActivationRollback<'_, T> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<T: Clone + 'static> Drop for ActivationRollback<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!(source = %self.inner.id, "computed activation failed");
            self.inner.detach(self.edge);
        }
    }
}

struct EvaluatingGuard<'a>(&'a Cell<bool>);

impl<'a> EvaluatingGuard<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for EvaluatingGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl<T: Clone + 'static> Reactive<T> for Computed<T> {
    fn kind(&self) -> ReactiveKind {
        ReactiveKind::Computed
    }

    fn get(&self) -> T {
        Computed::get(self)
    }

    fn get_untracked(&self) -> T {
        Computed::get_untracked(self)
    }

    fn subscribe_dyn(&self, callback: Rc<dyn Fn(&T)>) -> Unsubscribe {
        Computed::subscribe_dyn(self, callback)
    }
}

impl<T: 'static> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug + 'static> Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.id)
            .field("state", &self.inner.state.get())
            .field("subscribers", &self.inner.subscribers.get())
            .field("value", &*self.inner.value.borrow())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Signal;

    fn counted<F>(f: F) -> (Rc<Cell<u32>>, impl Fn() -> i32 + 'static)
    where
        F: Fn() -> i32 + 'static,
    {
        let calls = Rc::new(Cell::new(0));
        let calls_clone = calls.clone();
        (calls, move || {
            calls_clone.set(calls_clone.get() + 1);
            f()
        })
    }

    #[test]
    fn computed_is_lazy_until_read() {
        let (calls, evaluator) = counted(|| 42);
        let computed = Computed::new(evaluator);

        assert!(!computed.has_value());
        assert_eq!(calls.get(), 0);
        assert_eq!(computed.get(), 42);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn unobserved_computed_evaluates_on_every_read() {
        let (calls, evaluator) = counted(|| 42);
        let computed = Computed::new(evaluator);

        computed.get();
        computed.get();
        assert_eq!(calls.get(), 2);
        assert_eq!(computed.state(), ComputedState::Dirty);
    }

    #[test]
    fn unobserved_computed_ignores_upstream_changes() {
        let source = Signal::new(1);
        let reader = source.clone();
        let (calls, evaluator) = counted(move || reader.get() * 10);
        let computed = Computed::new(evaluator);

        assert_eq!(computed.get(), 10);
        source.set(2);
        source.set(3);
        assert_eq!(calls.get(), 1);
        assert_eq!(source.subscriber_count(), 0);

        assert_eq!(computed.get(), 30);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn observed_computed_caches_while_clean() {
        let source = Signal::new(1);
        let reader = source.clone();
        let (calls, evaluator) = counted(move || reader.get() + 1);
        let computed = Computed::new(evaluator);
        let _sub = computed.subscribe(|_| {});

        assert_eq!(calls.get(), 1);
        assert_eq!(computed.get(), 2);
        assert_eq!(computed.get(), 2);
        assert_eq!(calls.get(), 1);
        assert_eq!(computed.state(), ComputedState::Clean);
    }

    #[test]
    fn subscriber_hears_only_real_changes() {
        let source = Signal::new(4);
        let reader = source.clone();
        let parity = Computed::new(move || reader.get() % 2);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        let _sub = parity.subscribe(move |v| seen_clone.borrow_mut().push(*v));

        source.set(6);
        source.set(7);
        source.set(9);
        source.set(10);

        assert_eq!(*seen.borrow(), vec![1, 0]);
    }

    #[test]
    fn last_unsubscribe_resets_and_releases_upstream() {
        let source = Signal::new(1);
        let reader = source.clone();
        let computed = Computed::new(move || reader.get());

        let sub = computed.subscribe(|_| {});
        assert_eq!(source.subscriber_count(), 1);
        assert!(computed.has_value());

        sub.unsubscribe();
        assert_eq!(source.subscriber_count(), 0);
        assert_eq!(computed.state(), ComputedState::Dirty);
        assert!(!computed.has_value());

        // Can be re-subscribed later.
        let _again = computed.subscribe(|_| {});
        assert_eq!(source.subscriber_count(), 1);
        assert_eq!(computed.get(), 1);
    }

    #[test]
    fn subscription_adopts_same_epoch_evaluation() {
        let (calls, evaluator) = counted(|| 5);
        let computed = Computed::new(evaluator);

        assert_eq!(computed.get_untracked(), 5);
        let _sub = computed.subscribe(|_| {});
        assert_eq!(calls.get(), 1);
        assert_eq!(computed.state(), ComputedState::Clean);
    }

    #[test]
    fn stale_unobserved_evaluation_is_not_adopted() {
        let source = Signal::new(1);
        let reader = source.clone();
        let (calls, evaluator) = counted(move || reader.get());
        let computed = Computed::new(evaluator);

        computed.get();
        source.set(2);
        let _sub = computed.subscribe(|_| {});

        assert_eq!(calls.get(), 2);
        assert_eq!(computed.get(), 2);
    }

    #[test]
    fn dependencies_follow_the_branch_taken() {
        let use_left = Signal::new(true);
        let left = Signal::new("left");
        let right = Signal::new("right");

        let (flag, l, r) = (use_left.clone(), left.clone(), right.clone());
        let pick = Computed::new(move || if flag.get() { l.get() } else { r.get() });
        let _sub = pick.subscribe(|_| {});

        assert_eq!(left.subscriber_count(), 1);
        assert_eq!(right.subscriber_count(), 0);

        use_left.set(false);
        assert_eq!(pick.get(), "right");
        assert_eq!(left.subscriber_count(), 0);
        assert_eq!(right.subscriber_count(), 1);
    }

    #[test]
    fn self_read_is_a_cycle() {
        let slot: Rc<RefCell<Option<Computed<i32>>>> = Rc::new(RefCell::new(None));
        let slot_clone = slot.clone();
        let computed = Computed::new(move || {
            let me = slot_clone.borrow().clone();
            match me {
                Some(me) => me.try_get().map_or(-1, |v| v + 1),
                None => 0,
            }
        });
        *slot.borrow_mut() = Some(computed.clone());

        assert_eq!(computed.get(), -1);
        slot.borrow_mut().take();
    }

    #[test]
    fn evaluator_panic_leaves_subscription_working() {
        let input = Signal::new(1);
        let reader = input.clone();
        let doubled = Computed::new(move || {
            let value = reader.get();
            if value == 13 {
                panic!("unlucky input");
            }
            value * 2
        });

        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        let _sub = doubled.subscribe(move |v| seen_clone.borrow_mut().push(*v));

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| input.set(13)));
        assert!(outcome.is_err());
        assert_eq!(Runtime::scope_depth(), 0);
        assert_eq!(input.subscriber_count(), 1);

        input.set(4);
        assert_eq!(*seen.borrow(), vec![8]);
        assert_eq!(doubled.get(), 8);
        assert_eq!(doubled.state(), ComputedState::Clean);
    }

    #[test]
    fn failed_activation_leaves_no_subscriber() {
        let broken = Signal::new(true);
        let reader = broken.clone();
        let computed = Computed::new(move || {
            if reader.get() {
                panic!("not ready");
            }
            1
        });

        let outcome =
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| computed.subscribe(|_| {})));
        assert!(outcome.is_err());
        assert_eq!(computed.subscriber_count(), 0);
        assert_eq!(Runtime::observer_count(computed.id()), 0);
        assert_eq!(broken.subscriber_count(), 0);
        assert_eq!(computed.state(), ComputedState::Dirty);

        broken.set(false);
        let _sub = computed.subscribe(|_| {});
        assert_eq!(computed.subscriber_count(), 1);
        assert_eq!(broken.subscriber_count(), 1);
        assert_eq!(computed.get(), 1);
    }
}
