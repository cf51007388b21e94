//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, computeds
//! and effects. It owns the two pieces of shared mutable state in the
//! system: the dependency [`ScopeStack`] and the channel table holding every
//! source's subscribers.
//!
//! # How It Works
//!
//! 1. When a signal is created it allocates a channel slot and gets a
//!    [`SourceId`].
//!
//! 2. When a computed or effect body reads a signal, the read lands in the
//!    innermost scope frame. After the body returns the dependent attaches
//!    itself to each source it read.
//!
//! 3. When a writable signal changes, the runtime:
//!    a. bumps the write epoch
//!    b. marks every observer reachable from the source (computeds become
//!       "maybe dirty", effects become stale)
//!    c. delivers the new value to the source's subscribers in order;
//!       computeds refresh and forward only if their own value changed
//!
//! # Threading
//!
//! Execution is single-threaded and synchronous. Each thread owns its own
//! runtime; reactive handles are `!Send`. No `RefCell` borrow is held while
//! user code runs, so subscribers may freely read and write signals.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use indexmap::IndexMap;

use super::scope::{ScopeId, ScopeKind, ScopeOutput, ScopeStack, Teardown};
use super::subscriber::{Observer, Source, SourceId, SubscriberId};
use crate::error::Result;

type Channel = IndexMap<SubscriberId, Rc<dyn Observer>>;

struct Slot {
    generation: u32,
    channel: Option<Channel>,
}

/// Arena of notification channels addressed by [`SourceId`].
#[derive(Default)]
struct ChannelTable {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl ChannelTable {
    fn allocate(&mut self) -> SourceId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.channel = Some(Channel::new());
            return SourceId {
                index,
                generation: slot.generation,
            };
        }

        let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
        self.slots.push(Slot {
            generation: 0,
            channel: Some(Channel::new()),
        });
        SourceId {
            index,
            generation: 0,
        }
    }

    fn release(&mut self, id: SourceId) -> Option<Channel> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let channel = slot.channel.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        Some(channel)
    }

    fn channel(&self, id: SourceId) -> Option<&Channel> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.channel.as_ref())
    }

    fn channel_mut(&mut self, id: SourceId) -> Option<&mut Channel> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.channel.as_mut())
    }

    fn live(&self) -> usize {
        self.slots.iter().filter(|slot| slot.channel.is_some()).count()
    }
}

struct RuntimeState {
    scopes: RefCell<ScopeStack>,
    channels: RefCell<ChannelTable>,
    epoch: Cell<u64>,
}

thread_local! {
    static STATE: RuntimeState = RuntimeState {
        scopes: RefCell::new(ScopeStack::new()),
        channels: RefCell::new(ChannelTable::default()),
        epoch: Cell::new(0),
    };
}

/// The per-thread reactive runtime.
///
/// All methods are associated functions operating on the current thread's
/// state.
pub struct Runtime;

impl Runtime {
    // ------------------------------------------------------------------
    // Scopes
    // ------------------------------------------------------------------

    /// Push a dependency scope. Pair with [`Runtime::exit_scope`].
    pub fn enter_scope(kind: ScopeKind) -> ScopeId {
        STATE.with(|state| state.scopes.borrow_mut().enter(kind))
    }

    /// Pop the innermost dependency scope, returning what it collected.
    pub fn exit_scope(id: ScopeId) -> Result<ScopeOutput> {
        STATE.with(|state| state.scopes.borrow_mut().exit(id))
    }

    /// Run `f` inside a fresh scope of `kind`.
    ///
    /// The frame is popped even if `f` panics.
    pub fn track<R>(kind: ScopeKind, f: impl FnOnce() -> R) -> (R, ScopeOutput) {
        let guard = ScopeGuard::enter(kind);
        let value = f();
        (value, guard.finish())
    }

    /// Whether a read right now would be recorded as a dependency.
    pub fn is_tracking() -> bool {
        STATE.with(|state| state.scopes.borrow().is_tracking())
    }

    /// Number of active scope frames.
    pub fn scope_depth() -> usize {
        STATE.with(|state| state.scopes.borrow().depth())
    }

    pub(crate) fn record_read(source: Rc<dyn Source>) {
        STATE.with(|state| state.scopes.borrow_mut().record_read(source));
    }

    pub(crate) fn push_cleanup(teardown: Teardown) -> Result<()> {
        STATE.with(|state| state.scopes.borrow_mut().push_cleanup(teardown))
    }

    // ------------------------------------------------------------------
    // Channels
    // ------------------------------------------------------------------

    pub(crate) fn allocate_source() -> SourceId {
        STATE.with(|state| state.channels.borrow_mut().allocate())
    }

    /// Free a source's slot. Safe to call during thread teardown.
    pub(crate) fn release_source(id: SourceId) {
        // The channel is dropped outside the borrow: observers may own other
        // signals whose own drops come back here.
        let released = STATE
            .try_with(|state| {
                state
                    .channels
                    .try_borrow_mut()
                    .ok()
                    .and_then(|mut table| table.release(id))
            })
            .ok()
            .flatten();
        drop(released);
    }

    pub(crate) fn add_observer(id: SourceId, observer: Rc<dyn Observer>) -> SubscriberId {
        let subscriber = SubscriberId::new();
        STATE.with(|state| {
            if let Some(channel) = state.channels.borrow_mut().channel_mut(id) {
                channel.insert(subscriber, observer);
            }
        });
        subscriber
    }

    /// Remove an observer; returns whether it was present.
    pub(crate) fn remove_observer(id: SourceId, subscriber: SubscriberId) -> bool {
        let removed = STATE
            .try_with(|state| {
                state
                    .channels
                    .borrow_mut()
                    .channel_mut(id)
                    .and_then(|channel| channel.shift_remove(&subscriber))
            })
            .ok()
            .flatten();
        removed.is_some()
    }

    /// Number of observers currently attached to `id`.
    pub fn observer_count(id: SourceId) -> usize {
        STATE.with(|state| {
            state
                .channels
                .borrow()
                .channel(id)
                .map_or(0, |channel| channel.len())
        })
    }

    /// Number of live channel slots on this thread.
    pub fn live_sources() -> usize {
        STATE.with(|state| state.channels.borrow().live())
    }

    fn is_attached(id: SourceId, subscriber: SubscriberId) -> bool {
        STATE.with(|state| {
            state
                .channels
                .borrow()
                .channel(id)
                .is_some_and(|channel| channel.contains_key(&subscriber))
        })
    }

    fn snapshot(id: SourceId) -> Vec<(SubscriberId, Rc<dyn Observer>)> {
        STATE.with(|state| {
            state
                .channels
                .borrow()
                .channel(id)
                .map(|channel| {
                    channel
                        .iter()
                        .map(|(subscriber, observer)| (*subscriber, Rc::clone(observer)))
                        .collect()
                })
                .unwrap_or_default()
        })
    }

    // ------------------------------------------------------------------
    // Propagation
    // ------------------------------------------------------------------

    /// Counter bumped by every notifying write.
    pub fn epoch() -> u64 {
        STATE.with(|state| state.epoch.get())
    }

    /// Announce that a writable source changed to `value`.
    ///
    /// Marks every reachable observer, then delivers `value` to the
    /// source's own subscribers while `current` holds.
    pub(crate) fn notify_change(id: SourceId, value: &dyn Any, current: &dyn Fn() -> bool) {
        STATE.with(|state| state.epoch.set(state.epoch.get().wrapping_add(1)));
        tracing::trace!(source = %id, "source changed");
        Self::mark_observers(id);
        Self::deliver(id, value, current);
    }

    /// Phase one: flag every observer of `id` as possibly stale.
    pub(crate) fn mark_observers(id: SourceId) {
        for (_, observer) in Self::snapshot(id) {
            observer.mark();
        }
    }

    /// Phase two: hand `value` to every observer of `id`, in subscription order.
    ///
    /// The observer list is snapshotted first. Observers added while
    /// delivering are not called; observers removed while delivering are
    /// skipped.
    ///
    /// Delivery stops once `current` returns false: a write made by an
    /// earlier observer has already delivered its newer value to everyone.
    pub(crate) fn deliver(id: SourceId, value: &dyn Any, current: &dyn Fn() -> bool) {
        for (subscriber, observer) in Self::snapshot(id) {
            if !current() {
                tracing::trace!(source = %id, "delivery superseded by a newer value");
                break;
            }
            if !Self::is_attached(id, subscriber) {
                continue;
            }
            let guard = ScopeGuard::enter(ScopeKind::Notify);
            observer.notify(value);
            drop(guard.finish());
        }
    }
}

/// Pops its scope frame on drop, including during unwinding.
struct ScopeGuard {
    id: ScopeId,
    finished: bool,
}

impl ScopeGuard {
    fn enter(kind: ScopeKind) -> Self {
        Self {
            id: Runtime::enter_scope(kind),
            finished: false,
        }
    }

    fn finish(mut self) -> ScopeOutput {
        self.finished = true;
        match Runtime::exit_scope(self.id) {
            Ok(output) => output,
            Err(err) => {
                tracing::error!(error = %err, "dependency scope stack corrupted");
                ScopeOutput::default()
            }
        }
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        // Unwinding: pop whatever this frame collected and discard it.
        let _ = STATE.try_with(|state| {
            if let Ok(mut scopes) = state.scopes.try_borrow_mut() {
                let _ = scopes.exit(self.id);
            }
        });
    }
}
