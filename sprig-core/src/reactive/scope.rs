//! Dependency Scopes
//!
//! A scope is pushed while a computed or effect body runs. Every signal read
//! during that time is recorded in the innermost scope, which is how the
//! body's dependencies are discovered without being declared.
//!
//! # Implementation
//!
//! The [`ScopeStack`] is a plain stack owned by the runtime. Frames are
//! pushed with [`ScopeStack::enter`] and popped with [`ScopeStack::exit`],
//! strictly in reverse order. Untracked and notification frames swallow
//! reads so that code run from inside a body (user callbacks, `untrack`)
//! does not leak dependencies into it.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::subscriber::{Source, SourceId};
use crate::error::{Error, Result};

/// A teardown callback, run before an effect re-runs and when it is cancelled.
pub type Teardown = Box<dyn FnOnce()>;

/// Identifies one entered scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u64);

/// What kind of evaluation a scope frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// A computed signal's evaluator. Records reads.
    Computed,
    /// An effect body. Records reads and accepts `on_cleanup`.
    Effect,
    /// Code wrapped in `untrack`. Swallows reads, transparent to `on_cleanup`.
    Untracked,
    /// A subscriber callback invoked during notification. Swallows reads.
    Notify,
}

impl ScopeKind {
    fn records_reads(self) -> bool {
        matches!(self, ScopeKind::Computed | ScopeKind::Effect)
    }
}

/// The ordered, de-duplicated set of sources read inside one scope.
#[derive(Default)]
pub struct ReadSet {
    sources: IndexMap<SourceId, Rc<dyn Source>>,
}

impl ReadSet {
    fn insert(&mut self, source: Rc<dyn Source>) {
        self.sources.entry(source.source_id()).or_insert(source);
    }

    /// Ids of the sources, in first-read order.
    pub fn ids(&self) -> impl Iterator<Item = SourceId> + '_ {
        self.sources.keys().copied()
    }

    /// Whether `id` was read.
    pub fn contains(&self, id: SourceId) -> bool {
        self.sources.contains_key(&id)
    }

    /// Number of distinct sources read.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether nothing was read.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub(crate) fn into_sources(self) -> impl Iterator<Item = Rc<dyn Source>> {
        self.sources.into_values()
    }
}

impl fmt::Debug for ReadSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.sources.keys()).finish()
    }
}

/// Everything a frame collected by the time it was exited.
#[derive(Default)]
pub struct ScopeOutput {
    /// Sources read inside the frame.
    pub reads: ReadSet,
    /// Teardowns registered with `on_cleanup` (effect frames only).
    pub cleanups: Vec<Teardown>,
}

impl fmt::Debug for ScopeOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeOutput")
            .field("reads", &self.reads)
            .field("cleanups", &self.cleanups.len())
            .finish()
    }
}

struct Frame {
    id: ScopeId,
    kind: ScopeKind,
    reads: ReadSet,
    cleanups: SmallVec<[Teardown; 1]>,
}

/// Stack of active dependency scopes.
#[derive(Default)]
pub struct ScopeStack {
    frames: Vec<Frame>,
    next_id: u64,
}

impl ScopeStack {
    /// Create an empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a new frame.
    pub fn enter(&mut self, kind: ScopeKind) -> ScopeId {
        let id = ScopeId(self.next_id);
        self.next_id += 1;
        self.frames.push(Frame {
            id,
            kind,
            reads: ReadSet::default(),
            cleanups: SmallVec::new(),
        });
        id
    }

    /// Pop the frame `id`, which must be the innermost one.
    pub fn exit(&mut self, id: ScopeId) -> Result<ScopeOutput> {
        let top = self.frames.last().ok_or(Error::NoActiveScope)?;
        if top.id != id {
            return Err(Error::ScopeMismatch {
                expected: id,
                found: top.id,
            });
        }

        let frame = self.frames.pop().ok_or(Error::NoActiveScope)?;
        Ok(ScopeOutput {
            reads: frame.reads,
            cleanups: frame.cleanups.into_vec(),
        })
    }

    /// Record a read in the innermost frame. No-op without one.
    pub(crate) fn record_read(&mut self, source: Rc<dyn Source>) {
        if let Some(frame) = self.frames.last_mut() {
            if frame.kind.records_reads() {
                frame.reads.insert(source);
            }
        }
    }

    /// Register a teardown on the innermost effect frame, looking through
    /// untracked frames.
    pub(crate) fn push_cleanup(&mut self, teardown: Teardown) -> Result<()> {
        for frame in self.frames.iter_mut().rev() {
            match frame.kind {
                ScopeKind::Untracked => continue,
                ScopeKind::Effect => {
                    frame.cleanups.push(teardown);
                    return Ok(());
                }
                ScopeKind::Computed | ScopeKind::Notify => break,
            }
        }
        Err(Error::NoActiveEffect { hook: "on_cleanup" })
    }

    /// Whether a read right now would be recorded.
    pub fn is_tracking(&self) -> bool {
        self.frames
            .last()
            .is_some_and(|frame| frame.kind.records_reads())
    }

    /// Number of active frames.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

impl fmt::Debug for ScopeStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.frames.iter().map(|frame| (frame.id, frame.kind)))
            .finish()
    }
}
