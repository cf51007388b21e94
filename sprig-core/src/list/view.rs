//! Host-facing view abstraction for keyed lists.

use std::rc::Rc;

/// A rendered item the reconciler can place in the host tree.
///
/// An anchor is an attach point: mounting or moving a view "at" an anchor
/// places it immediately before whatever the anchor designates. The
/// reconciler only ever uses anchors obtained from [`anchor`](Self::anchor)
/// of a sibling, or the list's own end anchor.
pub trait RenderedView {
    /// Attach-point type, e.g. a DOM node handle or a child index.
    type Anchor: Clone;

    /// The attach point directly before this view.
    fn anchor(&self) -> Self::Anchor;

    /// Insert this freshly rendered view at `anchor`.
    fn mount(&mut self, anchor: &Self::Anchor);

    /// Relocate this already mounted view to `anchor`.
    fn move_to(&mut self, anchor: &Self::Anchor);

    /// Remove this view from the host.
    fn unmount(&mut self);
}

/// A mounted view together with its key and list position.
#[derive(Debug)]
pub struct KeyedEntry<K, V> {
    pub(crate) key: K,
    pub(crate) view: V,
    pub(crate) index: usize,
}

impl<K, V> KeyedEntry<K, V> {
    pub fn new(key: K, view: V, index: usize) -> Self {
        Self { key, view, index }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut V {
        &mut self.view
    }

    /// Position in the list as of the last reconcile.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn into_view(self) -> V {
        self.view
    }
}

/// Key items by reference identity.
///
/// Two `Rc`s yield the same key exactly when they point to the same
/// allocation.
pub fn identity_key<T: ?Sized>(item: &Rc<T>) -> usize {
    Rc::as_ptr(item).cast::<()>() as usize
}
