//! Owned keyed list state.

use std::fmt::Debug;
use std::hash::Hash;

use super::reconcile::{reconcile_in_place, Patch};
use super::view::{KeyedEntry, RenderedView};

/// The mounted entries of one keyed list plus its end anchor.
pub struct KeyedList<K, V: RenderedView> {
    entries: Vec<KeyedEntry<K, V>>,
    anchor: V::Anchor,
}

impl<K, V> KeyedList<K, V>
where
    K: Eq + Hash + Clone + Debug,
    V: RenderedView,
{
    /// An empty list whose views are mounted before `anchor`.
    pub fn new(anchor: V::Anchor) -> Self {
        Self {
            entries: Vec::new(),
            anchor,
        }
    }

    /// Reconcile the mounted views against `items`.
    ///
    /// A panic from `render_fn` leaves the list and its views untouched.
    pub fn update<I>(
        &mut self,
        items: &[I],
        key_fn: impl Fn(&I) -> K,
        render_fn: impl FnMut(&I) -> V,
    ) -> Patch {
        reconcile_in_place(&mut self.entries, items, key_fn, render_fn, &self.anchor)
    }

    /// Unmount every view. Returns how many were removed.
    pub fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        for mut entry in self.entries.drain(..) {
            entry.view.unmount();
        }
        removed
    }

    pub fn entries(&self) -> &[KeyedEntry<K, V>] {
        &self.entries
    }

    pub fn get(&self, key: &K) -> Option<&KeyedEntry<K, V>> {
        self.entries.iter().find(|entry| entry.key == *key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.entries.iter().map(|entry| &entry.key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn anchor(&self) -> &V::Anchor {
        &self.anchor
    }
}

impl<K: Debug, V: RenderedView> Debug for KeyedList<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedList")
            .field("keys", &self.entries.iter().map(|e| &e.key).collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::list::host::{Host, Op};

    #[test]
    fn update_then_clear() {
        let host = Host::default();
        let mut list = KeyedList::new(None);

        let patch = list.update(&[1, 2, 3], |n: &i32| *n, |n| host.view(&n.to_string()));
        assert_eq!(patch.mounted, 3);
        assert_eq!(list.keys().copied().collect::<Vec<_>>(), [1, 2, 3]);

        let patch = list.update(&[3, 1], |n: &i32| *n, |n| host.view(&n.to_string()));
        assert_eq!(patch.unmounted, 1);
        assert_eq!(patch.moved, 1);
        assert_eq!(host.order(), ["3", "1"]);
        assert_eq!(list.get(&1).map(|entry| entry.index()), Some(1));
        host.take_ops();

        assert_eq!(list.clear(), 2);
        assert!(list.is_empty());
        assert_eq!(host.take_ops(), [Op::unmount("3"), Op::unmount("1")]);
    }

    #[test]
    fn list_mounts_before_its_anchor() {
        let host = Host::default();
        host.view("footer").mount(&None);

        let mut list = KeyedList::new(Some("footer".to_string()));
        list.update(&["a", "b"], |s: &&str| s.to_string(), |s| host.view(s));

        assert_eq!(host.order(), ["a", "b", "footer"]);
    }

    #[test]
    fn panicking_render_keeps_mounted_views() {
        let host = Host::default();
        let mut list = KeyedList::new(None);
        list.update(&["a", "b"], |s: &&str| s.to_string(), |s| host.view(s));
        host.take_ops();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            list.update(&["b", "a", "x"], |s: &&str| s.to_string(), |s| {
                if *s == "x" {
                    panic!("render failed");
                }
                host.view(s)
            })
        }));
        assert!(result.is_err());
        assert_eq!(list.keys().map(String::as_str).collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(host.order(), ["a", "b"]);
        assert!(host.take_ops().is_empty());

        let patch = list.update(&["b", "a"], |s: &&str| s.to_string(), |s| host.view(s));
        assert_eq!(patch, Patch { moved: 1, ..Patch::default() });
        assert_eq!(host.order(), ["b", "a"]);
    }
}
