//! Keyed list reconciliation.
//!
//! # Algorithm
//!
//! 1. Index the previous entries by key.
//!
//! 2. Walk the new items in order. New keys are rendered right away; keys
//!    seen before contribute their old position. Repeated keys keep their
//!    first occurrence. Nothing has touched the host yet, so a panicking
//!    render leaves the previous list intact.
//!
//! 3. Unmount every old entry whose key is gone.
//!
//! 4. Among the surviving entries, the longest increasing run of old
//!    positions (in new order) is already correctly ordered and stays put.
//!
//! 5. Walk the new order backwards. Each position's attach point is the
//!    anchor of the entry after it (or the list's end anchor). New views are
//!    mounted there, surviving views off the run are moved there.
//!
//! A pure reorder therefore moves exactly `len - LIS` views, and no view of
//! a surviving key is rendered or unmounted again.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;

use super::lis::longest_increasing_subsequence;
use super::view::{KeyedEntry, RenderedView};
use crate::config;

/// Host operations performed by one reconcile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Patch {
    /// Views rendered and mounted.
    pub mounted: usize,
    /// Surviving views relocated.
    pub moved: usize,
    /// Views removed.
    pub unmounted: usize,
    /// Items skipped because their key was already present.
    pub duplicates: usize,
}

impl Patch {
    /// Whether the host tree was left untouched.
    pub fn is_noop(&self) -> bool {
        self.mounted == 0 && self.moved == 0 && self.unmounted == 0
    }
}

/// Where each position of the new list gets its view from.
enum Slot<V> {
    Fresh(V),
    Kept(usize),
}

/// Everything decided before the host is touched.
struct Plan<K, V> {
    slots: Vec<(K, Slot<V>)>,
    duplicates: usize,
}

enum Placed<V> {
    Fresh(V),
    Kept { old_index: usize, view: V },
}

/// Reconcile `old` against `items`, returning the new entries in list order.
///
/// See [`reconcile_with_patch`].
pub fn reconcile<I, K, V>(
    old: Vec<KeyedEntry<K, V>>,
    items: &[I],
    key_fn: impl Fn(&I) -> K,
    render_fn: impl FnMut(&I) -> V,
    mount_anchor: &V::Anchor,
) -> Vec<KeyedEntry<K, V>>
where
    K: Eq + Hash + Clone + Debug,
    V: RenderedView,
{
    reconcile_with_patch(old, items, key_fn, render_fn, mount_anchor).0
}

/// Reconcile `old` against `items` and report what was done to the host.
///
/// `mount_anchor` is the attach point just past the end of the list.
/// Every new view is rendered before any host operation runs.
pub fn reconcile_with_patch<I, K, V>(
    old: Vec<KeyedEntry<K, V>>,
    items: &[I],
    key_fn: impl Fn(&I) -> K,
    render_fn: impl FnMut(&I) -> V,
    mount_anchor: &V::Anchor,
) -> (Vec<KeyedEntry<K, V>>, Patch)
where
    K: Eq + Hash + Clone + Debug,
    V: RenderedView,
{
    let plan = plan(&old, items, key_fn, render_fn);
    apply(old, plan, mount_anchor)
}

/// Reconcile `entries` in place.
///
/// If `render_fn` panics, `entries` and the host are left as they were.
pub(crate) fn reconcile_in_place<I, K, V>(
    entries: &mut Vec<KeyedEntry<K, V>>,
    items: &[I],
    key_fn: impl Fn(&I) -> K,
    render_fn: impl FnMut(&I) -> V,
    mount_anchor: &V::Anchor,
) -> Patch
where
    K: Eq + Hash + Clone + Debug,
    V: RenderedView,
{
    let plan = plan(entries, items, key_fn, render_fn);
    let (next, patch) = apply(std::mem::take(entries), plan, mount_anchor);
    *entries = next;
    patch
}

/// Steps 1 and 2: resolve every new item to a surviving index or a fresh view.
fn plan<I, K, V>(
    old: &[KeyedEntry<K, V>],
    items: &[I],
    key_fn: impl Fn(&I) -> K,
    mut render_fn: impl FnMut(&I) -> V,
) -> Plan<K, V>
where
    K: Eq + Hash + Clone + Debug,
{
    let old_positions: HashMap<&K, usize> = old
        .iter()
        .enumerate()
        .map(|(index, entry)| (&entry.key, index))
        .collect();

    let mut seen: HashSet<K> = HashSet::with_capacity(items.len());
    let mut plan = Plan {
        slots: Vec::with_capacity(items.len()),
        duplicates: 0,
    };
    for item in items {
        let key = key_fn(item);
        if !seen.insert(key.clone()) {
            plan.duplicates += 1;
            if config::dev_checks() {
                tracing::warn!(
                    key = ?key,
                    "duplicate key in keyed list; keeping the first occurrence"
                );
            }
            continue;
        }
        let slot = match old_positions.get(&key) {
            Some(&old_index) => Slot::Kept(old_index),
            None => Slot::Fresh(render_fn(item)),
        };
        plan.slots.push((key, slot));
    }
    plan
}

/// Steps 3 to 5: the host operations.
fn apply<K, V>(
    old: Vec<KeyedEntry<K, V>>,
    plan: Plan<K, V>,
    mount_anchor: &V::Anchor,
) -> (Vec<KeyedEntry<K, V>>, Patch)
where
    V: RenderedView,
{
    let mut patch = Patch {
        duplicates: plan.duplicates,
        ..Patch::default()
    };

    if old.is_empty() {
        let mut entries = Vec::with_capacity(plan.slots.len());
        for (key, slot) in plan.slots {
            let Slot::Fresh(mut view) = slot else {
                continue;
            };
            view.mount(mount_anchor);
            patch.mounted += 1;
            let index = entries.len();
            entries.push(KeyedEntry { key, view, index });
        }
        return (entries, patch);
    }

    let mut old_slots: Vec<Option<KeyedEntry<K, V>>> = old.into_iter().map(Some).collect();
    let placed: Vec<(K, Placed<V>)> = plan
        .slots
        .into_iter()
        .filter_map(|(key, slot)| match slot {
            Slot::Fresh(view) => Some((key, Placed::Fresh(view))),
            Slot::Kept(old_index) => old_slots[old_index].take().map(|entry| {
                let view = entry.view;
                (key, Placed::Kept { old_index, view })
            }),
        })
        .collect();

    for mut removed in old_slots.into_iter().flatten() {
        removed.view.unmount();
        patch.unmounted += 1;
    }

    let (kept_positions, kept_sources): (Vec<usize>, Vec<usize>) = placed
        .iter()
        .enumerate()
        .filter_map(|(position, (_, placed))| match placed {
            Placed::Kept { old_index, .. } => Some((position, *old_index)),
            Placed::Fresh(_) => None,
        })
        .unzip();
    let mut stable = vec![false; placed.len()];
    for run_position in longest_increasing_subsequence(&kept_sources) {
        stable[kept_positions[run_position]] = true;
    }

    let mut reversed: Vec<KeyedEntry<K, V>> = Vec::with_capacity(placed.len());
    for (index, (key, placed)) in placed.into_iter().enumerate().rev() {
        let anchor = reversed
            .last()
            .map_or_else(|| mount_anchor.clone(), |next| next.view.anchor());
        let view = match placed {
            Placed::Fresh(mut view) => {
                view.mount(&anchor);
                patch.mounted += 1;
                view
            }
            Placed::Kept { mut view, .. } => {
                if !stable[index] {
                    view.move_to(&anchor);
                    patch.moved += 1;
                }
                view
            }
        };
        reversed.push(KeyedEntry { key, view, index });
    }
    reversed.reverse();

    tracing::trace!(
        mounted = patch.mounted,
        moved = patch.moved,
        unmounted = patch.unmounted,
        "keyed list reconciled"
    );
    (reversed, patch)
}
