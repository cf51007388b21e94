//! Keyed List Rendering
//!
//! Turns a sequence of items into a sequence of mounted views with the
//! fewest host operations: a view is rendered once per key, moved only when
//! it falls off the longest already-ordered run, and unmounted once when its
//! key disappears.
//!
//! The host side is abstracted by [`RenderedView`]. [`reconcile`] is the
//! pure algorithm over owned entries, [`KeyedList`] keeps the entries
//! between updates, and [`each`] drives a `KeyedList` from a reactive
//! `Vec`.

mod each;
mod keyed;
mod lis;
mod reconcile;
mod view;

pub use each::each;
pub use keyed::KeyedList;
pub use lis::longest_increasing_subsequence;
pub use reconcile::{reconcile, reconcile_with_patch, Patch};
pub use view::{identity_key, KeyedEntry, RenderedView};
