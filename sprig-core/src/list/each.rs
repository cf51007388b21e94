//! Reactive keyed lists.

use std::cell::RefCell;
use std::fmt::Debug;
use std::hash::Hash;
use std::rc::Rc;

use super::keyed::KeyedList;
use super::view::RenderedView;
use crate::config;
use crate::reactive::{watch, Reactive, Unsubscribe};

/// Keep a keyed list mounted in sync with a reactive `Vec`.
///
/// The list is rendered from the current value immediately and reconciled
/// on every change. Items whose key survives a change keep their view;
/// only new keys reach `render_fn`. Cancelling unmounts every entry.
///
/// # Duplicate Key Handling
///
/// Duplicate keys are warned about (with development checks on) and
/// skipped; only the first occurrence is rendered.
///
/// # Example
///
/// ```ignore
/// let rows = Signal::new(vec![Row { id: 1, .. }]);
///
/// let stop = each(&rows, |row| row.id, |row| RowView::render(row), body_end);
///
/// rows.update(|rows| rows.push(Row { id: 2, .. }));  // mounts one view
/// stop.unsubscribe();                                  // unmounts both
/// ```
pub fn each<S, I, K, V>(
    source: &S,
    key_fn: impl Fn(&I) -> K + 'static,
    render_fn: impl FnMut(&I) -> V + 'static,
    mount_anchor: V::Anchor,
) -> Unsubscribe
where
    S: Reactive<Vec<I>> + ?Sized,
    I: Clone + 'static,
    K: Eq + Hash + Clone + Debug + 'static,
    V: RenderedView + 'static,
{
    let list = Rc::new(RefCell::new(KeyedList::new(mount_anchor)));
    let render_fn = RefCell::new(render_fn);

    let updater = Rc::clone(&list);
    let subscription = watch(source, move |items: &Vec<I>| {
        let (Ok(mut list), Ok(mut render)) =
            (updater.try_borrow_mut(), render_fn.try_borrow_mut())
        else {
            if config::dev_checks() {
                tracing::warn!(
                    "keyed list source changed while the list was updating; change ignored"
                );
            }
            return;
        };
        list.update(items.as_slice(), &key_fn, &mut *render);
    });

    Unsubscribe::new(move || {
        subscription.unsubscribe();
        match list.try_borrow_mut() {
            Ok(mut list) => {
                let removed = list.clear();
                tracing::debug!(removed, "keyed list disposed");
            }
            Err(_) => tracing::warn!("keyed list cancelled from inside its own update"),
        }
    })
}
