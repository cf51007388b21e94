//! Equality comparators.
//!
//! A comparator decides whether a write is a no-op: `set(new)` is skipped
//! when `comparator(&old, &new)` returns `true`. Signals built with
//! [`Signal::new`](super::Signal::new) use the process-wide default for their
//! value type, which is `PartialEq` unless a different one was registered
//! with [`set_default_comparator`] at start-up.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::OnceLock;

use parking_lot::RwLock;

use crate::error::{Error, Result};

/// A shared comparator closure.
pub type Comparator<T> = Rc<dyn Fn(&T, &T) -> bool>;

type Registry = RwLock<HashMap<TypeId, Box<dyn Any + Send + Sync>>>;

static DEFAULTS: OnceLock<Registry> = OnceLock::new();

fn registry() -> &'static Registry {
    DEFAULTS.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Register the default comparator for `T`.
///
/// Intended to run once at process start, before signals of `T` are
/// created. Registering a second comparator for the same type fails with
/// [`Error::ComparatorAlreadySet`].
pub fn set_default_comparator<T: 'static>(comparator: fn(&T, &T) -> bool) -> Result<()> {
    let mut defaults = registry().write();
    let key = TypeId::of::<T>();
    if defaults.contains_key(&key) {
        return Err(Error::ComparatorAlreadySet {
            type_name: std::any::type_name::<T>(),
        });
    }
    defaults.insert(key, Box::new(comparator));
    Ok(())
}

/// The registered default for `T`, if any.
pub fn registered_comparator<T: 'static>() -> Option<fn(&T, &T) -> bool> {
    registry()
        .read()
        .get(&TypeId::of::<T>())
        .and_then(|entry| entry.downcast_ref::<fn(&T, &T) -> bool>())
        .copied()
}

/// The comparator `Signal::new` and `Computed::new` use for `T`.
pub fn default_comparator<T: PartialEq + 'static>() -> Comparator<T> {
    match registered_comparator::<T>() {
        Some(comparator) => Rc::new(comparator),
        None => Rc::new(|a: &T, b: &T| a == b),
    }
}

/// Never treats two values as equal; every `set` notifies.
pub fn never<T>(_: &T, _: &T) -> bool {
    false
}

/// Reference identity for shared values.
pub fn rc_ptr_eq<T: ?Sized>(a: &Rc<T>, b: &Rc<T>) -> bool {
    Rc::ptr_eq(a, b)
}
