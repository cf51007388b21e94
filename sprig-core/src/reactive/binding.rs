//! Reactive binding seam.
//!
//! Rendering code that is handed an arbitrary value needs to ask two
//! questions: is this value reactive, and if so, how do I hear about its
//! changes? The answers depend on which reactive library the host wires
//! in, so they go through a [`Binding`] configured once per thread.
//!
//! [`SignalBinding`] answers them for this crate's own [`Signal`] and
//! [`Computed`] types.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use super::computed::Computed;
use super::signal::{Reactive, Signal};
use super::subscriber::Unsubscribe;
use crate::config;
use crate::error::{Error, Result};

/// Callback handed to [`Binding::subscribe`]; receives each new value as `&dyn Any`.
pub type DynCallback = Rc<dyn Fn(&dyn Any)>;

/// Adapter between rendering code and a concrete reactive library.
pub trait Binding {
    /// Whether `value` is a reactive handle this binding understands.
    fn is_reactive(&self, value: &dyn Any) -> bool;

    /// Subscribe `callback` to changes of `value`.
    ///
    /// Values the binding does not recognise yield an inert handle.
    fn subscribe(&self, value: &dyn Any, callback: DynCallback) -> Unsubscribe;
}

thread_local! {
    static BINDING: RefCell<Option<Rc<dyn Binding>>> = const { RefCell::new(None) };
}

/// Install the binding for this thread. Fails if one is already installed.
pub fn configure(binding: impl Binding + 'static) -> Result<()> {
    BINDING.with(|slot| {
        let mut slot = slot.borrow_mut();
        if slot.is_some() {
            return Err(Error::BindingAlreadyConfigured);
        }
        *slot = Some(Rc::new(binding));
        tracing::debug!("reactive binding configured");
        Ok(())
    })
}

/// Whether a binding has been installed on this thread.
pub fn is_configured() -> bool {
    BINDING.with(|slot| slot.borrow().is_some())
}

fn current() -> Option<Rc<dyn Binding>> {
    let binding = BINDING.with(|slot| slot.borrow().clone());
    if binding.is_none() && config::dev_checks() {
        tracing::warn!("reactive binding used before `binding::configure`");
    }
    binding
}

/// Ask the configured binding whether `value` is reactive.
///
/// Returns `false` when no binding is configured.
pub fn is_reactive(value: &dyn Any) -> bool {
    current().is_some_and(|binding| binding.is_reactive(value))
}

/// Subscribe through the configured binding.
///
/// Returns an inert handle when no binding is configured.
pub fn subscribe(value: &dyn Any, callback: DynCallback) -> Unsubscribe {
    match current() {
        Some(binding) => binding.subscribe(value, callback),
        None => Unsubscribe::noop(),
    }
}

type Matcher = Box<dyn Fn(&dyn Any) -> bool>;
type Subscriber = Box<dyn Fn(&dyn Any, &DynCallback) -> Option<Unsubscribe>>;

/// [`Binding`] for [`Signal<T>`] and [`Computed<T>`].
///
/// Type erasure means each value type has to be registered with
/// [`with_type`](Self::with_type).
///
/// ```rust
/// use std::any::Any;
/// use sprig_core::reactive::{binding::{Binding, SignalBinding}, Signal};
///
/// let binding = SignalBinding::new().with_type::<i32>();
/// let count = Signal::new(1);
/// assert!(binding.is_reactive(&count as &dyn Any));
/// assert!(!binding.is_reactive(&1_i32 as &dyn Any));
/// ```
#[derive(Default)]
pub struct SignalBinding {
    matchers: Vec<Matcher>,
    subscribers: Vec<Subscriber>,
}

impl SignalBinding {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recognise `Signal<T>` and `Computed<T>`.
    pub fn with_type<T: Clone + 'static>(mut self) -> Self {
        self.matchers.push(Box::new(|value: &dyn Any| {
            value.is::<Signal<T>>() || value.is::<Computed<T>>()
        }));
        self.subscribers.push(Box::new(|value: &dyn Any, callback: &DynCallback| {
            let callback = Rc::clone(callback);
            let forward: Rc<dyn Fn(&T)> = Rc::new(move |v: &T| callback(v as &dyn Any));
            if let Some(signal) = value.downcast_ref::<Signal<T>>() {
                return Some(signal.subscribe_dyn(forward));
            }
            value
                .downcast_ref::<Computed<T>>()
                .map(|computed| computed.subscribe_dyn(forward))
        }));
        self
    }
}

impl Binding for SignalBinding {
    fn is_reactive(&self, value: &dyn Any) -> bool {
        self.matchers.iter().any(|matches| matches(value))
    }

    fn subscribe(&self, value: &dyn Any, callback: DynCallback) -> Unsubscribe {
        self.subscribers
            .iter()
            .find_map(|subscribe| subscribe(value, &callback))
            .unwrap_or_else(Unsubscribe::noop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn unconfigured_binding_is_inert() {
        let count = Signal::new(0);
        assert!(!is_configured());
        assert!(!is_reactive(&count));

        let handle = subscribe(&count, Rc::new(|_: &dyn Any| {}));
        assert!(!handle.is_active());
        assert_eq!(count.subscriber_count(), 0);
    }

    #[test]
    fn configure_once_per_thread() {
        configure(SignalBinding::new().with_type::<i32>()).unwrap();
        assert!(is_configured());
        assert_eq!(
            configure(SignalBinding::new()).unwrap_err(),
            Error::BindingAlreadyConfigured
        );
    }

    #[test]
    fn signal_binding_recognises_registered_types() {
        let binding = SignalBinding::new().with_type::<i32>();
        let count = Signal::new(1);
        let source = count.clone();
        let doubled = Computed::new(move || source.get() * 2);

        assert!(binding.is_reactive(&count));
        assert!(binding.is_reactive(&doubled));
        assert!(!binding.is_reactive(&Signal::new("text")));
        assert!(!binding.is_reactive(&5_i32));
    }

    #[test]
    fn signal_binding_forwards_changes() {
        configure(SignalBinding::new().with_type::<i32>()).unwrap();
        let count = Signal::new(1);
        let last = Rc::new(Cell::new(0));

        let sink = last.clone();
        let handle = subscribe(
            &count,
            Rc::new(move |value: &dyn Any| {
                if let Some(v) = value.downcast_ref::<i32>() {
                    sink.set(*v);
                }
            }),
        );

        count.set(7);
        assert_eq!(last.get(), 7);

        handle.unsubscribe();
        count.set(8);
        assert_eq!(last.get(), 7);
    }

    #[test]
    fn unknown_values_get_noop_handles() {
        let binding = SignalBinding::new().with_type::<i32>();
        let handle = binding.subscribe(&"plain", Rc::new(|_: &dyn Any| {}));
        assert!(!handle.is_active());
    }
}
