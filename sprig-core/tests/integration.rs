//! Integration Tests for Reactive System
//!
//! These tests verify that signals, computeds, watches and effects work
//! together correctly.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use sprig_core::reactive::binding::{self, SignalBinding};
use sprig_core::reactive::{
    effect, on_cleanup, watch, Computed, ComputedState, Runtime, Signal, Teardown,
};

fn recorder<T: Clone + 'static>() -> (Rc<RefCell<Vec<T>>>, impl Fn(&T) + 'static) {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    (seen, move |value: &T| sink.borrow_mut().push(value.clone()))
}

/// Test the basic count/double scenario end to end.
#[test]
fn count_and_double_end_to_end() {
    let count = Signal::new(0);
    let source = count.clone();
    let double = Computed::new(move || source.get() * 2);

    let (counts, on_count) = recorder::<i32>();
    let (doubles, on_double) = recorder::<i32>();
    let _a = watch(&count, on_count);
    let _b = watch(&double, on_double);

    count.set(1);
    assert_eq!(*counts.borrow(), vec![0, 1]);
    assert_eq!(*doubles.borrow(), vec![0, 2]);

    // Equal write: nobody hears about it
    count.set(1);
    assert_eq!(counts.borrow().len(), 2);
    assert_eq!(doubles.borrow().len(), 2);
}

/// Test that a diamond evaluates its sink exactly once per write.
#[test]
fn diamond_evaluates_sink_once_per_write() {
    let a = Signal::new(1);
    let (a1, a2) = (a.clone(), a.clone());
    let b = Computed::new(move || a1.get() * 2);
    let c = Computed::new(move || a2.get() * 3);

    let (b1, c1) = (b.clone(), c.clone());
    let d = Computed::new(move || b1.get() + c1.get());

    let (seen, on_d) = recorder::<i32>();
    let _watch = watch(&d, on_d);
    let baseline = d.evaluations();

    for x in 2..6 {
        a.set(x);
    }

    assert_eq!(d.evaluations() - baseline, 4);
    assert_eq!(*seen.borrow(), vec![5, 10, 15, 20, 25]);
}

/// Test that subscribers never observe a half-updated graph.
#[test]
fn diamond_is_glitch_free() {
    let a = Signal::new(1);
    let (a1, a2) = (a.clone(), a.clone());
    let b = Computed::new(move || a1.get() * 2);
    let c = Computed::new(move || a2.get() * 3);
    let (b1, c1) = (b.clone(), c.clone());
    let d = Computed::new(move || (b1.get(), c1.get()));

    let glitches = Rc::new(Cell::new(0));
    let counter = glitches.clone();
    let (b2, c2) = (b.clone(), c.clone());
    let _watch = watch(&d, move |&(seen_b, seen_c): &(i32, i32)| {
        if seen_b * 3 != seen_c * 2 || seen_b != b2.get_untracked() || seen_c != c2.get_untracked()
        {
            counter.set(counter.get() + 1);
        }
    });

    for x in 2..10 {
        a.set(x);
    }
    assert_eq!(glitches.get(), 0);
}

/// Test that computeds chain through several levels.
#[test]
fn nested_computed_chain() {
    let base = Signal::new(1);
    let source = base.clone();
    let plus_one = Computed::new(move || source.get() + 1);
    let p = plus_one.clone();
    let times_ten = Computed::new(move || p.get() * 10);
    let t = times_ten.clone();
    let label = Computed::new(move || format!("value={}", t.get()));

    let (labels, on_label) = recorder::<String>();
    let _watch = watch(&label, on_label);

    base.set(4);
    assert_eq!(*labels.borrow(), vec!["value=20", "value=50"]);
    assert_eq!(plus_one.subscriber_count(), 1);
    assert_eq!(times_ten.subscriber_count(), 1);
}

/// Test that an unobserved computed ignores upstream writes.
#[test]
fn unobserved_computed_stays_lazy() {
    let runs = Rc::new(Cell::new(0));
    let signal = Signal::new(0);

    let (s, r) = (signal.clone(), runs.clone());
    let computed = Computed::new(move || {
        r.set(r.get() + 1);
        s.get()
    });

    for x in 0..10 {
        signal.set(x);
    }
    assert_eq!(runs.get(), 0);

    assert_eq!(computed.get(), 9);
    assert_eq!(runs.get(), 1);
}

/// Test that the last unsubscribe resets a computed.
#[test]
fn computed_resets_after_last_unsubscribe() {
    let signal = Signal::new(3);
    let source = signal.clone();
    let squared = Computed::new(move || source.get() * source.get());

    let first = squared.subscribe(|_| {});
    let second = squared.subscribe(|_| {});
    assert_eq!(squared.state(), ComputedState::Clean);
    assert_eq!(signal.subscriber_count(), 1);

    first.unsubscribe();
    assert!(squared.has_value());
    second.unsubscribe();

    assert_eq!(squared.state(), ComputedState::Dirty);
    assert!(!squared.has_value());
    assert_eq!(signal.subscriber_count(), 0);
}

/// Test that effect teardowns run in order: previous run before the next, then on cancel.
#[test]
fn effect_teardown_order() {
    let page = Signal::new("home");
    let events = Rc::new(RefCell::new(Vec::<String>::new()));

    let (reader, log) = (page.clone(), events.clone());
    let stop = effect(move || {
        let name = reader.get();
        log.borrow_mut().push(format!("enter {name}"));

        let registered = log.clone();
        on_cleanup(move || registered.borrow_mut().push(format!("cleanup {name}")))
            .expect("inside effect");

        let returned = log.clone();
        Box::new(move || returned.borrow_mut().push(format!("leave {name}"))) as Teardown
    });

    page.set("about");
    stop.unsubscribe();

    assert_eq!(
        *events.borrow(),
        vec![
            "enter home",
            "cleanup home",
            "leave home",
            "enter about",
            "cleanup about",
            "leave about",
        ]
    );
}

/// Test that an effect with no dependencies runs once and tears down on cancel.
#[test]
fn effect_with_zero_dependencies() {
    let runs = Rc::new(Cell::new(0));
    let cleaned = Rc::new(Cell::new(false));

    let (r, c) = (runs.clone(), cleaned.clone());
    let stop = effect(move || {
        r.set(r.get() + 1);
        let c = c.clone();
        Box::new(move || c.set(true)) as Teardown
    });

    assert_eq!(runs.get(), 1);
    stop.unsubscribe();
    assert!(cleaned.get());
    stop.unsubscribe();
    assert_eq!(runs.get(), 1);
}

/// Test that one panicking subscriber does not stop the others.
#[test]
fn panicking_subscriber_is_isolated() {
    let signal = Signal::new(0);
    let (seen, on_value) = recorder::<i32>();

    let _bad = signal.subscribe(|_| panic!("subscriber failed"));
    let _good = signal.subscribe(on_value);

    signal.set(1);
    signal.set(2);

    assert_eq!(*seen.borrow(), vec![1, 2]);
    assert_eq!(Runtime::scope_depth(), 0);
}

/// Test the binding seam with the built-in signal binding.
#[test]
fn binding_routes_through_signal_binding() {
    binding::configure(SignalBinding::new().with_type::<String>()).expect("first configure");

    let title = Signal::new(String::from("draft"));
    let t = title.clone();
    let upper = Computed::new(move || t.get().to_uppercase());
    assert!(binding::is_reactive(&title));
    assert!(binding::is_reactive(&upper));
    assert!(!binding::is_reactive(&String::from("plain")));

    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let stop = binding::subscribe(
        &upper,
        Rc::new(move |value: &dyn std::any::Any| {
            if let Some(text) = value.downcast_ref::<String>() {
                sink.borrow_mut().push(text.clone());
            }
        }),
    );

    title.set(String::from("final"));
    stop.unsubscribe();
    title.set(String::from("ignored"));

    assert_eq!(*seen.borrow(), vec!["FINAL"]);
}

/// Test that dependencies follow the branch actually taken.
#[test]
fn dynamic_dependencies_switch_sources() {
    let use_first = Signal::new(true);
    let first = Signal::new("first");
    let second = Signal::new("second");

    let (u, f, s) = (use_first.clone(), first.clone(), second.clone());
    let picked = Computed::new(move || if u.get() { f.get() } else { s.get() });

    let (seen, on_pick) = recorder::<&str>();
    let _watch = watch(&picked, on_pick);
    assert_eq!(second.subscriber_count(), 0);

    use_first.set(false);
    assert_eq!(first.subscriber_count(), 0);
    assert_eq!(second.subscriber_count(), 1);

    first.set("ignored");
    second.set("updated");
    assert_eq!(*seen.borrow(), vec!["first", "second", "updated"]);
}
