//! Integration tests for Tinproxy

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use proptest::prelude::*;
use serde_json::json;
use tinproxy::{
    batch, computed, create_entity, effect, flush_jobs, reactive, readonly, release_entity, same_value,
    shallow_readonly, watch, Flush, OnInvalidate, ReactiveRuntime, RuntimeConfig, Value, View, WatchOptions,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Effect that reads `key` from `view` and counts its runs.
fn counting_reader(view: &View, key: &'static str) -> (tinproxy::Effect, Rc<Cell<usize>>) {
    let runs = Rc::new(Cell::new(0));
    let fx = effect({
        let (view, runs) = (view.clone(), runs.clone());
        move || {
            view.get(key);
            runs.set(runs.get() + 1);
        }
    });
    (fx, runs)
}

#[test]
fn repeated_writes_rerun_once_per_batch() {
    init_tracing();
    ReactiveRuntime::scope(|| {
        let state = reactive(json!({"count": 0})).unwrap();
        let (_fx, runs) = counting_reader(&state, "count");
        assert_eq!(runs.get(), 1);

        batch(|| {
            for i in 1..=10 {
                state.set("count", i);
            }
        });
        assert_eq!(runs.get(), 2);
        assert_eq!(state.get("count"), Value::from(10));
    });
}

#[test]
fn writing_an_equal_value_does_not_notify() {
    ReactiveRuntime::scope(|| {
        let state = reactive(json!({"n": 1, "x": null})).unwrap();
        state.set("x", f64::NAN);
        let (_n, n_runs) = counting_reader(&state, "n");
        let (_x, x_runs) = counting_reader(&state, "x");

        state.set("n", 1);
        state.set("x", f64::NAN);
        let report = flush_jobs();
        assert_eq!(report.ran, 0);
        assert_eq!((n_runs.get(), x_runs.get()), (1, 1));
    });
}

#[test]
fn deleting_notifies_only_existing_keys() {
    ReactiveRuntime::scope(|| {
        let state = reactive(json!({"a": 1})).unwrap();
        let (_fx, key_runs) = counting_reader(&state, "a");
        let iterate_runs = Rc::new(Cell::new(0));
        let _keys = effect({
            let (state, iterate_runs) = (state.clone(), iterate_runs.clone());
            move || {
                state.keys();
                iterate_runs.set(iterate_runs.get() + 1);
            }
        });

        assert!(!state.delete("missing"));
        flush_jobs();
        assert_eq!((key_runs.get(), iterate_runs.get()), (1, 1));

        assert!(state.delete("a"));
        flush_jobs();
        assert_eq!((key_runs.get(), iterate_runs.get()), (2, 2));
        assert!(!state.has("a"));
    });
}

#[test]
fn shrinking_length_notifies_truncated_indices() {
    ReactiveRuntime::scope(|| {
        let list = reactive(json!([1, 2, 3])).unwrap();
        let (_head, head_runs) = counting_reader(&list, "0");
        let (_tail, tail_runs) = counting_reader(&list, "2");

        list.set("length", 1);
        flush_jobs();
        assert_eq!(head_runs.get(), 1);
        assert_eq!(tail_runs.get(), 2);
        assert_eq!(list.get(2), Value::Undefined);
    });
}

#[test]
fn appending_past_the_end_notifies_length() {
    ReactiveRuntime::scope(|| {
        let list = reactive(json!([1])).unwrap();
        let lengths = Rc::new(RefCell::new(Vec::new()));
        let _fx = effect({
            let (list, lengths) = (list.clone(), lengths.clone());
            move || lengths.borrow_mut().push(list.len())
        });

        list.set(3, "x");
        flush_jobs();
        assert_eq!(*lengths.borrow(), vec![1, 4]);
        assert_eq!(list.snapshot(), json!([1, null, null, "x"]));
    });
}

#[test]
fn computed_is_lazy_and_recomputes_once_per_change() {
    ReactiveRuntime::scope(|| {
        let state = reactive(json!({"a": 2, "b": 3})).unwrap();
        let calls = Rc::new(Cell::new(0));
        let product = computed({
            let (state, calls) = (state.clone(), calls.clone());
            move || {
                calls.set(calls.get() + 1);
                state.get("a").as_f64().unwrap_or_default() * state.get("b").as_f64().unwrap_or_default()
            }
        });
        assert_eq!(calls.get(), 0);
        assert_eq!(product.value(), 6.0);

        state.set("a", 4);
        state.set("b", 5);
        assert_eq!(product.value(), 20.0);
        assert_eq!(product.value(), 20.0);
        assert_eq!(calls.get(), 2);
    });
}

#[test]
fn watch_immediate_and_deferred() {
    ReactiveRuntime::scope(|| {
        let state = reactive(json!({"name": "a"})).unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let record = |seen: &Rc<RefCell<Vec<(Value, Option<Value>)>>>| {
            let seen = seen.clone();
            move |new: &Value, old: Option<&Value>, _: &OnInvalidate| {
                seen.borrow_mut().push((new.clone(), old.cloned()))
            }
        };
        let getter = || {
            let state = state.clone();
            move || state.get("name")
        };

        watch(
            getter(),
            record(&seen),
            WatchOptions {
                immediate: true,
                ..Default::default()
            },
        );
        assert_eq!(*seen.borrow(), vec![(Value::from("a"), None)]);

        let later = Rc::new(RefCell::new(Vec::new()));
        watch(getter(), record(&later), WatchOptions::default());
        assert!(later.borrow().is_empty());

        state.set("name", "b");
        flush_jobs();
        assert_eq!(*later.borrow(), vec![(Value::from("b"), Some(Value::from("a")))]);
        assert_eq!(seen.borrow().len(), 2);
    });
}

#[test]
fn post_watch_sees_only_the_last_value() {
    ReactiveRuntime::scope(|| {
        let state = reactive(json!({"n": 0})).unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        watch(
            {
                let state = state.clone();
                move || state.get("n")
            },
            {
                let seen = seen.clone();
                move |new: &Value, _: Option<&Value>, _: &OnInvalidate| seen.borrow_mut().push(new.clone())
            },
            WatchOptions {
                flush: Flush::Post,
                ..Default::default()
            },
        );

        batch(|| {
            for i in 1..=3 {
                state.set("n", i);
            }
            assert!(seen.borrow().is_empty());
        });
        assert_eq!(*seen.borrow(), vec![Value::from(3)]);
    });
}

#[test]
fn wrapping_twice_returns_the_same_view() {
    ReactiveRuntime::scope(|| {
        let state = reactive(json!({"nested": {"x": 1}})).unwrap();
        assert!(View::ptr_eq(&state, &reactive(&state).unwrap()));

        let nested = state.get("nested");
        assert_eq!(nested, state.get("nested"));

        let frozen = shallow_readonly(&state).unwrap();
        assert!(View::ptr_eq(&frozen, &shallow_readonly(&state).unwrap()));
        assert!(!View::ptr_eq(&frozen, &readonly(&state).unwrap()));
    });
}

#[test]
fn pushing_twice_fires_the_length_watcher_once() {
    init_tracing();
    ReactiveRuntime::scope(|| {
        let list = reactive(json!([])).unwrap();
        let calls = Rc::new(RefCell::new(Vec::new()));
        watch(
            {
                let list = list.clone();
                move || list.len()
            },
            {
                let calls = calls.clone();
                move |new: &usize, old: Option<&usize>, _: &OnInvalidate| {
                    calls.borrow_mut().push((*new, old.copied()))
                }
            },
            WatchOptions::default(),
        );

        list.push(1);
        list.push(2);
        assert!(calls.borrow().is_empty());

        flush_jobs();
        assert_eq!(*calls.borrow(), vec![(2, Some(0))]);
    });
}

#[test]
fn runaway_effect_hits_the_recursion_limit() {
    let runtime = ReactiveRuntime::with_config(RuntimeConfig { recursion_limit: 5 });
    ReactiveRuntime::with_runtime(runtime, || {
        let state = reactive(json!({"a": 0, "b": 0})).unwrap();
        let _ping = effect({
            let state = state.clone();
            move || {
                let a = state.get("a").as_f64().unwrap_or_default();
                state.set("b", a + 1.0);
            }
        });
        let _pong = effect({
            let state = state.clone();
            move || {
                let b = state.get("b").as_f64().unwrap_or_default();
                state.set("a", b + 1.0);
            }
        });
        let report = flush_jobs();
        assert!(!report.is_ok());
        assert!(!ReactiveRuntime::current().has_pending_jobs());
    });
}

#[test]
fn released_entities_stop_notifying() {
    ReactiveRuntime::scope(|| {
        let runtime = ReactiveRuntime::current();
        let id = create_entity(json!({"a": 1})).unwrap();
        let state = reactive(id).unwrap();
        let (_fx, runs) = counting_reader(&state, "a");
        assert_eq!(runtime.edge_count(), 1);

        assert!(release_entity(id));
        assert!(!release_entity(id));
        assert!(!state.set("a", 5));
        flush_jobs();
        assert_eq!(runs.get(), 1);
        assert_eq!(runtime.edge_count(), 0);
    });
}

proptest! {
    #[test]
    fn any_number_of_writes_reruns_once(values in prop::collection::vec(-1000i32..1000, 1..20)) {
        ReactiveRuntime::scope(|| {
            let state = reactive(json!({"n": 5000})).unwrap();
            let (_fx, runs) = counting_reader(&state, "n");
            for value in &values {
                state.set("n", *value);
            }
            let report = flush_jobs();
            prop_assert_eq!(runs.get(), 2);
            prop_assert_eq!(report.ran, 1);
            Ok(())
        })?;
    }

    #[test]
    fn same_value_is_reflexive(n in any::<f64>()) {
        prop_assert!(same_value(&Value::from(n), &Value::from(n)));
    }
}
