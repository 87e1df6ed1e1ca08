use std::cell::{OnceCell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::computed::Computed;
use crate::effect::{Effect, EffectOptions};
use crate::reactive::View;
use crate::runtime::{EffectId, EntityId, Job, ReactiveRuntime};
use crate::value::Value;

/// When a watcher reacts to a change.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Flush {
    /// Queued with regular jobs and coalesced until the next flush. The
    /// default, so several writes in one turn produce a single callback.
    #[default]
    Pre,
    /// Queued after every regular job of the flush.
    Post,
    /// Run at notification time, once per change.
    Sync,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct WatchOptions {
    /// Fire the callback once at setup with no old value.
    pub immediate: bool,
    pub flush: Flush,
}

/// Registers a cleanup to run before the next reaction (or on stop), so a
/// callback can cancel work started for a value that is now stale.
#[derive(Clone, Default)]
pub struct OnInvalidate {
    cleanup: Rc<RefCell<Option<Box<dyn FnOnce()>>>>,
}

impl OnInvalidate {
    pub fn register(&self, cleanup: impl FnOnce() + 'static) {
        *self.cleanup.borrow_mut() = Some(Box::new(cleanup));
    }

    fn invalidate(&self) {
        let cleanup = self.cleanup.borrow_mut().take();
        if let Some(cleanup) = cleanup {
            cleanup();
        }
    }
}

impl fmt::Debug for OnInvalidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnInvalidate")
            .field("pending", &self.cleanup.borrow().is_some())
            .finish()
    }
}

/// Something that can be watched: a getter, a view (watched deeply) or a
/// computed value.
pub trait WatchSource {
    type Output: 'static;

    fn into_getter(self) -> Box<dyn Fn() -> Self::Output>;
}

impl<T, F> WatchSource for F
where
    T: 'static,
    F: Fn() -> T + 'static,
{
    type Output = T;

    fn into_getter(self) -> Box<dyn Fn() -> T> {
        Box::new(self)
    }
}

impl WatchSource for View {
    type Output = View;

    fn into_getter(self) -> Box<dyn Fn() -> View> {
        Box::new(move || {
            traverse(&self);
            self.clone()
        })
    }
}

impl WatchSource for &View {
    type Output = View;

    fn into_getter(self) -> Box<dyn Fn() -> View> {
        self.clone().into_getter()
    }
}

impl<T: Clone + 'static> WatchSource for Computed<T> {
    type Output = T;

    fn into_getter(self) -> Box<dyn Fn() -> T> {
        Box::new(move || self.value())
    }
}

/// Read every property reachable from `view` so a change anywhere in the
/// structure is observed. Each raw entity is visited once.
pub fn traverse(view: &View) {
    let mut seen = HashSet::new();
    traverse_into(view, &mut seen);
}

fn traverse_into(view: &View, seen: &mut HashSet<EntityId>) {
    if !seen.insert(view.raw()) {
        return;
    }
    for value in view.values() {
        if let Value::View(nested) = value {
            traverse_into(&nested, seen);
        }
    }
}

type Callback<T> = Box<dyn Fn(&T, Option<&T>, &OnInvalidate)>;

struct WatchState<T> {
    effect: OnceCell<Effect<T>>,
    old: RefCell<Option<T>>,
    on_invalidate: OnInvalidate,
    callback: Callback<T>,
}

impl<T: 'static> WatchState<T> {
    fn react(&self) {
        let Some(effect) = self.effect.get() else {
            return;
        };
        let new_value = effect.run();
        self.on_invalidate.invalidate();
        let old_value = self.old.borrow_mut().take();
        (self.callback)(&new_value, old_value.as_ref(), &self.on_invalidate);
        *self.old.borrow_mut() = Some(new_value);
    }
}

/// Handle to a running watcher. Dropping it leaves the watcher running.
#[derive(Clone)]
pub struct WatchHandle {
    id: EffectId,
    on_invalidate: OnInvalidate,
    runtime: Weak<ReactiveRuntime>,
}

impl WatchHandle {
    pub fn id(&self) -> EffectId {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.runtime
            .upgrade()
            .is_some_and(|runtime| runtime.is_observer_active(self.id))
    }

    /// Stop reacting and run any cleanup registered by the last callback.
    pub fn stop(&self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.remove_observer(self.id);
        }
        self.on_invalidate.invalidate();
    }
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle").field("id", &self.id).finish()
    }
}

/// Call `callback(new, old, on_invalidate)` whenever the value produced by
/// `source` is invalidated.
///
/// Without `immediate`, the first run only records the baseline old value.
///
/// # Example
///
/// ```ignore
/// let list = reactive(json!([]))?;
/// watch(
///     { let list = list.clone(); move || list.len() },
///     |new, old, _| println!("{old:?} -> {new}"),
///     WatchOptions::default(),
/// );
/// list.push(1);
/// list.push(2);
/// flush_jobs(); // prints "Some(0) -> 2" once
/// ```
pub fn watch<S, C>(source: S, callback: C, options: WatchOptions) -> WatchHandle
where
    S: WatchSource,
    C: Fn(&S::Output, Option<&S::Output>, &OnInvalidate) + 'static,
{
    let runtime = ReactiveRuntime::current();
    let getter = source.into_getter();
    let state = Rc::new(WatchState {
        effect: OnceCell::new(),
        old: RefCell::new(None),
        on_invalidate: OnInvalidate::default(),
        callback: Box::new(callback),
    });

    let flush = options.flush;
    let handle = runtime.handle();
    let effect = Effect::with_options(
        getter,
        EffectOptions::new().lazy(true).scheduler({
            let state = Rc::clone(&state);
            move |job: &Job| match flush {
                Flush::Sync => state.react(),
                Flush::Pre | Flush::Post => {
                    let Some(runtime) = handle.upgrade() else {
                        return;
                    };
                    let reaction = {
                        let state = Rc::clone(&state);
                        Job::new(job.id(), move || state.react())
                    };
                    if flush == Flush::Post {
                        runtime.queue_post_job(reaction);
                    } else {
                        runtime.queue_job(reaction);
                    }
                }
            }
        }),
    );
    let id = effect.id();
    let installed = state.effect.set(effect).is_ok();
    debug_assert!(installed, "watch effect set twice on a fresh cell");

    if options.immediate {
        state.react();
    } else if let Some(effect) = state.effect.get() {
        *state.old.borrow_mut() = Some(effect.run());
    }

    WatchHandle {
        id,
        on_invalidate: state.on_invalidate.clone(),
        runtime: runtime.handle(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::computed::computed;
    use crate::reactive::reactive;
    use crate::runtime::flush_jobs;
    use serde_json::json;
    use std::cell::Cell;

    #[test]
    fn immediate_fires_at_setup_without_old_value() {
        ReactiveRuntime::scope(|| {
            let state = reactive(json!({"a": 1})).unwrap();
            let calls = Rc::new(RefCell::new(Vec::new()));
            watch(
                {
                    let state = state.clone();
                    move || state.get("a")
                },
                {
                    let calls = calls.clone();
                    move |new: &Value, old: Option<&Value>, _: &OnInvalidate| {
                        calls.borrow_mut().push((new.clone(), old.cloned()))
                    }
                },
                WatchOptions {
                    immediate: true,
                    ..Default::default()
                },
            );
            assert_eq!(*calls.borrow(), vec![(Value::from(1), None)]);
        });
    }

    #[test]
    fn first_change_reports_old_and_new() {
        ReactiveRuntime::scope(|| {
            let state = reactive(json!({"a": 1})).unwrap();
            let calls = Rc::new(RefCell::new(Vec::new()));
            watch(
                {
                    let state = state.clone();
                    move || state.get("a")
                },
                {
                    let calls = calls.clone();
                    move |new: &Value, old: Option<&Value>, _: &OnInvalidate| {
                        calls.borrow_mut().push((new.clone(), old.cloned()))
                    }
                },
                WatchOptions::default(),
            );
            assert!(calls.borrow().is_empty());

            state.set("a", 2);
            flush_jobs();
            assert_eq!(*calls.borrow(), vec![(Value::from(2), Some(Value::from(1)))]);
        });
    }

    #[test]
    fn sync_flush_reacts_per_change() {
        ReactiveRuntime::scope(|| {
            let state = reactive(json!({"a": 1})).unwrap();
            let calls = Rc::new(Cell::new(0));
            watch(
                {
                    let state = state.clone();
                    move || state.get("a")
                },
                {
                    let calls = calls.clone();
                    move |_: &Value, _: Option<&Value>, _: &OnInvalidate| calls.set(calls.get() + 1)
                },
                WatchOptions {
                    flush: Flush::Sync,
                    ..Default::default()
                },
            );
            state.set("a", 2);
            state.set("a", 3);
            assert_eq!(calls.get(), 2);
        });
    }

    #[test]
    fn post_flush_waits_and_surfaces_the_last_value_once() {
        ReactiveRuntime::scope(|| {
            let state = reactive(json!({"a": 1})).unwrap();
            let calls = Rc::new(RefCell::new(Vec::new()));
            watch(
                {
                    let state = state.clone();
                    move || state.get("a")
                },
                {
                    let calls = calls.clone();
                    move |new: &Value, old: Option<&Value>, _: &OnInvalidate| {
                        calls.borrow_mut().push((new.clone(), old.cloned()))
                    }
                },
                WatchOptions {
                    flush: Flush::Post,
                    ..Default::default()
                },
            );
            state.set("a", 2);
            state.set("a", 3);
            assert!(calls.borrow().is_empty());

            flush_jobs();
            assert_eq!(*calls.borrow(), vec![(Value::from(3), Some(Value::from(1)))]);
        });
    }

    #[test]
    fn on_invalidate_runs_before_the_next_reaction() {
        ReactiveRuntime::scope(|| {
            let state = reactive(json!({"a": 1})).unwrap();
            let log = Rc::new(RefCell::new(Vec::<String>::new()));
            let handle = watch(
                {
                    let state = state.clone();
                    move || state.get("a")
                },
                {
                    let log = log.clone();
                    move |new: &Value, _: Option<&Value>, on_invalidate: &OnInvalidate| {
                        log.borrow_mut().push(format!("start {new}"));
                        let log = log.clone();
                        let new = new.clone();
                        on_invalidate.register(move || log.borrow_mut().push(format!("cancel {new}")));
                    }
                },
                WatchOptions {
                    flush: Flush::Sync,
                    ..Default::default()
                },
            );
            state.set("a", 2);
            state.set("a", 3);
            handle.stop();
            assert!(!handle.is_active());
            state.set("a", 4);
            assert_eq!(
                *log.borrow(),
                vec!["start 2", "cancel 2", "start 3", "cancel 3"]
            );
        });
    }

    #[test]
    fn watching_a_view_observes_nested_changes() {
        ReactiveRuntime::scope(|| {
            let state = reactive(json!({"user": {"tags": ["a"]}})).unwrap();
            let calls = Rc::new(Cell::new(0));
            watch(
                &state,
                {
                    let calls = calls.clone();
                    move |_: &View, _: Option<&View>, _: &OnInvalidate| calls.set(calls.get() + 1)
                },
                WatchOptions::default(),
            );
            let user = state.get("user");
            let tags = user.as_view().unwrap().get("tags");
            tags.as_view().unwrap().push("b");
            flush_jobs();
            assert_eq!(calls.get(), 1);
        });
    }

    #[test]
    fn traverse_survives_cycles() {
        ReactiveRuntime::scope(|| {
            let state = reactive(json!({"a": 1})).unwrap();
            state.set("me", &state);
            traverse(&state);
            assert_eq!(state.get("me"), Value::View(state.clone()));
        });
    }

    #[test]
    fn watching_a_computed_value() {
        ReactiveRuntime::scope(|| {
            let state = reactive(json!({"n": 1})).unwrap();
            let doubled = computed({
                let state = state.clone();
                move || state.get("n").as_f64().unwrap_or_default() * 2.0
            });
            let seen = Rc::new(RefCell::new(Vec::new()));
            watch(
                doubled,
                {
                    let seen = seen.clone();
                    move |new: &f64, old: Option<&f64>, _: &OnInvalidate| {
                        seen.borrow_mut().push((*new, old.copied()))
                    }
                },
                WatchOptions::default(),
            );
            state.set("n", 4);
            flush_jobs();
            assert_eq!(*seen.borrow(), vec![(8.0, Some(2.0))]);
        });
    }
}
