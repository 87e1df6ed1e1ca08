use std::cell::RefCell;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use indexmap::IndexSet;
use slotmap::{new_key_type, SlotMap};
use tracing::{debug, error, trace};

use super::arena::{Arena, Entity, EntityId};
use super::deps::DependencyGraph;
use super::scheduler::{FlushReport, Job, JobQueue};
use crate::error::ReactiveError;
use crate::reactive::{View, WrapOptions};
use crate::value::{ChangeKind, Key, TrackKey, Value};

new_key_type! {
    /// Identifier of an effect registered with a runtime.
    pub struct EffectId;
}

/// Custom rerun hook installed on an effect; receives the effect's own job.
pub type Scheduler = Rc<dyn Fn(&Job)>;

/// One edge an effect currently subscribes to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dependency {
    pub entity: EntityId,
    pub key: TrackKey,
}

/// Tunables for a runtime.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// How many times one job may be re-queued within a single flush before
    /// it is dropped as a runaway cycle.
    pub recursion_limit: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { recursion_limit: 100 }
    }
}

/// A registered effect: its current edges, rerun hook and job.
struct Observer {
    deps: Vec<(EntityId, TrackKey)>,
    scheduler: Option<Scheduler>,
    job: Option<Job>,
}

/// Execution context entry. A paused frame keeps the running observer (so
/// it is still excluded from its own notifications) but records nothing.
#[derive(Clone, Copy)]
struct Frame {
    observer: Option<EffectId>,
    tracking: bool,
}

/// Reactive context for tracking dependencies.
#[derive(Default)]
struct ReactiveContext {
    stack: Vec<Frame>,
    arena: Arena,
    graph: DependencyGraph,
    observers: SlotMap<EffectId, Observer>,
    queue: JobQueue,
    // One identity map per wrap variant, indexed by `WrapOptions::index`.
    views: [HashMap<EntityId, View>; 4],
}

impl ReactiveContext {
    fn active_observer(&self) -> Option<EffectId> {
        self.stack.last().and_then(|frame| frame.observer)
    }

    fn tracking_observer(&self) -> Option<EffectId> {
        self.stack
            .last()
            .filter(|frame| frame.tracking)
            .and_then(|frame| frame.observer)
    }
}

/// Reactive runtime owning entities, subscriptions and the job queue.
///
/// Every thread has a global runtime; scoped runtimes can be pushed on top
/// of it for isolation. Handles created inside a runtime keep a weak
/// reference to it and become inert once it is dropped.
///
/// # Examples
///
/// ```
/// use tinproxy::runtime::ReactiveRuntime;
/// use tinproxy::reactive;
///
/// ReactiveRuntime::scope(|| {
///     let state = reactive(serde_json::json!({"count": 1})).unwrap();
///     assert_eq!(state.get("count").as_f64(), Some(1.0));
/// });
/// // Runtime and all its state is dropped here
/// ```
pub struct ReactiveRuntime {
    config: RuntimeConfig,
    this: Weak<ReactiveRuntime>,
    context: RefCell<ReactiveContext>,
}

// Thread-local stack for scoped runtimes
thread_local! {
    static RUNTIME_STACK: RefCell<Vec<Rc<ReactiveRuntime>>> = const { RefCell::new(Vec::new()) };
    static GLOBAL_RUNTIME: Rc<ReactiveRuntime> = ReactiveRuntime::new();
}

impl ReactiveRuntime {
    /// Create a new isolated runtime.
    pub fn new() -> Rc<Self> {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Rc<Self> {
        Rc::new_cyclic(|this| ReactiveRuntime {
            config,
            this: this.clone(),
            context: RefCell::new(ReactiveContext::default()),
        })
    }

    /// Run a function with a fresh isolated runtime.
    ///
    /// The runtime and all its state is cleaned up when the function
    /// returns.
    pub fn scope<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let runtime = Self::new();
        let result = Self::with_runtime(runtime.clone(), f);
        runtime.clear();
        result
    }

    /// The runtime of this thread used when no scoped runtime is active.
    pub fn global() -> Rc<Self> {
        GLOBAL_RUNTIME.with(Rc::clone)
    }

    /// Get the current reactive runtime (scoped or global fallback).
    pub fn current() -> Rc<Self> {
        RUNTIME_STACK.with(|stack| stack.borrow().last().cloned().unwrap_or_else(Self::global))
    }

    /// Run a function with a specific runtime as the current context.
    pub fn with_runtime<F, R>(runtime: Rc<Self>, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        RUNTIME_STACK.with(|stack| {
            stack.borrow_mut().push(runtime);
        });

        let result = panic::catch_unwind(AssertUnwindSafe(f));

        RUNTIME_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });

        match result {
            Ok(r) => r,
            Err(e) => panic::resume_unwind(e),
        }
    }

    /// Clear all entities, effects, subscriptions and pending jobs.
    pub fn clear(&self) {
        let old = std::mem::take(&mut *self.context.borrow_mut());
        debug!(
            entities = old.arena.len(),
            effects = old.observers.len(),
            "clearing runtime"
        );
        // User closures owned by the old state may touch the runtime on drop.
        drop(old);
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub(crate) fn handle(&self) -> Weak<ReactiveRuntime> {
        self.this.clone()
    }

    // ---- entities ----

    pub fn insert_json(&self, json: serde_json::Value) -> Result<EntityId, ReactiveError> {
        self.context.borrow_mut().arena.import(json)
    }

    /// Converts host data to a storable value, importing any containers.
    pub fn import_value(&self, json: serde_json::Value) -> Value {
        self.context.borrow_mut().arena.import_value(json)
    }

    pub(crate) fn alloc_record(&self) -> EntityId {
        self.context
            .borrow_mut()
            .arena
            .insert(Entity::Record(Default::default()))
    }

    pub fn contains_entity(&self, id: EntityId) -> bool {
        self.context.borrow().arena.contains(id)
    }

    pub fn entity_count(&self) -> usize {
        self.context.borrow().arena.len()
    }

    /// Removes an entity together with its subscription edges and cached
    /// views. Entities it references are left alone.
    pub fn release_entity(&self, id: EntityId) -> bool {
        let (entity, views) = {
            let mut context = self.context.borrow_mut();
            let entity = context.arena.remove(id);
            context.graph.remove_entity(id);
            let views: Vec<View> = context
                .views
                .iter_mut()
                .filter_map(|cache| cache.remove(&id))
                .collect();
            (entity, views)
        };
        debug!(entity = ?id, released = entity.is_some(), "release entity");
        drop(views);
        entity.is_some()
    }

    pub(crate) fn with_entity<R>(&self, id: EntityId, f: impl FnOnce(&Entity) -> R) -> Option<R> {
        self.context.borrow().arena.get(id).map(f)
    }

    pub(crate) fn with_entity_mut<R>(
        &self,
        id: EntityId,
        f: impl FnOnce(&mut Entity) -> R,
    ) -> Option<R> {
        self.context.borrow_mut().arena.get_mut(id).map(f)
    }

    pub(crate) fn normalize_key(&self, id: EntityId, key: Key) -> Key {
        match self.context.borrow().arena.get(id) {
            Some(entity) => entity.normalize(key),
            None => key,
        }
    }

    pub fn export(&self, id: EntityId) -> serde_json::Value {
        self.context.borrow().arena.export(id)
    }

    // ---- views ----

    /// The cached view of an entity for one wrap variant.
    pub(crate) fn view(&self, id: EntityId, options: WrapOptions) -> View {
        let mut context = self.context.borrow_mut();
        context.views[options.index()]
            .entry(id)
            .or_insert_with(|| View::new(id, options, self.handle()))
            .clone()
    }

    // ---- observers ----

    pub(crate) fn register_observer(&self, scheduler: Option<Scheduler>) -> EffectId {
        let id = self.context.borrow_mut().observers.insert(Observer {
            deps: Vec::new(),
            scheduler,
            job: None,
        });
        debug!(effect = ?id, "register effect");
        id
    }

    /// Install the job that reruns an observer. Observers without a job are
    /// never notified.
    pub(crate) fn attach_job(&self, id: EffectId, job: Job) {
        let previous = match self.context.borrow_mut().observers.get_mut(id) {
            Some(observer) => observer.job.replace(job),
            None => Some(job),
        };
        drop(previous);
    }

    /// Dispose an observer: unsubscribe it everywhere and drop pending jobs.
    pub fn remove_observer(&self, id: EffectId) -> bool {
        let (observer, jobs) = {
            let mut context = self.context.borrow_mut();
            let context = &mut *context;
            let observer = context.observers.remove(id);
            if let Some(observer) = &observer {
                for (entity, key) in &observer.deps {
                    context.graph.unsubscribe(*entity, key, id);
                }
            }
            (observer, context.queue.remove(id))
        };
        debug!(effect = ?id, removed = observer.is_some(), "dispose effect");
        drop(jobs);
        observer.is_some()
    }

    /// Unsubscribe an observer from every edge it read during its last run.
    pub(crate) fn cleanup_observer(&self, id: EffectId) {
        let mut context = self.context.borrow_mut();
        let context = &mut *context;
        let Some(observer) = context.observers.get_mut(id) else {
            return;
        };
        for (entity, key) in observer.deps.drain(..) {
            context.graph.unsubscribe(entity, &key, id);
        }
    }

    pub fn is_observer_active(&self, id: EffectId) -> bool {
        self.context.borrow().observers.contains_key(id)
    }

    pub fn observer_count(&self) -> usize {
        self.context.borrow().observers.len()
    }

    pub fn edge_count(&self) -> usize {
        self.context.borrow().graph.edge_count()
    }

    pub(crate) fn observer_deps(&self, id: EffectId) -> Vec<Dependency> {
        self.context
            .borrow()
            .observers
            .get(id)
            .map(|observer| {
                observer
                    .deps
                    .iter()
                    .map(|(entity, key)| Dependency {
                        entity: *entity,
                        key: key.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    // ---- execution context ----

    /// Make `id` the current observer until the guard is dropped.
    pub(crate) fn enter_observer(&self, id: EffectId) -> ContextGuard<'_> {
        self.push_frame(Frame {
            observer: Some(id),
            tracking: true,
        })
    }

    /// Stop recording reads until the guard is dropped.
    pub(crate) fn pause_tracking(&self) -> ContextGuard<'_> {
        let observer = self.active_observer();
        self.push_frame(Frame {
            observer,
            tracking: false,
        })
    }

    fn push_frame(&self, frame: Frame) -> ContextGuard<'_> {
        self.context.borrow_mut().stack.push(frame);
        ContextGuard { runtime: self }
    }

    pub fn active_observer(&self) -> Option<EffectId> {
        self.context.borrow().active_observer()
    }

    // ---- track / trigger ----

    /// Track a read of (entity, key) by the current observer.
    pub fn track_read(&self, entity: EntityId, key: TrackKey) {
        let mut context = self.context.borrow_mut();
        let Some(observer) = context.tracking_observer() else {
            return;
        };
        let context = &mut *context;
        let Some(slot) = context.observers.get_mut(observer) else {
            return;
        };
        if context.graph.subscribe(entity, key.clone(), observer) {
            trace!(entity = ?entity, key = %key, effect = ?observer, "track");
            slot.deps.push((entity, key));
        }
    }

    /// Notify all observers that depend on (entity, key).
    ///
    /// The running observer is never notified of its own writes. Sequence
    /// inserts also reach `length` subscribers, a shrinking `length` reaches
    /// subscribers of the indices cut off, and structural changes reach
    /// enumeration subscribers.
    pub fn notify_observers(
        &self,
        entity: EntityId,
        key: &Key,
        kind: ChangeKind,
        new_value: Option<&Value>,
    ) {
        let targets: Vec<(Job, Option<Scheduler>)> = {
            let context = self.context.borrow();
            let graph = &context.graph;
            let mut effects: IndexSet<EffectId> =
                graph.subscribers(entity, &TrackKey::Key(key.clone())).collect();

            if context.arena.is_sequence(entity) {
                if kind == ChangeKind::Insert && matches!(key, Key::Index(_)) {
                    effects.extend(graph.subscribers(entity, &TrackKey::Key(Key::Length)));
                }
                if *key == Key::Length {
                    if let Some(length) = new_value.and_then(Value::as_index) {
                        effects.extend(graph.index_subscribers_from(entity, length));
                    }
                }
            }
            if kind.is_structural() {
                effects.extend(graph.subscribers(entity, &TrackKey::Iterate));
            }

            let active = context.active_observer();
            effects
                .into_iter()
                .filter(|id| Some(*id) != active)
                .filter_map(|id| context.observers.get(id))
                .filter_map(|observer| {
                    let job = observer.job.clone()?;
                    Some((job, observer.scheduler.clone()))
                })
                .collect()
        };

        trace!(entity = ?entity, key = %key, ?kind, targets = targets.len(), "trigger");

        for (job, scheduler) in targets {
            match scheduler {
                Some(scheduler) => scheduler(&job),
                None => self.queue_job(job),
            }
        }
    }

    // ---- job queue ----

    /// Queue a job for the next flush, coalescing duplicates.
    pub fn queue_job(&self, job: Job) {
        let rejected = self.context.borrow_mut().queue.enqueue(job);
        drop(rejected);
    }

    /// Queue a job that runs after every regular job of the flush.
    pub fn queue_post_job(&self, job: Job) {
        let rejected = self.context.borrow_mut().queue.enqueue_post(job);
        drop(rejected);
    }

    pub fn has_pending_jobs(&self) -> bool {
        !self.context.borrow().queue.is_empty()
    }

    /// Run every pending job, including jobs queued while flushing.
    ///
    /// A flush requested while one is already running is a no-op. Panics
    /// are contained per job and reported in the returned [`FlushReport`].
    pub fn flush_jobs(&self) -> FlushReport {
        let mut report = FlushReport::default();
        {
            let mut context = self.context.borrow_mut();
            if context.queue.flushing {
                return report;
            }
            context.queue.flushing = true;
        }
        let _flushing = FlushGuard { runtime: self };
        debug!(pending = self.context.borrow().queue.len(), "flush jobs");

        let mut runs: HashMap<EffectId, usize> = HashMap::new();
        loop {
            let next = self.context.borrow_mut().queue.next();
            let Some(job) = next else {
                break;
            };

            let count = runs.entry(job.id()).or_default();
            *count += 1;
            if *count > self.config.recursion_limit {
                let err = ReactiveError::RecursionLimit {
                    job: job.id(),
                    limit: self.config.recursion_limit,
                };
                error!(%err, "dropping job");
                report.failures.push(err);
                continue;
            }

            match panic::catch_unwind(AssertUnwindSafe(|| job.run())) {
                Ok(()) => report.ran += 1,
                Err(payload) => {
                    let err = ReactiveError::JobPanicked {
                        job: job.id(),
                        message: panic_message(payload.as_ref()),
                    };
                    error!(%err, "job failed");
                    report.failures.push(err);
                }
            }
        }
        report
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Pops the execution context frame pushed by `enter_observer` or
/// `pause_tracking`, also when the body unwinds.
pub(crate) struct ContextGuard<'a> {
    runtime: &'a ReactiveRuntime,
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        self.runtime.context.borrow_mut().stack.pop();
    }
}

struct FlushGuard<'a> {
    runtime: &'a ReactiveRuntime,
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.runtime.context.borrow_mut().queue.flushing = false;
    }
}
