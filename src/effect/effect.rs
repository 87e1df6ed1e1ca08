use std::fmt;
use std::rc::{Rc, Weak};

use crate::runtime::{Dependency, EffectId, Job, ReactiveRuntime, Scheduler};

/// Options for [`Effect::with_options`].
#[derive(Clone, Default)]
pub struct EffectOptions {
    pub(crate) lazy: bool,
    pub(crate) scheduler: Option<Scheduler>,
}

impl EffectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Do not run the effect on creation.
    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    /// Called with the effect's job instead of queueing it whenever a
    /// dependency changes.
    pub fn scheduler(mut self, scheduler: impl Fn(&Job) + 'static) -> Self {
        self.scheduler = Some(Rc::new(scheduler));
        self
    }
}

impl fmt::Debug for EffectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectOptions")
            .field("lazy", &self.lazy)
            .field("scheduler", &self.scheduler.is_some())
            .finish()
    }
}

/// A computation whose reads are tracked and which reruns when they change.
///
/// Each run first drops every dependency of the previous run, so branches not
/// taken this time are forgotten. The runtime keeps the effect alive until it
/// is disposed; dropping a handle does not stop it.
///
/// # Examples
///
/// ```ignore
/// let state = reactive(json!({"count": 0}))?;
/// let seen = Rc::new(Cell::new(0.0));
/// let _effect = Effect::new({
///     let (state, seen) = (state.clone(), seen.clone());
///     move || seen.set(state.get("count").as_f64().unwrap_or_default())
/// });
/// state.set("count", 5);
/// flush_jobs();
/// assert_eq!(seen.get(), 5.0);
/// ```
pub struct Effect<T = ()> {
    inner: Rc<EffectInner<T>>,
}

struct EffectInner<T> {
    id: EffectId,
    body: Box<dyn Fn() -> T>,
    runtime: Weak<ReactiveRuntime>,
}

impl<T> EffectInner<T> {
    fn run(&self) -> T {
        let Some(runtime) = self.runtime.upgrade() else {
            return (self.body)();
        };
        runtime.cleanup_observer(self.id);
        let _context = runtime.enter_observer(self.id);
        (self.body)()
    }
}

impl<T: 'static> Effect<T> {
    /// Create an effect and run it once to collect its dependencies.
    pub fn new<F>(body: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self::with_options(body, EffectOptions::default())
    }

    pub fn with_options<F>(body: F, options: EffectOptions) -> Self
    where
        F: Fn() -> T + 'static,
    {
        let runtime = ReactiveRuntime::current();
        let id = runtime.register_observer(options.scheduler);
        let inner = Rc::new(EffectInner {
            id,
            body: Box::new(body),
            runtime: runtime.handle(),
        });
        runtime.attach_job(id, {
            let inner = Rc::clone(&inner);
            Job::new(id, move || {
                inner.run();
            })
        });

        let effect = Self { inner };
        if !options.lazy {
            effect.run();
        }
        effect
    }
}

impl<T> Effect<T> {
    /// Run the body now, re-collecting dependencies, and return its result.
    pub fn run(&self) -> T {
        self.inner.run()
    }

    pub fn id(&self) -> EffectId {
        self.inner.id
    }

    /// Edges the effect subscribed to during its last run.
    pub fn deps(&self) -> Vec<Dependency> {
        self.inner
            .runtime
            .upgrade()
            .map(|runtime| runtime.observer_deps(self.inner.id))
            .unwrap_or_default()
    }

    pub fn is_active(&self) -> bool {
        self.inner
            .runtime
            .upgrade()
            .is_some_and(|runtime| runtime.is_observer_active(self.inner.id))
    }

    /// Unsubscribe from every dependency and drop any pending rerun. Running
    /// a disposed effect still calls the body but tracks nothing.
    pub fn dispose(&self) {
        if let Some(runtime) = self.inner.runtime.upgrade() {
            runtime.remove_observer(self.inner.id);
        }
    }
}

impl<T> Clone for Effect<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Effect<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect").field("id", &self.inner.id).finish()
    }
}

/// Create a new effect that runs now and again whenever anything it read
/// changes.
pub fn effect<T, F>(body: F) -> Effect<T>
where
    T: 'static,
    F: Fn() -> T + 'static,
{
    Effect::new(body)
}

/// Create an effect with explicit options.
pub fn effect_with<T, F>(body: F, options: EffectOptions) -> Effect<T>
where
    T: 'static,
    F: Fn() -> T + 'static,
{
    Effect::with_options(body, options)
}
