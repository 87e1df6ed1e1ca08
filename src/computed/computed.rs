//! Lazily evaluated, cached derived values.
//!
//! # Invariants
//!
//! 1. The getter does not run until [`Computed::value`] is first called.
//! 2. After a dependency changes, the next `value()` recomputes exactly once;
//!    further reads return the cache until another change.
//! 3. Readers of `value()` are notified only on the clean -> dirty
//!    transition, through the `value` key of an internal holder entity.
//!
//! # Failure Modes
//!
//! - **Getter panics**: the dirty flag stays set so the next `value()`
//!   retries; the previous cached value is kept.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::effect::{Effect, EffectOptions};
use crate::runtime::{EntityId, ReactiveRuntime};
use crate::value::{ChangeKind, Key, TrackKey};

const VALUE_KEY: &str = "value";

/// A derived value recomputed on demand.
///
/// Cloning a `Computed` creates a new handle to the **same** inner state.
/// The underlying effect is disposed when the last handle is dropped.
pub struct Computed<T> {
    inner: Rc<ComputedInner<T>>,
}

struct ComputedInner<T> {
    effect: Effect<T>,
    cached: RefCell<Option<T>>,
    dirty: Cell<bool>,
    holder: EntityId,
    runtime: Weak<ReactiveRuntime>,
}

impl<T> ComputedInner<T> {
    fn invalidate(&self) {
        if self.dirty.replace(true) {
            return;
        }
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.notify_observers(self.holder, &Key::from(VALUE_KEY), ChangeKind::Overwrite, None);
        }
    }
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.remove_observer(self.effect.id());
            runtime.release_entity(self.holder);
        }
    }
}

impl<T: Clone + 'static> Computed<T> {
    pub fn new<F>(getter: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        let runtime = ReactiveRuntime::current();
        let holder = runtime.alloc_record();
        let inner = Rc::new_cyclic(|weak: &Weak<ComputedInner<T>>| {
            let weak = weak.clone();
            let effect = Effect::with_options(
                getter,
                EffectOptions::new().lazy(true).scheduler(move |_| {
                    if let Some(inner) = weak.upgrade() {
                        inner.invalidate();
                    }
                }),
            );
            ComputedInner {
                effect,
                cached: RefCell::new(None),
                dirty: Cell::new(true), // Dirty initially, computes on first read.
                holder,
                runtime: runtime.handle(),
            }
        });
        Self { inner }
    }

    /// The current value, recomputed first if a dependency changed.
    ///
    /// Reading inside an effect makes that effect depend on this value.
    pub fn value(&self) -> T {
        let cached = if self.inner.dirty.get() {
            None
        } else {
            self.inner.cached.borrow().clone()
        };
        let value = match cached {
            Some(value) => value,
            None => self.recompute(),
        };
        if let Some(runtime) = self.inner.runtime.upgrade() {
            runtime.track_read(self.inner.holder, TrackKey::Key(Key::from(VALUE_KEY)));
        }
        value
    }

    fn recompute(&self) -> T {
        let value = self.inner.effect.run();
        *self.inner.cached.borrow_mut() = Some(value.clone());
        self.inner.dirty.set(false);
        value
    }
}

impl<T> Computed<T> {
    /// Whether the next `value()` will run the getter.
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("cached", &self.inner.cached.borrow())
            .field("dirty", &self.inner.dirty.get())
            .finish()
    }
}

/// Create a new computed value.
///
/// # Example
///
/// ```ignore
/// let state = reactive(json!({"count": 5}))?;
/// let doubled = computed({
///     let state = state.clone();
///     move || state.get("count").as_f64().unwrap_or_default() * 2.0
/// });
/// assert_eq!(doubled.value(), 10.0);
/// ```
pub fn computed<T, F>(getter: F) -> Computed<T>
where
    T: Clone + 'static,
    F: Fn() -> T + 'static,
{
    Computed::new(getter)
}
