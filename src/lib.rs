//! # Tinproxy
//!
//! Fine-grained reactive state for plain, nested data.
//!
//! Data lives in a per-thread runtime as records and sequences. Views wrap
//! that data and record which keys an effect reads; writes through a view
//! notify exactly the effects that read the written key.
//!
//! ## Views
//!
//! - [`reactive`] / [`shallow_reactive`] - mutable views, deep or one level
//! - [`readonly`] / [`shallow_readonly`] - views that log and ignore writes
//!
//! ## Derivations
//!
//! - [`Effect`] - reruns when anything it read changes
//! - [`Computed`] - lazily evaluated, cached value
//! - [`watch`] - old/new callbacks over a getter, a view or a computed value
//!
//! Reruns are queued and deduplicated; [`flush_jobs`] (or [`batch`]) is the
//! boundary at which they run.

pub mod computed;
pub mod effect;
pub mod error;
pub mod reactive;
pub mod runtime;
pub mod value;
pub mod watch;

// Re-export main types for convenience
pub use computed::{computed, Computed};
pub use effect::{effect, effect_with, Effect, EffectOptions};
pub use error::ReactiveError;
pub use reactive::{reactive, readonly, shallow_reactive, shallow_readonly, wrap, IntoEntity, View, WrapOptions};
pub use runtime::{
    batch, create_entity, flush_jobs, release_entity, Dependency, EffectId, EntityId, FlushReport, Job,
    ReactiveRuntime, RuntimeConfig,
};
pub use value::{same_value, ChangeKind, Key, TrackKey, Value};
pub use watch::{watch, Flush, OnInvalidate, WatchHandle, WatchOptions, WatchSource};
