//! Runtime support for reactive primitives.
//!
//! This module provides the infrastructure for dependency tracking: the
//! entity arena, the subscription store, the execution context stack and
//! the batching job queue.

mod arena;
mod context;
mod deps;
mod scheduler;

pub(crate) use arena::Entity;
pub use arena::EntityId;
pub use context::{Dependency, EffectId, ReactiveRuntime, RuntimeConfig, Scheduler};
pub use scheduler::{FlushReport, Job};

/// Import host data into the current runtime and return its raw handle.
pub fn create_entity(json: serde_json::Value) -> Result<EntityId, crate::ReactiveError> {
    ReactiveRuntime::current().insert_json(json)
}

/// Remove an entity from the current runtime, with its edges and views.
pub fn release_entity(id: EntityId) -> bool {
    ReactiveRuntime::current().release_entity(id)
}

/// Run every job queued on the current runtime.
///
/// This is the end-of-turn boundary: mutations made since the last flush
/// are coalesced and each affected effect reruns once.
pub fn flush_jobs() -> FlushReport {
    ReactiveRuntime::current().flush_jobs()
}

/// Run `f` as one synchronous turn, then flush the jobs it queued.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    let result = f();
    let report = flush_jobs();
    if !report.is_ok() {
        tracing::warn!(failures = report.failures.len(), "batch flush reported failures");
    }
    result
}
