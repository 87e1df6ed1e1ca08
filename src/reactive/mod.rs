//! Observable views over plain data.
//!
//! A view intercepts every read, write, delete and enumeration of the entity
//! it wraps and turns them into track and notify calls. Four variants exist:
//! deep or shallow, mutable or read-only.

mod sequence;
mod view;

pub use view::{View, WrapOptions};

use crate::error::ReactiveError;
use crate::runtime::{EntityId, ReactiveRuntime};

/// Anything that designates an entity to wrap.
pub trait IntoEntity {
    fn into_entity(self, runtime: &ReactiveRuntime) -> Result<EntityId, ReactiveError>;
}

impl IntoEntity for serde_json::Value {
    fn into_entity(self, runtime: &ReactiveRuntime) -> Result<EntityId, ReactiveError> {
        runtime.insert_json(self)
    }
}

impl IntoEntity for EntityId {
    fn into_entity(self, runtime: &ReactiveRuntime) -> Result<EntityId, ReactiveError> {
        if runtime.contains_entity(self) {
            Ok(self)
        } else {
            Err(ReactiveError::UnknownEntity(self))
        }
    }
}

impl IntoEntity for &View {
    fn into_entity(self, runtime: &ReactiveRuntime) -> Result<EntityId, ReactiveError> {
        self.raw().into_entity(runtime)
    }
}

impl IntoEntity for View {
    fn into_entity(self, runtime: &ReactiveRuntime) -> Result<EntityId, ReactiveError> {
        (&self).into_entity(runtime)
    }
}

/// Wrap an entity in the current runtime with the given variant.
///
/// Wrapping the same entity twice with the same options returns the same
/// view.
pub fn wrap(source: impl IntoEntity, options: WrapOptions) -> Result<View, ReactiveError> {
    let runtime = ReactiveRuntime::current();
    let id = source.into_entity(&runtime)?;
    Ok(runtime.view(id, options))
}

/// Deep, mutable view.
///
/// # Example
///
/// ```ignore
/// let state = reactive(json!({"user": {"name": "Ada"}}))?;
/// let user = state.get("user");
/// assert!(user.as_view().is_some());
/// ```
pub fn reactive(source: impl IntoEntity) -> Result<View, ReactiveError> {
    wrap(source, WrapOptions::REACTIVE)
}

/// Mutable view that hands nested containers back unwrapped.
pub fn shallow_reactive(source: impl IntoEntity) -> Result<View, ReactiveError> {
    wrap(source, WrapOptions::SHALLOW_REACTIVE)
}

/// Deep, read-only view. Writes are logged and ignored.
pub fn readonly(source: impl IntoEntity) -> Result<View, ReactiveError> {
    wrap(source, WrapOptions::READONLY)
}

pub fn shallow_readonly(source: impl IntoEntity) -> Result<View, ReactiveError> {
    wrap(source, WrapOptions::SHALLOW_READONLY)
}
