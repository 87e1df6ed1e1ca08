use thiserror::Error;

use crate::runtime::{EffectId, EntityId};
use crate::value::Key;

/// Errors reported by the reactive runtime.
///
/// Writes rejected by a view are logged and reported through a `false`
/// return value; the variants here surface from fallible constructors and
/// from [`FlushReport`](crate::runtime::FlushReport).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReactiveError {
    #[error("Only objects and arrays can be wrapped. Found: '{0}'")]
    NotAContainer(String),
    #[error("Entity {0:?} does not exist in this runtime")]
    UnknownEntity(EntityId),
    #[error("Key '{key}' is not valid for a {shape}")]
    InvalidKey { key: Key, shape: &'static str },
    #[error("Invalid sequence length: '{0}'")]
    InvalidLength(String),
    #[error("Job {job:?} panicked: {message}")]
    JobPanicked { job: EffectId, message: String },
    #[error("Job {job:?} was re-queued more than {limit} times in one flush")]
    RecursionLimit { job: EffectId, limit: usize },
}
