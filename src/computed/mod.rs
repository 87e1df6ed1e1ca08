//! Cached derived values.

mod computed;

pub use computed::{computed, Computed};
