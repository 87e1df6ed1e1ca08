//! Tracked side effects.

mod effect;

pub use effect::{effect, effect_with, Effect, EffectOptions};
