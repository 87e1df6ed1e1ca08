//! Sequence methods on [`View`].
//!
//! Mutating methods run with tracking paused: they read `length` and move
//! elements internally, and those reads must not become dependencies of the
//! calling effect. They are expressed as index and `length` writes through
//! the view so subscribers see exactly the changes a caller doing the same
//! writes by hand would produce.

use tracing::warn;

use super::View;
use crate::value::{same_value, strict_equals, Key, Value};

impl View {
    /// Replace `delete_count` elements at `start` with `items`, returning the
    /// removed elements.
    pub fn splice(&self, start: usize, delete_count: usize, items: Vec<Value>) -> Vec<Value> {
        if self.is_readonly() {
            warn!(start, delete_count, "splice on read-only view ignored");
            return Vec::new();
        }
        let Some(runtime) = self.runtime() else {
            return Vec::new();
        };
        let Some(current) = self.raw_items(&runtime) else {
            warn!(entity = ?self.raw(), "splice on a record ignored");
            return Vec::new();
        };

        let _paused = runtime.pause_tracking();
        let start = start.min(current.len());
        let end = start.saturating_add(delete_count).min(current.len());
        let mut next = current;
        let removed: Vec<Value> = next
            .splice(start..end, items.into_iter().map(Value::into_raw))
            .collect();

        for (index, value) in next.iter().enumerate().skip(start) {
            self.set(index, value.clone());
        }
        self.set(Key::Length, next.len());

        removed
            .into_iter()
            .map(|value| self.wrap_nested(&runtime, value))
            .collect()
    }

    /// Append a value, returning the new length.
    pub fn push(&self, value: impl Into<Value>) -> usize {
        let length = self.raw_len();
        self.splice(length, 0, vec![value.into()]);
        self.raw_len()
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> Value {
        match self.raw_len() {
            0 => Value::Undefined,
            length => self.splice(length - 1, 1, Vec::new()).pop().unwrap_or_default(),
        }
    }

    /// Remove and return the first element.
    pub fn shift(&self) -> Value {
        self.splice(0, 1, Vec::new()).pop().unwrap_or_default()
    }

    /// Prepend a value, returning the new length.
    pub fn unshift(&self, value: impl Into<Value>) -> usize {
        self.splice(0, 0, vec![value.into()]);
        self.raw_len()
    }

    pub fn insert(&self, index: usize, value: impl Into<Value>) {
        self.splice(index, 0, vec![value.into()]);
    }

    pub fn remove(&self, index: usize) -> Value {
        self.splice(index, 1, Vec::new()).pop().unwrap_or_default()
    }

    /// Whether the sequence contains `needle` (NaN matches NaN).
    pub fn includes(&self, needle: impl Into<Value>) -> bool {
        self.search(&needle.into(), false, same_value).is_some()
    }

    pub fn index_of(&self, needle: impl Into<Value>) -> Option<usize> {
        self.search(&needle.into(), false, strict_equals)
    }

    pub fn last_index_of(&self, needle: impl Into<Value>) -> Option<usize> {
        self.search(&needle.into(), true, strict_equals)
    }

    /// Search through the view first, so every element read is tracked and
    /// views compare by view identity. When that misses, retry on the raw
    /// elements by raw identity: a raw handle (or a view of another variant)
    /// never equals the wrapped element it corresponds to.
    fn search(
        &self,
        needle: &Value,
        reverse: bool,
        eq: fn(&Value, &Value) -> bool,
    ) -> Option<usize> {
        let length = self.len();
        let found = ordered(length, reverse).find(|index| eq(&self.get(*index), needle));
        found.or_else(|| {
            let runtime = self.runtime()?;
            let items = self.raw_items(&runtime)?;
            let needle = needle.clone().into_raw();
            ordered(items.len(), reverse).find(|index| eq(&items[*index], &needle))
        })
    }

    fn raw_len(&self) -> usize {
        self.runtime()
            .and_then(|runtime| {
                runtime.with_entity(self.raw(), |entity| {
                    if entity.is_sequence() {
                        entity.len()
                    } else {
                        0
                    }
                })
            })
            .unwrap_or(0)
    }
}

fn ordered(length: usize, reverse: bool) -> Box<dyn Iterator<Item = usize>> {
    if reverse {
        Box::new((0..length).rev())
    } else {
        Box::new(0..length)
    }
}
