use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, warn};

use crate::runtime::{Entity, EntityId, ReactiveRuntime};
use crate::value::{same_value, ChangeKind, Key, TrackKey, Value};

/// Which of the four view variants to build.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct WrapOptions {
    /// Hand nested containers back raw instead of wrapping them.
    pub shallow: bool,
    /// Reject writes and skip tracking.
    pub read_only: bool,
}

impl WrapOptions {
    pub const REACTIVE: Self = Self {
        shallow: false,
        read_only: false,
    };
    pub const SHALLOW_REACTIVE: Self = Self {
        shallow: true,
        read_only: false,
    };
    pub const READONLY: Self = Self {
        shallow: false,
        read_only: true,
    };
    pub const SHALLOW_READONLY: Self = Self {
        shallow: true,
        read_only: true,
    };

    pub(crate) fn index(self) -> usize {
        usize::from(self.shallow) | (usize::from(self.read_only) << 1)
    }
}

/// An observable view of a raw entity.
///
/// Reads through a mutable view are recorded against the running effect;
/// writes that change a value notify the effects that read it. Views are
/// cached per (entity, variant), so wrapping the same entity twice with the
/// same options yields the same view (`View::ptr_eq`).
#[derive(Clone)]
pub struct View {
    inner: Rc<ViewInner>,
}

struct ViewInner {
    raw: EntityId,
    options: WrapOptions,
    runtime: Weak<ReactiveRuntime>,
}

impl View {
    pub(crate) fn new(raw: EntityId, options: WrapOptions, runtime: Weak<ReactiveRuntime>) -> Self {
        Self {
            inner: Rc::new(ViewInner {
                raw,
                options,
                runtime,
            }),
        }
    }

    /// The wrapped entity. Only used internally to compare identities and
    /// to unwrap values before they are stored.
    pub(crate) fn raw(&self) -> EntityId {
        self.inner.raw
    }

    pub fn options(&self) -> WrapOptions {
        self.inner.options
    }

    pub fn is_readonly(&self) -> bool {
        self.inner.options.read_only
    }

    pub fn is_shallow(&self) -> bool {
        self.inner.options.shallow
    }

    pub fn ptr_eq(a: &View, b: &View) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }

    pub(crate) fn runtime(&self) -> Option<Rc<ReactiveRuntime>> {
        let runtime = self.inner.runtime.upgrade();
        if runtime.is_none() {
            debug!(entity = ?self.raw(), "view used after its runtime was dropped");
        }
        runtime
    }

    fn track(&self, runtime: &ReactiveRuntime, key: TrackKey) {
        if !self.is_readonly() {
            runtime.track_read(self.raw(), key);
        }
    }

    /// Enumeration is observed through `length` on sequences and through the
    /// structural key on records.
    fn track_structure(&self, runtime: &ReactiveRuntime) {
        let key = if self.is_sequence_in(runtime) {
            TrackKey::Key(Key::Length)
        } else {
            TrackKey::Iterate
        };
        self.track(runtime, key);
    }

    fn is_sequence_in(&self, runtime: &ReactiveRuntime) -> bool {
        runtime
            .with_entity(self.raw(), Entity::is_sequence)
            .unwrap_or(false)
    }

    pub fn is_sequence(&self) -> bool {
        self.runtime()
            .is_some_and(|runtime| self.is_sequence_in(&runtime))
    }

    pub(crate) fn wrap_nested(&self, runtime: &ReactiveRuntime, value: Value) -> Value {
        if self.is_shallow() {
            return value;
        }
        match value {
            Value::Object(id) if runtime.contains_entity(id) => {
                Value::View(runtime.view(id, self.options()))
            }
            other => other,
        }
    }

    /// Raw elements of a sequence, read without tracking.
    pub(crate) fn raw_items(&self, runtime: &ReactiveRuntime) -> Option<Vec<Value>> {
        runtime
            .with_entity(self.raw(), |entity| match entity {
                Entity::Sequence(items) => Some(items.clone()),
                Entity::Record(_) => None,
            })
            .flatten()
    }

    pub fn has(&self, key: impl Into<Key>) -> bool {
        let Some(runtime) = self.runtime() else {
            return false;
        };
        let key = runtime.normalize_key(self.raw(), key.into());
        self.track(&runtime, TrackKey::Key(key.clone()));
        runtime
            .with_entity(self.raw(), |entity| entity.has(&key))
            .unwrap_or(false)
    }

    /// Property names of a record, or indices of a sequence.
    pub fn keys(&self) -> Vec<Key> {
        let Some(runtime) = self.runtime() else {
            return Vec::new();
        };
        self.track_structure(&runtime);
        runtime
            .with_entity(self.raw(), Entity::keys)
            .unwrap_or_default()
    }

    /// Number of elements of a sequence, or of properties of a record.
    pub fn len(&self) -> usize {
        let Some(runtime) = self.runtime() else {
            return 0;
        };
        self.track_structure(&runtime);
        runtime.with_entity(self.raw(), Entity::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: impl Into<Key>) -> Value {
        let Some(runtime) = self.runtime() else {
            return Value::Undefined;
        };
        let key = runtime.normalize_key(self.raw(), key.into());
        self.track(&runtime, TrackKey::Key(key.clone()));
        let value = runtime
            .with_entity(self.raw(), |entity| entity.get(&key))
            .unwrap_or_default();
        self.wrap_nested(&runtime, value)
    }

    pub fn values(&self) -> Vec<Value> {
        self.keys().into_iter().map(|key| self.get(key)).collect()
    }

    pub fn entries(&self) -> Vec<(Key, Value)> {
        self.keys()
            .into_iter()
            .map(|key| {
                let value = self.get(key.clone());
                (key, value)
            })
            .collect()
    }

    /// Write a value. Returns false when the write was rejected: read-only
    /// view, invalid key for the entity's shape, or released entity.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> bool {
        let key = key.into();
        if self.is_readonly() {
            warn!(key = %key, "set on read-only view ignored");
            return false;
        }
        let Some(runtime) = self.runtime() else {
            return false;
        };
        let key = runtime.normalize_key(self.raw(), key);
        let value = value.into().into_raw();
        let stored = value.clone();
        let write = match runtime.with_entity_mut(self.raw(), |entity| entity.set(&key, stored)) {
            Some(Ok(write)) => write,
            Some(Err(err)) => {
                warn!(%err, "write rejected");
                return false;
            }
            None => {
                warn!(key = %key, "write to a released entity ignored");
                return false;
            }
        };
        if !same_value(&write.old, &value) {
            let kind = if write.existed {
                ChangeKind::Overwrite
            } else {
                ChangeKind::Insert
            };
            runtime.notify_observers(self.raw(), &key, kind, Some(&value));
        }
        true
    }

    /// Import host data and store it under `key`.
    pub fn set_json(&self, key: impl Into<Key>, json: serde_json::Value) -> bool {
        let key = key.into();
        if self.is_readonly() {
            warn!(key = %key, "set on read-only view ignored");
            return false;
        }
        let Some(runtime) = self.runtime() else {
            return false;
        };
        let value = runtime.import_value(json);
        self.set(key, value)
    }

    /// Delete a key. Returns true if the key existed and was removed.
    pub fn delete(&self, key: impl Into<Key>) -> bool {
        let key = key.into();
        if self.is_readonly() {
            warn!(key = %key, "delete on read-only view ignored");
            return false;
        }
        let Some(runtime) = self.runtime() else {
            return false;
        };
        let key = runtime.normalize_key(self.raw(), key);
        match runtime.with_entity_mut(self.raw(), |entity| entity.delete(&key)) {
            Some(Ok(true)) => {
                runtime.notify_observers(self.raw(), &key, ChangeKind::Remove, None);
                true
            }
            Some(Ok(false)) | None => false,
            Some(Err(err)) => {
                warn!(%err, "delete rejected");
                false
            }
        }
    }

    /// The current raw data as JSON, read without tracking.
    pub fn snapshot(&self) -> serde_json::Value {
        self.runtime()
            .map(|runtime| runtime.export(self.raw()))
            .unwrap_or(serde_json::Value::Null)
    }
}

impl PartialEq for View {
    fn eq(&self, other: &Self) -> bool {
        View::ptr_eq(self, other)
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("raw", &self.inner.raw)
            .field("options", &self.inner.options)
            .finish()
    }
}
