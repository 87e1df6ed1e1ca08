//! Dynamic values and property keys.
//!
//! Wrapped data has no fixed schema, so reads and writes go through the
//! dynamically typed [`Value`] and are addressed by a [`Key`].

use std::fmt;
use std::rc::Rc;

use crate::reactive::View;
use crate::runtime::EntityId;

/// A value stored in (or read from) a wrapped entity.
///
/// Containers are never stored inline. A nested object or array is held by
/// handle as [`Value::Object`]; deep views hand it back as [`Value::View`].
#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Object(EntityId),
    View(View),
}

impl Value {
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_view(&self) -> Option<&View> {
        match self {
            Value::View(view) => Some(view),
            _ => None,
        }
    }

    /// Interprets the value as a sequence length or index.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Value::Number(n) if *n >= 0.0 && n.fract() == 0.0 && *n <= usize::MAX as f64 => {
                Some(*n as usize)
            }
            _ => None,
        }
    }

    /// The raw entity behind an object handle or a view.
    pub fn raw_entity(&self) -> Option<EntityId> {
        match self {
            Value::Object(id) => Some(*id),
            Value::View(view) => Some(view.raw()),
            _ => None,
        }
    }

    /// Strips any view wrapper so the value can be stored in an entity.
    pub(crate) fn into_raw(self) -> Value {
        match self {
            Value::View(view) => Value::Object(view.raw()),
            other => other,
        }
    }
}

/// Change detection equality: identity for containers, content for
/// scalars, and NaN equals NaN so rewriting NaN is not a change.
pub fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Object(a), Value::Object(b)) => a == b,
        (Value::View(a), Value::View(b)) => View::ptr_eq(a, b),
        _ => false,
    }
}

/// Strict equality used by `index_of`: like [`same_value`] except NaN never
/// matches.
pub(crate) fn strict_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a == b,
        _ => same_value(a, b),
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        same_value(self, other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Object(id) => write!(f, "[object {:?}]", id),
            Value::View(view) => write!(f, "[view {:?}]", view.raw()),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(value.into())
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Number(value.into())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value as f64)
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::Number(value as f64)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.into())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value.into())
    }
}

impl From<EntityId> for Value {
    fn from(value: EntityId) -> Self {
        Value::Object(value)
    }
}

impl From<View> for Value {
    fn from(value: View) -> Self {
        Value::View(value)
    }
}

impl From<&View> for Value {
    fn from(value: &View) -> Self {
        Value::View(value.clone())
    }
}

/// A property key on a wrapped entity.
///
/// Keys are normalised against the entity's shape when used: on a sequence
/// `"length"` means [`Key::Length`] and numeric names mean [`Key::Index`];
/// on a record both become plain property names.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    Prop(Rc<str>),
    Index(usize),
    Length,
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Prop(name) => write!(f, "{}", name),
            Key::Index(index) => write!(f, "{}", index),
            Key::Length => write!(f, "length"),
        }
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Prop(value.into())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::Prop(value.into())
    }
}

impl From<usize> for Key {
    fn from(value: usize) -> Self {
        Key::Index(value)
    }
}

impl From<u32> for Key {
    fn from(value: u32) -> Self {
        Key::Index(value as usize)
    }
}

impl From<i32> for Key {
    fn from(value: i32) -> Self {
        match usize::try_from(value) {
            Ok(index) => Key::Index(index),
            Err(_) => Key::Prop(value.to_string().into()),
        }
    }
}

/// A key as recorded in the subscription store.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TrackKey {
    Key(Key),
    /// The set of keys of an entity, observed by enumeration.
    Iterate,
}

impl fmt::Display for TrackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKey::Key(key) => key.fmt(f),
            TrackKey::Iterate => write!(f, "<iterate>"),
        }
    }
}

impl From<Key> for TrackKey {
    fn from(value: Key) -> Self {
        TrackKey::Key(value)
    }
}

/// The kind of mutation being reported to subscribers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    /// An existing key received a different value.
    Overwrite,
    /// A key that did not exist was added.
    Insert,
    /// An existing key was deleted.
    Remove,
}

impl ChangeKind {
    /// Whether the set of keys changed.
    pub fn is_structural(self) -> bool {
        matches!(self, ChangeKind::Insert | ChangeKind::Remove)
    }
}
