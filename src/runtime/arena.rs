use std::collections::HashSet;
use std::rc::Rc;

use indexmap::IndexMap;
use slotmap::{new_key_type, SlotMap};

use crate::error::ReactiveError;
use crate::value::{Key, Value};

new_key_type! {
    /// Handle to a raw entity owned by a runtime arena.
    pub struct EntityId;
}

/// Sequences are capped at 2^32 - 1 elements; larger lengths and the
/// indices past them are rejected.
const MAX_SEQUENCE_LENGTH: usize = u32::MAX as usize;

/// A plain container owned by the arena.
#[derive(Debug)]
pub(crate) enum Entity {
    Record(IndexMap<Rc<str>, Value>),
    Sequence(Vec<Value>),
}

/// Result of a native write: the previous value and whether the key existed.
#[derive(Debug)]
pub(crate) struct Write {
    pub old: Value,
    pub existed: bool,
}

impl Entity {
    pub fn is_sequence(&self) -> bool {
        matches!(self, Entity::Sequence(_))
    }

    fn shape(&self) -> &'static str {
        match self {
            Entity::Record(_) => "record",
            Entity::Sequence(_) => "sequence",
        }
    }

    /// Maps a key onto the addressing scheme of this entity.
    pub fn normalize(&self, key: Key) -> Key {
        match (self, key) {
            (Entity::Record(_), Key::Index(index)) => Key::Prop(index.to_string().into()),
            (Entity::Record(_), Key::Length) => Key::Prop("length".into()),
            (Entity::Sequence(_), Key::Prop(name)) => {
                if &*name == "length" {
                    Key::Length
                } else if let Ok(index) = name.parse::<usize>() {
                    Key::Index(index)
                } else {
                    Key::Prop(name)
                }
            }
            (_, key) => key,
        }
    }

    pub fn has(&self, key: &Key) -> bool {
        match (self, key) {
            (Entity::Record(map), Key::Prop(name)) => map.contains_key(name),
            (Entity::Sequence(items), Key::Index(index)) => *index < items.len(),
            (Entity::Sequence(_), Key::Length) => true,
            _ => false,
        }
    }

    pub fn get(&self, key: &Key) -> Value {
        match (self, key) {
            (Entity::Record(map), Key::Prop(name)) => map.get(name).cloned().unwrap_or_default(),
            (Entity::Sequence(items), Key::Index(index)) => {
                items.get(*index).cloned().unwrap_or_default()
            }
            (Entity::Sequence(items), Key::Length) => Value::from(items.len()),
            _ => Value::Undefined,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Entity::Record(map) => map.len(),
            Entity::Sequence(items) => items.len(),
        }
    }

    pub fn set(&mut self, key: &Key, value: Value) -> Result<Write, ReactiveError> {
        match (self, key) {
            (Entity::Record(map), Key::Prop(name)) => {
                let old = map.insert(name.clone(), value);
                Ok(Write {
                    existed: old.is_some(),
                    old: old.unwrap_or_default(),
                })
            }
            (Entity::Sequence(items), Key::Index(index)) => {
                if *index >= MAX_SEQUENCE_LENGTH {
                    return Err(ReactiveError::InvalidKey {
                        key: key.clone(),
                        shape: "sequence",
                    });
                }
                let existed = *index < items.len();
                if !existed {
                    resize(items, *index + 1).map_err(|_| ReactiveError::InvalidKey {
                        key: key.clone(),
                        shape: "sequence",
                    })?;
                }
                let old = std::mem::replace(&mut items[*index], value);
                Ok(Write { old, existed })
            }
            (Entity::Sequence(items), Key::Length) => {
                let length = value
                    .as_index()
                    .filter(|length| *length <= MAX_SEQUENCE_LENGTH)
                    .ok_or_else(|| ReactiveError::InvalidLength(value.to_string()))?;
                let old = Value::from(items.len());
                resize(items, length).map_err(|_| ReactiveError::InvalidLength(value.to_string()))?;
                Ok(Write { old, existed: true })
            }
            (entity, key) => Err(ReactiveError::InvalidKey {
                key: key.clone(),
                shape: entity.shape(),
            }),
        }
    }

    /// Removes a key, returning whether it existed.
    ///
    /// Sequence slots cannot be removed without shifting, so deleting an
    /// index leaves an `Undefined` hole; deleting a hole reports `false`.
    pub fn delete(&mut self, key: &Key) -> Result<bool, ReactiveError> {
        match (self, key) {
            (Entity::Record(map), Key::Prop(name)) => Ok(map.shift_remove(name).is_some()),
            (Entity::Sequence(items), Key::Index(index)) => match items.get_mut(*index) {
                Some(slot) if !slot.is_undefined() => {
                    *slot = Value::Undefined;
                    Ok(true)
                }
                _ => Ok(false),
            },
            (entity, key) => Err(ReactiveError::InvalidKey {
                key: key.clone(),
                shape: entity.shape(),
            }),
        }
    }

    pub fn keys(&self) -> Vec<Key> {
        match self {
            Entity::Record(map) => map.keys().map(|name| Key::Prop(name.clone())).collect(),
            Entity::Sequence(items) => (0..items.len()).map(Key::Index).collect(),
        }
    }
}

/// Storage for every raw entity known to a runtime.
#[derive(Default)]
pub(crate) struct Arena {
    entities: SlotMap<EntityId, Entity>,
}

impl Arena {
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(id)
    }

    pub fn insert(&mut self, entity: Entity) -> EntityId {
        self.entities.insert(entity)
    }

    pub fn remove(&mut self, id: EntityId) -> Option<Entity> {
        self.entities.remove(id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_sequence(&self, id: EntityId) -> bool {
        self.entities.get(id).is_some_and(Entity::is_sequence)
    }

    /// Imports a JSON object or array (and everything nested in it).
    pub fn import(&mut self, json: serde_json::Value) -> Result<EntityId, ReactiveError> {
        match self.import_value(json) {
            Value::Object(id) => Ok(id),
            other => Err(ReactiveError::NotAContainer(other.to_string())),
        }
    }

    pub fn import_value(&mut self, json: serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::from(s),
            serde_json::Value::Array(items) => {
                let items = items.into_iter().map(|item| self.import_value(item)).collect();
                Value::Object(self.insert(Entity::Sequence(items)))
            }
            serde_json::Value::Object(fields) => {
                let map = fields
                    .into_iter()
                    .map(|(name, field)| (Rc::from(name), self.import_value(field)))
                    .collect();
                Value::Object(self.insert(Entity::Record(map)))
            }
        }
    }

    /// Exports an entity as JSON. Cycles and released entities become `null`.
    pub fn export(&self, id: EntityId) -> serde_json::Value {
        let mut visiting = HashSet::new();
        self.export_entity(id, &mut visiting)
    }

    fn export_entity(&self, id: EntityId, visiting: &mut HashSet<EntityId>) -> serde_json::Value {
        let Some(entity) = self.entities.get(id) else {
            return serde_json::Value::Null;
        };
        if !visiting.insert(id) {
            return serde_json::Value::Null;
        }
        let json = match entity {
            Entity::Record(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(name, value)| (name.to_string(), self.export_value(value, visiting)))
                    .collect(),
            ),
            Entity::Sequence(items) => serde_json::Value::Array(
                items
                    .iter()
                    .map(|value| self.export_value(value, visiting))
                    .collect(),
            ),
        };
        visiting.remove(&id);
        json
    }

    fn export_value(&self, value: &Value, visiting: &mut HashSet<EntityId>) -> serde_json::Value {
        match value {
            Value::Undefined | Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => export_number(*n),
            Value::String(s) => serde_json::Value::String(s.to_string()),
            Value::Object(id) => self.export_entity(*id, visiting),
            Value::View(view) => self.export_entity(view.raw(), visiting),
        }
    }
}

fn export_number(n: f64) -> serde_json::Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

/// Grows or truncates a sequence, failing instead of aborting when the
/// allocation cannot be made.
fn resize(items: &mut Vec<Value>, length: usize) -> Result<(), std::collections::TryReserveError> {
    if length > items.len() {
        items.try_reserve_exact(length - items.len())?;
    }
    items.resize(length, Value::Undefined);
    Ok(())
}
