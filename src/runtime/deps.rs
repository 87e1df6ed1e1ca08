use std::collections::HashMap;

use indexmap::IndexSet;

use super::{EffectId, EntityId};
use crate::value::{Key, TrackKey};

/// Subscription store: (entity, key) -> set of subscribed effects.
///
/// An edge lives only while it has at least one subscriber; empty sets are
/// pruned as soon as the last subscriber leaves.
#[derive(Default)]
pub(crate) struct DependencyGraph {
    edges: HashMap<EntityId, HashMap<TrackKey, IndexSet<EffectId>>>,
}

impl DependencyGraph {
    /// Returns true if the effect was not already subscribed to the edge.
    pub fn subscribe(&mut self, entity: EntityId, key: TrackKey, effect: EffectId) -> bool {
        self.edges
            .entry(entity)
            .or_default()
            .entry(key)
            .or_default()
            .insert(effect)
    }

    pub fn unsubscribe(&mut self, entity: EntityId, key: &TrackKey, effect: EffectId) {
        let Some(keys) = self.edges.get_mut(&entity) else {
            return;
        };
        if let Some(subscribers) = keys.get_mut(key) {
            subscribers.shift_remove(&effect);
            if subscribers.is_empty() {
                keys.remove(key);
            }
        }
        if keys.is_empty() {
            self.edges.remove(&entity);
        }
    }

    pub fn subscribers(&self, entity: EntityId, key: &TrackKey) -> impl Iterator<Item = EffectId> + '_ {
        self.edges
            .get(&entity)
            .and_then(|keys| keys.get(key))
            .into_iter()
            .flat_map(|subscribers| subscribers.iter().copied())
    }

    /// Subscribers of every index at or beyond `length`.
    pub fn index_subscribers_from(&self, entity: EntityId, length: usize) -> Vec<EffectId> {
        let Some(keys) = self.edges.get(&entity) else {
            return Vec::new();
        };
        let mut indexed: Vec<(usize, &IndexSet<EffectId>)> = keys
            .iter()
            .filter_map(|(key, subscribers)| match key {
                TrackKey::Key(Key::Index(index)) if *index >= length => Some((*index, subscribers)),
                _ => None,
            })
            .collect();
        indexed.sort_by_key(|(index, _)| *index);
        indexed
            .into_iter()
            .flat_map(|(_, subscribers)| subscribers.iter().copied())
            .collect()
    }

    /// Drops every edge of an entity.
    pub fn remove_entity(&mut self, entity: EntityId) {
        self.edges.remove(&entity);
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(HashMap::len).sum()
    }

    pub fn clear(&mut self) {
        self.edges.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn ids() -> (EntityId, EffectId, EffectId) {
        let mut entities: SlotMap<EntityId, ()> = SlotMap::with_key();
        let mut effects: SlotMap<EffectId, ()> = SlotMap::with_key();
        (entities.insert(()), effects.insert(()), effects.insert(()))
    }

    #[test]
    fn subscribe_is_idempotent() {
        let (entity, a, _) = ids();
        let mut graph = DependencyGraph::default();
        assert!(graph.subscribe(entity, Key::from("x").into(), a));
        assert!(!graph.subscribe(entity, Key::from("x").into(), a));
        assert_eq!(graph.subscribers(entity, &Key::from("x").into()).count(), 1);
    }

    #[test]
    fn last_unsubscribe_prunes_the_edge() {
        let (entity, a, b) = ids();
        let mut graph = DependencyGraph::default();
        let key: TrackKey = Key::from("x").into();
        graph.subscribe(entity, key.clone(), a);
        graph.subscribe(entity, key.clone(), b);
        graph.unsubscribe(entity, &key, a);
        assert_eq!(graph.edge_count(), 1);
        graph.unsubscribe(entity, &key, b);
        assert_eq!(graph.edge_count(), 0);
        assert!(graph.edges.is_empty());
    }

    #[test]
    fn indices_at_or_beyond_length() {
        let (entity, a, b) = ids();
        let mut graph = DependencyGraph::default();
        graph.subscribe(entity, Key::Index(0).into(), a);
        graph.subscribe(entity, Key::Index(2).into(), b);
        assert_eq!(graph.index_subscribers_from(entity, 1), vec![b]);
        assert_eq!(graph.index_subscribers_from(entity, 0), vec![a, b]);
    }
}
