use crate::entity::{Entity, EntityKind};
use indexmap::IndexMap;
use std::sync::Arc;

/// Per-broker memo of resolved entities, one map per kind.
///
/// Entries keep insertion order. They are never overwritten in place; stale
/// ones are pruned so the next lookup goes back to the backend.
#[derive(Debug, Default)]
pub struct ReflectionCache {
    maps: [IndexMap<String, Arc<Entity>>; 4],
}

impl ReflectionCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, kind: EntityKind, name: &str) -> Option<&Arc<Entity>> {
        self.maps[kind.slot()].get(name)
    }

    /// Memoize `entity` under `name`; an existing entry wins
    pub fn insert(&mut self, kind: EntityKind, name: &str, entity: Arc<Entity>) -> Arc<Entity> {
        Arc::clone(
            self.maps[kind.slot()]
                .entry(name.to_string())
                .or_insert(entity),
        )
    }

    /// Drop every entry whose entity is no longer tokenized.
    ///
    /// Covers evicted units as well as internal classes and cached negative
    /// lookups, which a newly processed unit may now declare.
    pub fn prune_untokenized(&mut self) -> usize {
        let mut pruned = 0;
        for map in &mut self.maps {
            let before = map.len();
            map.retain(|_, entity| entity.is_tokenized());
            pruned += before - map.len();
        }
        pruned
    }

    #[must_use]
    pub fn len(&self, kind: EntityKind) -> usize {
        self.maps[kind.slot()].len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.maps.iter().all(IndexMap::is_empty)
    }

    /// Cached names of `kind` in insertion order
    pub fn names(&self, kind: EntityKind) -> impl Iterator<Item = &str> + '_ {
        self.maps[kind.slot()].keys().map(String::as_str)
    }

    pub fn clear(&mut self) {
        for map in &mut self.maps {
            map.clear();
        }
    }
}
