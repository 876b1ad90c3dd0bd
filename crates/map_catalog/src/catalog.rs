//! Catalog resolution and the locking discipline predicates.

use crate::entry::{Difficulty, MapDifficultyEntry, MapEntry};
use std::collections::HashMap;

/// Lookup key of a player's binding slot.
///
/// Bindings are keyed by `(map, lock group)`, not `(map, difficulty)`:
/// multiple difficulties sharing one lock group occupy a single slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceLockKey {
    pub map_id: u32,
    pub lock_id: i32,
}

/// In-memory store of map, difficulty and encounter descriptors.
///
/// Populated once during world startup from the static game data and treated
/// as read-only afterwards.
#[derive(Debug, Default)]
pub struct MapCatalog {
    maps: HashMap<u32, MapEntry>,
    map_difficulties: HashMap<(u32, Difficulty), MapDifficultyEntry>,
}

impl MapCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_map(&mut self, map: MapEntry) {
        self.maps.insert(map.id, map);
    }

    pub fn insert_map_difficulty(&mut self, map_difficulty: MapDifficultyEntry) {
        self.map_difficulties
            .insert((map_difficulty.map_id, map_difficulty.difficulty), map_difficulty);
    }

    /// Resolves a `(map, difficulty)` pair.
    ///
    /// # Panics
    ///
    /// Panics when either descriptor is missing. Callers only reach the lock
    /// system with ids taken from the catalog itself, so a miss is a
    /// programmer error, not a runtime condition.
    pub fn context(&self, map_id: u32, difficulty: Difficulty) -> MapContext<'_> {
        let map = self
            .maps
            .get(&map_id)
            .unwrap_or_else(|| panic!("map {map_id} missing from catalog"));
        let map_difficulty = self
            .map_difficulties
            .get(&(map_id, difficulty))
            .unwrap_or_else(|| panic!("map {map_id} has no difficulty {difficulty}"));
        MapContext { map, map_difficulty }
    }

    /// Non-panicking variant of [`MapCatalog::context`].
    pub fn get_context(&self, map_id: u32, difficulty: Difficulty) -> Option<MapContext<'_>> {
        Some(MapContext {
            map: self.maps.get(&map_id)?,
            map_difficulty: self.map_difficulties.get(&(map_id, difficulty))?,
        })
    }
}

/// A resolved `(map, difficulty)` descriptor pair.
#[derive(Debug, Clone, Copy)]
pub struct MapContext<'a> {
    pub map: &'a MapEntry,
    pub map_difficulty: &'a MapDifficultyEntry,
}

impl MapContext<'_> {
    /// The binding slot this variant occupies.
    pub fn key(&self) -> InstanceLockKey {
        InstanceLockKey {
            map_id: self.map_difficulty.map_id,
            lock_id: self.map_difficulty.lock_id,
        }
    }

    /// Whether all bound players share one progress record.
    ///
    /// True exactly when the map is neither flex-locking nor using encounter
    /// locks.
    pub fn is_instance_id_bound(&self) -> bool {
        !self.map.is_flex_locking() && !self.map_difficulty.is_using_encounter_locks()
    }
}
