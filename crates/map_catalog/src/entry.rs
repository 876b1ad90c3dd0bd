//! Static dungeon descriptors.
//!
//! These records are reference data: loaded once at startup and never
//! mutated. The lock manager reads them through [`crate::MapContext`].

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Dungeon difficulty identifier.
///
/// Thin wrapper around the numeric difficulty id so it cannot be confused
/// with map or instance ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Difficulty(pub u8);

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reset cadence of a map difficulty.
///
/// Difficulties with [`ResetInterval::Never`] do not participate in the lock
/// system at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResetInterval {
    Never,
    Daily,
    Weekly,
}

/// Descriptor of one map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapEntry {
    /// Numeric map id
    pub id: u32,
    /// Display name, used in logs
    pub name: String,
    /// Whether this map uses flex-locking admission
    pub flex_locking: bool,
}

impl MapEntry {
    pub fn is_flex_locking(&self) -> bool {
        self.flex_locking
    }
}

/// Descriptor of one `(map, difficulty)` variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapDifficultyEntry {
    /// Map this variant belongs to
    pub map_id: u32,
    /// Difficulty of this variant
    pub difficulty: Difficulty,
    /// Lock group id; multiple difficulties may share one lock group
    pub lock_id: i32,
    /// Reset cadence of bindings created for this variant
    pub reset_interval: ResetInterval,
    /// Whether locks are enforced per encounter instead of per instance
    pub encounter_locks: bool,
}

impl MapDifficultyEntry {
    /// Whether this variant participates in the lock system.
    pub fn has_reset_schedule(&self) -> bool {
        self.reset_interval != ResetInterval::Never
    }

    pub fn is_using_encounter_locks(&self) -> bool {
        self.encounter_locks
    }

    /// Length of one reset period.
    pub fn raid_duration(&self) -> Duration {
        match self.reset_interval {
            ResetInterval::Never => Duration::zero(),
            ResetInterval::Daily => Duration::days(1),
            ResetInterval::Weekly => Duration::days(7),
        }
    }
}

/// Descriptor of one boss encounter.
///
/// `bit` is the encounter's position inside the completed-encounters mask of
/// a binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncounterEntry {
    pub id: u32,
    pub name: String,
    pub bit: u8,
}
