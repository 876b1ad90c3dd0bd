//! # Map Catalog - Dungeon Reference Data
//!
//! Read-only descriptors for maps, map difficulties and boss encounters,
//! plus the registry of live numeric instance identifiers. This crate plays
//! the same role for the instance lock system that a shared-types crate
//! plays for a server core: every other component consumes these types, none
//! of them owns them.
//!
//! ## Key Types
//!
//! - [`MapEntry`] / [`MapDifficultyEntry`] - static dungeon descriptors
//! - [`MapContext`] - a resolved `(map, difficulty)` pair with the locking
//!   discipline predicates
//! - [`EncounterEntry`] - boss descriptor carried by lock update events
//! - [`InstanceIdRegistry`] - concurrent set of instance ids currently in use
//!
//! ## Locking disciplines
//!
//! A map difficulty participates in the lock system only when it has a reset
//! schedule. Within that, three disciplines exist:
//!
//! * **Instance-bound** - neither flex-locking nor encounter locks; all
//!   bound players share one progress record.
//! * **Flex-locking** - admission compares per-boss completion masks.
//! * **Encounter locks** - locks are enforced per encounter, never at the
//!   zone boundary.

pub use catalog::{InstanceLockKey, MapCatalog, MapContext};
pub use entry::{Difficulty, EncounterEntry, MapDifficultyEntry, MapEntry, ResetInterval};
pub use registry::InstanceIdRegistry;

pub mod catalog;
pub mod entry;
pub mod registry;
