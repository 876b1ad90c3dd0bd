//! Binding data model.
//!
//! An [`InstanceLock`] is a player's durable association with one saved copy
//! of a reset-scheduled dungeon. For instance-bound dungeons the progress
//! blob lives in a [`SharedInstanceState`](crate::shared::SharedInstanceState)
//! jointly owned by every binding of that copy; for flex and encounter-locked
//! dungeons each binding owns its progress outright.

use crate::shared::SharedInstanceState;
use chrono::{DateTime, Utc};
use map_catalog::{Difficulty, EncounterEntry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Persistent player identity, the character `guid` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerGuid(pub u64);

impl std::fmt::Display for PlayerGuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Player-{}", self.0)
    }
}

/// Opaque per-binding progress blob.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockProgress {
    /// Serialized dungeon state, owned by the script layer
    pub data: String,
    /// Bitmask of bosses killed within this binding
    pub completed_encounters_mask: u32,
    /// Saved return location on expulsion
    pub entrance_world_safe_loc_id: u32,
}

/// Outcome of the admission predicate.
///
/// `None` admits the transfer; the other values are delivered to the client
/// as transfer abort codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferAbort {
    None,
    LockedToDifferentInstance,
    AlreadyCompletedEncounter,
}

/// State change applied to a binding when an encounter completes.
#[derive(Debug, Clone)]
pub struct InstanceLockUpdateEvent {
    /// Saved copy the player is inside
    pub instance_id: u32,
    /// Replacement progress blob
    pub new_data: String,
    /// Instance-wide completion mask, mirrored into the player's mask for
    /// dungeons that do not use encounter locks
    pub instance_completed_encounters_mask: u32,
    /// Boss that was just killed, if any
    pub completed_encounter: Option<EncounterEntry>,
}

#[derive(Debug)]
enum LockBacking {
    Owned(LockProgress),
    Shared(Arc<SharedInstanceState>),
}

/// A player's binding to one saved copy of a dungeon.
///
/// `instance_id` stays `0` while the binding is temporary; it is assigned on
/// the first encounter completion, when the binding is promoted into the
/// permanent store.
#[derive(Debug)]
pub struct InstanceLock {
    map_id: u32,
    difficulty: Difficulty,
    instance_id: u32,
    expiry_time: DateTime<Utc>,
    extended: bool,
    backing: LockBacking,
}

impl InstanceLock {
    /// Creates a binding that owns its progress.
    pub fn new(
        map_id: u32,
        difficulty: Difficulty,
        expiry_time: DateTime<Utc>,
        instance_id: u32,
    ) -> Self {
        Self {
            map_id,
            difficulty,
            instance_id,
            expiry_time,
            extended: false,
            backing: LockBacking::Owned(LockProgress::default()),
        }
    }

    /// Creates a binding holding a strong reference to a shared record.
    pub(crate) fn shared(
        map_id: u32,
        difficulty: Difficulty,
        expiry_time: DateTime<Utc>,
        instance_id: u32,
        state: Arc<SharedInstanceState>,
    ) -> Self {
        Self {
            map_id,
            difficulty,
            instance_id,
            expiry_time,
            extended: false,
            backing: LockBacking::Shared(state),
        }
    }

    pub fn map_id(&self) -> u32 {
        self.map_id
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    pub fn instance_id(&self) -> u32 {
        self.instance_id
    }

    pub fn expiry_time(&self) -> DateTime<Utc> {
        self.expiry_time
    }

    pub fn is_extended(&self) -> bool {
        self.extended
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry_time < now
    }

    pub fn data(&self) -> String {
        match &self.backing {
            LockBacking::Owned(progress) => progress.data.clone(),
            LockBacking::Shared(state) => state.data(),
        }
    }

    pub fn completed_encounters_mask(&self) -> u32 {
        match &self.backing {
            LockBacking::Owned(progress) => progress.completed_encounters_mask,
            LockBacking::Shared(state) => state.completed_encounters_mask(),
        }
    }

    pub fn entrance_world_safe_loc_id(&self) -> u32 {
        match &self.backing {
            LockBacking::Owned(progress) => progress.entrance_world_safe_loc_id,
            LockBacking::Shared(state) => state.entrance_world_safe_loc_id(),
        }
    }

    pub(crate) fn set_extended(&mut self, extended: bool) {
        self.extended = extended;
    }

    pub(crate) fn set_expiry_time(&mut self, expiry_time: DateTime<Utc>) {
        self.expiry_time = expiry_time;
    }

    /// Assigns the saved copy this binding is bound to.
    ///
    /// A shared-backed binding forwards the id to its shared record: the
    /// record's id is assigned on promotion, not at creation.
    pub(crate) fn set_instance_id(&mut self, instance_id: u32) {
        self.instance_id = instance_id;
        if let LockBacking::Shared(state) = &self.backing {
            state.assign_instance_id(instance_id);
        }
    }

    pub(crate) fn set_data(&mut self, data: String) {
        match &mut self.backing {
            LockBacking::Owned(progress) => progress.data = data,
            LockBacking::Shared(state) => state.set_data(data),
        }
    }

    pub(crate) fn add_completed_encounters(&mut self, bits: u32) {
        match &mut self.backing {
            LockBacking::Owned(progress) => progress.completed_encounters_mask |= bits,
            LockBacking::Shared(state) => state.add_completed_encounters(bits),
        }
    }

    pub(crate) fn set_progress(&mut self, new_progress: LockProgress) {
        match &mut self.backing {
            LockBacking::Owned(progress) => *progress = new_progress,
            LockBacking::Shared(state) => state.set_progress(new_progress),
        }
    }

    pub(crate) fn shared_state(&self) -> Option<&Arc<SharedInstanceState>> {
        match &self.backing {
            LockBacking::Owned(_) => None,
            LockBacking::Shared(state) => Some(state),
        }
    }
}
