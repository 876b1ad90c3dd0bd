//! The instance lock manager.
//!
//! Tracks which players are bound to which saved copies of reset-scheduled
//! dungeons. Bindings live in two disjoint stores keyed by player and lock
//! group: *temporary* bindings are created when a fresh instance is entered
//! and carry no instance id yet; the first encounter completion promotes
//! them into the *permanent* store. Expiry is evaluated on access against
//! the reset schedule; there is no background sweep.
//!
//! All mutation is serialized through the world's main tick. No operation
//! suspends; persistence statements are queued onto a caller-supplied
//! transaction or fired through the database handle, and a separate writer
//! task drains them.

use crate::clock::WorldClock;
use crate::config::ResetScheduleConfig;
use crate::lock::{InstanceLock, InstanceLockUpdateEvent, PlayerGuid, TransferAbort};
use crate::persistence::{self, CharacterDatabase, CharacterLockRow, InstanceRow, Transaction};
use crate::reset;
use crate::shared::{SharedInstanceRegistry, SharedInstanceState};
use chrono::{DateTime, Utc};
use map_catalog::{Difficulty, InstanceIdRegistry, InstanceLockKey, MapCatalog, MapContext};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};

type LockStore = HashMap<PlayerGuid, HashMap<InstanceLockKey, InstanceLock>>;

/// Authority over instance bindings for the whole world.
///
/// Constructed once at world startup with its collaborators and owned by
/// the world; see [`InstanceLockManager::load`] and
/// [`InstanceLockManager::unload`] for the lifecycle around it.
pub struct InstanceLockManager {
    catalog: Arc<MapCatalog>,
    clock: Arc<dyn WorldClock>,
    reset_config: ResetScheduleConfig,
    db: CharacterDatabase,
    registry: Arc<SharedInstanceRegistry>,
    permanent: LockStore,
    temporary: LockStore,
}

impl InstanceLockManager {
    pub fn new(
        catalog: Arc<MapCatalog>,
        clock: Arc<dyn WorldClock>,
        reset_config: ResetScheduleConfig,
        db: CharacterDatabase,
    ) -> Self {
        let registry = SharedInstanceRegistry::new(db.clone());
        Self {
            catalog,
            clock,
            reset_config,
            db,
            registry,
            permanent: LockStore::new(),
            temporary: LockStore::new(),
        }
    }

    /// Hydrates the manager from the two persisted tables.
    ///
    /// Shared records are indexed first; binding rows of instance-bound
    /// dungeons then attach to them. A binding row whose shared record is
    /// missing is corruption: the row is deleted and load continues. Every
    /// persisted instance id is registered so the world cannot hand it out
    /// again.
    pub fn load(
        &mut self,
        instance_rows: Vec<InstanceRow>,
        lock_rows: Vec<CharacterLockRow>,
        instance_ids: &InstanceIdRegistry,
    ) {
        let mut shared_by_id: HashMap<u32, Arc<SharedInstanceState>> =
            HashMap::with_capacity(instance_rows.len());
        for row in instance_rows {
            let state = SharedInstanceState::from_row(
                &self.registry,
                row.instance_id,
                crate::lock::LockProgress {
                    data: row.data,
                    completed_encounters_mask: row.completed_encounters_mask,
                    entrance_world_safe_loc_id: row.entrance_world_safe_loc_id,
                },
            );
            shared_by_id.insert(row.instance_id, state);
        }

        let mut loaded = 0usize;
        for row in lock_rows {
            let player = PlayerGuid(row.guid);
            let entries = self.catalog.context(row.map_id, Difficulty(row.difficulty));
            let expiry_time = DateTime::<Utc>::from_timestamp(row.expiry_time, 0)
                .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

            instance_ids.register(row.instance_id);

            let mut lock = if entries.is_instance_id_bound() {
                let Some(state) = shared_by_id.get(&row.instance_id) else {
                    error!(
                        "Missing shared record for instance-bound lock (instance {})",
                        row.instance_id
                    );
                    self.db.execute(persistence::delete_character_locks_for_instance_statement(
                        row.instance_id,
                    ));
                    continue;
                };
                self.registry.register(row.instance_id, state);
                InstanceLock::shared(
                    row.map_id,
                    Difficulty(row.difficulty),
                    expiry_time,
                    row.instance_id,
                    Arc::clone(state),
                )
            } else {
                InstanceLock::new(row.map_id, Difficulty(row.difficulty), expiry_time, row.instance_id)
            };

            lock.set_progress(crate::lock::LockProgress {
                data: row.data,
                completed_encounters_mask: row.completed_encounters_mask,
                entrance_world_safe_loc_id: row.entrance_world_safe_loc_id,
            });
            lock.set_extended(row.extended);

            self.permanent
                .entry(player)
                .or_default()
                .insert(InstanceLockKey { map_id: row.map_id, lock_id: row.lock_id }, lock);
            loaded += 1;
        }

        info!(
            "Loaded {} instance locks, {} shared records",
            loaded,
            self.registry.len()
        );
        // shared_by_id goes out of scope here; records no surviving binding
        // claimed fire the deletion hook and clean up their rows.
    }

    /// Tears the manager down for shutdown.
    ///
    /// The unloading flag must be set before the stores drop their bindings,
    /// otherwise destroying the permanent bindings would emit one shared
    /// delete per instance.
    pub fn unload(&mut self) {
        self.registry.set_unloading(true);
        self.temporary.clear();
        self.permanent.clear();
        self.registry.clear();
    }

    /// The binding that governs admission for a player, if any.
    ///
    /// Expired permanents that were not extended are invisible here, but a
    /// temporary with the same key is returned.
    pub fn find_active_instance_lock(
        &self,
        player: PlayerGuid,
        entries: &MapContext<'_>,
    ) -> Option<&InstanceLock> {
        self.find_active(player, entries.key(), false, true)
    }

    fn find_active(
        &self,
        player: PlayerGuid,
        key: InstanceLockKey,
        ignore_temporary: bool,
        ignore_expired: bool,
    ) -> Option<&InstanceLock> {
        if let Some(lock) = self.permanent_lock(player, key) {
            if !lock.is_expired(self.clock.now()) || lock.is_extended() || !ignore_expired {
                return Some(lock);
            }
        }
        if ignore_temporary {
            return None;
        }
        self.temporary_lock(player, key)
    }

    pub(crate) fn permanent_lock(
        &self,
        player: PlayerGuid,
        key: InstanceLockKey,
    ) -> Option<&InstanceLock> {
        self.permanent.get(&player).and_then(|locks| locks.get(&key))
    }

    pub(crate) fn temporary_lock(
        &self,
        player: PlayerGuid,
        key: InstanceLockKey,
    ) -> Option<&InstanceLock> {
        self.temporary.get(&player).and_then(|locks| locks.get(&key))
    }

    /// All permanent bindings a player holds.
    pub fn instance_locks_for_player(&self, player: PlayerGuid) -> Vec<&InstanceLock> {
        self.permanent
            .get(&player)
            .map(|locks| locks.values().collect())
            .unwrap_or_default()
    }

    /// Creates a temporary binding for a freshly materialized instance.
    ///
    /// Returns `None` for dungeons without a reset schedule; they do not
    /// participate in the lock system. The binding starts with instance id
    /// `0` and expires at the next reset. For instance-bound dungeons a
    /// fresh shared record is materialized and registered under
    /// `instance_id`; the binding carries a strong reference to it.
    pub fn create_instance_lock_for_new_instance(
        &mut self,
        player: PlayerGuid,
        entries: &MapContext<'_>,
        instance_id: u32,
    ) -> Option<&InstanceLock> {
        if !entries.map_difficulty.has_reset_schedule() {
            return None;
        }

        let expiry_time = self.next_reset_time(entries);
        let lock = if entries.is_instance_id_bound() {
            let state = SharedInstanceState::new(&self.registry);
            self.registry.register(instance_id, &state);
            InstanceLock::shared(
                entries.map_difficulty.map_id,
                entries.map_difficulty.difficulty,
                expiry_time,
                0,
                state,
            )
        } else {
            InstanceLock::new(
                entries.map_difficulty.map_id,
                entries.map_difficulty.difficulty,
                expiry_time,
                0,
            )
        };

        debug!(
            "Created temporary instance lock for {} on map {} ({}) in instance {}",
            player, entries.map.id, entries.map.name, instance_id
        );

        let key = entries.key();
        let locks = self.temporary.entry(player).or_default();
        locks.insert(key, lock);
        locks.get(&key)
    }

    /// Applies an encounter completion to a player's binding.
    ///
    /// Locates a usable permanent binding, or promotes the temporary one, or
    /// fabricates a fresh permanent binding bound to `update.instance_id`.
    /// The promotion path is what preserves an expired-but-extended binding
    /// across the reset boundary: the temporary is moved whole, never
    /// rebuilt. An expired binding reaching this point must be extended; it
    /// is refreshed to the next reset window and its extension cleared.
    ///
    /// Emits the delete+insert pair for the binding's row onto `transaction`.
    pub fn update_instance_lock_for_player(
        &mut self,
        transaction: &mut Transaction,
        player: PlayerGuid,
        entries: &MapContext<'_>,
        update: InstanceLockUpdateEvent,
    ) -> &InstanceLock {
        let key = entries.key();
        let now = self.clock.now();
        let next_reset = self.next_reset_time(entries);

        let mut located = self.find_active(player, key, true, true).is_some();

        if !located {
            // Move the binding out of temporary storage if it exists there,
            // so an expired lock is not destroyed before any boss is killed
            // in a fresh one; the player can still exit the instance and
            // reactivate the old lock.
            if let Some(lock) = Self::take_lock(&mut self.temporary, player, key) {
                debug!(
                    "Promoting temporary instance lock to permanent for {} in instance {}",
                    player, update.instance_id
                );
                self.permanent.entry(player).or_default().insert(key, lock);
                located = true;
            }
        }

        if located {
            let lock = self
                .permanent
                .get_mut(&player)
                .and_then(|locks| locks.get_mut(&key))
                .expect("permanent binding located above");
            if entries.is_instance_id_bound() {
                assert!(
                    lock.instance_id() == 0 || lock.instance_id() == update.instance_id,
                    "binding for {player} already bound to instance {}, got update for instance {}",
                    lock.instance_id(),
                    update.instance_id
                );
                let state = Self::resolve_shared(&self.registry, update.instance_id);
                let own = lock
                    .shared_state()
                    .expect("instance-bound binding must carry a shared record");
                assert!(
                    Arc::ptr_eq(own, &state),
                    "binding references a different shared record than the registry holds for instance {}",
                    update.instance_id
                );
            }
        } else {
            let lock = if entries.is_instance_id_bound() {
                let state = Self::resolve_shared(&self.registry, update.instance_id);
                InstanceLock::shared(
                    entries.map_difficulty.map_id,
                    entries.map_difficulty.difficulty,
                    next_reset,
                    update.instance_id,
                    state,
                )
            } else {
                InstanceLock::new(
                    entries.map_difficulty.map_id,
                    entries.map_difficulty.difficulty,
                    next_reset,
                    update.instance_id,
                )
            };
            self.permanent.entry(player).or_default().insert(key, lock);
            debug!(
                "Created new instance lock for {} in instance {}",
                player, update.instance_id
            );
        }

        let lock = self
            .permanent
            .get_mut(&player)
            .and_then(|locks| locks.get_mut(&key))
            .expect("permanent binding resolved above");

        lock.set_instance_id(update.instance_id);
        lock.set_data(update.new_data);
        if let Some(encounter) = &update.completed_encounter {
            lock.add_completed_encounters(1u32 << encounter.bit);
            debug!(
                "Instance lock for {} in instance {} gains completed encounter {} ({})",
                player, update.instance_id, encounter.id, encounter.name
            );
        }

        // Instance-wide progress is mirrored into the player's mask so the
        // lockout UI shows bosses killed before the player joined.
        if !entries.map_difficulty.is_using_encounter_locks() {
            lock.add_completed_encounters(update.instance_completed_encounters_mask);
        }

        if lock.is_expired(now) {
            assert!(
                lock.is_extended(),
                "an expired instance lock must have been extended to receive updates"
            );
            lock.set_expiry_time(next_reset);
            lock.set_extended(false);
            debug!(
                "Expired instance lock for {} in instance {} is active again",
                player, update.instance_id
            );
        }

        transaction.append(persistence::delete_character_lock_statement(player, key));
        transaction.append(persistence::insert_character_lock_statement(player, key, lock));

        lock
    }

    /// Applies an encounter completion to a shared record directly.
    ///
    /// Emits the delete+insert pair for the record's row onto `transaction`.
    pub fn update_shared_instance_lock(
        &self,
        transaction: &mut Transaction,
        update: InstanceLockUpdateEvent,
    ) {
        let state = Self::resolve_shared(&self.registry, update.instance_id);
        assert_eq!(
            state.instance_id(),
            update.instance_id,
            "shared record identity mismatch"
        );

        state.set_data(update.new_data);
        if let Some(encounter) = &update.completed_encounter {
            state.add_completed_encounters(1u32 << encounter.bit);
            debug!(
                "Instance {} gains completed encounter {} ({})",
                update.instance_id, encounter.id, encounter.name
            );
        }

        transaction.append(persistence::delete_instance_statement(update.instance_id));
        transaction.append(persistence::insert_instance_statement(&state));
    }

    /// Toggles the extension flag on a player's permanent binding.
    ///
    /// Expired permanents are eligible, so a freshly expired lock can still
    /// be re-extended. The row update is fired outside any transaction.
    pub fn update_instance_lock_extension_for_player(
        &mut self,
        player: PlayerGuid,
        entries: &MapContext<'_>,
        extended: bool,
    ) {
        let key = entries.key();
        if self.find_active(player, key, true, false).is_none() {
            return;
        }
        let lock = self
            .permanent
            .get_mut(&player)
            .and_then(|locks| locks.get_mut(&key))
            .expect("permanent binding found above");

        lock.set_extended(extended);
        self.db.execute(persistence::update_character_lock_extension_statement(
            player, key, extended,
        ));
        debug!(
            "Instance lock for {} on map {} is {} extended",
            player,
            entries.map.id,
            if extended { "now" } else { "no longer" }
        );
    }

    /// Whether a player holding an existing binding may join `candidate`.
    ///
    /// Dungeons without a reset schedule and players without an active
    /// binding are always admitted. Flex-locking compares completion masks;
    /// encounter-locked dungeons admit at the zone boundary and enforce at
    /// the encounter; instance-bound dungeons reject a player bound to a
    /// different saved copy.
    pub fn can_join_instance_lock(
        &self,
        player: PlayerGuid,
        entries: &MapContext<'_>,
        candidate: &InstanceLock,
    ) -> TransferAbort {
        if !entries.map_difficulty.has_reset_schedule() {
            return TransferAbort::None;
        }

        let Some(lock) = self.find_active_instance_lock(player, entries) else {
            return TransferAbort::None;
        };

        if entries.map.is_flex_locking() {
            // Any boss killed in the player's lock but alive in the
            // candidate blocks entry.
            if lock.completed_encounters_mask() & !candidate.completed_encounters_mask() != 0 {
                return TransferAbort::AlreadyCompletedEncounter;
            }
            return TransferAbort::None;
        }

        if !entries.map_difficulty.is_using_encounter_locks()
            && lock.instance_id() != 0
            && lock.instance_id() != candidate.instance_id()
        {
            return TransferAbort::LockedToDifferentInstance;
        }

        TransferAbort::None
    }

    /// Next reset instant for a map variant's cadence.
    pub fn next_reset_time(&self, entries: &MapContext<'_>) -> DateTime<Utc> {
        reset::next_reset_time(
            self.clock.as_ref(),
            &self.reset_config,
            entries.map_difficulty.reset_interval,
        )
    }

    /// When a binding actually stops being usable.
    ///
    /// An extension buys one additional reset period: an extended binding
    /// that already expired runs to the next reset, one that has not yet
    /// expired runs a full reset period past its expiry.
    pub fn effective_expiry_time(
        &self,
        entries: &MapContext<'_>,
        lock: &InstanceLock,
    ) -> DateTime<Utc> {
        if !lock.is_extended() {
            return lock.expiry_time();
        }
        if lock.is_expired(self.clock.now()) {
            return self.next_reset_time(entries);
        }
        lock.expiry_time() + entries.map_difficulty.raid_duration()
    }

    /// Read-only view of the shared record registry.
    pub fn shared_registry(&self) -> &SharedInstanceRegistry {
        &self.registry
    }

    /// Whether any binding is currently tracked.
    pub fn is_empty(&self) -> bool {
        self.permanent.is_empty() && self.temporary.is_empty()
    }

    fn resolve_shared(
        registry: &Arc<SharedInstanceRegistry>,
        instance_id: u32,
    ) -> Arc<SharedInstanceState> {
        registry
            .lookup(instance_id)
            .unwrap_or_else(|| panic!("no shared record registered for instance {instance_id}"))
            .upgrade()
            .unwrap_or_else(|| panic!("shared record for instance {instance_id} is not referenced by any binding"))
    }

    fn take_lock(store: &mut LockStore, player: PlayerGuid, key: InstanceLockKey) -> Option<InstanceLock> {
        let locks = store.get_mut(&player)?;
        let lock = locks.remove(&key)?;
        if locks.is_empty() {
            store.remove(&player);
        }
        Some(lock)
    }
}
