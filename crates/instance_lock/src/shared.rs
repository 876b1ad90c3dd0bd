//! Shared per-instance progress records and their registry.
//!
//! Instance-bound dungeons keep one progress record per saved copy, jointly
//! owned by every permanent binding that references it. The registry holds
//! only weak back-references so it can hand the record to new bindings
//! without extending its lifetime; when the last owning binding drops, the
//! record's destructor notifies the registry, which erases the
//! back-reference and removes the persisted row.

use crate::lock::LockProgress;
use crate::persistence::{self, CharacterDatabase};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::debug;

/// Progress record shared by all permanent bindings of one saved copy.
#[derive(Debug)]
pub struct SharedInstanceState {
    /// `0` until the first binding referencing this record is promoted
    instance_id: AtomicU32,
    progress: Mutex<LockProgress>,
    registry: Weak<SharedInstanceRegistry>,
}

impl SharedInstanceState {
    /// Fresh record for a newly created instance. The instance id is
    /// assigned later, on promotion.
    pub(crate) fn new(registry: &Arc<SharedInstanceRegistry>) -> Arc<Self> {
        Arc::new(Self {
            instance_id: AtomicU32::new(0),
            progress: Mutex::new(LockProgress::default()),
            registry: Arc::downgrade(registry),
        })
    }

    /// Record hydrated from a persisted row.
    pub(crate) fn from_row(
        registry: &Arc<SharedInstanceRegistry>,
        instance_id: u32,
        progress: LockProgress,
    ) -> Arc<Self> {
        Arc::new(Self {
            instance_id: AtomicU32::new(instance_id),
            progress: Mutex::new(progress),
            registry: Arc::downgrade(registry),
        })
    }

    pub fn instance_id(&self) -> u32 {
        self.instance_id.load(Ordering::Relaxed)
    }

    pub(crate) fn assign_instance_id(&self, instance_id: u32) {
        self.instance_id.store(instance_id, Ordering::Relaxed);
    }

    pub fn progress(&self) -> LockProgress {
        self.progress.lock().unwrap().clone()
    }

    pub fn data(&self) -> String {
        self.progress.lock().unwrap().data.clone()
    }

    pub fn completed_encounters_mask(&self) -> u32 {
        self.progress.lock().unwrap().completed_encounters_mask
    }

    pub fn entrance_world_safe_loc_id(&self) -> u32 {
        self.progress.lock().unwrap().entrance_world_safe_loc_id
    }

    pub(crate) fn set_data(&self, data: String) {
        self.progress.lock().unwrap().data = data;
    }

    pub(crate) fn add_completed_encounters(&self, bits: u32) {
        self.progress.lock().unwrap().completed_encounters_mask |= bits;
    }

    pub(crate) fn set_progress(&self, progress: LockProgress) {
        *self.progress.lock().unwrap() = progress;
    }
}

impl Drop for SharedInstanceState {
    fn drop(&mut self) {
        let instance_id = *self.instance_id.get_mut();
        // A record that was never promoted has no persisted row to clean up.
        if instance_id == 0 {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.on_shared_delete(instance_id);
        }
    }
}

/// Weak back-references from instance id to the shared record.
///
/// Ownership lives entirely on the bindings; a failed upgrade of a stored
/// handle during normal operation is a bug.
#[derive(Debug)]
pub struct SharedInstanceRegistry {
    entries: Mutex<HashMap<u32, Weak<SharedInstanceState>>>,
    unloading: AtomicBool,
    db: CharacterDatabase,
}

impl SharedInstanceRegistry {
    pub(crate) fn new(db: CharacterDatabase) -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(HashMap::new()),
            unloading: AtomicBool::new(false),
            db,
        })
    }

    pub(crate) fn register(&self, instance_id: u32, state: &Arc<SharedInstanceState>) {
        self.entries
            .lock()
            .unwrap()
            .insert(instance_id, Arc::downgrade(state));
    }

    pub(crate) fn lookup(&self, instance_id: u32) -> Option<Weak<SharedInstanceState>> {
        self.entries.lock().unwrap().get(&instance_id).cloned()
    }

    /// Whether a back-reference is held for this instance id.
    pub fn contains(&self, instance_id: u32) -> bool {
        self.entries.lock().unwrap().contains_key(&instance_id)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub(crate) fn set_unloading(&self, unloading: bool) {
        self.unloading.store(unloading, Ordering::Relaxed);
    }

    pub(crate) fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    /// Deletion hook, invoked from the shared record's destructor.
    ///
    /// The back-reference is erased before the persistence delete goes out;
    /// the hook must stay safe to call from a drop happening anywhere in the
    /// manager. During unload the hook is a no-op so that tearing down the
    /// binding stores does not emit per-instance deletes.
    fn on_shared_delete(&self, instance_id: u32) {
        if self.unloading.load(Ordering::Relaxed) {
            return;
        }

        self.entries.lock().unwrap().remove(&instance_id);
        self.db
            .execute(persistence::delete_instance_statement(instance_id));
        debug!("Deleting shared record for instance {}, no longer referenced by any player", instance_id);
    }
}
