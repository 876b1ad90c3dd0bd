//! Registry of numeric instance identifiers in use.

use dashmap::DashSet;

/// Concurrent set of instance ids that may not be handed out again.
///
/// The lock manager registers every persisted id during load; the world
/// allocates fresh ids through [`InstanceIdRegistry::allocate`] when a new
/// saved copy is materialized. Id `0` is reserved to mean "no instance yet"
/// and is never allocated.
#[derive(Debug, Default)]
pub struct InstanceIdRegistry {
    used: DashSet<u32>,
}

impl InstanceIdRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks an id as in use. Returns `false` if it already was.
    pub fn register(&self, instance_id: u32) -> bool {
        self.used.insert(instance_id)
    }

    pub fn unregister(&self, instance_id: u32) {
        self.used.remove(&instance_id);
    }

    pub fn is_registered(&self, instance_id: u32) -> bool {
        self.used.contains(&instance_id)
    }

    /// Claims and returns the smallest free id.
    pub fn allocate(&self) -> u32 {
        let mut instance_id = 1;
        while !self.used.insert(instance_id) {
            instance_id += 1;
        }
        instance_id
    }
}
