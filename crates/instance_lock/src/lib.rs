//! # Instance Lock Manager
//!
//! Tracks which players are bound to which saved copies ("instances") of
//! reset-scheduled dungeons and raids: whether a player may enter a dungeon
//! in progress, when a binding expires, whether it may be voluntarily
//! extended past its expiry, and how state is shared between players bound
//! to the same copy.
//!
//! ## Architecture Overview
//!
//! * **Binding stores** - two disjoint mappings per player and lock group:
//!   *temporary* bindings created when a fresh instance is entered, and
//!   *permanent* bindings created or promoted on the first encounter
//!   completion. A player never holds both for the same key.
//! * **Shared records** - instance-bound dungeons keep one progress record
//!   per saved copy, jointly owned by every permanent binding referencing
//!   it. The [`shared::SharedInstanceRegistry`] holds weak back-references
//!   only; the last binding to drop triggers the deletion hook.
//! * **Reset scheduler** - a pure function over the world clock and the
//!   configured reset hour/day; expiry is evaluated on access, never swept.
//! * **Admission predicate** - [`InstanceLockManager::can_join_instance_lock`]
//!   decides zone transfers under the three locking disciplines
//!   (instance-bound, flex-locking, encounter locks).
//! * **Persistence emitter** - every mutation is rendered into literal SQL
//!   statements appended to a caller-supplied [`Transaction`] or fired
//!   through the [`CharacterDatabase`] handle; a writer task owned by the
//!   world drains them.
//!
//! ## Concurrency
//!
//! The manager is single-writer: all mutation happens on the world's main
//! tick and no operation suspends. The only shared state is the
//! jointly-owned shared records, guarded internally.
//!
//! ## Error Handling
//!
//! Admission rejections are [`TransferAbort`] values, never errors.
//! Corrupted rows found at load are healed in place (deleted and logged).
//! Violated internal invariants are programmer errors and abort.

pub use clock::{ManualClock, SystemClock, WorldClock};
pub use config::{InstanceLockConfig, ResetScheduleConfig};
pub use error::InstanceLockError;
pub use lock::{InstanceLock, InstanceLockUpdateEvent, LockProgress, PlayerGuid, TransferAbort};
pub use manager::InstanceLockManager;
pub use persistence::{CharacterDatabase, CharacterLockRow, DbRequest, InstanceRow, Transaction};
pub use reset::next_reset_time;

pub mod clock;
pub mod config;
pub mod error;
pub mod lock;
pub mod manager;
pub mod persistence;
pub mod reset;
pub mod shared;
