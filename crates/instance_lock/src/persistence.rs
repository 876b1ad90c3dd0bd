//! Persistence emitter and the character database handle.
//!
//! The lock manager never talks to SQL directly. State changes are rendered
//! into literal statements: updates append a delete+insert pair to a
//! caller-supplied [`Transaction`], and single-statement changes go out
//! fire-and-forget through [`CharacterDatabase`]. A writer task owned by the
//! world drains the channel; nothing in this module blocks.

use crate::error::InstanceLockError;
use crate::lock::{InstanceLock, PlayerGuid};
use crate::shared::SharedInstanceState;
use map_catalog::InstanceLockKey;
use tokio::sync::mpsc;
use tracing::warn;

/// A request handed to the database writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbRequest {
    /// Single fire-and-forget statement
    Execute(String),
    /// Statement batch committed atomically, in order
    Commit(Vec<String>),
}

/// Append-only statement batch.
///
/// The manager appends; the caller commits through
/// [`CharacterDatabase::commit`]. Statement order within the batch is
/// preserved.
#[derive(Debug, Default)]
pub struct Transaction {
    statements: Vec<String>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, statement: String) {
        self.statements.push(statement);
    }

    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

/// Clonable handle to the character database writer.
#[derive(Debug, Clone)]
pub struct CharacterDatabase {
    sender: mpsc::UnboundedSender<DbRequest>,
}

impl CharacterDatabase {
    /// Creates the handle together with the receiving end the writer task
    /// drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<DbRequest>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Queues a single statement outside any transaction.
    pub fn execute(&self, statement: String) {
        if self.sender.send(DbRequest::Execute(statement)).is_err() {
            warn!("Character database writer is gone, dropping statement");
        }
    }

    /// Queues a transaction for commit.
    pub fn commit(&self, transaction: Transaction) -> Result<(), InstanceLockError> {
        self.sender
            .send(DbRequest::Commit(transaction.statements))
            .map_err(|_| InstanceLockError::Persistence("character database writer is gone".to_string()))
    }
}

/// Row shape of the `instance2` table.
#[derive(Debug, Clone)]
pub struct InstanceRow {
    pub instance_id: u32,
    pub data: String,
    pub completed_encounters_mask: u32,
    pub entrance_world_safe_loc_id: u32,
}

/// Row shape of the `character_instance_lock` table.
#[derive(Debug, Clone)]
pub struct CharacterLockRow {
    pub guid: u64,
    pub map_id: u32,
    pub lock_id: i32,
    pub instance_id: u32,
    pub difficulty: u8,
    pub data: String,
    pub completed_encounters_mask: u32,
    pub entrance_world_safe_loc_id: u32,
    /// Seconds since epoch
    pub expiry_time: i64,
    pub extended: bool,
}

/// Escapes a string payload for interpolation into a statement.
pub fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\'' => escaped.push_str("\\'"),
            '\0' => escaped.push_str("\\0"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            c => escaped.push(c),
        }
    }
    escaped
}

pub(crate) fn delete_character_lock_statement(guid: PlayerGuid, key: InstanceLockKey) -> String {
    format!(
        "DELETE FROM character_instance_lock WHERE guid={} AND mapId={} AND lockId={}",
        guid.0, key.map_id, key.lock_id
    )
}

pub(crate) fn insert_character_lock_statement(
    guid: PlayerGuid,
    key: InstanceLockKey,
    lock: &InstanceLock,
) -> String {
    format!(
        "INSERT INTO character_instance_lock (guid, mapId, lockId, instanceId, difficulty, data, \
         completedEncountersMask, entranceWorldSafeLocId, expiryTime, extended) \
         VALUES ({}, {}, {}, {}, {}, \"{}\", {}, {}, {}, {})",
        guid.0,
        key.map_id,
        key.lock_id,
        lock.instance_id(),
        lock.difficulty().0,
        escape(&lock.data()),
        lock.completed_encounters_mask(),
        lock.entrance_world_safe_loc_id(),
        lock.expiry_time().timestamp(),
        i32::from(lock.is_extended())
    )
}

pub(crate) fn update_character_lock_extension_statement(
    guid: PlayerGuid,
    key: InstanceLockKey,
    extended: bool,
) -> String {
    format!(
        "UPDATE character_instance_lock SET extended = {} WHERE guid = {} AND mapId = {} AND lockId = {}",
        i32::from(extended),
        guid.0,
        key.map_id,
        key.lock_id
    )
}

/// Removes every binding row of one saved copy; used to heal orphans at load.
pub(crate) fn delete_character_locks_for_instance_statement(instance_id: u32) -> String {
    format!("DELETE FROM character_instance_lock WHERE instanceId = {instance_id}")
}

pub(crate) fn delete_instance_statement(instance_id: u32) -> String {
    format!("DELETE FROM instance2 WHERE instanceId={instance_id}")
}

pub(crate) fn insert_instance_statement(state: &SharedInstanceState) -> String {
    let progress = state.progress();
    format!(
        "INSERT INTO instance2 (instanceId, data, completedEncountersMask, entranceWorldSafeLocId) \
         VALUES ({}, \"{}\", {}, {})",
        state.instance_id(),
        escape(&progress.data),
        progress.completed_encounters_mask,
        progress.entrance_world_safe_loc_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use map_catalog::Difficulty;

    #[test]
    fn escape_handles_quotes_and_backslashes() {
        assert_eq!(escape(r#"a"b'c\d"#), r#"a\"b\'c\\d"#);
        assert_eq!(escape("line\nbreak"), "line\\nbreak");
        assert_eq!(escape("plain"), "plain");
    }

    #[test]
    fn character_lock_statements_have_the_expected_shape() {
        let guid = PlayerGuid(1);
        let key = InstanceLockKey { map_id: 100, lock_id: 7 };
        let expiry = Utc.from_utc_datetime(
            &NaiveDate::from_ymd_opt(2024, 4, 2)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
        );
        let mut lock = InstanceLock::new(100, Difficulty(5), expiry, 42);
        lock.set_data("pro\"gress".to_string());
        lock.add_completed_encounters(0b1000);

        assert_eq!(
            delete_character_lock_statement(guid, key),
            "DELETE FROM character_instance_lock WHERE guid=1 AND mapId=100 AND lockId=7"
        );
        assert_eq!(
            insert_character_lock_statement(guid, key, &lock),
            format!(
                "INSERT INTO character_instance_lock (guid, mapId, lockId, instanceId, difficulty, \
                 data, completedEncountersMask, entranceWorldSafeLocId, expiryTime, extended) \
                 VALUES (1, 100, 7, 42, 5, \"pro\\\"gress\", 8, 0, {}, 0)",
                expiry.timestamp()
            )
        );
    }

    #[test]
    fn extension_statement_encodes_the_flag() {
        let key = InstanceLockKey { map_id: 100, lock_id: 7 };
        assert_eq!(
            update_character_lock_extension_statement(PlayerGuid(3), key, true),
            "UPDATE character_instance_lock SET extended = 1 WHERE guid = 3 AND mapId = 100 AND lockId = 7"
        );
        assert_eq!(
            update_character_lock_extension_statement(PlayerGuid(3), key, false),
            "UPDATE character_instance_lock SET extended = 0 WHERE guid = 3 AND mapId = 100 AND lockId = 7"
        );
    }

    #[test]
    fn instance_statements_target_instance2() {
        assert_eq!(
            delete_instance_statement(9),
            "DELETE FROM instance2 WHERE instanceId=9"
        );
        assert_eq!(
            delete_character_locks_for_instance_statement(9),
            "DELETE FROM character_instance_lock WHERE instanceId = 9"
        );
    }

    #[tokio::test]
    async fn commit_preserves_statement_order() {
        let (db, mut requests) = CharacterDatabase::channel();
        let mut transaction = Transaction::new();
        transaction.append("DELETE FROM character_instance_lock WHERE guid=1".to_string());
        transaction.append("INSERT INTO character_instance_lock VALUES (1)".to_string());
        db.commit(transaction).unwrap();

        match requests.recv().await.unwrap() {
            DbRequest::Commit(statements) => {
                assert_eq!(statements.len(), 2);
                assert!(statements[0].starts_with("DELETE"));
                assert!(statements[1].starts_with("INSERT"));
            }
            other => panic!("expected a commit, got {other:?}"),
        }
    }

    #[test]
    fn commit_fails_once_the_writer_is_gone() {
        let (db, requests) = CharacterDatabase::channel();
        drop(requests);
        let result = db.commit(Transaction::new());
        assert!(matches!(result, Err(InstanceLockError::Persistence(_))));
    }
}
