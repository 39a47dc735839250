//! Durable operation store backed by redb.
//!
//! This module provides ACID-compliant persistence for:
//! - Pending operations (the offline write queue)
//! - Engine metadata (schema version, last successful sync time)
//!
//! Queued operations survive page reloads and process restarts; the store
//! reconstructs the queue deterministically ordered by
//! `(priority desc, created_at asc)` on load.

use crate::error::SyncError;
use crate::types::{OperationId, OperationKind, OperationStatus, PendingOperation};
use parking_lot::RwLock;
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

// Table definitions
const OPERATIONS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("operations");
const META_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");

/// Version of the persisted schema this build reads and writes
const SCHEMA_VERSION: u32 = 1;

const SCHEMA_VERSION_KEY: &str = "schema_version";
const LAST_SYNC_TIME_KEY: &str = "last_sync_time";

/// Durable operation store using redb for ACID-compliant persistence
///
/// All access must be routed through the engine's [`TaskQueue`] so that
/// concurrent UI-triggered writes and background sync reads never interleave.
///
/// [`TaskQueue`]: crate::serializer::TaskQueue
#[derive(Clone)]
pub struct OperationStore {
    db: Arc<RwLock<Database>>,
}

impl OperationStore {
    /// Create a new store instance at the given path.
    ///
    /// This will:
    /// - Create the database directory if it doesn't exist
    /// - Initialize the database file and tables
    /// - Verify the schema version, stamping it on first open
    /// - Reset operations left in flight by a crash back to pending
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Migration` if the stored schema version is not
    /// supported; the on-disk records are preserved untouched in that case.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, SyncError> {
        let path = path.as_ref();

        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Open/create database
        let db = Database::create(path)?;

        // Initialize tables and verify schema
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(OPERATIONS_TABLE)?;
            let mut meta = write_txn.open_table(META_TABLE)?;

            let stored: Option<u32> = match meta.get(SCHEMA_VERSION_KEY)? {
                Some(v) => Some(
                    serde_json::from_slice(v.value())
                        .map_err(|e| SyncError::Serialization(e.to_string()))?,
                ),
                None => None,
            };
            match stored {
                None => {
                    let data = serde_json::to_vec(&SCHEMA_VERSION)
                        .map_err(|e| SyncError::Serialization(e.to_string()))?;
                    meta.insert(SCHEMA_VERSION_KEY, data.as_slice())?;
                }
                Some(SCHEMA_VERSION) => {}
                Some(found) => {
                    // Forward migrations from older versions land here as the
                    // schema evolves; v1 is the first shipped schema, so any
                    // other version is out of range. Records stay on disk.
                    return Err(SyncError::Migration {
                        found,
                        supported: SCHEMA_VERSION,
                    });
                }
            }
        }
        write_txn.commit()?;

        let store = Self {
            db: Arc::new(RwLock::new(db)),
        };
        store.recover()?;
        Ok(store)
    }

    /// Reset operations left `InFlight` by a crash back to `Pending`.
    ///
    /// An operation is marked in flight just before its transport send; a
    /// process death between the mark and the outcome leaves it stranded.
    /// Resetting on load makes queue replay idempotent.
    fn recover(&self) -> Result<(), SyncError> {
        let stranded: Vec<PendingOperation> = self
            .list_all()?
            .into_iter()
            .filter(|op| op.status == OperationStatus::InFlight)
            .collect();

        if stranded.is_empty() {
            return Ok(());
        }

        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(OPERATIONS_TABLE)?;
            for mut op in stranded {
                op.status = OperationStatus::Pending;
                let key = op.id.to_string_repr();
                let data = serde_json::to_vec(&op)
                    .map_err(|e| SyncError::Serialization(e.to_string()))?;
                table.insert(key.as_str(), data.as_slice())?;
                info!(id = %op.id, resource = %op.resource_key(), "Recovered in-flight operation to pending");
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Operation Queue
    // ═══════════════════════════════════════════════════════════════════════

    /// Append an operation to the queue, applying supersession.
    ///
    /// A still-`Pending` operation on the same `(resource_type, resource_id)`
    /// is replaced by the new one — only the latest payload per resource needs
    /// to survive. In-flight operations are never preempted. When a pending
    /// `Create` is replaced by an `Update`, the replacement keeps kind
    /// `Create`: the remote peer has never seen the resource.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Validation` if `resource_type` or `resource_id`
    /// is empty.
    pub fn append(&self, mut op: PendingOperation) -> Result<OperationId, SyncError> {
        if op.resource_type.trim().is_empty() {
            return Err(SyncError::Validation(
                "resource_type must not be empty".to_string(),
            ));
        }
        if op.resource_id.trim().is_empty() {
            return Err(SyncError::Validation(
                "resource_id must not be empty".to_string(),
            ));
        }

        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(OPERATIONS_TABLE)?;

            // Find the still-pending operation for this resource, if any
            let superseded = {
                let mut found: Option<PendingOperation> = None;
                for entry in table.iter()? {
                    let (_, value) = entry?;
                    let existing: PendingOperation = serde_json::from_slice(value.value())
                        .map_err(|e| SyncError::Serialization(e.to_string()))?;
                    if existing.status == OperationStatus::Pending
                        && existing.resource_type == op.resource_type
                        && existing.resource_id == op.resource_id
                    {
                        found = Some(existing);
                        break;
                    }
                }
                found
            };

            if let Some(old) = superseded {
                if old.kind == OperationKind::Create && op.kind == OperationKind::Update {
                    op.kind = OperationKind::Create;
                }
                let old_key = old.id.to_string_repr();
                table.remove(old_key.as_str())?;
                debug!(
                    superseded = %old.id,
                    by = %op.id,
                    resource = %op.resource_key(),
                    "Superseded pending operation"
                );
            }

            let key = op.id.to_string_repr();
            let data =
                serde_json::to_vec(&op).map_err(|e| SyncError::Serialization(e.to_string()))?;
            table.insert(key.as_str(), data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(op.id)
    }

    /// Overwrite a stored operation with its new state.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::OperationNotFound` if no operation with the given
    /// id exists.
    pub fn update(&self, op: &PendingOperation) -> Result<(), SyncError> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(OPERATIONS_TABLE)?;
            let key = op.id.to_string_repr();
            if table.get(key.as_str())?.is_none() {
                return Err(SyncError::OperationNotFound(op.id.to_string()));
            }
            let data =
                serde_json::to_vec(op).map_err(|e| SyncError::Serialization(e.to_string()))?;
            table.insert(key.as_str(), data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Remove an operation from the queue.
    pub fn remove(&self, id: &OperationId) -> Result<(), SyncError> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(OPERATIONS_TABLE)?;
            let key = id.to_string_repr();
            table.remove(key.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Load a single operation by id.
    ///
    /// Returns `None` if no operation with the given id exists.
    pub fn get(&self, id: &OperationId) -> Result<Option<PendingOperation>, SyncError> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(OPERATIONS_TABLE)?;
        let key = id.to_string_repr();

        match table.get(key.as_str())? {
            Some(v) => {
                let op: PendingOperation = serde_json::from_slice(v.value())
                    .map_err(|e| SyncError::Serialization(e.to_string()))?;
                Ok(Some(op))
            }
            None => Ok(None),
        }
    }

    /// Load every stored operation, deterministically ordered by
    /// `(priority desc, created_at asc)`, ties broken by id.
    pub fn list_all(&self) -> Result<Vec<PendingOperation>, SyncError> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(OPERATIONS_TABLE)?;

        let mut ops = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let op: PendingOperation = serde_json::from_slice(value.value())
                .map_err(|e| SyncError::Serialization(e.to_string()))?;
            ops.push(op);
        }
        ops.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.0.cmp(&b.id.0))
        });
        Ok(ops)
    }

    /// Load operations awaiting delivery, in drain order.
    pub fn list_pending(&self) -> Result<Vec<PendingOperation>, SyncError> {
        Ok(self
            .list_all()?
            .into_iter()
            .filter(|op| op.status == OperationStatus::Pending)
            .collect())
    }

    /// Load permanently failed operations awaiting manual retry or discard.
    pub fn list_failed(&self) -> Result<Vec<PendingOperation>, SyncError> {
        Ok(self
            .list_all()?
            .into_iter()
            .filter(|op| op.status == OperationStatus::Failed)
            .collect())
    }

    /// Count of stored operations (everything not yet succeeded).
    pub fn count(&self) -> Result<usize, SyncError> {
        Ok(self.list_all()?.len())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Metadata
    // ═══════════════════════════════════════════════════════════════════════

    /// Load the time of the last successful sync, if any.
    pub fn last_sync_time(&self) -> Result<Option<i64>, SyncError> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(META_TABLE)?;

        match table.get(LAST_SYNC_TIME_KEY)? {
            Some(v) => {
                let ts: i64 = serde_json::from_slice(v.value())
                    .map_err(|e| SyncError::Serialization(e.to_string()))?;
                Ok(Some(ts))
            }
            None => Ok(None),
        }
    }

    /// Record the time of the last successful sync.
    pub fn set_last_sync_time(&self, ts: i64) -> Result<(), SyncError> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(META_TABLE)?;
            let data =
                serde_json::to_vec(&ts).map_err(|e| SyncError::Serialization(e.to_string()))?;
            table.insert(LAST_SYNC_TIME_KEY, data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Priority;
    use tempfile::TempDir;

    fn create_test_store() -> (OperationStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.redb");
        let store = OperationStore::new(&db_path).unwrap();
        (store, temp_dir)
    }

    fn test_op(resource_id: &str, kind: OperationKind) -> PendingOperation {
        PendingOperation::new(
            "workout",
            resource_id,
            kind,
            serde_json::json!({"field": "value"}),
            Priority::default(),
        )
    }

    #[test]
    fn test_store_can_be_created() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.redb");
        let store = OperationStore::new(&db_path);
        assert!(store.is_ok());
    }

    #[test]
    fn test_store_creates_parent_directories() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested/path/to/test.redb");
        let store = OperationStore::new(&db_path);
        assert!(store.is_ok());
        assert!(db_path.exists());
    }

    #[test]
    fn test_append_and_get() {
        let (store, _temp) = create_test_store();

        let op = test_op("1", OperationKind::Update);
        let id = store.append(op.clone()).unwrap();
        assert_eq!(id, op.id);

        let loaded = store.get(&id).unwrap();
        assert!(loaded.is_some());
        assert_eq!(loaded.unwrap(), op);
    }

    #[test]
    fn test_get_nonexistent_operation() {
        let (store, _temp) = create_test_store();

        let loaded = store.get(&OperationId::new()).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_append_rejects_empty_resource_type() {
        let (store, _temp) = create_test_store();

        let mut op = test_op("1", OperationKind::Create);
        op.resource_type = "".to_string();
        let result = store.append(op);
        assert!(matches!(result, Err(SyncError::Validation(_))));
    }

    #[test]
    fn test_append_rejects_empty_resource_id() {
        let (store, _temp) = create_test_store();

        let mut op = test_op("1", OperationKind::Create);
        op.resource_id = "  ".to_string();
        let result = store.append(op);
        assert!(matches!(result, Err(SyncError::Validation(_))));
    }

    #[test]
    fn test_newer_pending_supersedes_older() {
        let (store, _temp) = create_test_store();

        let mut first = test_op("1", OperationKind::Update);
        first.payload = serde_json::json!({"name": "A"});
        let first_id = store.append(first).unwrap();

        let mut second = test_op("1", OperationKind::Update);
        second.payload = serde_json::json!({"name": "B"});
        let second_id = store.append(second).unwrap();

        assert!(store.get(&first_id).unwrap().is_none());
        let survivor = store.get(&second_id).unwrap().unwrap();
        assert_eq!(survivor.payload, serde_json::json!({"name": "B"}));
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_delete_supersedes_prior_update() {
        let (store, _temp) = create_test_store();

        store.append(test_op("1", OperationKind::Update)).unwrap();
        let delete_id = store.append(test_op("1", OperationKind::Delete)).unwrap();

        let ops = store.list_pending().unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].id, delete_id);
        assert_eq!(ops[0].kind, OperationKind::Delete);
    }

    #[test]
    fn test_update_after_pending_create_keeps_create_kind() {
        let (store, _temp) = create_test_store();

        store.append(test_op("1", OperationKind::Create)).unwrap();
        let mut update = test_op("1", OperationKind::Update);
        update.payload = serde_json::json!({"name": "fresh"});
        let id = store.append(update).unwrap();

        let survivor = store.get(&id).unwrap().unwrap();
        assert_eq!(survivor.kind, OperationKind::Create);
        assert_eq!(survivor.payload, serde_json::json!({"name": "fresh"}));
    }

    #[test]
    fn test_in_flight_operation_is_not_superseded() {
        let (store, _temp) = create_test_store();

        let mut in_flight = test_op("1", OperationKind::Update);
        in_flight.status = OperationStatus::InFlight;
        let in_flight_id = store.append(in_flight).unwrap();

        let newer_id = store.append(test_op("1", OperationKind::Update)).unwrap();

        assert!(store.get(&in_flight_id).unwrap().is_some());
        assert!(store.get(&newer_id).unwrap().is_some());
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_supersession_is_per_resource() {
        let (store, _temp) = create_test_store();

        let a = store.append(test_op("1", OperationKind::Update)).unwrap();
        let b = store.append(test_op("2", OperationKind::Update)).unwrap();

        assert!(store.get(&a).unwrap().is_some());
        assert!(store.get(&b).unwrap().is_some());
    }

    #[test]
    fn test_update_requires_existing_operation() {
        let (store, _temp) = create_test_store();

        let op = test_op("1", OperationKind::Update);
        let result = store.update(&op);
        assert!(matches!(result, Err(SyncError::OperationNotFound(_))));
    }

    #[test]
    fn test_update_overwrites_stored_state() {
        let (store, _temp) = create_test_store();

        let op = test_op("1", OperationKind::Update);
        let id = store.append(op.clone()).unwrap();

        let mut changed = op;
        changed.attempt = 3;
        changed.last_error = Some("server hiccup".to_string());
        store.update(&changed).unwrap();

        let loaded = store.get(&id).unwrap().unwrap();
        assert_eq!(loaded.attempt, 3);
        assert_eq!(loaded.last_error.as_deref(), Some("server hiccup"));
    }

    #[test]
    fn test_remove_operation() {
        let (store, _temp) = create_test_store();

        let id = store.append(test_op("1", OperationKind::Create)).unwrap();
        assert!(store.get(&id).unwrap().is_some());

        store.remove(&id).unwrap();
        assert!(store.get(&id).unwrap().is_none());
    }

    #[test]
    fn test_list_pending_order() {
        let (store, _temp) = create_test_store();

        let mut low = test_op("1", OperationKind::Update);
        low.priority = Priority::Low;
        low.created_at = 100;
        let mut high_late = test_op("2", OperationKind::Update);
        high_late.priority = Priority::High;
        high_late.created_at = 300;
        let mut high_early = test_op("3", OperationKind::Update);
        high_early.priority = Priority::High;
        high_early.created_at = 200;
        let mut medium = test_op("4", OperationKind::Update);
        medium.priority = Priority::Medium;
        medium.created_at = 50;

        for op in [low.clone(), high_late.clone(), high_early.clone(), medium.clone()] {
            store.append(op).unwrap();
        }

        let ordered: Vec<_> = store
            .list_pending()
            .unwrap()
            .into_iter()
            .map(|op| op.id)
            .collect();
        assert_eq!(ordered, vec![high_early.id, high_late.id, medium.id, low.id]);
    }

    #[test]
    fn test_queue_persists_across_instances() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.redb");

        let id = {
            let store = OperationStore::new(&db_path).unwrap();
            store.append(test_op("1", OperationKind::Update)).unwrap()
        };

        {
            let store = OperationStore::new(&db_path).unwrap();
            let loaded = store.get(&id).unwrap();
            assert!(loaded.is_some());
        }
    }

    #[test]
    fn test_recover_resets_in_flight_to_pending() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.redb");

        let id = {
            let store = OperationStore::new(&db_path).unwrap();
            let mut op = test_op("1", OperationKind::Update);
            op.status = OperationStatus::InFlight;
            store.append(op).unwrap()
        };

        // Reopening simulates a restart after a crash mid-send
        let store = OperationStore::new(&db_path).unwrap();
        let loaded = store.get(&id).unwrap().unwrap();
        assert_eq!(loaded.status, OperationStatus::Pending);
    }

    #[test]
    fn test_list_failed() {
        let (store, _temp) = create_test_store();

        let mut failed = test_op("1", OperationKind::Update);
        failed.status = OperationStatus::Failed;
        failed.last_error = Some("rejected".to_string());
        let failed_id = store.append(failed).unwrap();
        store.append(test_op("2", OperationKind::Update)).unwrap();

        let listed = store.list_failed().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, failed_id);
    }

    #[test]
    fn test_last_sync_time_roundtrip() {
        let (store, _temp) = create_test_store();

        assert!(store.last_sync_time().unwrap().is_none());
        store.set_last_sync_time(1_700_000_000_000).unwrap();
        assert_eq!(store.last_sync_time().unwrap(), Some(1_700_000_000_000));
    }

    #[test]
    fn test_future_schema_version_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.redb");

        {
            let store = OperationStore::new(&db_path).unwrap();
            store.append(test_op("1", OperationKind::Update)).unwrap();

            // Stamp a version from the future
            let db = store.db.read();
            let write_txn = db.begin_write().unwrap();
            {
                let mut meta = write_txn.open_table(META_TABLE).unwrap();
                let data = serde_json::to_vec(&99u32).unwrap();
                meta.insert(SCHEMA_VERSION_KEY, data.as_slice()).unwrap();
            }
            write_txn.commit().unwrap();
        }

        let result = OperationStore::new(&db_path);
        assert!(matches!(
            result,
            Err(SyncError::Migration {
                found: 99,
                supported: SCHEMA_VERSION
            })
        ));

        // Records must survive the failed open
        {
            let db = Database::create(&db_path).unwrap();
            let read_txn = db.begin_read().unwrap();
            let table = read_txn.open_table(OPERATIONS_TABLE).unwrap();
            assert_eq!(table.iter().unwrap().count(), 1);
        }
    }
}
