use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use super::backend::SnapshotBackend;
use super::record::{Record, RecordId};
use crate::error::{StoreError, StoreResult};

const MAX_TABLE_NAME_LEN: usize = 128;

/// Table names double as snapshot file names, so only a conservative alphabet is allowed.
pub fn validate_table_name(name: &str) -> StoreResult<()> {
    let ok = !name.is_empty()
        && name.len() <= MAX_TABLE_NAME_LEN
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok { Ok(()) } else { Err(StoreError::InvalidTableName(name.to_string())) }
}

/// One writer lock per table name, created on first use and kept for the process lifetime.
#[derive(Default)]
pub struct TableLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TableLocks {
    pub fn for_table(&self, table: &str) -> Arc<Mutex<()>> {
        let mut map = self.inner.lock();
        map.entry(table.to_string()).or_default().clone()
    }
}

/// Get-all / get-by-id / upsert over named tables.
///
/// Upserts to one table are serialized by that table's lock and applied in arrival
/// order; upserts to different tables never contend. Reads take no lock and see the
/// last snapshot the backend committed.
#[derive(Clone)]
pub struct TableStore {
    backend: Arc<dyn SnapshotBackend>,
    locks: Arc<TableLocks>,
}

impl TableStore {
    pub fn new(backend: Arc<dyn SnapshotBackend>) -> Self {
        Self { backend, locks: Arc::new(TableLocks::default()) }
    }

    pub fn backend(&self) -> &Arc<dyn SnapshotBackend> { &self.backend }

    /// Handle to a single table. Fails for names that cannot be stored.
    pub fn table(&self, name: &str) -> StoreResult<Table<'_>> {
        validate_table_name(name)?;
        Ok(Table { store: self, name: name.to_string() })
    }
}

/// A [`TableStore`] bound to one table name.
pub struct Table<'a> {
    store: &'a TableStore,
    name: String,
}

impl Table<'_> {
    pub fn name(&self) -> &str { &self.name }

    /// Current snapshot. A table that was never written is empty.
    pub fn get_all(&self) -> StoreResult<Vec<Record>> {
        match self.store.backend.load(&self.name) {
            Ok(records) => Ok(records),
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    pub fn get_by_id(&self, id: &RecordId) -> StoreResult<Record> {
        self.get_all()?
            .into_iter()
            .find(|r| id.matches(r))
            .ok_or_else(|| StoreError::NotFound(format!("{}/{}", self.name, id)))
    }

    /// Replace the record with the same id in place, or append it. The whole table is
    /// written back as one snapshot; on failure the previous snapshot stays current.
    pub fn upsert(&self, record: Record) -> StoreResult<Record> {
        let id = RecordId::of(&record)?;
        let lock = self.store.locks.for_table(&self.name);
        let _guard = lock.lock();

        let mut records = self.get_all()?;
        let replaced = match records.iter().position(|r| id.matches(r)) {
            Some(pos) => {
                records[pos] = record.clone();
                // Drop any later duplicates a hand-edited snapshot may carry.
                let mut seen = false;
                records.retain(|r| {
                    if !id.matches(r) { return true; }
                    let keep = !seen;
                    seen = true;
                    keep
                });
                true
            }
            None => {
                records.push(record.clone());
                false
            }
        };
        self.store.backend.store(&self.name, &records)?;
        if replaced {
            debug!(target: "recordkeep::storage", "upsert table='{}' id={} replaced", self.name, id);
        } else {
            info!(target: "recordkeep::storage", "upsert table='{}' id={} appended count={}", self.name, id, records.len());
        }
        Ok(record)
    }
}
