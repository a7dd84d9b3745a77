//! In-memory snapshot backend for tests and ephemeral deployments.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use super::backend::{decode_snapshot, SnapshotBackend};
use super::record::Record;
use crate::error::{StoreError, StoreResult};

/// Keeps each table as serialized JSON bytes so `load` decodes exactly what `store` wrote.
///
/// Writes can be made to fail on demand to exercise the failure path of the table
/// store: a failed `store` leaves the previous snapshot in place, as the file backend does.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    tables: RwLock<HashMap<String, Vec<u8>>>,
    failing_writes: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self { Self::default() }

    /// Seed a table, bypassing failure injection.
    pub fn with_table(self, table: &str, records: &[Record]) -> Self {
        let bytes = serde_json::to_vec(records).unwrap_or_else(|_| b"[]".to_vec());
        self.tables.write().insert(table.to_string(), bytes);
        self
    }

    /// Make the next `count` calls to `store` fail with a persistence error.
    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn take_failure(&self) -> bool {
        self.failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl SnapshotBackend for MemoryBackend {
    fn load(&self, table: &str) -> StoreResult<Vec<Record>> {
        let guard = self.tables.read();
        let bytes = guard
            .get(table)
            .ok_or_else(|| StoreError::NotFound(format!("table '{}'", table)))?;
        decode_snapshot(table, bytes)
    }

    fn store(&self, table: &str, records: &[Record]) -> StoreResult<()> {
        let bytes = serde_json::to_vec(records).map_err(|e| StoreError::corrupt(table, e.to_string()))?;
        if self.take_failure() {
            return Err(StoreError::persistence(table, std::io::Error::other("injected write failure")));
        }
        self.tables.write().insert(table.to_string(), bytes);
        Ok(())
    }
}
