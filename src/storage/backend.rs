//! Snapshot persistence: each table is read and written as one whole document.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde_json::Value as JsonValue;
use tracing::{debug, error, warn};

use super::record::Record;
use crate::error::{StoreError, StoreResult};

/// Durable storage for table snapshots.
///
/// # Invariants
///
/// - `load` returns exactly the records passed to the last successful `store`
/// - `load` fails with [`StoreError::NotFound`] when the table was never written
/// - `store` replaces the snapshot as a single unit: a concurrent `load`, or a `load`
///   after a crash, observes either the old or the new contents, never a mix
pub trait SnapshotBackend: Send + Sync {
    fn load(&self, table: &str) -> StoreResult<Vec<Record>>;

    fn store(&self, table: &str, records: &[Record]) -> StoreResult<()>;
}

/// Decode a snapshot document. Used by every backend that keeps serialized bytes.
pub(crate) fn decode_snapshot(table: &str, bytes: &[u8]) -> StoreResult<Vec<Record>> {
    let doc: JsonValue = serde_json::from_slice(bytes).map_err(|e| StoreError::corrupt(table, e.to_string()))?;
    let JsonValue::Array(items) = doc else {
        return Err(StoreError::corrupt(table, "snapshot is not a JSON array"));
    };
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            JsonValue::Object(map) => Ok(map),
            other => Err(StoreError::corrupt(table, format!("element {} is not an object: {}", i, other))),
        })
        .collect()
}

/// One `<root>/<table>.json` file per table holding a JSON array of records.
///
/// Writes go to a uniquely named staging file in the same directory which is flushed to
/// disk and then renamed over the live file, so the live file is never truncated.
#[derive(Debug, Clone)]
pub struct FileBackend {
    root: PathBuf,
    pretty: bool,
}

impl FileBackend {
    /// Create a backend rooted at `root`. The directory is created if missing.
    pub fn new<P: AsRef<Path>>(root: P) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| StoreError::persistence("<root>", e))?;
        Ok(Self { root, pretty: false })
    }

    /// Indent snapshot files for hand editing.
    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn root_path(&self) -> &Path { &self.root }

    pub fn snapshot_path(&self, table: &str) -> PathBuf { self.root.join(format!("{}.json", table)) }

    fn staging_path(&self, table: &str) -> PathBuf {
        self.root.join(format!(".{}.json.{}.tmp", table, uuid::Uuid::new_v4().simple()))
    }

    fn write_staged(&self, staging: &Path, bytes: &[u8]) -> std::io::Result<()> {
        let mut f = fs::OpenOptions::new().write(true).create_new(true).open(staging)?;
        f.write_all(bytes)?;
        f.sync_all()
    }

    #[cfg(unix)]
    fn sync_root(&self) {
        // Persists the rename itself; failure only weakens durability, not atomicity.
        if let Err(e) = fs::File::open(&self.root).and_then(|d| d.sync_all()) {
            warn!(target: "recordkeep::storage", "directory fsync failed for '{}': {}", self.root.display(), e);
        }
    }

    #[cfg(not(unix))]
    fn sync_root(&self) {}
}

impl SnapshotBackend for FileBackend {
    fn load(&self, table: &str) -> StoreResult<Vec<Record>> {
        let path = self.snapshot_path(table);
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(StoreError::NotFound(format!("table '{}'", table))),
            Err(e) => {
                error!(target: "recordkeep::storage", "read failed table='{}' path='{}': {}", table, path.display(), e);
                return Err(StoreError::persistence(table, e));
            }
        };
        let records = decode_snapshot(table, &bytes)?;
        debug!(target: "recordkeep::storage", "load table='{}' records={}", table, records.len());
        Ok(records)
    }

    fn store(&self, table: &str, records: &[Record]) -> StoreResult<()> {
        let bytes = (if self.pretty { serde_json::to_vec_pretty(records) } else { serde_json::to_vec(records) })
            .map_err(|e| StoreError::corrupt(table, e.to_string()))?;
        let staging = self.staging_path(table);
        let live = self.snapshot_path(table);
        let committed = self
            .write_staged(&staging, &bytes)
            .and_then(|_| fs::rename(&staging, &live));
        if let Err(e) = committed {
            let _ = fs::remove_file(&staging);
            error!(target: "recordkeep::storage", "write failed table='{}' path='{}': {}", table, live.display(), e);
            return Err(StoreError::persistence(table, e));
        }
        self.sync_root();
        debug!(target: "recordkeep::storage", "store table='{}' records={} bytes={}", table, records.len(), bytes.len());
        Ok(())
    }
}
