//!
//! recordkeep storage module
//! --------------------------
//! Durable named tables of loosely typed JSON records keyed by `id`.
//!
//! Each table is persisted as one snapshot document through a [`SnapshotBackend`]:
//! `<data_dir>/<table>.json` for the [`FileBackend`], a byte buffer for the
//! [`MemoryBackend`]. Snapshots are replaced whole, never edited in place.
//!
//! Key responsibilities:
//! - Atomic whole-table writes (stage, fsync, rename).
//! - Upsert by id with replace-not-merge semantics and stable insertion order.
//! - Per-table writer serialization so read-modify-write cycles never interleave.
//!
//! The public API centers around [`TableStore`], usually shared behind an `Arc`
//! in the HTTP state.

mod backend;
mod memory;
mod record;
mod table;

pub use backend::{FileBackend, SnapshotBackend};
pub use memory::MemoryBackend;
pub use record::{Record, RecordId, ID_FIELD};
pub use table::{validate_table_name, Table, TableLocks, TableStore};

#[cfg(test)]
#[path = "storage_tests.rs"]
mod storage_tests;
