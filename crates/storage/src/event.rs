//! Notifications published by the store.

use std::path::PathBuf;

/// Something the store did, broadcast to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// Boot-time load finished; failed files were skipped.
    Ready { loaded: usize, failed: usize },
    /// A persisted table file could not be loaded.
    LoadFailed { file: PathBuf, reason: String },
    TableCreated { table: String },
    TableDropped { table: String },
    /// A save of every table is about to start.
    Saving,
    TableSaving { table: String },
    TableSaved { table: String },
    /// A table write-back failed; the next save retries it.
    SaveFailed { table: String, reason: String },
}
