//! Merge reconciler
//!
//! Folds a fetched remote snapshot into the local store with a per-key
//! last-writer-wins rule. The remote file is opened read-only; the local
//! store is the only mutation target and every write of one merge happens in
//! a single transaction.
//!
//! Ordering relies on device wall clocks being roughly comparable: a remote
//! record replaces the local one only when its timestamp is strictly greater.

use std::path::Path;

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::Serialize;

use crate::error::{Result, SyncError};
use crate::storage::queries::{list_progress, write_progress, RECORD_COLUMNS};
use crate::storage::PROGRESS_TABLE;

/// What a merge did to the local store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    /// Remote-only records copied in
    pub inserted: usize,
    /// Local records replaced by a strictly newer remote one
    pub updated: usize,
    /// Shared records where the local one was kept (older or tied remote)
    pub kept: usize,
    /// The remote snapshot was missing or unreadable and nothing was merged
    pub remote_skipped: bool,
}

impl MergeReport {
    fn skipped() -> Self {
        Self {
            remote_skipped: true,
            ..Default::default()
        }
    }

    /// Whether the local store changed
    pub fn changed(&self) -> bool {
        self.inserted + self.updated > 0
    }
}

/// Merge `remote` into `local`.
///
/// A missing, empty or malformed remote is not an error: the local store is
/// left as is and a skipped report comes back. A malformed local store fails
/// with `LocalStoreInvalid` before anything is written.
pub fn merge_snapshot(local: &Path, remote: &Path) -> Result<MergeReport> {
    // A bad local store fails the merge even when there is nothing to merge in
    let mut conn = open_local(local)?;

    let remote_records = match load_remote(remote) {
        Ok(records) => records,
        Err(e) => {
            tracing::warn!("Ignoring remote snapshot {}: {}", remote.display(), e);
            return Ok(MergeReport::skipped());
        }
    };

    let mut report = MergeReport::default();

    let tx = conn.transaction()?;
    for record in &remote_records {
        let local_timestamp: Option<i64> = tx
            .query_row(
                "SELECT timestamp FROM progress WHERE doc_digest = ?",
                params![record.doc_digest],
                |row| row.get(0),
            )
            .optional()?;

        match local_timestamp {
            None => {
                write_progress(&tx, record)?;
                report.inserted += 1;
            }
            Some(ts) if record.timestamp > ts => {
                write_progress(&tx, record)?;
                report.updated += 1;
            }
            Some(_) => report.kept += 1,
        }
    }
    tx.commit()?;

    // The transport ships the main file only; fold any WAL back in
    conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;

    Ok(report)
}

/// Boolean entry point: `true` unless the local store is unusable
pub fn merge(local: &Path, remote: &Path) -> bool {
    match merge_snapshot(local, remote) {
        Ok(report) => {
            tracing::info!(
                "Merged {} into {}: {} inserted, {} updated, {} kept{}",
                remote.display(),
                local.display(),
                report.inserted,
                report.updated,
                report.kept,
                if report.remote_skipped { " (remote skipped)" } else { "" }
            );
            true
        }
        Err(e) => {
            tracing::error!("Merge into {} failed: {}", local.display(), e);
            false
        }
    }
}

/// Transport callback. `cached` is the last snapshot the transport saw; the
/// reconciler is two-way and does not need it.
pub fn on_merge(local: &Path, _cached: &Path, remote: &Path) -> bool {
    merge(local, remote)
}

fn load_remote(path: &Path) -> Result<Vec<crate::types::ProgressRecord>> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| SyncError::RemoteSnapshotInvalid(format!("unreadable: {}", e)))?;
    if metadata.len() == 0 {
        return Err(SyncError::RemoteSnapshotInvalid("empty file".to_string()));
    }

    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| SyncError::RemoteSnapshotInvalid(e.to_string()))?;

    validate_schema(&conn).map_err(|e| SyncError::RemoteSnapshotInvalid(e.to_string()))?;
    list_progress(&conn).map_err(|e| SyncError::RemoteSnapshotInvalid(e.to_string()))
}

fn open_local(path: &Path) -> Result<Connection> {
    if !path.is_file() {
        return Err(SyncError::LocalStoreInvalid(format!(
            "{} does not exist",
            path.display()
        )));
    }

    // No CREATE flag: never conjure an empty store in place of a broken path
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| SyncError::LocalStoreInvalid(e.to_string()))?;
    conn.busy_timeout(std::time::Duration::from_secs(30))?;

    validate_schema(&conn).map_err(|e| SyncError::LocalStoreInvalid(e.to_string()))?;
    Ok(conn)
}

/// A store is well formed when the record table exists with every column we read
fn validate_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.prepare(&format!(
        "SELECT {} FROM {} LIMIT 0",
        RECORD_COLUMNS, PROGRESS_TABLE
    ))?;
    Ok(())
}
