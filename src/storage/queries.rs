//! Database queries for progress records

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::Result;
use crate::types::{clamp_percentage, ProgressRecord};

/// Columns in the order `record_from_row` expects them
pub const RECORD_COLUMNS: &str = "doc_digest, progress, percentage, timestamp, device, device_id";

/// Parse a record from a database row
pub fn record_from_row(row: &Row) -> rusqlite::Result<ProgressRecord> {
    Ok(ProgressRecord {
        doc_digest: row.get("doc_digest")?,
        progress_cursor: row.get("progress")?,
        percentage: row.get("percentage")?,
        timestamp: row.get("timestamp")?,
        origin_device: row.get("device")?,
        origin_device_id: row.get("device_id")?,
    })
}

/// Upsert a record, replacing every field of an existing row with the same digest
pub fn write_progress(conn: &Connection, record: &ProgressRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO progress (doc_digest, progress, percentage, timestamp, device, device_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(doc_digest) DO UPDATE SET
            progress = excluded.progress,
            percentage = excluded.percentage,
            timestamp = excluded.timestamp,
            device = excluded.device,
            device_id = excluded.device_id",
        params![
            record.doc_digest,
            record.progress_cursor,
            clamp_percentage(record.percentage),
            record.timestamp,
            record.origin_device,
            record.origin_device_id,
        ],
    )?;
    Ok(())
}

/// Exact lookup by digest
pub fn read_progress(conn: &Connection, doc_digest: &str) -> Result<Option<ProgressRecord>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {} FROM progress WHERE doc_digest = ?",
        RECORD_COLUMNS
    ))?;
    let record = stmt.query_row(params![doc_digest], record_from_row).optional()?;
    Ok(record)
}

/// All records, ordered by digest
pub fn list_progress(conn: &Connection) -> Result<Vec<ProgressRecord>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {} FROM progress ORDER BY doc_digest",
        RECORD_COLUMNS
    ))?;
    let records = stmt
        .query_map([], record_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(records)
}

/// Number of records in the store
pub fn count_progress(conn: &Connection) -> Result<i64> {
    let count = conn.query_row("SELECT COUNT(*) FROM progress", [], |row| row.get(0))?;
    Ok(count)
}
