//! Storage engine for readsync
//!
//! Handles the SQLite progress store: connection setup, schema ensure and
//! record queries.

mod connection;
mod migrations;
pub mod queries;

pub use connection::Storage;
pub use migrations::{run_migrations as ensure_schema, schema_version, PROGRESS_TABLE, SCHEMA_VERSION};

use crate::error::Result;
use crate::types::ProgressRecord;

impl Storage {
    /// Upsert a record (local writes always win)
    pub fn write(&self, record: &ProgressRecord) -> Result<()> {
        self.with_connection(|conn| queries::write_progress(conn, record))
    }

    /// Exact lookup by digest
    pub fn read(&self, doc_digest: &str) -> Result<Option<ProgressRecord>> {
        self.with_connection(|conn| queries::read_progress(conn, doc_digest))
    }

    /// All records ordered by digest
    pub fn list(&self) -> Result<Vec<ProgressRecord>> {
        self.with_connection(queries::list_progress)
    }

    /// Number of stored records
    pub fn count(&self) -> Result<i64> {
        self.with_connection(queries::count_progress)
    }

    /// Idempotent schema ensure; already done by `open`
    pub fn ensure(&self) -> Result<()> {
        self.with_connection(ensure_schema)
    }
}
