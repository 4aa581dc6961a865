//! readsync - reading progress sync
//!
//! Keeps one reading position per document consistent across devices that
//! only share a storage folder: a SQLite progress store, a last-writer-wins
//! merge of fetched snapshots, and an orchestrator that decides when to sync.

pub mod device;
pub mod error;
pub mod storage;
pub mod sync;
pub mod types;

pub use device::DeviceIdentity;
pub use error::{Result, SyncError};
pub use storage::Storage;
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
