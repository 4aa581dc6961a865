//! Progress synchronization
//!
//! The merge reconciler folds a fetched snapshot into the local store, the
//! orchestrator decides when that happens, and the worker drives the
//! orchestrator from a single tokio task.

mod lifecycle;
pub mod merge;
mod orchestrator;
pub mod providers;
pub mod transport;
mod worker;

pub use lifecycle::{AutoSync, LifecycleEvent, LifecycleEventKind};
pub use merge::{merge, merge_snapshot, on_merge, MergeReport};
pub use orchestrator::{
    Collaborators, DeviceSyncState, PullOutcome, SkipReason, SyncOrchestrator, SyncOutcome,
    SyncPhase, SyncRequest,
};
pub use providers::{
    AlwaysOnline, Clock, Connectivity, DigestProvider, LogNotifier, NetworkMonitor, Notifier,
    ReaderPosition, StaticDigest, StaticPosition, SystemClock,
};
pub use transport::{FolderTransport, MergeFn, Transport};
pub use worker::{SyncCommand, SyncWorker};

/// Sync direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncDirection {
    Push,
    Pull,
}
