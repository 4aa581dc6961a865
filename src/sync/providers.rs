//! Collaborator seams consumed by the orchestrator
//!
//! Document identity, reader position, connectivity, user interaction and
//! time are all owned by the host application. The simple implementations
//! here back the CLI.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::types::{clamp_percentage, ProgressRecord};

/// Supplies the identity key of the current document
pub trait DigestProvider: Send + Sync {
    /// `None` when no document is open or no digest can be computed
    fn current_digest(&self) -> Option<String>;
}

/// Read and move the reader's position
pub trait ReaderPosition: Send + Sync {
    /// Opaque cursor for the current position
    fn current_progress(&self) -> String;
    /// Completion ratio in [0, 1]
    fn current_percentage(&self) -> f64;
    /// Jump to the position described by `record`
    fn apply(&self, record: &ProgressRecord);
}

/// Connectivity levels, ordered from worst to best
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Connectivity {
    Offline,
    /// Link up, internet not confirmed
    Connected,
    Online,
}

/// Current connectivity of the device
pub trait NetworkMonitor: Send + Sync {
    fn status(&self) -> Connectivity;
}

/// Presentation layer: notices and confirmations
#[async_trait]
pub trait Notifier: Send + Sync {
    fn info(&self, message: &str);
    fn error(&self, message: &str);
    /// Ask the user; `true` only on explicit acceptance
    async fn confirm(&self, message: &str) -> bool;
}

/// Wall clock in unix seconds
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

/// System wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Fixed digest, e.g. given on the command line
#[derive(Debug, Clone, Default)]
pub struct StaticDigest(pub Option<String>);

impl DigestProvider for StaticDigest {
    fn current_digest(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Network that is always reachable (shared folder on a local mount)
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnline;

impl NetworkMonitor for AlwaysOnline {
    fn status(&self) -> Connectivity {
        Connectivity::Online
    }
}

/// Position held in memory; `apply` moves it
#[derive(Debug)]
pub struct StaticPosition {
    inner: Mutex<(String, f64)>,
}

impl StaticPosition {
    pub fn new(cursor: impl Into<String>, percentage: f64) -> Self {
        Self {
            inner: Mutex::new((cursor.into(), clamp_percentage(percentage))),
        }
    }
}

impl ReaderPosition for StaticPosition {
    fn current_progress(&self) -> String {
        self.inner.lock().0.clone()
    }

    fn current_percentage(&self) -> f64 {
        self.inner.lock().1
    }

    fn apply(&self, record: &ProgressRecord) {
        *self.inner.lock() = (record.progress_cursor.clone(), record.percentage);
    }
}

/// Routes notices to the log and declines every prompt
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn info(&self, message: &str) {
        tracing::info!("{}", message);
    }

    fn error(&self, message: &str) {
        tracing::error!("{}", message);
    }

    async fn confirm(&self, message: &str) -> bool {
        tracing::info!("Declining prompt without a user: {}", message);
        false
    }
}
